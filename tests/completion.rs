use std::net;
use std::sync;
use std::thread;

use prost_rpc_context::{
    ErrorStatusPb, InboundCall, MethodMetrics, Response, ResponseReceiver, RpcContext,
    RpcErrorCode, UserCredentials,
};

#[derive(Clone, PartialEq, prost::Message)]
struct ReserveRequest {
    #[prost(uint32, tag = "1")]
    id: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
struct ReserveResponse {
    #[prost(string, tag = "1")]
    result: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct QuotaError {
    #[prost(uint32, tag = "1")]
    retry_after_seconds: u32,
}

const QUOTA_ERROR_EXT: u32 = 150;

fn address() -> net::SocketAddr {
    "192.168.1.20:51000".parse().unwrap()
}

fn reserve_context(
    call_id: u64,
    id: u32,
    metrics: &sync::Arc<MethodMetrics>,
) -> (RpcContext<ReserveRequest, ReserveResponse>, ResponseReceiver) {
    let (call, receiver) = InboundCall::new(call_id, address(), UserCredentials::for_user("svc"));
    let ctx = RpcContext::new(
        Box::new(call),
        ReserveRequest { id },
        ReserveResponse::default(),
        metrics.clone(),
    );
    (ctx, receiver)
}

fn decode_status(response: Response) -> ErrorStatusPb {
    // Go through the wire encoding, the way a client would see it.
    let bytes = prost_rpc_context::codec::encode(&response.into_status().unwrap()).unwrap();
    prost_rpc_context::codec::decode(bytes).unwrap()
}

#[test]
fn success_payload_equals_what_the_handler_wrote() {
    let metrics = sync::Arc::new(MethodMetrics::new("quota.Quota.Reserve"));
    let (mut ctx, receiver) = reserve_context(1, 7, &metrics);

    assert_eq!(ctx.request_pb().id, 7);
    ctx.response_pb().result = "ok".to_owned();
    ctx.respond_success();

    let response = futures::executor::block_on(receiver).unwrap();
    assert_eq!(
        response.into_message::<ReserveResponse>().unwrap(),
        ReserveResponse {
            result: "ok".to_owned()
        }
    );
}

#[test]
fn quota_exceeded_scenario() {
    let metrics = sync::Arc::new(MethodMetrics::new("quota.Quota.Reserve"));
    let (ctx, receiver) = reserve_context(2, 7, &metrics);

    ctx.respond_application_error(
        QUOTA_ERROR_EXT,
        "quota exceeded",
        &QuotaError {
            retry_after_seconds: 30,
        },
    );

    let status = decode_status(futures::executor::block_on(receiver).unwrap());
    assert_eq!(status.message, "quota exceeded");
    assert_eq!(status.code(), RpcErrorCode::ErrorApplication);
    assert_eq!(
        status.extension::<QuotaError>(QUOTA_ERROR_EXT).unwrap(),
        Some(QuotaError {
            retry_after_seconds: 30
        })
    );
}

#[test]
fn generic_failure_has_no_extensions_on_the_wire() {
    let metrics = sync::Arc::new(MethodMetrics::new("quota.Quota.Reserve"));
    let (ctx, receiver) = reserve_context(3, 7, &metrics);

    ctx.respond_failure(failure::err_msg("backend unavailable"));

    let status = decode_status(futures::executor::block_on(receiver).unwrap());
    assert_eq!(status.message, "backend unavailable");
    assert_eq!(status.code(), RpcErrorCode::ErrorApplication);
    assert_eq!(status.extension_ids().count(), 0);
}

#[test]
fn concurrent_completions_count_every_call() {
    const CALLS: u64 = 64;

    let metrics = sync::Arc::new(MethodMetrics::new("quota.Quota.Reserve"));
    let mut receivers = Vec::new();
    let mut threads = Vec::new();
    for call_id in 0..CALLS {
        let (mut ctx, receiver) = reserve_context(call_id, call_id as u32, &metrics);
        receivers.push(receiver);
        threads.push(thread::spawn(move || {
            if ctx.request_pb().id % 2 == 0 {
                ctx.response_pb().result = "ok".to_owned();
                ctx.respond_success();
            } else {
                ctx.respond_failure("odd");
            }
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.successes, CALLS / 2);
    assert_eq!(snapshot.failures, CALLS / 2);
    assert_eq!(snapshot.completed(), CALLS);
    assert_eq!(snapshot.transmit_failures, 0);

    for receiver in receivers {
        futures::executor::block_on(receiver).unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handler_hands_context_to_background_task() {
    let metrics = sync::Arc::new(MethodMetrics::new("quota.Quota.Reserve"));
    let (ctx, receiver) = reserve_context(4, 7, &metrics);

    // The handler returns right away; a blocking worker completes the call later.
    let worker = tokio::task::spawn_blocking(move || {
        let mut ctx = ctx;
        ctx.trace().record("reserved on worker");
        let id = ctx.request_pb().id;
        ctx.response_pb().result = format!("reserved {}", id);
        ctx.respond_success();
    });

    let response = receiver.await.unwrap();
    worker.await.unwrap();
    assert_eq!(
        response.into_message::<ReserveResponse>().unwrap().result,
        "reserved 7"
    );
    assert_eq!(metrics.snapshot().successes, 1);
}

#[test]
fn trace_is_readable_after_completion() {
    let metrics = sync::Arc::new(MethodMetrics::new("quota.Quota.Reserve"));
    let (ctx, receiver) = reserve_context(5, 7, &metrics);

    ctx.trace().record("looked up quota");
    assert_eq!(ctx.requestor_string(), "{real_user=svc, eff_user=} at 192.168.1.20:51000");
    ctx.respond_failure("denied");

    assert!(receiver.trace().dump().contains("looked up quota"));
    assert!(!futures::executor::block_on(receiver).unwrap().is_success());
}
