#[macro_use]
extern crate failure_derive;

use std::collections;
use std::net;
use std::sync;

use clap::Parser;
use parking_lot::Mutex;
use prost_rpc_context::{InboundCall, MethodMetrics, RpcContext, UserCredentials};

mod schema;

/// Runs a batch of quota reservations through an in-process quota service.
#[derive(Debug, Parser)]
#[command(name = "quota-demo")]
struct Args {
    /// Number of reservation calls to issue.
    #[arg(long, env = "QUOTA_DEMO_CALLS", default_value_t = 12)]
    calls: u32,
    /// Units a client may hold before further reservations are rejected.
    #[arg(long, env = "QUOTA_DEMO_LIMIT", default_value_t = 10)]
    limit: u32,
    /// Units asked for by every call.
    #[arg(long, default_value_t = 3)]
    units: u32,
    /// Seconds a rejected client is told to wait before retrying.
    #[arg(long, default_value_t = 30)]
    retry_after_seconds: u32,
}

#[derive(Debug, Fail)]
enum ReserveError {
    #[fail(display = "Invalid request: cannot reserve zero units")]
    ZeroUnits,
}

#[derive(Debug)]
struct QuotaService {
    limit: u32,
    retry_after_seconds: u32,
    used: Mutex<collections::HashMap<String, u32>>,
}

type ReserveContext = RpcContext<schema::ReserveRequest, schema::ReserveResponse>;

impl QuotaService {
    fn new(limit: u32, retry_after_seconds: u32) -> Self {
        QuotaService {
            limit,
            retry_after_seconds,
            used: Mutex::new(collections::HashMap::new()),
        }
    }

    /// Handles `quota.Quota.Reserve`. The call is completed on a background task, after this
    /// method has returned.
    fn reserve(self: &sync::Arc<Self>, ctx: ReserveContext) {
        let service = self.clone();
        tokio::spawn(async move { service.complete_reserve(ctx) });
    }

    fn complete_reserve(&self, mut ctx: ReserveContext) {
        let client = ctx.request_pb().client.clone();
        let units = ctx.request_pb().units;
        ctx.trace().record(format!("reserving {} units for {}", units, client));

        if units == 0 {
            return ctx.respond_failure(ReserveError::ZeroUnits);
        }

        let remaining = {
            let mut used = self.used.lock();
            let held = used.entry(client.clone()).or_insert(0);
            match held.checked_add(units) {
                Some(total) if total <= self.limit => {
                    *held = total;
                    Some(self.limit - total)
                }
                _ => None,
            }
        };

        match remaining {
            Some(remaining) => {
                let response = ctx.response_pb();
                response.granted = units;
                response.remaining = remaining;
                ctx.respond_success();
            }
            None => {
                tracing::info!(requestor = %ctx.requestor_string(), units, "quota exceeded");
                ctx.respond_application_error(
                    schema::QUOTA_ERROR_EXT,
                    "quota exceeded",
                    &schema::QuotaError {
                        retry_after_seconds: self.retry_after_seconds,
                    },
                );
            }
        }
    }
}

fn describe(result: prost_rpc_context::Result<prost_rpc_context::Response>) -> String {
    let response = match result {
        Ok(response) => response,
        Err(error) => return format!("transport error: {}", error),
    };
    match response.into_message::<schema::ReserveResponse>() {
        Ok(response) => format!(
            "granted {} units, {} remaining",
            response.granted, response.remaining
        ),
        Err(error) => match error.remote_status() {
            Some(status) => match status.extension::<schema::QuotaError>(schema::QUOTA_ERROR_EXT) {
                Ok(Some(quota)) => format!(
                    "{} (retry after {}s)",
                    status.message, quota.retry_after_seconds
                ),
                _ => status.to_string(),
            },
            None => error.to_string(),
        },
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .init();

    let args = Args::parse();
    let service = sync::Arc::new(QuotaService::new(args.limit, args.retry_after_seconds));
    let metrics = sync::Arc::new(MethodMetrics::new("quota.Quota.Reserve"));
    let peer = net::SocketAddr::new(net::Ipv4Addr::LOCALHOST.into(), 7051);

    let mut receivers = Vec::new();
    for call_id in 0..u64::from(args.calls) {
        let client = format!("client-{}", call_id % 2);
        let (call, receiver) =
            InboundCall::new(call_id, peer, UserCredentials::for_user(client.clone()));
        let request = schema::ReserveRequest {
            client,
            units: args.units,
        };
        let ctx = RpcContext::new(
            Box::new(call),
            request,
            schema::ReserveResponse::default(),
            metrics.clone(),
        );
        service.reserve(ctx);
        receivers.push(receiver);
    }

    for receiver in receivers {
        let call_id = receiver.call_id();
        let trace = receiver.trace().dump();
        let outcome = describe(receiver.await);
        println!("call {}: {}", call_id, outcome);
        tracing::debug!(call_id, trace = %trace.trim_end(), "call trace");
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        method = metrics.method(),
        successes = snapshot.successes,
        failures = snapshot.failures,
        transmit_failures = snapshot.transmit_failures,
        mean_latency_us = snapshot.mean_latency_us(),
        max_latency_us = snapshot.max_latency_us,
        "done"
    );
}
