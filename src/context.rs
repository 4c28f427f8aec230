//! The server-side handle through which a service handler completes a call.
use std::fmt;
use std::net;
use std::sync;
use std::thread;

use crate::call;
use crate::codec;
use crate::credentials;
use crate::metrics;
use crate::status;
use crate::trace;

/// The context handed to a service handler together with a request.
///
/// It owns the decoded request, the (initially empty) response and the obligation to complete
/// the pending call exactly once. The handler fills in [`response_pb`](#method.response_pb) and
/// then calls one of [`respond_success`](#method.respond_success),
/// [`respond_failure`](#method.respond_failure) or
/// [`respond_application_error`](#method.respond_application_error). Each of those consumes the
/// context, so it cannot be completed twice or used afterwards:
///
/// ```compile_fail
/// # fn handle(ctx: prost_rpc_context::RpcContext<(), ()>) {
/// ctx.respond_success();
/// ctx.respond_failure("again");
/// # }
/// ```
///
/// ```compile_fail
/// # fn handle(mut ctx: prost_rpc_context::RpcContext<(), ()>) {
/// ctx.respond_success();
/// ctx.response_pb();
/// # }
/// ```
///
/// The context can be moved to another thread or task and completed from there, before or after
/// the handler method returns.
///
/// Dropping a context without completing it is a bug in the handler. The call is then completed
/// with a generic application error so the client is not left waiting, and in builds with debug
/// assertions the drop panics.
#[derive(Debug)]
pub struct RpcContext<Req, Resp> {
    call: Option<Box<dyn call::PendingCall>>,
    request_pb: Req,
    response_pb: Resp,
    metrics: sync::Arc<metrics::MethodMetrics>,
}

impl<Req, Resp> RpcContext<Req, Resp>
where
    Req: prost::Message,
    Resp: prost::Message,
{
    /// Creates a context for `call`. This is meant to be called by service dispatch code, right
    /// before the handler is invoked.
    pub fn new(
        call: Box<dyn call::PendingCall>,
        request_pb: Req,
        response_pb: Resp,
        metrics: sync::Arc<metrics::MethodMetrics>,
    ) -> Self {
        RpcContext {
            call: Some(call),
            request_pb,
            response_pb,
            metrics,
        }
    }

    /// The trace buffer for this call.
    pub fn trace(&self) -> &trace::Trace {
        self.call().trace()
    }

    /// Sends the response message to the client.
    ///
    /// The response must already be filled in through [`response_pb`](#method.response_pb).
    /// Request and response are released when this returns.
    pub fn respond_success(mut self) {
        match codec::encode(&self.response_pb) {
            Ok(bytes) => self.finish(call::Response::Success(bytes)),
            Err(error) => {
                tracing::error!(
                    method = self.metrics.method(),
                    %error,
                    "failed to encode response"
                );
                let status = status::ErrorStatusPb::new(
                    status::RpcErrorCode::ErrorApplication,
                    format!("failed to encode response: {}", error),
                );
                self.finish(call::Response::Failure(status))
            }
        }
    }

    /// Completes the call with an `ERROR_APPLICATION` error carrying only `error` as text.
    ///
    /// Meant for unexpected failures the client is not expected to handle in any particular way;
    /// errors that clients should act upon are better sent with
    /// [`respond_application_error`](#method.respond_application_error).
    pub fn respond_failure<E>(mut self, error: E)
    where
        E: fmt::Display,
    {
        let status =
            status::ErrorStatusPb::new(status::RpcErrorCode::ErrorApplication, error.to_string());
        self.finish(call::Response::Failure(status))
    }

    /// Completes the call with an application error: a text `message` plus the structured
    /// `app_error_pb`, attached to the error envelope as extension field `error_ext_id`.
    ///
    /// For an error message defined as
    ///
    /// ```text
    /// message QuotaError {
    ///   extend ErrorStatusPB {
    ///     optional QuotaError quota_error_ext = 150;
    ///   }
    ///   required uint32 retry_after_seconds = 1;
    /// }
    /// ```
    ///
    /// a handler responds with
    /// `ctx.respond_application_error(150, "quota exceeded", &QuotaError { retry_after_seconds: 30 })`
    /// and the client reads it back with `status.extension::<QuotaError>(150)`.
    ///
    /// # Panics
    ///
    /// In builds with debug assertions, if `error_ext_id` is not a valid user extension id, i.e.
    /// greater than `LAST_RESERVED_EXTENSION_ID` and at most `MAX_EXTENSION_ID`. Either way the
    /// payload is dropped and the call is completed with only `message`, before any panic.
    /// Uniqueness of the id across services is not checked.
    pub fn respond_application_error<S, M>(
        mut self,
        error_ext_id: u32,
        message: S,
        app_error_pb: &M,
    ) where
        S: Into<String>,
        M: prost::Message,
    {
        let mut status =
            status::ErrorStatusPb::new(status::RpcErrorCode::ErrorApplication, message);
        if !status::is_user_extension_id(error_ext_id) {
            tracing::error!(
                method = self.metrics.method(),
                error_ext_id,
                "error extension id is reserved or out of range, dropping the error payload"
            );
            self.finish(call::Response::Failure(status));
            if cfg!(debug_assertions) {
                panic!(
                    "error extension id {} must be greater than {} and at most {}",
                    error_ext_id,
                    status::LAST_RESERVED_EXTENSION_ID,
                    status::MAX_EXTENSION_ID
                );
            }
            return;
        }
        if let Err(error) = status.set_extension(error_ext_id, app_error_pb) {
            tracing::error!(
                method = self.metrics.method(),
                error_ext_id,
                %error,
                "failed to encode application error payload"
            );
        }
        self.finish(call::Response::Failure(status))
    }

    /// The credentials of the remote user who made this call.
    pub fn user_credentials(&self) -> &credentials::UserCredentials {
        self.call().user_credentials()
    }

    /// The address the call was sent from.
    pub fn remote_address(&self) -> &net::SocketAddr {
        self.call().remote_address()
    }

    /// Identifies the requestor by both user and address; meant for log messages.
    pub fn requestor_string(&self) -> String {
        format!("{} at {}", self.user_credentials(), self.remote_address())
    }

    /// The decoded request.
    pub fn request_pb(&self) -> &Req {
        &self.request_pb
    }

    /// The response to fill in before calling `respond_success`.
    pub fn response_pb(&mut self) -> &mut Resp {
        &mut self.response_pb
    }

    /// The response as filled in so far.
    pub fn response_pb_ref(&self) -> &Resp {
        &self.response_pb
    }

    /// The counters of the method this call is for.
    pub fn metrics(&self) -> &metrics::MethodMetrics {
        &self.metrics
    }

    fn call(&self) -> &dyn call::PendingCall {
        match self.call {
            Some(ref call) => &**call,
            None => unreachable!("rpc context used after it was completed"),
        }
    }

    fn finish(&mut self, response: call::Response) {
        if let Some(call) = self.call.take() {
            complete(call, response, &self.metrics);
        }
    }
}

impl<Req, Resp> Drop for RpcContext<Req, Resp> {
    fn drop(&mut self) {
        let call = match self.call.take() {
            Some(call) => call,
            None => return,
        };

        let requestor = format!("{} at {}", call.user_credentials(), call.remote_address());
        tracing::error!(
            method = self.metrics.method(),
            requestor = %requestor,
            "rpc context dropped without responding"
        );
        let status = status::ErrorStatusPb::new(
            status::RpcErrorCode::ErrorApplication,
            "handler dropped the call without responding",
        );
        complete(call, call::Response::Failure(status), &self.metrics);

        if cfg!(debug_assertions) && !thread::panicking() {
            panic!(
                "rpc context for {} dropped without calling a respond method",
                self.metrics.method()
            );
        }
    }
}

fn complete(
    call: Box<dyn call::PendingCall>,
    response: call::Response,
    metrics: &metrics::MethodMetrics,
) {
    let latency = call.received_at().elapsed();
    if response.is_success() {
        metrics.record_success(latency);
    } else {
        metrics.record_failure(latency);
    }
    tracing::debug!(
        method = metrics.method(),
        success = response.is_success(),
        latency_us = latency.as_micros() as u64,
        "completing call"
    );

    if let Err(error) = call.transmit(response) {
        metrics.record_transmit_failure();
        tracing::warn!(method = metrics.method(), %error, "failed to transmit response");
    }
}
