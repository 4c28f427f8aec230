//! The boundary between the completion context and the transport that owns the call.
use std::fmt;
use std::net;
use std::pin;
use std::sync;
use std::task;
use std::time;

use futures::channel::oneshot;
use futures::Future;

use crate::codec;
use crate::credentials;
use crate::error;
use crate::status;
use crate::trace;

/// What a call was completed with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// The serialized response message.
    Success(bytes::Bytes),
    /// The error envelope describing why the call failed.
    Failure(status::ErrorStatusPb),
}

impl Response {
    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        match *self {
            Response::Success(_) => true,
            Response::Failure(_) => false,
        }
    }

    /// Decodes a successful response as an `M`; a failure becomes an `Error::Remote`.
    pub fn into_message<M>(self) -> error::Result<M>
    where
        M: prost::Message + Default,
    {
        match self {
            Response::Success(bytes) => codec::decode(bytes),
            Response::Failure(status) => Err(error::Error::remote(status)),
        }
    }

    /// The error envelope, if the call failed.
    pub fn into_status(self) -> Option<status::ErrorStatusPb> {
        match self {
            Response::Success(_) => None,
            Response::Failure(status) => Some(status),
        }
    }
}

/// A call that has been received and decoded by the transport and is waiting for its response.
///
/// The transport owns implementations of this trait; a completion context only borrows the
/// caller's identity from it and finally hands it back through `transmit`.
pub trait PendingCall: fmt::Debug + Send + 'static {
    /// The address of the peer that sent the call.
    fn remote_address(&self) -> &net::SocketAddr;

    /// The credentials of the peer that sent the call.
    fn user_credentials(&self) -> &credentials::UserCredentials;

    /// The trace buffer of this call.
    fn trace(&self) -> &trace::Trace;

    /// When the call was received; handler latency is measured from here.
    fn received_at(&self) -> time::Instant;

    /// Queues the response for sending and gives the call back to the transport.
    ///
    /// An error means the response could not be queued, e.g. because the connection has already
    /// gone away. The call is finished either way.
    fn transmit(self: Box<Self>, response: Response) -> error::Result<()>;
}

/// A pending call that hands its response to the connection over a oneshot channel.
#[derive(Debug)]
pub struct InboundCall {
    call_id: u64,
    remote_address: net::SocketAddr,
    credentials: credentials::UserCredentials,
    trace: sync::Arc<trace::Trace>,
    received_at: time::Instant,
    sender: oneshot::Sender<Response>,
}

/// The connection's end of an [`InboundCall`](struct.InboundCall.html).
///
/// Resolves to the response once the call is completed, or to `Error::Canceled` if the call is
/// dropped without ever transmitting one.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct ResponseReceiver {
    call_id: u64,
    trace: sync::Arc<trace::Trace>,
    receiver: oneshot::Receiver<Response>,
}

impl InboundCall {
    /// Creates a call received just now, together with the receiver for its response.
    pub fn new(
        call_id: u64,
        remote_address: net::SocketAddr,
        credentials: credentials::UserCredentials,
    ) -> (InboundCall, ResponseReceiver) {
        let (sender, receiver) = oneshot::channel();
        let trace = sync::Arc::new(trace::Trace::new());
        let call = InboundCall {
            call_id,
            remote_address,
            credentials,
            trace: trace.clone(),
            received_at: time::Instant::now(),
            sender,
        };
        let receiver = ResponseReceiver {
            call_id,
            trace,
            receiver,
        };
        (call, receiver)
    }

    /// The transport-assigned id of this call.
    pub fn call_id(&self) -> u64 {
        self.call_id
    }
}

impl PendingCall for InboundCall {
    fn remote_address(&self) -> &net::SocketAddr {
        &self.remote_address
    }

    fn user_credentials(&self) -> &credentials::UserCredentials {
        &self.credentials
    }

    fn trace(&self) -> &trace::Trace {
        &self.trace
    }

    fn received_at(&self) -> time::Instant {
        self.received_at
    }

    fn transmit(self: Box<Self>, response: Response) -> error::Result<()> {
        let call_id = self.call_id;
        self.sender
            .send(response)
            .map_err(|_| error::Error::ConnectionClosed { call_id })
    }
}

impl ResponseReceiver {
    /// The id of the call this receiver belongs to.
    pub fn call_id(&self) -> u64 {
        self.call_id
    }

    /// The trace buffer of the call, readable after it has completed.
    pub fn trace(&self) -> &trace::Trace {
        &self.trace
    }
}

impl Future for ResponseReceiver {
    type Output = error::Result<Response>;

    fn poll(mut self: pin::Pin<&mut Self>, cx: &mut task::Context) -> task::Poll<Self::Output> {
        pin::Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(error::Error::from))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn address() -> net::SocketAddr {
        "127.0.0.1:7051".parse().unwrap()
    }

    #[test]
    fn transmit_reaches_receiver() {
        let (call, receiver) = InboundCall::new(1, address(), credentials::UserCredentials::new());
        assert_eq!(call.call_id(), 1);
        call.trace().record("handled");

        let call: Box<dyn PendingCall> = Box::new(call);
        call.transmit(Response::Success(bytes::Bytes::from_static(b"\x08\x01")))
            .unwrap();

        assert_eq!(receiver.trace().entries().len(), 1);
        let response = futures::executor::block_on(receiver).unwrap();
        assert!(response.is_success());
    }

    #[test]
    fn transmit_after_receiver_is_gone() {
        let (call, receiver) = InboundCall::new(2, address(), credentials::UserCredentials::new());
        drop(receiver);

        let result = Box::new(call).transmit(Response::Success(bytes::Bytes::new()));
        assert_eq!(result, Err(error::Error::ConnectionClosed { call_id: 2 }));
    }

    #[test]
    fn dropped_call_cancels_receiver() {
        let (call, receiver) = InboundCall::new(3, address(), credentials::UserCredentials::new());
        drop(call);

        match futures::executor::block_on(receiver) {
            Err(error::Error::Canceled { .. }) => {}
            other => panic!("expected cancellation, got {:?}", other),
        }
    }

    #[test]
    fn failure_becomes_remote_error() {
        let status =
            status::ErrorStatusPb::new(status::RpcErrorCode::ErrorApplication, "nope");
        let response = Response::Failure(status.clone());
        assert!(!response.is_success());
        assert_eq!(response.clone().into_status(), Some(status.clone()));

        #[derive(Clone, PartialEq, prost::Message)]
        struct Empty {}

        assert_eq!(
            response.into_message::<Empty>(),
            Err(error::Error::remote(status))
        );
    }
}
