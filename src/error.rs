//! Error type definitions for errors that can occur around an RPC call completion.
use std::result;

use crate::status;

/// A convenience type alias for creating a `Result` with the error being of type `Error`.
pub type Result<A> = result::Result<A, Error>;

/// An error has occurred.
///
/// None of these are ever surfaced to a handler through the completion operations of an
/// [`RpcContext`](../context/struct.RpcContext.html); they show up at the transport boundary and
/// on the client side when a response is decoded.
#[derive(Clone, Debug, Eq, Fail, PartialEq)]
pub enum Error {
    /// An error occurred during message decoding.
    #[fail(display = "Decode error: {}", error)]
    Decode {
        /// The underlying decode error.
        #[cause]
        error: prost::DecodeError,
    },
    /// An error occurred during message encoding.
    #[fail(display = "Encode error: {}", error)]
    Encode {
        /// The underlying encode error.
        #[cause]
        error: prost::EncodeError,
    },
    /// The pending call was dropped before it transmitted a response.
    #[fail(display = "Canceled error: {}", error)]
    Canceled {
        /// The underlying canceled error.
        #[cause]
        error: futures::channel::oneshot::Canceled,
    },
    /// The connection went away before the response could be handed to it.
    #[fail(display = "Connection closed before responding to call {}", call_id)]
    ConnectionClosed {
        /// The id of the call whose response was lost.
        call_id: u64,
    },
    /// The remote side completed the call with an error envelope.
    #[fail(display = "Remote error: {}", status)]
    Remote {
        /// The envelope sent by the remote side.
        status: status::ErrorStatusPb,
    },
}

impl Error {
    /// Constructs a new remote error.
    pub fn remote(status: status::ErrorStatusPb) -> Self {
        Error::Remote { status }
    }

    /// Returns the remote error envelope, if this is a remote error.
    pub fn remote_status(&self) -> Option<&status::ErrorStatusPb> {
        match *self {
            Error::Remote { ref status } => Some(status),
            _ => None,
        }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(error: prost::DecodeError) -> Self {
        Error::Decode { error }
    }
}

impl From<prost::EncodeError> for Error {
    fn from(error: prost::EncodeError) -> Self {
        Error::Encode { error }
    }
}

impl From<futures::channel::oneshot::Canceled> for Error {
    fn from(error: futures::channel::oneshot::Canceled) -> Self {
        Error::Canceled { error }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remote_status_only_for_remote_errors() {
        let status = status::ErrorStatusPb::new(status::RpcErrorCode::ErrorApplication, "boom");
        let error = Error::remote(status.clone());
        assert_eq!(error.remote_status(), Some(&status));
        assert_eq!(error.to_string(), "Remote error: ERROR_APPLICATION: boom");

        let closed = Error::ConnectionClosed { call_id: 3 };
        assert_eq!(closed.remote_status(), None);
        assert_eq!(
            closed.to_string(),
            "Connection closed before responding to call 3"
        );
    }
}
