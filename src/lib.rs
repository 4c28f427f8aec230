//! Server-side call completion for prost-based RPC services.
//!
//! A transport decodes a request, wraps it together with an empty response and its pending call
//! handle into an [`RpcContext`](context/struct.RpcContext.html) and hands that to the service
//! handler. The handler completes the call exactly once, from whatever thread or task it likes,
//! with a success response, a generic failure or a structured application error.
//!
//! ```
//! use std::sync::Arc;
//!
//! use prost_rpc_context::{InboundCall, MethodMetrics, RpcContext, UserCredentials};
//!
//! #[derive(Clone, PartialEq, prost::Message)]
//! struct GetRequest {
//!     #[prost(uint32, tag = "1")]
//!     id: u32,
//! }
//!
//! #[derive(Clone, PartialEq, prost::Message)]
//! struct GetResponse {
//!     #[prost(string, tag = "1")]
//!     result: String,
//! }
//!
//! let metrics = Arc::new(MethodMetrics::new("example.Store.Get"));
//! let (call, receiver) = InboundCall::new(1, "127.0.0.1:7051".parse().unwrap(), UserCredentials::new());
//! let mut ctx = RpcContext::new(Box::new(call), GetRequest { id: 7 }, GetResponse::default(), metrics);
//!
//! ctx.response_pb().result = "ok".to_owned();
//! ctx.respond_success();
//!
//! let response = futures::executor::block_on(receiver).unwrap();
//! assert_eq!(response.into_message::<GetResponse>().unwrap().result, "ok");
//! ```

#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unsafe_code)]
#![deny(unstable_features)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]

#[macro_use]
extern crate failure_derive;

pub mod call;
pub mod codec;
pub mod context;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod status;
pub mod trace;

pub use crate::call::{InboundCall, PendingCall, Response, ResponseReceiver};
pub use crate::context::RpcContext;
pub use crate::credentials::UserCredentials;
pub use crate::error::{Error, Result};
pub use crate::metrics::{MethodMetrics, MetricsSnapshot};
pub use crate::status::{ErrorStatusPb, RpcErrorCode};
pub use crate::trace::Trace;
