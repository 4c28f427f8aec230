//! The error envelope that is sent to the client when a call does not succeed.
//!
//! The envelope is wire compatible with this protobuf (proto2) message:
//!
//! ```text
//! message ErrorStatusPB {
//!   required string message = 1;
//!   optional RpcErrorCodePB code = 2;
//!   extensions 100 to max;
//! }
//! ```
//!
//! Services that want to pass structured error details define their own message and attach it
//! under an extension field number of their choosing; see
//! [`ErrorStatusPb::set_extension`](struct.ErrorStatusPb.html#method.set_extension).
use std::collections;
use std::fmt;

use prost::encoding::{self, DecodeContext, WireType};

use crate::codec;
use crate::error;

/// The first field number of the extension range of the envelope.
pub const FIRST_EXTENSION_ID: u32 = 100;

/// The last extension field number reserved for error kinds built into the framework.
///
/// Extensions defined by services must use a field number strictly greater than this.
pub const LAST_RESERVED_EXTENSION_ID: u32 = 101;

/// The largest field number protobuf allows.
pub const MAX_EXTENSION_ID: u32 = (1 << 29) - 1;

const MESSAGE_TAG: u32 = 1;
const CODE_TAG: u32 = 2;

/// Whether `id` may be used for a service-defined error extension.
pub fn is_user_extension_id(id: u32) -> bool {
    id > LAST_RESERVED_EXTENSION_ID && id <= MAX_EXTENSION_ID
}

/// The error category carried in the `code` field of the envelope.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RpcErrorCode {
    /// The server failed in an unspecified way.
    FatalUnknown = 10,
    /// The service handler reported an error.
    ErrorApplication = 1,
    /// The requested method does not exist.
    ErrorNoSuchMethod = 2,
    /// The requested service does not exist.
    ErrorNoSuchService = 3,
    /// The server rejected the call because it is overloaded.
    ErrorServerTooBusy = 4,
    /// The request could not be processed.
    ErrorInvalidRequest = 5,
    /// The server is shutting down.
    FatalServerShuttingDown = 11,
    /// The call header was malformed.
    FatalInvalidRpcHeader = 12,
    /// The request could not be deserialized.
    FatalDeserializingRequest = 13,
    /// The client speaks an incompatible protocol version.
    FatalVersionMismatch = 14,
    /// The client is not allowed to talk to this server.
    FatalUnauthorized = 15,
}

impl RpcErrorCode {
    /// Looks up the code with the given wire value.
    pub fn from_i32(value: i32) -> Option<RpcErrorCode> {
        match value {
            10 => Some(RpcErrorCode::FatalUnknown),
            1 => Some(RpcErrorCode::ErrorApplication),
            2 => Some(RpcErrorCode::ErrorNoSuchMethod),
            3 => Some(RpcErrorCode::ErrorNoSuchService),
            4 => Some(RpcErrorCode::ErrorServerTooBusy),
            5 => Some(RpcErrorCode::ErrorInvalidRequest),
            11 => Some(RpcErrorCode::FatalServerShuttingDown),
            12 => Some(RpcErrorCode::FatalInvalidRpcHeader),
            13 => Some(RpcErrorCode::FatalDeserializingRequest),
            14 => Some(RpcErrorCode::FatalVersionMismatch),
            15 => Some(RpcErrorCode::FatalUnauthorized),
            _ => None,
        }
    }

    /// Fatal errors mean the client should tear down the connection.
    pub fn is_fatal(self) -> bool {
        match self {
            RpcErrorCode::FatalUnknown
            | RpcErrorCode::FatalServerShuttingDown
            | RpcErrorCode::FatalInvalidRpcHeader
            | RpcErrorCode::FatalDeserializingRequest
            | RpcErrorCode::FatalVersionMismatch
            | RpcErrorCode::FatalUnauthorized => true,
            _ => false,
        }
    }

    /// The name of the code as it appears in the protobuf definition.
    pub fn as_str_name(self) -> &'static str {
        match self {
            RpcErrorCode::FatalUnknown => "FATAL_UNKNOWN",
            RpcErrorCode::ErrorApplication => "ERROR_APPLICATION",
            RpcErrorCode::ErrorNoSuchMethod => "ERROR_NO_SUCH_METHOD",
            RpcErrorCode::ErrorNoSuchService => "ERROR_NO_SUCH_SERVICE",
            RpcErrorCode::ErrorServerTooBusy => "ERROR_SERVER_TOO_BUSY",
            RpcErrorCode::ErrorInvalidRequest => "ERROR_INVALID_REQUEST",
            RpcErrorCode::FatalServerShuttingDown => "FATAL_SERVER_SHUTTING_DOWN",
            RpcErrorCode::FatalInvalidRpcHeader => "FATAL_INVALID_RPC_HEADER",
            RpcErrorCode::FatalDeserializingRequest => "FATAL_DESERIALIZING_REQUEST",
            RpcErrorCode::FatalVersionMismatch => "FATAL_VERSION_MISMATCH",
            RpcErrorCode::FatalUnauthorized => "FATAL_UNAUTHORIZED",
        }
    }
}

impl Default for RpcErrorCode {
    fn default() -> Self {
        RpcErrorCode::FatalUnknown
    }
}

impl From<RpcErrorCode> for i32 {
    fn from(code: RpcErrorCode) -> i32 {
        code as i32
    }
}

/// The error envelope of a failed call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorStatusPb {
    /// Human readable description of the error. Always present on the wire.
    pub message: String,
    /// Raw wire value of the error category, if one was set.
    pub code: Option<i32>,
    extensions: collections::BTreeMap<u32, bytes::Bytes>,
}

impl ErrorStatusPb {
    /// Creates an envelope with the given category and message and no extensions.
    pub fn new<S>(code: RpcErrorCode, message: S) -> Self
    where
        S: Into<String>,
    {
        ErrorStatusPb {
            message: message.into(),
            code: Some(code.into()),
            extensions: collections::BTreeMap::new(),
        }
    }

    /// The error category; an absent or unknown value reads as `FATAL_UNKNOWN`.
    pub fn code(&self) -> RpcErrorCode {
        self.code
            .and_then(RpcErrorCode::from_i32)
            .unwrap_or_default()
    }

    /// Attaches `payload` under extension field number `id`, replacing any previous value.
    ///
    /// # Panics
    ///
    /// If `id` is outside of `FIRST_EXTENSION_ID..=MAX_EXTENSION_ID`; such a field would collide
    /// with the regular fields of the envelope or not be encodable at all.
    pub fn set_extension<M>(&mut self, id: u32, payload: &M) -> error::Result<()>
    where
        M: prost::Message,
    {
        let bytes = codec::encode(payload)?;
        self.set_extension_bytes(id, bytes);
        Ok(())
    }

    /// Attaches an already serialized payload under extension field number `id`.
    ///
    /// # Panics
    ///
    /// Same as [`set_extension`](#method.set_extension).
    pub fn set_extension_bytes(&mut self, id: u32, payload: bytes::Bytes) {
        assert!(
            id >= FIRST_EXTENSION_ID && id <= MAX_EXTENSION_ID,
            "error extension id {} is outside of {}..={}",
            id,
            FIRST_EXTENSION_ID,
            MAX_EXTENSION_ID
        );
        self.extensions.insert(id, payload);
    }

    /// Decodes the extension with field number `id` as an `M`, if it is present.
    pub fn extension<M>(&self, id: u32) -> error::Result<Option<M>>
    where
        M: prost::Message + Default,
    {
        match self.extensions.get(&id) {
            Some(bytes) => Ok(Some(codec::decode(bytes.clone())?)),
            None => Ok(None),
        }
    }

    /// The raw serialized payload of extension `id`.
    pub fn extension_bytes(&self, id: u32) -> Option<&bytes::Bytes> {
        self.extensions.get(&id)
    }

    /// Whether extension `id` is populated.
    pub fn has_extension(&self, id: u32) -> bool {
        self.extensions.contains_key(&id)
    }

    /// The field numbers of all populated extensions, in ascending order.
    pub fn extension_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.extensions.keys().cloned()
    }
}

impl fmt::Display for ErrorStatusPb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code().as_str_name(), self.message)
    }
}

impl prost::Message for ErrorStatusPb {
    fn encode_raw(&self, buf: &mut impl bytes::BufMut)
    where
        Self: Sized,
    {
        encoding::string::encode(MESSAGE_TAG, &self.message, buf);
        if let Some(ref code) = self.code {
            encoding::int32::encode(CODE_TAG, code, buf);
        }
        for (id, payload) in &self.extensions {
            encoding::bytes::encode(*id, payload, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl bytes::Buf,
        ctx: DecodeContext,
    ) -> Result<(), prost::DecodeError>
    where
        Self: Sized,
    {
        match tag {
            MESSAGE_TAG => encoding::string::merge(wire_type, &mut self.message, buf, ctx),
            CODE_TAG => {
                let mut code = 0;
                encoding::int32::merge(wire_type, &mut code, buf, ctx)?;
                self.code = Some(code);
                Ok(())
            }
            id if id >= FIRST_EXTENSION_ID && wire_type == WireType::LengthDelimited => {
                let mut payload = bytes::Bytes::new();
                encoding::bytes::merge(wire_type, &mut payload, buf, ctx)?;
                // A message field split over several occurrences merges as the concatenation of
                // their payloads.
                let merged = match self.extensions.remove(&id) {
                    Some(previous) => {
                        let mut joined =
                            bytes::BytesMut::with_capacity(previous.len() + payload.len());
                        joined.extend_from_slice(&previous);
                        joined.extend_from_slice(&payload);
                        joined.freeze()
                    }
                    None => payload,
                };
                self.extensions.insert(id, merged);
                Ok(())
            }
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::string::encoded_len(MESSAGE_TAG, &self.message)
            + self
                .code
                .as_ref()
                .map_or(0, |code| encoding::int32::encoded_len(CODE_TAG, code))
            + self
                .extensions
                .iter()
                .map(|(id, payload)| encoding::bytes::encoded_len(*id, payload))
                .sum::<usize>()
    }

    fn clear(&mut self) {
        self.message.clear();
        self.code = None;
        self.extensions.clear();
    }
}
