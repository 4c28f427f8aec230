//! Encoding helpers shared by the context, the wire envelope and the transport boundary.
use crate::error;

/// Efficiently decode a particular message type from a byte buffer.
pub fn decode<M>(buf: bytes::Bytes) -> error::Result<M>
where
    M: prost::Message + Default,
{
    let message = prost::Message::decode(buf)?;
    Ok(message)
}

/// Efficiently encode a particular message into a byte buffer.
pub fn encode<M>(message: &M) -> error::Result<bytes::Bytes>
where
    M: prost::Message,
{
    let len = prost::Message::encoded_len(message);
    let mut buf = bytes::BytesMut::with_capacity(len);
    prost::Message::encode(message, &mut buf)?;
    Ok(buf.freeze())
}
