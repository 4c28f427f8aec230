//! Messages of the `quota.Quota` service.

/// Extension field number of `QuotaError` in the error envelope.
pub const QUOTA_ERROR_EXT: u32 = 150;

#[derive(Clone, PartialEq, prost::Message)]
pub struct ReserveRequest {
    #[prost(string, tag = "1")]
    pub client: String,
    #[prost(uint32, tag = "2")]
    pub units: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ReserveResponse {
    #[prost(uint32, tag = "1")]
    pub granted: u32,
    #[prost(uint32, tag = "2")]
    pub remaining: u32,
}

/// Sent under `QUOTA_ERROR_EXT` when a client has used up its quota.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QuotaError {
    #[prost(uint32, tag = "1")]
    pub retry_after_seconds: u32,
}
