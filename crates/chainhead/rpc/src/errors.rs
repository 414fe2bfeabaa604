use thiserror::Error;

/// Errors surfaced by an [`RpcTransport`](crate::RpcTransport).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The node answered with an error, or the request could not be sent.
    #[error("rpc: {0}")]
    Rpc(String),

    /// The response did not have the expected shape.
    #[error("decode: {0}")]
    Decode(String),

    /// The connection is gone.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

/// Errors from negotiating and calling a versioned method group.
#[derive(Debug, Clone, Error)]
pub enum MethodGroupError {
    /// The node does not advertise a single method of the group.
    #[error("no methods found for prefix {0}")]
    NoMethodsForPrefix(String),

    /// The node exposes the group under a version we were told not to use.
    #[error("unsupported {prefix} version: {version}")]
    UnsupportedVersion { prefix: String, version: String },

    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}
