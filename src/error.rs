use thiserror::Error;

/// Errors raised while emitting events on the socket transport. Inbound
/// delivery problems never surface here; the transport's own reconnection
/// handles those.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("failed to emit '{event}': {source}")]
    Emit {
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// A REST request that did not produce a usable response.
#[derive(Debug, Error)]
#[error("request to {endpoint} failed: {source}")]
pub struct FetchError {
    pub endpoint: String,
    #[source]
    pub source: anyhow::Error,
}

impl FetchError {
    pub fn new(endpoint: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            endpoint: endpoint.into(),
            source,
        }
    }
}

/// Local rejections applied before anything is emitted. No event is sent
/// when one of these fires.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("message is {len} characters, limit is {limit}")]
    MessageTooLong { len: usize, limit: usize },
    #[error("no conversation is open")]
    NoOpenConversation,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unknown conversation '{0}'")]
    UnknownConversation(String),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
