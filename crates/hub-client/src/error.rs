/// Failures reported by a transport implementation.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection refused: {0}")]
    Refused(String),

    #[error("connection closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Top-level client error.
///
/// None of these are fatal to the host: they reach the application through
/// the error callback or as the return value of [`HubClient::send`](crate::HubClient::send).
#[derive(thiserror::Error, Debug)]
pub enum HubError {
    #[error("config: {0}")]
    Config(String),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("not connected")]
    NotConnected,

    #[error("encode: {0}")]
    Encode(#[from] gm_protocol::CodecError),

    #[error("write failed: transport is gone")]
    WriteFailed,

    #[error("reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),
}

pub type Result<T> = std::result::Result<T, HubError>;
