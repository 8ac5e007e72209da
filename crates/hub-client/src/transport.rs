//! Transport seam: how the client obtains a framed, bidirectional link to
//! the hub.
//!
//! The client owns exactly one [`Link`] at a time and drives it from a
//! dedicated task.  Dropping a link (or aborting its task) is the abortive
//! discard; closing its sink is the graceful close.

use std::pin::Pin;

use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open transport: outbound text frames go into `sink`, inbound text
/// frames come out of `stream`.  The stream ending means the peer closed.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Link {
    pub fn new<S, St>(sink: S, stream: St) -> Self
    where
        S: Sink<String, Error = TransportError> + Send + 'static,
        St: Stream<Item = Result<String, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Transport factory.  One call per connection attempt.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new link to `url`.  Open-handshake timeouts are the
    /// implementation's responsibility.
    async fn open(&self, url: &str) -> Result<Link, TransportError>;
}

/// WebSocket transport over `tokio-tungstenite` (plain `ws://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Link, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
        let (sink, stream) = ws.split();

        let sink = sink
            .sink_map_err(TransportError::from)
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text))));

        let stream = stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!("dropping non-UTF-8 binary frame");
                        None
                    }
                },
                // Ping/pong are answered by tungstenite; a close frame is
                // followed by the end of the stream.
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok(Link::new(sink, stream))
    }
}
