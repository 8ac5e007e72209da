//! In-memory transport for tests and offline runs.
//!
//! Every successful [`open`](Connector::open) hands the hub side of the new
//! link to the receiver returned by [`MemoryConnector::pair`] as a
//! [`MemoryPeer`].  Opens can be scripted to fail, and every attempt is
//! timestamped with [`tokio::time::Instant`] so paused-clock tests can
//! measure back-off delays exactly.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::{stream, SinkExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::PollSender;

use crate::error::TransportError;
use crate::transport::{Connector, Link};

#[derive(Default)]
struct Script {
    refuse_all: bool,
    refuse_next: VecDeque<String>,
    attempts: Vec<Instant>,
}

/// Connector whose links are pairs of in-process channels.
#[derive(Clone)]
pub struct MemoryConnector {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            script: Arc::default(),
            peers,
        };
        (connector, rx)
    }

    /// Fail the next open with `reason`.  Queued refusals are consumed in order.
    pub fn refuse_next(&self, reason: impl Into<String>) {
        self.script.lock().refuse_next.push_back(reason.into());
    }

    /// Fail every open until switched off again.
    pub fn refuse_all(&self, refuse: bool) {
        self.script.lock().refuse_all = refuse;
    }

    /// Number of open attempts so far.
    pub fn attempt_count(&self) -> usize {
        self.script.lock().attempts.len()
    }

    /// When each open attempt happened, oldest first.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.script.lock().attempts.clone()
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &str) -> Result<Link, TransportError> {
        {
            let mut script = self.script.lock();
            script.attempts.push(Instant::now());
            if let Some(reason) = script.refuse_next.pop_front() {
                return Err(TransportError::Refused(reason));
            }
            if script.refuse_all {
                return Err(TransportError::Refused(format!("{url} is unreachable")));
            }
        }

        let (to_hub, from_client) = mpsc::channel::<String>(64);
        let (to_client, from_hub) = mpsc::unbounded_channel::<Result<String, TransportError>>();

        let peer = MemoryPeer {
            url: url.to_owned(),
            inbound: from_client,
            outbound: to_client,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Refused("memory hub is gone".into()))?;

        let sink = PollSender::new(to_hub).sink_map_err(|_| TransportError::Closed);
        let stream = stream::unfold(from_hub, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        Ok(Link::new(sink, stream))
    }
}

/// Hub side of one in-memory link.  Dropping it closes the link from the
/// hub's end.
pub struct MemoryPeer {
    pub url: String,
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl MemoryPeer {
    /// Next frame written by the client; `None` once the client closed or
    /// discarded the link.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Push a frame to the client.  Returns `false` if the link is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.outbound.send(Ok(text.into())).is_ok()
    }

    /// Raise a transport error on the client side; the link then drops.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.outbound
            .send(Err(TransportError::Other(reason.into())))
            .is_ok()
    }
}
