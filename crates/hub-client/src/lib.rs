//! `gm-client` is a resilient client for the Grandmaster message hub.
//!
//! An application keeps one logical link to the hub through a
//! [`HubClient`].  The client opens the transport, announces itself,
//! forwards every inbound frame to the application, and reconnects with
//! capped exponential back-off whenever the transport drops.
//!
//! ```rust,no_run
//! # async fn example() -> gm_client::Result<()> {
//! use gm_client::{ClientConfig, HubClient};
//!
//! let config = ClientConfig::builder()
//!     .app_name("billing-worker")
//!     .on_connect(|client| {
//!         let _ = client.send("ready");
//!     })
//!     .on_message(|client, msg| {
//!         if msg["command"] == "ping" {
//!             let _ = client.send("pong");
//!         }
//!     })
//!     .build()?;
//!
//! let client = HubClient::websocket(config)?;
//! client
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//! # Ok(())
//! # }
//! ```
//!
//! # Connection flow
//!
//! 1. `connect()` discards any previous transport (abortively) and opens a new one
//! 2. On open: state becomes `Connected`, the reconnect counter resets, the
//!    handshake envelope `App connected: <app>` is sent, `on_connect` runs
//! 3. Inbound frames are decoded (non-JSON becomes `{"content": <raw>}`) and
//!    passed to `on_message`
//! 4. On close: a reconnect is scheduled after
//!    `min(30s, interval * 1.5^(n-1))` until the attempt cap is reached;
//!    `on_close` runs either way
//! 5. `disconnect()` cancels the timer, sends `App disconnecting: <app>` and
//!    closes gracefully without triggering a reconnect

pub mod builder;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod reconnect;
pub mod transport;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::ClientConfigBuilder;
pub use client::{ConnectionState, HubClient};
pub use config::{ClientConfig, HubSettings};
pub use dispatcher::Dispatcher;
pub use error::{HubError, Result, TransportError};
pub use memory::{MemoryConnector, MemoryPeer};
pub use reconnect::ReconnectBackoff;
pub use transport::{Connector, Link, WsConnector};

// Re-export gm-protocol so applications never need to import it directly.
pub use gm_protocol::{decode, encode, CodecError, Envelope};
