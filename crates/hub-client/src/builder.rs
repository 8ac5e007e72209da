//! Builder pattern for constructing a [`ClientConfig`].

use std::time::Duration;

use serde_json::Value;

use crate::client::HubClient;
use crate::config::{
    resolve, ClientConfig, HubSettings, APP_NAME_ENV, DEFAULT_APP_NAME, DEFAULT_HUB_URL,
    HUB_URL_ENV,
};
use crate::dispatcher::Dispatcher;
use crate::error::{HubError, Result};
use crate::reconnect::ReconnectBackoff;

/// Fluent builder for [`ClientConfig`].
///
/// # Example
///
/// ```rust,no_run
/// # use gm_client::ClientConfig;
/// let config = ClientConfig::builder()
///     .url("ws://localhost:8765")
///     .app_name("billing-worker")
///     .reconnect_interval(std::time::Duration::from_secs(2))
///     .max_reconnect_attempts(5)
///     .on_message(|_client, msg| println!("hub says {msg}"))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    url: Option<String>,
    app_name: Option<String>,
    reconnect: ReconnectBackoff,
    dispatcher: Dispatcher,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Identity ─────────────────────────────────────────────────────

    /// Hub address.  Unset: `GRANDMASTER_URL`, then `ws://grandmaster:8765`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Application identifier.  Unset: `APP_NAME`, then `rust-app`.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Apply every field present in `settings`.
    pub fn settings(mut self, settings: HubSettings) -> Self {
        if let Some(url) = settings.url {
            self.url = Some(url);
        }
        if let Some(name) = settings.app_name {
            self.app_name = Some(name);
        }
        if let Some(interval) = settings.reconnect_interval_ms {
            self.reconnect.initial_delay = Duration::from_millis(interval);
        }
        if let Some(max) = settings.max_reconnect_attempts {
            self.reconnect.max_attempts = max;
        }
        self
    }

    // ── Reconnect ────────────────────────────────────────────────────

    /// Seed of the back-off formula (default 5 s).
    pub fn reconnect_interval(mut self, d: Duration) -> Self {
        self.reconnect.initial_delay = d;
        self
    }

    /// Cap on consecutive automatic reconnect attempts (default 10).
    pub fn max_reconnect_attempts(mut self, n: u32) -> Self {
        self.reconnect.max_attempts = n;
        self
    }

    /// Override the whole reconnect policy.
    pub fn reconnect_backoff(mut self, policy: ReconnectBackoff) -> Self {
        self.reconnect = policy;
        self
    }

    // ── Callbacks ────────────────────────────────────────────────────

    pub fn on_connect(mut self, f: impl Fn(&HubClient) + Send + Sync + 'static) -> Self {
        self.dispatcher.set_on_connect(f);
        self
    }

    pub fn on_message(mut self, f: impl Fn(&HubClient, Value) + Send + Sync + 'static) -> Self {
        self.dispatcher.set_on_message(f);
        self
    }

    /// Replace the default `tracing` error sink.
    pub fn on_error(mut self, f: impl Fn(&HubClient, &HubError) + Send + Sync + 'static) -> Self {
        self.dispatcher.set_on_error(f);
        self
    }

    pub fn on_close(mut self, f: impl Fn(&HubClient) + Send + Sync + 'static) -> Self {
        self.dispatcher.set_on_close(f);
        self
    }

    /// Resolve fallbacks and validate.
    pub fn build(self) -> Result<ClientConfig> {
        let url = resolve(self.url, HUB_URL_ENV, DEFAULT_HUB_URL);
        let app_name = resolve(self.app_name, APP_NAME_ENV, DEFAULT_APP_NAME);

        if url.trim().is_empty() {
            return Err(HubError::Config("hub url is required".into()));
        }
        if app_name.trim().is_empty() {
            return Err(HubError::Config("app name is required".into()));
        }
        self.reconnect.validate().map_err(HubError::Config)?;

        tracing::debug!(
            url = %url,
            app = %app_name,
            max_attempts = self.reconnect.max_attempts,
            "hub client configured"
        );
        Ok(ClientConfig {
            url,
            app_name,
            reconnect: self.reconnect,
            dispatcher: self.dispatcher,
        })
    }
}
