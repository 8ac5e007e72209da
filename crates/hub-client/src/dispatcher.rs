//! Lifecycle callbacks and their dispatch.
//!
//! The client invokes every callback from its single driver task, one at a
//! time, in the order the underlying events happened.  A callback receives
//! the [`HubClient`] that raised it and may call [`send`](HubClient::send),
//! [`connect`](HubClient::connect) or [`disconnect`](HubClient::disconnect)
//! from inside the callback; the client never holds its state lock while a
//! callback runs.
//!
//! A panicking callback is caught and logged so the event loop keeps
//! running.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use crate::client::HubClient;
use crate::error::HubError;

pub type ConnectCallback = Arc<dyn Fn(&HubClient) + Send + Sync>;
pub type MessageCallback = Arc<dyn Fn(&HubClient, Value) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&HubClient, &HubError) + Send + Sync>;
pub type CloseCallback = Arc<dyn Fn(&HubClient) + Send + Sync>;

/// Default error sink: a structured `tracing` event.
pub fn log_error(client: &HubClient, error: &HubError) {
    tracing::error!(app = %client.app_name(), error = %error, "hub client error");
}

/// The four callback slots.
#[derive(Clone)]
pub struct Dispatcher {
    on_connect: ConnectCallback,
    on_message: MessageCallback,
    on_error: ErrorCallback,
    on_close: CloseCallback,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            on_connect: Arc::new(|_: &HubClient| {}),
            on_message: Arc::new(|_: &HubClient, _: Value| {}),
            on_error: Arc::new(log_error),
            on_close: Arc::new(|_: &HubClient| {}),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn set_on_connect(&mut self, f: impl Fn(&HubClient) + Send + Sync + 'static) {
        self.on_connect = Arc::new(f);
    }

    pub fn set_on_message(&mut self, f: impl Fn(&HubClient, Value) + Send + Sync + 'static) {
        self.on_message = Arc::new(f);
    }

    pub fn set_on_error(&mut self, f: impl Fn(&HubClient, &HubError) + Send + Sync + 'static) {
        self.on_error = Arc::new(f);
    }

    pub fn set_on_close(&mut self, f: impl Fn(&HubClient) + Send + Sync + 'static) {
        self.on_close = Arc::new(f);
    }

    pub(crate) fn connected(&self, client: &HubClient) {
        guarded("connect", || (self.on_connect)(client));
    }

    pub(crate) fn message(&self, client: &HubClient, message: Value) {
        guarded("message", || (self.on_message)(client, message));
    }

    pub(crate) fn error(&self, client: &HubClient, error: &HubError) {
        guarded("error", || (self.on_error)(client, error));
    }

    pub(crate) fn closed(&self, client: &HubClient) {
        guarded("close", || (self.on_close)(client));
    }
}

fn guarded(callback: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(callback, "hub client callback panicked");
    }
}
