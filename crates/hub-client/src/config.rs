//! Client configuration: the immutable [`ClientConfig`] and the optional,
//! file-backed [`HubSettings`] that can seed it.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatcher::Dispatcher;
use crate::error::{HubError, Result};
use crate::reconnect::ReconnectBackoff;

/// Environment variable consulted for the hub address.
pub const HUB_URL_ENV: &str = "GRANDMASTER_URL";
/// Environment variable consulted for the application identifier.
pub const APP_NAME_ENV: &str = "APP_NAME";

pub const DEFAULT_HUB_URL: &str = "ws://grandmaster:8765";
pub const DEFAULT_APP_NAME: &str = "rust-app";

/// Fully resolved, validated configuration.  Build with
/// [`ClientConfigBuilder`](crate::builder::ClientConfigBuilder).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) url: String,
    pub(crate) app_name: String,
    pub(crate) reconnect: ReconnectBackoff,
    pub(crate) dispatcher: Dispatcher,
}

impl ClientConfig {
    pub fn builder() -> crate::builder::ClientConfigBuilder {
        crate::builder::ClientConfigBuilder::new()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn reconnect(&self) -> &ReconnectBackoff {
        &self.reconnect
    }
}

/// Serializable settings, e.g. the `[hub]` table of a host's TOML file.
/// Every field is optional; unset fields fall through to the environment
/// and then to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    pub url: Option<String>,
    pub app_name: Option<String>,
    pub reconnect_interval_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
}

impl HubSettings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| HubError::Config(format!("invalid hub settings: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HubError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn reconnect_interval(&self) -> Option<Duration> {
        self.reconnect_interval_ms.map(Duration::from_millis)
    }
}

/// Explicit value, then environment variable, then default.
pub(crate) fn resolve(explicit: Option<String>, env_key: &str, default: &str) -> String {
    explicit
        .or_else(|| std::env::var(env_key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_value_wins() {
        let v = resolve(Some("ws://a".into()), "GM_TEST_UNSET_VAR_1", "ws://d");
        assert_eq!(v, "ws://a");
    }

    #[test]
    fn env_var_beats_default() {
        std::env::set_var("GM_TEST_SET_VAR_1", "ws://from-env:1");
        let v = resolve(None, "GM_TEST_SET_VAR_1", "ws://d");
        assert_eq!(v, "ws://from-env:1");
        let v = resolve(Some("ws://a".into()), "GM_TEST_SET_VAR_1", "ws://d");
        assert_eq!(v, "ws://a");
    }

    #[test]
    fn empty_env_var_falls_back_to_default() {
        std::env::set_var("GM_TEST_SET_VAR_2", "");
        let v = resolve(None, "GM_TEST_SET_VAR_2", "ws://d");
        assert_eq!(v, "ws://d");
    }

    #[test]
    fn falls_back_to_default() {
        let v = resolve(None, "GM_TEST_UNSET_VAR_2", "ws://d");
        assert_eq!(v, "ws://d");
    }

    #[test]
    fn empty_settings_parse() {
        let s = HubSettings::from_toml_str("").unwrap();
        assert_eq!(s, HubSettings::default());
    }

    #[test]
    fn settings_parse() {
        let s = HubSettings::from_toml_str(
            r#"
url = "ws://hub.internal:8765"
app_name = "billing"
reconnect_interval_ms = 1000
max_reconnect_attempts = 3
"#,
        )
        .unwrap();
        assert_eq!(s.url.as_deref(), Some("ws://hub.internal:8765"));
        assert_eq!(s.app_name.as_deref(), Some("billing"));
        assert_eq!(s.reconnect_interval(), Some(Duration::from_secs(1)));
        assert_eq!(s.max_reconnect_attempts, Some(3));
    }

    #[test]
    fn bad_settings_are_config_errors() {
        let err = HubSettings::from_toml_str("max_reconnect_attempts = \"many\"").unwrap_err();
        assert!(matches!(err, HubError::Config(_)));
    }
}
