//! Reference monitoring app for the Grandmaster hub.
//!
//! Connects through [`gm_client::HubClient`], publishes a status report
//! every 30 seconds, and answers hub commands:
//!
//! - `ping`   : reply `pong` with `responseId` and `latency_ms`
//! - `status` : send a status report immediately
//! - `restart`: logged only; restarting is the supervisor's job
//!
//! Usage:
//!   GRANDMASTER_URL=ws://localhost:8765 APP_NAME=monitor gm-monitor-node
//!
//! Env vars:
//!   GRANDMASTER_URL: hub address (default: ws://grandmaster:8765)
//!   APP_NAME       : application id (default: "rust-app")
//!   GM_CONFIG      : optional TOML file with hub settings
//!   RUST_LOG       : log filter (default: info)

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gm_client::{ClientConfig, HubClient, HubSettings};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = match std::env::var("GM_CONFIG") {
        Ok(path) => HubSettings::load(path)?,
        Err(_) => HubSettings::default(),
    };

    let started = Instant::now();
    let config = ClientConfig::builder()
        .settings(settings)
        .on_connect(move |client| {
            tracing::info!(app = %client.app_name(), "connected to hub, reporting status");
            report_status(client, started, "healthy");
        })
        .on_message(move |client, msg| {
            tracing::info!(message = %msg, "received message");
            match handle_command(&msg, Utc::now()) {
                Some(Reply::Pong(pong)) => {
                    if let Err(e) = client.send_with("pong", &pong) {
                        tracing::warn!(error = %e, "pong not sent");
                    }
                }
                Some(Reply::Status) => report_status(client, started, "responding"),
                Some(Reply::Restart) => tracing::info!("received restart command"),
                None => {}
            }
        })
        .on_close(|_| tracing::info!("connection closed"))
        .build()?;

    let client = HubClient::websocket(config)?;

    let reporter = client.clone();
    let status_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATUS_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            if reporter.is_connected() {
                report_status(&reporter, started, "healthy");
            }
        }
    });

    tracing::info!(url = %client.url(), app = %client.app_name(), "starting monitor node");
    client
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await;

    status_task.abort();
    tracing::info!("monitor node exiting");
    Ok(())
}

/// What to do about an inbound hub message.
#[derive(Debug, PartialEq)]
enum Reply {
    Pong(Pong),
    Status,
    Restart,
}

#[derive(Debug, PartialEq, Serialize)]
struct Pong {
    #[serde(rename = "responseId")]
    response_id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    status: &'static str,
    uptime_seconds: f64,
    system_info: SystemInfo,
}

#[derive(Debug, Serialize)]
struct SystemInfo {
    os: &'static str,
    arch: &'static str,
    pid: u32,
    hostname: Option<String>,
    version: &'static str,
}

fn handle_command(msg: &Value, now: DateTime<Utc>) -> Option<Reply> {
    match msg.get("command")?.as_str()? {
        "ping" => Some(Reply::Pong(Pong {
            response_id: msg.get("id").cloned().unwrap_or(Value::Null),
            latency_ms: msg.get("timestamp").and_then(|ts| latency_ms(ts, now)),
        })),
        "status" => Some(Reply::Status),
        "restart" => Some(Reply::Restart),
        other => {
            tracing::debug!(command = other, "ignoring unknown command");
            None
        }
    }
}

/// Milliseconds between a hub timestamp and `now`.  Accepts epoch seconds
/// (number or numeric string) and RFC 3339 strings.
fn latency_ms(timestamp: &Value, now: DateTime<Utc>) -> Option<f64> {
    let sent_ms = match timestamp {
        Value::Number(n) => n.as_f64()? * 1000.0,
        Value::String(s) => match s.parse::<f64>() {
            Ok(secs) => secs * 1000.0,
            Err(_) => DateTime::parse_from_rfc3339(s).ok()?.timestamp_millis() as f64,
        },
        _ => return None,
    };
    let latency = now.timestamp_millis() as f64 - sent_ms;
    Some((latency * 100.0).round() / 100.0)
}

fn status_report(started: Instant, status: &'static str) -> StatusReport {
    StatusReport {
        status,
        uptime_seconds: (started.elapsed().as_secs_f64() * 10.0).round() / 10.0,
        system_info: SystemInfo {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            pid: std::process::id(),
            hostname: std::env::var("HOSTNAME").ok(),
            version: env!("CARGO_PKG_VERSION"),
        },
    }
}

fn report_status(client: &HubClient, started: Instant, status: &'static str) {
    let report = status_report(started, status);
    let content = format!("Status from {}", client.app_name());
    match client.send_with(content, &report) {
        Ok(()) => tracing::info!(uptime_seconds = report.uptime_seconds, "status update sent"),
        Err(e) => tracing::warn!(error = %e, "status update not sent"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn ping_with_iso_timestamp() {
        let msg = json!({ "command": "ping", "id": "r1", "timestamp": "2025-03-16T12:34:56.000Z" });
        let reply = handle_command(&msg, at("2025-03-16T12:34:56.250Z")).unwrap();
        assert_eq!(
            reply,
            Reply::Pong(Pong {
                response_id: json!("r1"),
                latency_ms: Some(250.0),
            })
        );
    }

    #[test]
    fn ping_with_epoch_seconds() {
        let now = at("2025-03-16T12:00:01Z");
        let sent = now.timestamp() as f64 - 0.5;
        let msg = json!({ "command": "ping", "id": 3, "timestamp": sent });
        match handle_command(&msg, now) {
            Some(Reply::Pong(p)) => {
                assert_eq!(p.response_id, json!(3));
                assert_eq!(p.latency_ms, Some(500.0));
            }
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[test]
    fn ping_without_timestamp_has_no_latency() {
        let msg = json!({ "command": "ping" });
        let reply = handle_command(&msg, Utc::now()).unwrap();
        assert_eq!(
            reply,
            Reply::Pong(Pong {
                response_id: Value::Null,
                latency_ms: None,
            })
        );
    }

    #[test]
    fn status_and_restart() {
        assert_eq!(handle_command(&json!({ "command": "status" }), Utc::now()), Some(Reply::Status));
        assert_eq!(handle_command(&json!({ "command": "restart" }), Utc::now()), Some(Reply::Restart));
    }

    #[test]
    fn non_commands_are_ignored() {
        assert_eq!(handle_command(&json!({ "content": "hello" }), Utc::now()), None);
        assert_eq!(handle_command(&json!({ "command": "dance" }), Utc::now()), None);
        assert_eq!(handle_command(&json!({ "command": 5 }), Utc::now()), None);
    }

    #[test]
    fn pong_serializes_response_id() {
        let pong = Pong {
            response_id: json!("abc"),
            latency_ms: None,
        };
        assert_eq!(serde_json::to_value(&pong).unwrap(), json!({ "responseId": "abc" }));
    }

    #[test]
    fn status_report_shape() {
        let v = serde_json::to_value(status_report(Instant::now(), "healthy")).unwrap();
        assert_eq!(v["status"], "healthy");
        assert_eq!(v["system_info"]["os"], std::env::consts::OS);
        assert!(v["uptime_seconds"].as_f64().unwrap() >= 0.0);
    }
}
