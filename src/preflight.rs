use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::{
    config::ServerConfig,
    socketio::{
        EngineTransport,
        client::engine_endpoint,
        packet::{EnginePacket, OpenHandshake, POLLING_RECORD_SEPARATOR, parse_engine_packet},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightOutcome {
    Handshake {
        url: String,
        handshake: OpenHandshake,
    },
    Failed {
        url: String,
        reason: String,
    },
}

impl PreflightOutcome {
    pub fn url(&self) -> &str {
        match self {
            PreflightOutcome::Handshake { url, .. } | PreflightOutcome::Failed { url, .. } => url,
        }
    }
}

/// Opens an Engine.IO long-polling session over plain HTTP and reads the
/// open packet. Tells "server down" apart from "WebSocket upgrade refused".
pub async fn probe_handshake(server: &ServerConfig, timeout: Duration) -> PreflightOutcome {
    let url = match engine_endpoint(
        &server.base_url,
        &server.socketio_path,
        EngineTransport::Polling,
    ) {
        Ok(url) => url,
        Err(err) => {
            return PreflightOutcome::Failed {
                url: server.base_url.clone(),
                reason: err.to_string(),
            };
        }
    };

    match fetch_handshake(url.as_str(), timeout).await {
        Ok(handshake) => {
            tracing::info!(
                target: "preflight",
                url = %url,
                sid = %handshake.sid,
                upgrades = ?handshake.upgrades,
                ping_interval_ms = handshake.ping_interval,
                "polling_handshake_ok"
            );
            PreflightOutcome::Handshake {
                url: url.to_string(),
                handshake,
            }
        }
        Err(err) => {
            tracing::warn!(target: "preflight", url = %url, error = %format!("{err:#}"), "polling_handshake_failed");
            PreflightOutcome::Failed {
                url: url.to_string(),
                reason: format!("{err:#}"),
            }
        }
    }
}

async fn fetch_handshake(url: &str, timeout: Duration) -> Result<OpenHandshake> {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .context("failed to build http client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .context("failed to read handshake body")?;
    if !status.is_success() {
        return Err(anyhow!("server answered {status}: {}", body.trim()));
    }

    let first_record = body
        .split(POLLING_RECORD_SEPARATOR)
        .next()
        .unwrap_or_default();
    match parse_engine_packet(first_record)? {
        EnginePacket::Open(handshake) => Ok(handshake),
        other => Err(anyhow!("expected an engine.io open packet, got {other:?}")),
    }
}
