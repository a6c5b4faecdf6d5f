use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    console::Console,
    kuma::{KumaApi, KumaError, LoginRequest, interpret_login},
    preflight::{PreflightOutcome, probe_handshake},
    probe::{ProbeReport, StepOutcome, StepRecord, plan::ProbeStep},
    recorder::{EventRecorder, pretty_json},
    socketio::{CallOutcome, EventSink, SocketClient},
};

/// Runs the configured plan against the server and returns what happened.
///
/// Only a failed connect is an error. Step failures are recorded in the
/// report; a connection lost mid-run stops the plan and is reported too.
/// The client is always disconnected before returning.
pub async fn run_probe(
    config: &Config,
    console: &Console,
    recorder: Arc<EventRecorder>,
    shutdown: CancellationToken,
) -> Result<ProbeReport> {
    let mut report = ProbeReport::default();

    if config.preflight.enabled {
        let outcome = probe_handshake(
            &config.server,
            Duration::from_millis(config.preflight.timeout_ms),
        )
        .await;
        print_preflight(console, &outcome);
        report.preflight = Some(outcome);
    }

    console.line(format!(
        "Connecting to Uptime Kuma at {}...",
        config.server.base_url
    ));
    let sink: Arc<dyn EventSink> = recorder.clone();
    let options = config.connect_options();
    let client = tokio::select! {
        _ = shutdown.cancelled() => {
            report.interrupted = true;
            report.recorded = recorder.snapshot();
            return Ok(report);
        }
        connected = SocketClient::connect(&options, sink) => connected
            .with_context(|| format!("failed to connect to {}", config.server.base_url))?,
    };
    report.session = Some(client.session().clone());

    let session = ProbeSession {
        config,
        console,
        client: &client,
        api: KumaApi::new(&client, &recorder, config.timing.refresh_settle()),
    };

    for step in &config.plan {
        if shutdown.is_cancelled() {
            report.interrupted = true;
            break;
        }
        if !client.is_connected() {
            report.connection_lost = Some(lost_reason(&recorder));
            break;
        }

        let label = step.label();
        let started = Instant::now();
        tracing::info!(
            target: "probe",
            step = %label,
            window_ms = step.window().as_millis() as u64,
            "step_started"
        );

        let result = tokio::select! {
            _ = shutdown.cancelled() => None,
            result = session.run_step(step) => Some(result),
        };
        let outcome = match result {
            None => {
                report.interrupted = true;
                report.steps.push(StepRecord {
                    label,
                    outcome: StepOutcome::Interrupted,
                    elapsed: started.elapsed(),
                });
                break;
            }
            Some(Ok(outcome)) => outcome,
            Some(Err(err)) if err.is_connection_loss() => {
                console.line(format!("{label} failed: {err}"));
                report.connection_lost = Some(err.to_string());
                report.steps.push(StepRecord {
                    label,
                    outcome: StepOutcome::Failed(err.to_string()),
                    elapsed: started.elapsed(),
                });
                break;
            }
            Some(Err(err)) => {
                console.line(format!("{label} failed: {err}"));
                StepOutcome::Failed(err.to_string())
            }
        };
        tracing::info!(target: "probe", step = %label, outcome = %outcome, "step_finished");
        report.steps.push(StepRecord {
            label,
            outcome,
            elapsed: started.elapsed(),
        });

        match hold_until(started + step.window(), &shutdown, &client).await {
            Hold::Elapsed => {}
            Hold::Shutdown => {
                report.interrupted = true;
                break;
            }
            Hold::Closed => {
                report.connection_lost = Some(lost_reason(&recorder));
                break;
            }
        }
    }

    if !report.interrupted && report.connection_lost.is_none() && !client.is_connected() {
        report.connection_lost = Some(lost_reason(&recorder));
    }
    if let Some(reason) = &report.connection_lost {
        console.line(format!("Connection lost: {reason}"));
        tracing::warn!(target: "probe", reason = %reason, "connection_lost");
    }

    if report.interrupted {
        console.line("Interrupted; disconnecting...");
        tracing::warn!(target: "probe", "probe_interrupted");
    }
    client.disconnect().await;
    report.recorded = recorder.snapshot();
    Ok(report)
}

enum Hold {
    Elapsed,
    Shutdown,
    Closed,
}

/// Sleeps until `deadline`, waking early on shutdown or when the session ends.
async fn hold_until(
    deadline: Instant,
    shutdown: &CancellationToken,
    client: &SocketClient,
) -> Hold {
    tokio::select! {
        _ = shutdown.cancelled() => Hold::Shutdown,
        _ = client.closed() => Hold::Closed,
        _ = tokio::time::sleep_until(deadline) => Hold::Elapsed,
    }
}

fn lost_reason(recorder: &EventRecorder) -> String {
    recorder
        .snapshot()
        .disconnect_reason
        .unwrap_or_else(|| "connection closed".to_string())
}

fn print_preflight(console: &Console, outcome: &PreflightOutcome) {
    match outcome {
        PreflightOutcome::Handshake { url, handshake } => console.line(format!(
            "Polling handshake OK at {url}: sid={} upgrades={:?} pingInterval={}ms pingTimeout={}ms",
            handshake.sid, handshake.upgrades, handshake.ping_interval, handshake.ping_timeout
        )),
        PreflightOutcome::Failed { url, reason } => {
            console.line(format!("Polling handshake failed at {url}: {reason}"))
        }
    }
}

struct ProbeSession<'a> {
    config: &'a Config,
    console: &'a Console,
    client: &'a SocketClient,
    api: KumaApi<'a>,
}

impl ProbeSession<'_> {
    async fn run_step(&self, step: &ProbeStep) -> Result<StepOutcome, KumaError> {
        let window = step.window();
        match step {
            ProbeStep::Login { .. } => self.login(window).await,
            ProbeStep::Call { event, args, .. } => self.call(event, args.clone(), window).await,
            ProbeStep::Emit { event, args, .. } => {
                self.client.emit(event, args.clone())?;
                self.console.line(format!("Emitted {event}"));
                Ok(StepOutcome::Emitted)
            }
            ProbeStep::CreateNotification { .. } => self.create_notification(window).await,
            ProbeStep::ListNotifications { .. } => self.list_notifications().await,
            ProbeStep::ListMonitors { .. } => self.list_monitors().await,
            ProbeStep::Wait { label, .. } => {
                if let Some(label) = label {
                    self.console.line(format!("Waiting for {label}..."));
                }
                Ok(StepOutcome::Waited)
            }
        }
    }

    async fn login(&self, window: Duration) -> Result<StepOutcome, KumaError> {
        let credentials = &self.config.credentials;
        let Some(password) = &credentials.password else {
            self.console.line(format!(
                "Skipping login: no password configured (set {} or credentials.password)",
                crate::config::ENV_PASSWORD
            ));
            return Ok(StepOutcome::Skipped("no password configured".to_string()));
        };

        self.console
            .line(format!("Attempting to login as {}...", credentials.username));
        let request = LoginRequest {
            username: credentials.username.clone(),
            password: password.clone(),
            token: credentials.token.clone().unwrap_or_default(),
        };

        let reply = match self.api.login_reply(&request, window).await {
            Ok(reply) => reply,
            Err(KumaError::NoAcknowledgement { window_ms, .. }) => {
                self.console
                    .line(format!("No login response within {window_ms}ms"));
                return Ok(StepOutcome::NoAcknowledgement);
            }
            Err(err) => return Err(err),
        };

        let body = reply.first().cloned().unwrap_or(Value::Null);
        let response_line = format!("Login response: {}", pretty_json(&body));
        match interpret_login(&reply) {
            Ok(_) => {
                self.console.block([response_line.as_str(), "Login successful!"]);
                Ok(StepOutcome::LoggedIn)
            }
            Err(err @ (KumaError::Rejected { .. } | KumaError::TokenRequired)) => {
                let failure = format!("Login failed: {err}");
                self.console.block([response_line.as_str(), failure.as_str()]);
                Ok(StepOutcome::Rejected(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn call(
        &self,
        event: &str,
        args: Vec<Value>,
        window: Duration,
    ) -> Result<StepOutcome, KumaError> {
        self.console.line(format!("Requesting {event}..."));
        match self.client.call_within(event, args, window).await? {
            CallOutcome::Acknowledged(args) => {
                self.console.line(format!(
                    "{event} response: {}",
                    pretty_json(&Value::Array(args.clone()))
                ));
                Ok(StepOutcome::Acknowledged(args))
            }
            CallOutcome::NoAcknowledgement => {
                self.console.line(format!(
                    "{event}: no acknowledgement within {}ms",
                    window.as_millis()
                ));
                Ok(StepOutcome::NoAcknowledgement)
            }
        }
    }

    async fn create_notification(&self, window: Duration) -> Result<StepOutcome, KumaError> {
        let draft = &self.config.test_notification;
        self.console
            .line(format!("Creating test notification '{}'...", draft.name));

        match self.api.add_notification(draft, window).await {
            Ok(Some(id)) => {
                self.console
                    .line(format!("addNotification accepted, new id: {id}"));
                match self.api.notification(id).await {
                    Ok(listed) => self.console.line(format!(
                        "Notification {id} is listed as '{}' ({})",
                        listed.name,
                        listed.kind.as_deref().unwrap_or("unknown")
                    )),
                    Err(err @ KumaError::NotFound { .. }) => {
                        self.console.line(format!("{err} in the pushed list yet"))
                    }
                    Err(err) => return Err(err),
                }
                Ok(StepOutcome::Created { id: Some(id) })
            }
            Ok(None) => {
                self.console
                    .line("addNotification accepted without reporting an id");
                Ok(StepOutcome::Created { id: None })
            }
            Err(err @ KumaError::Rejected { .. }) => {
                self.console.line(format!("addNotification failed: {err}"));
                Ok(StepOutcome::Rejected(err.to_string()))
            }
            Err(KumaError::NoAcknowledgement { window_ms, .. }) => {
                self.console.line(format!(
                    "addNotification: no acknowledgement within {window_ms}ms"
                ));
                Ok(StepOutcome::NoAcknowledgement)
            }
            Err(err) => Err(err),
        }
    }

    async fn list_notifications(&self) -> Result<StepOutcome, KumaError> {
        self.console.line("Getting all notifications...");
        let notifications = self.api.refresh_notifications().await?;

        let mut lines = vec![format!("Found {} notifications:", notifications.len())];
        lines.extend(notifications.iter().map(|notification| {
            format!(
                "  - ID: {}, Name: {}, Type: {}, Active: {}",
                notification.id,
                notification.name,
                notification.kind.as_deref().unwrap_or("unknown"),
                notification.active
            )
        }));
        self.console.block(lines.iter().map(String::as_str));
        Ok(StepOutcome::Listed {
            count: notifications.len(),
        })
    }

    async fn list_monitors(&self) -> Result<StepOutcome, KumaError> {
        self.console.line("Getting all monitors...");
        let monitors = self.api.refresh_monitors().await?;

        let mut lines = vec![format!("Found {} monitors:", monitors.len())];
        lines.extend(monitors.iter().map(|monitor| {
            let target = match (&monitor.url, &monitor.hostname, monitor.port) {
                (Some(url), _, _) if !url.is_empty() => url.clone(),
                (_, Some(host), Some(port)) => format!("{host}:{port}"),
                (_, Some(host), None) => host.clone(),
                _ => "-".to_string(),
            };
            format!(
                "  - ID: {}, Name: {}, Type: {}, Target: {}, Active: {}",
                monitor.id, monitor.name, monitor.kind, target, monitor.active
            )
        }));
        self.console.block(lines.iter().map(String::as_str));
        Ok(StepOutcome::Listed {
            count: monitors.len(),
        })
    }
}
