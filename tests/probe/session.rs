use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use kuma_probe::{
    config::Config,
    console::Console,
    kuma::{KumaApi, KumaError, LoginRequest},
    probe::{ProbeStep, StepOutcome, run_probe},
    recorder::EventRecorder,
    report::render_summary,
    socketio::{ConnectOptions, EventSink, SocketClient},
};

use crate::support::{FakeKuma, FakeServerOptions, ServerAction, push};

fn probe_config(server: &FakeKuma, plan: Vec<ProbeStep>) -> Config {
    let mut config = Config::default();
    config.server.base_url = server.base_url.clone();
    config.credentials.password = Some("secret".to_string());
    config.preflight.enabled = false;
    config.timing.connect_timeout_ms = 2_000;
    config.timing.refresh_settle_ms = 300;
    config.plan = plan;
    config
}

fn notification(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "active": 1,
        "isDefault": 0,
        "userId": 1,
        "config": format!("{{\"type\":\"webhook\",\"name\":\"{name}\",\"applyExisting\":false}}")
    })
}

/// Behaves like Uptime Kuma: acks login and addNotification, pushes list
/// updates, and never acknowledges the list calls.
async fn kuma_like_server() -> FakeKuma {
    let created = Arc::new(AtomicU64::new(0));
    FakeKuma::spawn(FakeServerOptions::default(), move |event, args| {
        let list = || {
            let mut entries = vec![notification(1, "Ops webhook")];
            if created.load(Ordering::SeqCst) > 0 {
                entries.push(notification(5, "Socket.IO Test Notification"));
            }
            Value::Array(entries)
        };
        match event {
            "login" if args[0]["password"] == json!("secret") => {
                vec![ServerAction::Ack(vec![json!({"ok": true, "token": "jwt"})])]
            }
            "login" => vec![ServerAction::Ack(vec![json!({
                "ok": false,
                "msg": "Incorrect username or password."
            })])],
            "addNotification" => {
                created.store(5, Ordering::SeqCst);
                vec![
                    ServerAction::Ack(vec![json!({"ok": true, "msg": "Saved.", "id": 5})]),
                    push("notificationList", vec![list()]),
                ]
            }
            "getNotificationList" => vec![push("notificationList", vec![list()])],
            "getMonitorList" => vec![push(
                "monitorList",
                vec![json!({
                    "2": {"id": 2, "name": "status page", "type": "http", "url": "https://example.com", "active": true},
                })],
            )],
            _ => Vec::new(),
        }
    })
    .await
}

#[tokio::test]
async fn scripted_session_records_every_step() {
    let server = kuma_like_server().await;
    let config = probe_config(
        &server,
        vec![
            ProbeStep::Login { wait_ms: 100 },
            ProbeStep::Call {
                event: "getNotificationList".to_string(),
                args: vec![json!({})],
                wait_ms: 150,
            },
            ProbeStep::Call {
                event: "getSettings".to_string(),
                args: vec![json!({})],
                wait_ms: 100,
            },
            ProbeStep::CreateNotification { wait_ms: 200 },
            ProbeStep::ListNotifications { wait_ms: 100 },
            ProbeStep::ListMonitors { wait_ms: 100 },
            ProbeStep::Wait {
                ms: 50,
                label: Some("additional events".to_string()),
            },
        ],
    );
    let (console, output) = Console::captured();
    let recorder = Arc::new(EventRecorder::with_echo(console.clone()));

    let report = run_probe(&config, &console, recorder, CancellationToken::new())
        .await
        .expect("probe should run");

    let outcomes: Vec<&StepOutcome> = report.steps.iter().map(|record| &record.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            &StepOutcome::LoggedIn,
            &StepOutcome::NoAcknowledgement,
            &StepOutcome::NoAcknowledgement,
            &StepOutcome::Created { id: Some(5) },
            &StepOutcome::Listed { count: 2 },
            &StepOutcome::Listed { count: 1 },
            &StepOutcome::Waited,
        ]
    );
    assert!(!report.interrupted);
    assert_eq!(report.connection_lost, None);
    assert!(report.steps[1].elapsed >= Duration::from_millis(150));
    assert_eq!(
        report
            .session
            .as_ref()
            .and_then(|session| session.socket_sid.as_deref()),
        Some("socket-1")
    );

    assert_eq!(
        report.step("create notification").map(|record| &record.outcome),
        Some(&StepOutcome::Created { id: Some(5) })
    );

    let names = report.recorded.event_names();
    assert!(names.iter().filter(|name| **name == "notificationList").count() >= 3);
    assert_eq!(names.last(), Some(&"monitorList"));
    assert_eq!(
        report.recorded.notification_list.as_ref().map(|list| list.as_array().map(Vec::len)),
        Some(Some(2))
    );

    let printed = output.contents();
    assert!(printed.contains("Attempting to login as admin..."));
    assert!(printed.contains("Login successful!"));
    assert!(printed.contains("Received event: notificationList"));
    assert!(printed.contains("getSettings: no acknowledgement within 100ms"));
    assert!(printed.contains("  - ID: 5, Name: Socket.IO Test Notification, Type: webhook, Active: true"));
    assert!(printed.contains("Notification 5 is listed as 'Socket.IO Test Notification' (webhook)"));
    assert_eq!(
        server
            .frames()
            .iter()
            .filter(|frame| frame.contains("\"getNotificationList\""))
            .count(),
        2,
        "the created notification is looked up in the pushed list only"
    );
    assert!(printed.contains("  - ID: 2, Name: status page, Type: http, Target: https://example.com, Active: true"));

    let summary = render_summary(&report);
    assert!(summary.contains("SUMMARY OF RECEIVED EVENTS:"));
    assert!(summary.contains("Event: notificationList"));
    assert!(summary.contains("Notification List Data Structure:"));

    assert!(server.wait_for_frame("41").await, "probe should leave the namespace");
}

#[tokio::test]
async fn rejected_or_missing_credentials_do_not_abort_the_plan() {
    let server = kuma_like_server().await;
    let mut config = probe_config(
        &server,
        vec![
            ProbeStep::Login { wait_ms: 100 },
            ProbeStep::Emit {
                event: "getNotificationList".to_string(),
                args: Vec::new(),
                wait_ms: 100,
            },
        ],
    );
    config.credentials.password = Some("wrong".to_string());
    let (console, output) = Console::captured();

    let report = run_probe(
        &config,
        &console,
        Arc::new(EventRecorder::new()),
        CancellationToken::new(),
    )
    .await
    .expect("probe should run");

    assert!(matches!(
        &report.steps[0].outcome,
        StepOutcome::Rejected(reason) if reason.contains("Incorrect username or password.")
    ));
    assert_eq!(report.steps[1].outcome, StepOutcome::Emitted);
    let printed = output.contents();
    let response = printed
        .find("Login response:")
        .expect("the rejected reply should be printed");
    let failure = printed.find("Login failed:").expect("failure should be printed");
    assert!(response < failure);
    assert!(printed[response..failure].contains("\"msg\": \"Incorrect username or password.\""));
}

#[tokio::test]
async fn kuma_login_reports_a_required_token() {
    let server = FakeKuma::spawn(FakeServerOptions::default(), |event, _| match event {
        "login" => vec![ServerAction::Ack(vec![json!({"ok": false, "tokenRequired": true})])],
        _ => Vec::new(),
    })
    .await;
    let recorder = Arc::new(EventRecorder::new());
    let sink: Arc<dyn EventSink> = recorder.clone();
    let client = SocketClient::connect(&ConnectOptions::new(server.base_url.clone()), sink)
        .await
        .expect("client should connect");
    let api = KumaApi::new(&client, &recorder, Duration::from_millis(100));

    let request = LoginRequest {
        username: "admin".to_string(),
        password: "secret".to_string(),
        token: String::new(),
    };
    let err = api
        .login(&request, Duration::from_millis(500))
        .await
        .expect_err("login without a token must fail");
    assert!(matches!(err, KumaError::TokenRequired), "unexpected error: {err:?}");

    let missing = api
        .notification(7)
        .await
        .expect_err("nothing has been pushed yet");
    assert!(matches!(missing, KumaError::NotFound { id: 7 }));
    assert!(
        !server
            .frames()
            .iter()
            .any(|frame| frame.contains("getNotificationList")),
        "lookups must not request a new list"
    );
    client.disconnect().await;
}

#[tokio::test]
async fn login_without_password_is_skipped() {
    let server = kuma_like_server().await;
    let mut config = probe_config(&server, vec![ProbeStep::Login { wait_ms: 10 }]);
    config.credentials.password = None;
    let (console, _output) = Console::captured();

    let report = run_probe(
        &config,
        &console,
        Arc::new(EventRecorder::new()),
        CancellationToken::new(),
    )
    .await
    .expect("probe should run");

    assert!(matches!(report.steps[0].outcome, StepOutcome::Skipped(_)));
    assert!(
        !server.frames().iter().any(|frame| frame.contains("\"login\"")),
        "no login frame should be sent"
    );
}

#[tokio::test]
async fn shutdown_interrupts_long_waits_and_still_disconnects() {
    let server = kuma_like_server().await;
    let config = probe_config(
        &server,
        vec![
            ProbeStep::Wait {
                ms: 10_000,
                label: None,
            },
            ProbeStep::Login { wait_ms: 100 },
        ],
    );
    let (console, output) = Console::captured();
    let shutdown = CancellationToken::new();

    let canceller = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let report = run_probe(&config, &console, Arc::new(EventRecorder::new()), shutdown)
        .await
        .expect("probe should run");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.interrupted);
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].outcome, StepOutcome::Waited);
    assert!(output.contents().contains("Interrupted; disconnecting..."));
    assert!(server.wait_for_frame("41").await);
}

#[tokio::test]
async fn server_side_disconnect_stops_the_plan() {
    let server = FakeKuma::spawn(FakeServerOptions::default(), |event, _| match event {
        "logout" => vec![ServerAction::Disconnect],
        _ => Vec::new(),
    })
    .await;
    let config = probe_config(
        &server,
        vec![
            ProbeStep::Emit {
                event: "logout".to_string(),
                args: Vec::new(),
                wait_ms: 200,
            },
            ProbeStep::Call {
                event: "getSettings".to_string(),
                args: Vec::new(),
                wait_ms: 100,
            },
        ],
    );
    let (console, _output) = Console::captured();
    let recorder = Arc::new(EventRecorder::new());

    let report = run_probe(&config, &console, Arc::clone(&recorder), CancellationToken::new())
        .await
        .expect("probe should run");

    assert_eq!(report.steps.len(), 1);
    assert_eq!(
        report.connection_lost.as_deref(),
        Some("server disconnected the namespace")
    );
    assert!(render_summary(&report).contains("Connection lost: server disconnected the namespace"));
}

#[tokio::test]
async fn disconnect_during_the_last_step_is_reported() {
    let server = FakeKuma::spawn(FakeServerOptions::default(), |event, _| match event {
        "logout" => vec![ServerAction::Disconnect],
        _ => Vec::new(),
    })
    .await;
    let config = probe_config(
        &server,
        vec![ProbeStep::Emit {
            event: "logout".to_string(),
            args: Vec::new(),
            wait_ms: 5_000,
        }],
    );
    let (console, output) = Console::captured();

    let started = tokio::time::Instant::now();
    let report = run_probe(
        &config,
        &console,
        Arc::new(EventRecorder::new()),
        CancellationToken::new(),
    )
    .await
    .expect("probe should run");

    assert!(started.elapsed() < Duration::from_secs(3), "the window should end early");
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].outcome, StepOutcome::Emitted);
    assert!(!report.interrupted);
    assert_eq!(
        report.connection_lost.as_deref(),
        Some("server disconnected the namespace")
    );
    assert!(output.contents().contains("Connection lost: server disconnected the namespace"));
    assert!(render_summary(&report).contains("Connection lost: server disconnected the namespace"));
}

#[tokio::test]
async fn unreachable_server_is_a_run_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("port should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    drop(listener);

    let mut config = Config::default();
    config.server.base_url = format!("http://{addr}");
    config.preflight.enabled = false;
    config.timing.connect_timeout_ms = 1_000;
    let (console, _output) = Console::captured();

    let err = run_probe(
        &config,
        &console,
        Arc::new(EventRecorder::new()),
        CancellationToken::new(),
    )
    .await
    .expect_err("connect should fail");
    assert!(format!("{err:#}").contains("failed to connect to"));
}
