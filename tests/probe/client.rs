use std::{sync::Arc, time::Duration};

use serde_json::json;
use time::OffsetDateTime;

use kuma_probe::{
    recorder::EventRecorder,
    socketio::{
        CallOutcome, ClientErrorKind, ConnectOptions, EventSink, NoopEventSink, SocketClient,
    },
};

use crate::support::{FakeKuma, FakeServerOptions, ServerAction, push, wait_until};

fn options_for(server: &FakeKuma) -> ConnectOptions {
    ConnectOptions {
        connect_timeout: Duration::from_secs(2),
        ack_timeout: Duration::from_millis(200),
        ..ConnectOptions::new(server.base_url.clone())
    }
}

async fn connect(server: &FakeKuma) -> (SocketClient, Arc<EventRecorder>) {
    let recorder = Arc::new(EventRecorder::new());
    let sink: Arc<dyn EventSink> = recorder.clone();
    let client = SocketClient::connect(&options_for(server), sink)
        .await
        .expect("client should connect");
    (client, recorder)
}

#[tokio::test]
async fn login_call_receives_acknowledgement() {
    let server = FakeKuma::spawn(FakeServerOptions::default(), |event, args| match event {
        "login" if args[0]["password"] == json!("secret") => {
            vec![ServerAction::Ack(vec![json!({"ok": true, "token": "jwt"})])]
        }
        _ => Vec::new(),
    })
    .await;
    let (client, recorder) = connect(&server).await;

    assert_eq!(client.session().engine_sid, "engine-1");
    assert_eq!(client.session().socket_sid.as_deref(), Some("socket-1"));
    assert_eq!(client.session().ping_interval, Duration::from_millis(25_000));
    assert_eq!(recorder.snapshot().socket_sid.as_deref(), Some("socket-1"));

    let args = client
        .call(
            "login",
            vec![json!({"username": "admin", "password": "secret", "token": ""})],
        )
        .await
        .expect("login should be acknowledged");
    assert_eq!(args, vec![json!({"ok": true, "token": "jwt"})]);

    assert!(
        server
            .frames()
            .iter()
            .any(|frame| frame.starts_with("420[\"login\",")),
        "login should carry ack id 0"
    );
    client.disconnect().await;
}

#[tokio::test]
async fn silence_is_a_result_for_call_within_and_a_timeout_for_call() {
    let server = FakeKuma::spawn(FakeServerOptions::default(), |_, _| Vec::new()).await;
    let (client, _recorder) = connect(&server).await;

    let outcome = client
        .call_within("getSettings", vec![json!({})], Duration::from_millis(150))
        .await
        .expect("silence should not be an error");
    assert_eq!(outcome, CallOutcome::NoAcknowledgement);

    let err = client
        .call("getNotifications", vec![json!({})])
        .await
        .expect_err("call should time out");
    assert_eq!(err.kind, ClientErrorKind::Timeout);
    assert!(client.is_connected());
    client.disconnect().await;
}

#[tokio::test]
async fn server_ping_is_answered_with_pong() {
    let options = FakeServerOptions {
        ping_after_connect: true,
        ..FakeServerOptions::default()
    };
    let server = FakeKuma::spawn(options, |_, _| Vec::new()).await;
    let (client, _recorder) = connect(&server).await;

    assert!(server.wait_for_frame("3").await, "client should answer ping");
    client.disconnect().await;
}

#[tokio::test]
async fn heartbeat_silence_ends_the_session() {
    let options = FakeServerOptions {
        ping_interval_ms: 150,
        ping_timeout_ms: 100,
        ..FakeServerOptions::default()
    };
    let server = FakeKuma::spawn(options, |_, _| Vec::new()).await;
    let (client, recorder) = connect(&server).await;
    let connected_at = tokio::time::Instant::now();

    tokio::time::timeout(Duration::from_secs(2), client.closed())
        .await
        .expect("silent server should end the session");
    let silent_for = connected_at.elapsed();

    assert!(!client.is_connected());
    assert!(silent_for >= Duration::from_millis(200), "closed after {silent_for:?}");
    assert!(silent_for < Duration::from_millis(900), "closed after {silent_for:?}");
    assert_eq!(
        recorder.snapshot().disconnect_reason.as_deref(),
        Some("no heartbeat within 250ms")
    );
    client.disconnect().await;
}

#[tokio::test]
async fn server_event_asking_for_ack_is_answered_with_empty_ack() {
    let server = FakeKuma::spawn(FakeServerOptions::default(), |event, _| match event {
        "trigger" => vec![ServerAction::Frame(
            "423[\"serverQuestion\",{\"n\":1}]".to_string(),
        )],
        _ => Vec::new(),
    })
    .await;
    let (client, recorder) = connect(&server).await;

    let sent_at = OffsetDateTime::now_utc();
    client.emit("trigger", Vec::new()).expect("emit should succeed");

    assert!(server.wait_for_frame("433[]").await, "client should ack id 3");
    let snapshot = recorder.snapshot();
    assert_eq!(snapshot.event_names(), vec!["serverQuestion"]);
    assert_eq!(snapshot.events[0].args, vec![json!({"n": 1})]);
    assert!(snapshot.events[0].received_at >= sent_at);
    assert!(client.is_connected());
    client.disconnect().await;
}

#[tokio::test]
async fn pushed_events_reach_the_sink_in_order() {
    let options = FakeServerOptions {
        push_on_connect: vec![
            ("info".to_string(), vec![json!({"version": "1.23.16"})]),
            (
                "notificationList".to_string(),
                vec![json!([{"id": 1, "name": "ops", "config": "{\"type\":\"webhook\"}"}])],
            ),
        ],
        ..FakeServerOptions::default()
    };
    let server = FakeKuma::spawn(options, |event, _| match event {
        "getMonitorList" => vec![push("monitorList", vec![json!({"4": {"id": 4, "name": "web"}})])],
        _ => Vec::new(),
    })
    .await;
    let (client, recorder) = connect(&server).await;

    assert!(
        wait_until(Duration::from_secs(2), || recorder.event_count() >= 2).await,
        "initial pushes should be recorded"
    );
    client
        .emit("getMonitorList", Vec::new())
        .expect("emit should succeed");
    assert!(wait_until(Duration::from_secs(2), || recorder.monitor_list().is_some()).await);

    let snapshot = recorder.snapshot();
    assert_eq!(
        snapshot.event_names(),
        vec!["info", "notificationList", "monitorList"]
    );
    assert_eq!(snapshot.notification_list.as_ref().map(|list| list[0]["id"].clone()), Some(json!(1)));
    client.disconnect().await;
}

#[tokio::test]
async fn connect_error_is_reported_as_rejection() {
    let options = FakeServerOptions {
        reject_connect: Some(json!({"message": "not authorized"})),
        ..FakeServerOptions::default()
    };
    let server = FakeKuma::spawn(options, |_, _| Vec::new()).await;

    let err = SocketClient::connect(&options_for(&server), Arc::new(NoopEventSink))
        .await
        .err()
        .expect("connect should be rejected");
    assert_eq!(err.kind, ClientErrorKind::ConnectRejected);
    assert!(err.message.contains("not authorized"), "{}", err.message);
}

#[tokio::test]
async fn server_disconnect_stops_the_client() {
    let server = FakeKuma::spawn(FakeServerOptions::default(), |event, _| match event {
        "logout" => vec![ServerAction::Disconnect],
        _ => Vec::new(),
    })
    .await;
    let (client, recorder) = connect(&server).await;

    client.emit("logout", Vec::new()).expect("emit should succeed");
    assert!(wait_until(Duration::from_secs(2), || !client.is_connected()).await);
    assert_eq!(
        recorder.snapshot().disconnect_reason.as_deref(),
        Some("server disconnected the namespace")
    );

    let err = client
        .emit("getSettings", Vec::new())
        .expect_err("emit after disconnect must fail");
    assert_eq!(err.kind, ClientErrorKind::NotConnected);
    client.disconnect().await;
}

#[tokio::test]
async fn pending_call_fails_when_the_session_closes() {
    let server = FakeKuma::spawn(FakeServerOptions::default(), |event, _| match event {
        "crash" => vec![ServerAction::Close],
        _ => Vec::new(),
    })
    .await;
    let (client, _recorder) = connect(&server).await;

    let err = client
        .call_within("crash", Vec::new(), Duration::from_secs(2))
        .await
        .expect_err("closed session must fail the waiter");
    assert!(err.is_connection_loss(), "unexpected error: {err:?}");
    client.disconnect().await;
}

#[tokio::test]
async fn disconnect_leaves_namespace_once() {
    let server = FakeKuma::spawn(FakeServerOptions::default(), |_, _| Vec::new()).await;
    let (client, recorder) = connect(&server).await;

    client.disconnect().await;
    client.disconnect().await;

    assert!(!client.is_connected());
    assert!(server.wait_for_frame("41").await);
    assert_eq!(
        server.frames().iter().filter(|frame| *frame == "41").count(),
        1
    );
    assert_eq!(
        recorder.snapshot().disconnect_reason.as_deref(),
        Some("client disconnect")
    );
}
