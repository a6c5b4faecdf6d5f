use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub enum ServerAction {
    Ack(Vec<Value>),
    Push { event: String, args: Vec<Value> },
    Disconnect,
    Close,
    /// Sent verbatim, for frames the other actions cannot express.
    Frame(String),
}

pub fn push(event: &str, args: Vec<Value>) -> ServerAction {
    ServerAction::Push {
        event: event.to_string(),
        args,
    }
}

#[derive(Clone)]
pub struct FakeServerOptions {
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub reject_connect: Option<Value>,
    pub ping_after_connect: bool,
    pub push_on_connect: Vec<(String, Vec<Value>)>,
}

impl Default for FakeServerOptions {
    fn default() -> Self {
        Self {
            ping_interval_ms: 25_000,
            ping_timeout_ms: 20_000,
            reject_connect: None,
            ping_after_connect: false,
            push_on_connect: Vec::new(),
        }
    }
}

type Script = Arc<dyn Fn(&str, &[Value]) -> Vec<ServerAction> + Send + Sync>;

/// A single-connection Socket.IO server speaking just enough of the
/// protocol to script Uptime Kuma conversations.
pub struct FakeKuma {
    pub base_url: String,
    frames: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeKuma {
    pub async fn spawn(
        options: FakeServerOptions,
        script: impl Fn(&str, &[Value]) -> Vec<ServerAction> + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("fake server should bind");
        let addr = listener
            .local_addr()
            .expect("fake server should have an address");
        let frames = Arc::new(Mutex::new(Vec::new()));
        let script: Script = Arc::new(script);

        let task_frames = Arc::clone(&frames);
        let task = tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            serve(stream, options, script, task_frames).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            frames,
            task,
        }
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().expect("frames lock").clone()
    }

    pub async fn wait_for_frame(&self, expected: &str) -> bool {
        wait_until(Duration::from_secs(2), || {
            self.frames().iter().any(|frame| frame == expected)
        })
        .await
    }
}

impl Drop for FakeKuma {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn event_frame(event: &str, args: Vec<Value>) -> String {
    let mut payload = vec![json!(event)];
    payload.extend(args);
    format!("42{}", Value::Array(payload))
}

fn parse_event(body: &str) -> (Option<u64>, String, Vec<Value>) {
    let digits: String = body.chars().take_while(char::is_ascii_digit).collect();
    let ack_id = digits.parse().ok();
    let mut payload: Vec<Value> =
        serde_json::from_str(&body[digits.len()..]).expect("event payload should be a json array");
    let name = payload.remove(0);
    (
        ack_id,
        name.as_str().expect("event name").to_string(),
        payload,
    )
}

async fn serve(
    stream: tokio::net::TcpStream,
    options: FakeServerOptions,
    script: Script,
    frames: Arc<Mutex<Vec<String>>>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let open = json!({
        "sid": "engine-1",
        "upgrades": [],
        "pingInterval": options.ping_interval_ms,
        "pingTimeout": options.ping_timeout_ms,
        "maxPayload": 1_000_000
    });
    if ws.send(Message::Text(format!("0{open}"))).await.is_err() {
        return;
    }

    let mut outgoing = Vec::new();
    'session: while let Some(Ok(message)) = ws.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        frames.lock().expect("frames lock").push(text.clone());

        if text == "40" || text.starts_with("40{") {
            match &options.reject_connect {
                Some(data) => outgoing.push(format!("44{data}")),
                None => {
                    outgoing.push("40{\"sid\":\"socket-1\"}".to_string());
                    if options.ping_after_connect {
                        outgoing.push("2".to_string());
                    }
                    for (event, args) in &options.push_on_connect {
                        outgoing.push(event_frame(event, args.clone()));
                    }
                }
            }
        } else if text == "41" {
            break;
        } else if let Some(body) = text.strip_prefix("42") {
            let (ack_id, name, args) = parse_event(body);
            let mut closing = false;
            for action in script(&name, &args) {
                match action {
                    ServerAction::Ack(reply) => {
                        if let Some(ack_id) = ack_id {
                            outgoing.push(format!("43{ack_id}{}", Value::Array(reply)));
                        }
                    }
                    ServerAction::Push { event, args } => outgoing.push(event_frame(&event, args)),
                    ServerAction::Disconnect => outgoing.push("41".to_string()),
                    ServerAction::Frame(frame) => outgoing.push(frame),
                    ServerAction::Close => {
                        outgoing.push("1".to_string());
                        closing = true;
                    }
                }
            }
            for frame in outgoing.drain(..) {
                if ws.send(Message::Text(frame)).await.is_err() {
                    break 'session;
                }
            }
            if closing {
                break;
            }
            continue;
        }

        for frame in outgoing.drain(..) {
            if ws.send(Message::Text(frame)).await.is_err() {
                break 'session;
            }
        }
    }

    // Keep the socket open until the client goes away.
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            frames.lock().expect("frames lock").push(text);
        }
    }
}
