use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub namespace: String,
    pub name: String,
    pub args: Vec<Value>,
    pub received_at: OffsetDateTime,
}

impl InboundEvent {
    pub fn first_arg(&self) -> Option<&Value> {
        self.args.first()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected { sid: Option<String> },
    Disconnected { reason: String },
    Event(InboundEvent),
}

/// Receives every lifecycle change and every server-pushed event, in order.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &ClientEvent);
}

#[derive(Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn on_event(&self, _event: &ClientEvent) {}
}
