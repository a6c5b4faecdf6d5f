pub mod broker;
pub mod client;
pub mod error;
pub mod events;
pub mod packet;

pub use client::{CallOutcome, ConnectOptions, EngineTransport, SessionInfo, SocketClient};
pub use error::{ClientError, ClientErrorKind};
pub use events::{ClientEvent, EventSink, InboundEvent, NoopEventSink};
