use crate::socketio::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KumaError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("'{event}' was not acknowledged within {window_ms}ms")]
    NoAcknowledgement { event: String, window_ms: u64 },
    #[error("'{event}' rejected by server: {message}")]
    Rejected { event: String, message: String },
    #[error("login requires a two-factor token")]
    TokenRequired,
    #[error("'{event}' acknowledgement carried no payload")]
    EmptyResponse { event: String },
    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },
    #[error("notification {id} not found")]
    NotFound { id: u64 },
}

impl KumaError {
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, KumaError::Client(err) if err.is_connection_loss())
    }
}

pub(crate) fn decode_error(what: impl Into<String>, err: impl std::fmt::Display) -> KumaError {
    KumaError::Decode {
        what: what.into(),
        message: err.to_string(),
    }
}
