#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    InvalidUrl,
    Transport,
    Handshake,
    ConnectRejected,
    Protocol,
    NotConnected,
    Timeout,
    Closed,
    Serialization,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ClientError {
    pub kind: ClientErrorKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// True when the error means the session is gone and further sends are pointless.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self.kind,
            ClientErrorKind::NotConnected | ClientErrorKind::Closed | ClientErrorKind::Transport
        )
    }
}

pub fn invalid_url(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorKind::InvalidUrl, message)
}

pub fn transport_failure(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorKind::Transport, message)
}

pub fn handshake_failure(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorKind::Handshake, message)
}

pub fn connect_rejected(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorKind::ConnectRejected, message)
}

pub fn protocol_error(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorKind::Protocol, message)
}

pub fn not_connected(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorKind::NotConnected, message)
}

pub fn timeout_error(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorKind::Timeout, message)
}

pub fn closed(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorKind::Closed, message)
}

pub fn serialization_error(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorKind::Serialization, message)
}
