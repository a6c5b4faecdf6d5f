use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::socketio::error::{ClientError, closed};

#[derive(Default)]
struct AckBrokerState {
    pending: HashMap<u64, oneshot::Sender<Vec<Value>>>,
    closed: bool,
}

/// Correlates outgoing events that asked for an acknowledgement with the
/// ACK packets the server sends back.
pub struct AckBroker {
    state: Mutex<AckBrokerState>,
    next_ack_id: AtomicU64,
}

impl Default for AckBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl AckBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AckBrokerState::default()),
            next_ack_id: AtomicU64::new(0),
        }
    }

    pub fn register(&self) -> Result<(u64, oneshot::Receiver<Vec<Value>>), ClientError> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(closed("connection is closed; no acknowledgements can arrive"));
        }

        let ack_id = self.next_ack_id.fetch_add(1, Ordering::Relaxed);
        let (response_tx, response_rx) = oneshot::channel();
        state.pending.insert(ack_id, response_tx);
        Ok((ack_id, response_rx))
    }

    /// Returns false when nobody is waiting for `ack_id` any more.
    pub fn resolve(&self, ack_id: u64, args: Vec<Value>) -> bool {
        let Some(response_tx) = self.lock_state().pending.remove(&ack_id) else {
            return false;
        };
        response_tx.send(args).is_ok()
    }

    pub fn cancel(&self, ack_id: u64) {
        self.lock_state().pending.remove(&ack_id);
    }

    /// Drops every waiter; they observe a closed channel. Returns how many were dropped.
    pub fn close(&self) -> usize {
        let mut state = self.lock_state();
        state.closed = true;
        let dropped = state.pending.len();
        state.pending.clear();
        dropped
    }

    pub fn pending_len(&self) -> usize {
        self.lock_state().pending.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, AckBrokerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
