//! Session and submission event streaming

use crate::executor::ExecutionPath;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignOutReason {
    /// `disconnect()` was called
    Requested,
    /// The provider signed the user out
    Provider,
    /// The account changed to one without a usable access key
    AccountChanged,
}

/// Events published to application subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SignedIn {
        account_id: String,
        public_key: String,
        /// Restored from an existing session without prompting
        restored: bool,
    },

    SignedOut {
        account_id: Option<String>,
        reason: SignOutReason,
    },

    AccountChanged {
        previous: Option<String>,
        account_id: String,
    },

    EndpointChanged {
        network_id: String,
        node_url: String,
    },

    RegistrationInjected {
        token_contract_id: String,
        account_id: String,
    },

    TransactionsSubmitted {
        submission_id: String,
        path: ExecutionPath,
        receivers: Vec<String>,
    },

    SubmissionFailed {
        submission_id: String,
        path: ExecutionPath,
        error: String,
    },
}

/// Broadcasts events to any number of subscribers; events without subscribers are dropped
pub struct EventStream {
    sender: broadcast::Sender<Event>,
}

impl EventStream {
    /// Create a new event stream
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers
    pub fn emit(&self, event: Event) {
        debug!("Emitting event: {:?}", event);

        match self.sender.send(event) {
            Ok(count) => {
                debug!("Event sent to {} receivers", count);
            }
            Err(e) => {
                debug!("No receivers for event: {:?}", e);
            }
        }
    }

    /// Number of live subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}
