//! Lifecycle event bus.
//!
//! The presenter subscribes to these notifications instead of polling the
//! orchestrator; background ticks emit best-effort and never let a full or
//! closed channel disturb the lifecycle itself.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Events emitted across a plan's payment and generation lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PaymentSessionCreated {
        plan_id: String,
        external_reference: String,
    },
    PaymentSessionResumed {
        plan_id: String,
        external_reference: String,
    },
    PaymentApproved {
        plan_id: String,
    },
    PaymentRejected {
        plan_id: String,
    },
    PaymentInitializationFailed {
        plan_id: String,
        reason: String,
    },
    /// A retry cleared the previous session.
    PaymentSessionReset {
        plan_id: String,
    },
    GenerationRequested {
        plan_id: String,
    },
    GenerationStarted {
        plan_id: String,
    },
    GenerationCompleted {
        plan_id: String,
    },
    GenerationFailed {
        plan_id: String,
    },
    /// An illegal state transition was attempted and ignored.
    ConsistencyWarning {
        plan_id: String,
        detail: String,
    },
}

/// Cloneable sending half of the event bus.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing the failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort emit for background tasks: failures are logged, never
    /// propagated.
    pub async fn emit(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("dropping lifecycle event: {}", e);
        }
    }
}

/// Creates the event channel with the given buffer capacity.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}
