/*!
 * # Lifecycle State Machine
 *
 * Pure definition of the finite states and legal transitions shared by the
 * payment phase and the generation phase of a single plan's life. No I/O
 * happens here; the orchestration services apply these transitions and decide
 * what to do with a rejected one (log a consistency warning, never mutate).
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// States of the payment phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    /// No payment session exists yet.
    Uninitialized,
    /// A session is being created at the gateway.
    Initializing,
    /// The session exists and the athlete still has to act on it.
    AwaitingAction,
    /// A manual status check is in flight.
    Verifying,
    Approved,
    Rejected,
    /// Session creation failed; recoverable through a retry.
    InitializationFailed,
}

impl PaymentStatus {
    /// States with no automatic outgoing transition. Once entered, only an
    /// explicit retry leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved | PaymentStatus::Rejected | PaymentStatus::InitializationFailed
        )
    }

    /// The awaiting window: the countdown and the auto-poll loop are armed
    /// exactly while the status is in this window.
    pub fn is_awaiting(self) -> bool {
        matches!(self, PaymentStatus::AwaitingAction | PaymentStatus::Verifying)
    }
}

/// Events driving the payment phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentEvent {
    /// First initialization attempt.
    Init,
    /// The gateway returned a session.
    SessionCreated,
    /// A manual status check started.
    CheckStarted,
    /// A manual check came back non-terminal.
    StillPending,
    Approved,
    RejectedOrCancelled,
    InitError,
    /// Explicit user retry from a failed state; implies a full session reset.
    Retry,
}

/// States of the generation phase, entered only after payment approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GenerationStatus {
    NotRequested,
    Queued,
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }

    /// Whether the generation poller should be running for this status.
    pub fn is_in_flight(self) -> bool {
        matches!(self, GenerationStatus::Queued | GenerationStatus::Generating)
    }
}

/// Events driving the generation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum GenerationEvent {
    /// Generation requested by the user. Legal from `NotRequested` and, as a
    /// retry, from `Failed`.
    Requested,
    WorkerPickedUp,
    WorkerDone,
    WorkerError,
}

/// An event was applied in a state that has no transition for it. The caller
/// must treat this as a no-op and report it; state is never corrupted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransition {
    #[error("illegal payment transition: {event} while {from}")]
    Payment {
        from: PaymentStatus,
        event: PaymentEvent,
    },
    #[error("illegal generation transition: {event} while {from}")]
    Generation {
        from: GenerationStatus,
        event: GenerationEvent,
    },
}

/// Applies a payment-phase event, returning the successor state.
pub fn payment_transition(
    from: PaymentStatus,
    event: PaymentEvent,
) -> Result<PaymentStatus, InvalidTransition> {
    use PaymentEvent as E;
    use PaymentStatus as S;

    let next = match (from, event) {
        (S::Uninitialized, E::Init) => S::Initializing,
        (S::Rejected | S::InitializationFailed, E::Retry) => S::Initializing,
        (S::Initializing, E::SessionCreated) => S::AwaitingAction,
        (S::Initializing, E::InitError) => S::InitializationFailed,
        (S::AwaitingAction, E::CheckStarted) => S::Verifying,
        (S::Verifying, E::StillPending) => S::AwaitingAction,
        (S::AwaitingAction | S::Verifying, E::Approved) => S::Approved,
        (S::AwaitingAction | S::Verifying, E::RejectedOrCancelled) => S::Rejected,
        (from, event) => return Err(InvalidTransition::Payment { from, event }),
    };
    Ok(next)
}

/// Applies a generation-phase event, returning the successor state.
///
/// `WorkerDone` is legal straight from `Queued` as well: a poll may observe
/// the terminal record without ever seeing the intermediate `Generating`.
pub fn generation_transition(
    from: GenerationStatus,
    event: GenerationEvent,
) -> Result<GenerationStatus, InvalidTransition> {
    use GenerationEvent as E;
    use GenerationStatus as S;

    let next = match (from, event) {
        (S::NotRequested | S::Failed, E::Requested) => S::Queued,
        (S::Queued, E::WorkerPickedUp) => S::Generating,
        (S::Queued | S::Generating, E::WorkerDone) => S::Completed,
        (S::Queued | S::Generating, E::WorkerError) => S::Failed,
        (from, event) => return Err(InvalidTransition::Generation { from, event }),
    };
    Ok(next)
}
