//! PlanForge Lifecycle Core
//!
//! Payment and plan-generation lifecycle orchestration for the PlanForge
//! training-plan marketplace: creates a payment session exactly once per
//! attempt, polls the gateway for approval both automatically and on demand,
//! runs the countdown to session expiry, and after approval drives the
//! asynchronous document-generation job to a terminal state.
//!
//! The crate is UI-agnostic: a presenter binds to [`PaymentOrchestrator`] and
//! [`GenerationPoller`] through read-only snapshots and the event bus, and the
//! plan-type-specific backends are injected behind the [`PlanService`] trait.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod scheduler;
pub mod services;
pub mod session_store;

pub use config::LifecycleConfig;
pub use errors::ServiceError;
pub use events::{Event, EventSender};
pub use lifecycle::{GenerationStatus, PaymentStatus};
pub use scheduler::{PollHandle, PollingScheduler};
pub use services::facade::{PlanRecord, PlanService, PlanStatus, PlanType};
pub use services::generation_poller::{GenerationPoller, GenerationSnapshot};
pub use services::payment_orchestrator::{
    ManualCheckOutcome, PaymentOrchestrator, PaymentSnapshot,
};
pub use services::registry::PlanServiceRegistry;
pub use session_store::{InMemorySessionStore, PersistedSession, SessionStore};
