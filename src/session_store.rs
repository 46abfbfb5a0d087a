//! Minimal durable recovery for in-flight payment sessions.
//!
//! Client-local persistence is an injected dependency rather than a global:
//! one record per plan, written once on successful payment creation, read once
//! at orchestrator bootstrap, cleared on terminal payment states and on retry.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::services::facade::PlanType;

/// The single persisted record needed to resume an in-flight session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub plan_id: String,
    pub external_reference: String,
    pub plan_type: PlanType,
}

/// Storage seam for session recovery. Implementations are expected to be
/// cheap; the orchestrator treats a failed `save` as non-fatal.
pub trait SessionStore: Send + Sync {
    fn load(&self, plan_id: &str) -> Option<PersistedSession>;
    fn save(&self, session: &PersistedSession) -> Result<(), ServiceError>;
    fn clear(&self, plan_id: &str);
}

/// Process-local store keyed by plan identifier.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: DashMap<String, PersistedSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, plan_id: &str) -> Option<PersistedSession> {
        self.entries.get(plan_id).map(|entry| entry.value().clone())
    }

    fn save(&self, session: &PersistedSession) -> Result<(), ServiceError> {
        self.entries
            .insert(session.plan_id.clone(), session.clone());
        Ok(())
    }

    fn clear(&self, plan_id: &str) {
        self.entries.remove(plan_id);
    }
}
