//! Tagged dispatch from plan type to backend binding.
//!
//! The plan type travels with the plan identifier from the moment it is
//! created and is resolved here exactly once. There is no fallback probing of
//! other backends when a lookup misses; an unbound type is an error.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::services::facade::{PlanService, PlanType};

/// Registry holding one `PlanService` binding per plan type.
#[derive(Clone, Default)]
pub struct PlanServiceRegistry {
    bindings: HashMap<PlanType, Arc<dyn PlanService>>,
}

impl PlanServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the binding for a plan type.
    pub fn register(&mut self, plan_type: PlanType, service: Arc<dyn PlanService>) -> &mut Self {
        self.bindings.insert(plan_type, service);
        self
    }

    /// Resolves the binding for a plan type.
    pub fn resolve(&self, plan_type: PlanType) -> Result<Arc<dyn PlanService>, ServiceError> {
        self.bindings.get(&plan_type).cloned().ok_or_else(|| {
            ServiceError::NotFound(format!("no backend bound for plan type {plan_type}"))
        })
    }

    pub fn is_bound(&self, plan_type: PlanType) -> bool {
        self.bindings.contains_key(&plan_type)
    }
}
