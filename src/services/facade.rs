//! Capability interface the lifecycle core consumes.
//!
//! One binding exists per plan type; the core never talks to a concrete
//! gateway or plan backend directly. Bindings live outside this crate and are
//! injected as `Arc<dyn PlanService>`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::lifecycle::GenerationStatus;

/// The four independent plan types the marketplace sells.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanType {
    General,
    Strength,
    Running,
    Cycling,
}

/// Result of creating a payment session at the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInit {
    pub external_reference: String,
    /// Base64-encoded QR code image, when the gateway issues one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    /// Copy-and-paste payload for QR-less clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pix_payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

/// Gateway-side payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GatewayStatus {
    Approved,
    Pending,
    Rejected,
    Cancelled,
}

/// Backend status of a plan record across both lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    PaymentPending,
    PaymentApproved,
    Queued,
    Generating,
    Completed,
    Failed,
}

impl PlanStatus {
    /// Projects the backend record onto the generation phase.
    pub fn generation_status(self) -> GenerationStatus {
        match self {
            PlanStatus::PaymentPending | PlanStatus::PaymentApproved => {
                GenerationStatus::NotRequested
            }
            PlanStatus::Queued => GenerationStatus::Queued,
            PlanStatus::Generating => GenerationStatus::Generating,
            PlanStatus::Completed => GenerationStatus::Completed,
            PlanStatus::Failed => GenerationStatus::Failed,
        }
    }

    pub fn payment_approved(self) -> bool {
        !matches!(self, PlanStatus::PaymentPending)
    }
}

/// A plan record as read from the backend. Not owned by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub plan_id: String,
    pub plan_type: PlanType,
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_refs: Vec<String>,
}

/// Whether the backend exposes the test-mode approval backdoor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulateCapability {
    pub can_simulate: bool,
}

/// Abstraction over the plan-type-specific backends.
///
/// All operations are idempotent reads except `create_payment`,
/// `simulate_approval` and `request_generation`; the orchestration layer is
/// responsible for issuing those at most once per lifecycle attempt.
#[async_trait]
pub trait PlanService: Send + Sync {
    /// Creates a payment session for the plan and returns its handles.
    async fn create_payment(
        &self,
        plan_id: &str,
        description: &str,
        amount: Decimal,
    ) -> Result<PaymentInit, ServiceError>;

    /// Reads the current gateway status of an existing session.
    async fn check_payment_status(
        &self,
        external_reference: &str,
    ) -> Result<GatewayStatus, ServiceError>;

    /// Reports whether `simulate_approval` is available in this environment.
    async fn can_simulate(&self) -> Result<SimulateCapability, ServiceError>;

    /// Test-mode backdoor: marks the session approved without a real
    /// gateway round-trip.
    async fn simulate_approval(&self, external_reference: &str) -> Result<(), ServiceError>;

    /// Asks the worker to generate the document for an approved plan.
    async fn request_generation(&self, plan_id: &str) -> Result<(), ServiceError>;

    /// Fetches the plan record, including its generation status.
    async fn get_plan(&self, plan_id: &str) -> Result<PlanRecord, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_formats_match_the_backend() {
        let status: PlanStatus = serde_json::from_str("\"PAYMENT_APPROVED\"").unwrap();
        assert_eq!(status, PlanStatus::PaymentApproved);
        assert_eq!(
            serde_json::to_string(&PlanStatus::Generating).unwrap(),
            "\"GENERATING\""
        );

        let gateway: GatewayStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(gateway, GatewayStatus::Cancelled);

        assert_eq!(
            serde_json::to_string(&PlanType::General).unwrap(),
            "\"general\""
        );
    }

    #[test]
    fn plan_status_projects_onto_generation_phase() {
        assert_eq!(
            PlanStatus::PaymentApproved.generation_status(),
            GenerationStatus::NotRequested
        );
        assert_eq!(
            PlanStatus::Generating.generation_status(),
            GenerationStatus::Generating
        );
        assert!(!PlanStatus::PaymentPending.payment_approved());
        assert!(PlanStatus::Queued.payment_approved());
    }
}
