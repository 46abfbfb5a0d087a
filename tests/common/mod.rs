#![allow(dead_code)]

//! Shared test harness: a scripted in-process `PlanService` double plus the
//! wiring (event channel, session store, config) the lifecycle services need.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use planforge_api::config::LifecycleConfig;
use planforge_api::errors::ServiceError;
use planforge_api::events::{self, Event, EventSender};
use planforge_api::services::facade::{
    GatewayStatus, PaymentInit, PlanRecord, PlanService, PlanStatus, PlanType, SimulateCapability,
};
use planforge_api::services::generation_poller::GenerationPoller;
use planforge_api::services::payment_orchestrator::PaymentOrchestrator;
use planforge_api::session_store::InMemorySessionStore;

/// A queued gateway response with an optional artificial latency, so tests can
/// interleave a slow automatic check with a fast manual one.
type QueuedStatus = (GatewayStatus, Option<Duration>);

/// Deterministic `PlanService` double. Responses are scripted per call;
/// counters record every side-effecting invocation.
pub struct ScriptedPlanService {
    pub create_payment_calls: AtomicUsize,
    pub check_calls: AtomicUsize,
    pub simulate_calls: AtomicUsize,
    pub request_generation_calls: AtomicUsize,
    pub get_plan_calls: AtomicUsize,

    statuses: Mutex<VecDeque<QueuedStatus>>,
    plan_statuses: Mutex<VecDeque<PlanStatus>>,
    current_plan_status: Mutex<PlanStatus>,
    plan_type: Mutex<PlanType>,

    fail_create: AtomicBool,
    fail_check: AtomicBool,
    fail_request_generation: AtomicBool,
    fail_get_plan: AtomicBool,
    can_simulate: AtomicBool,

    reference_counter: AtomicU32,
}

impl ScriptedPlanService {
    pub fn new() -> Self {
        Self {
            create_payment_calls: AtomicUsize::new(0),
            check_calls: AtomicUsize::new(0),
            simulate_calls: AtomicUsize::new(0),
            request_generation_calls: AtomicUsize::new(0),
            get_plan_calls: AtomicUsize::new(0),
            statuses: Mutex::new(VecDeque::new()),
            plan_statuses: Mutex::new(VecDeque::new()),
            current_plan_status: Mutex::new(PlanStatus::PaymentPending),
            plan_type: Mutex::new(PlanType::General),
            fail_create: AtomicBool::new(false),
            fail_check: AtomicBool::new(false),
            fail_request_generation: AtomicBool::new(false),
            fail_get_plan: AtomicBool::new(false),
            can_simulate: AtomicBool::new(false),
            reference_counter: AtomicU32::new(0),
        }
    }

    /// Queues the next `check_payment_status` response.
    pub fn queue_status(&self, status: GatewayStatus) {
        self.statuses.lock().unwrap().push_back((status, None));
    }

    /// Queues a `check_payment_status` response that resolves only after
    /// `delay` of (paused) time.
    pub fn queue_status_delayed(&self, status: GatewayStatus, delay: Duration) {
        self.statuses.lock().unwrap().push_back((status, Some(delay)));
    }

    /// Queues `get_plan` responses, consumed one per call; once the queue is
    /// empty the last observed status repeats.
    pub fn queue_plan_statuses(&self, statuses: impl IntoIterator<Item = PlanStatus>) {
        self.plan_statuses.lock().unwrap().extend(statuses);
    }

    pub fn set_plan_status(&self, status: PlanStatus) {
        *self.current_plan_status.lock().unwrap() = status;
    }

    pub fn set_plan_type(&self, plan_type: PlanType) {
        *self.plan_type.lock().unwrap() = plan_type;
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_check(&self, fail: bool) {
        self.fail_check.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_request_generation(&self, fail: bool) {
        self.fail_request_generation.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_get_plan(&self, fail: bool) {
        self.fail_get_plan.store(fail, Ordering::SeqCst);
    }

    pub fn set_can_simulate(&self, available: bool) {
        self.can_simulate.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlanService for ScriptedPlanService {
    async fn create_payment(
        &self,
        _plan_id: &str,
        _description: &str,
        _amount: Decimal,
    ) -> Result<PaymentInit, ServiceError> {
        self.create_payment_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ServiceError::Gateway("gateway unavailable".into()));
        }
        let n = self.reference_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentInit {
            external_reference: format!("ref-{n}"),
            qr_code: Some("aGVsbG8=".into()),
            pix_payload: Some(format!("pix-payload-{n}")),
            checkout_url: Some(format!("https://gateway.test/checkout/{n}")),
        })
    }

    async fn check_payment_status(
        &self,
        _external_reference: &str,
    ) -> Result<GatewayStatus, ServiceError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_check.load(Ordering::SeqCst) {
            return Err(ServiceError::Gateway("status endpoint unreachable".into()));
        }
        let queued = self.statuses.lock().unwrap().pop_front();
        match queued {
            Some((status, Some(delay))) => {
                tokio::time::sleep(delay).await;
                Ok(status)
            }
            Some((status, None)) => Ok(status),
            None => Ok(GatewayStatus::Pending),
        }
    }

    async fn can_simulate(&self) -> Result<SimulateCapability, ServiceError> {
        Ok(SimulateCapability {
            can_simulate: self.can_simulate.load(Ordering::SeqCst),
        })
    }

    async fn simulate_approval(&self, _external_reference: &str) -> Result<(), ServiceError> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn request_generation(&self, _plan_id: &str) -> Result<(), ServiceError> {
        self.request_generation_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_request_generation.load(Ordering::SeqCst) {
            return Err(ServiceError::Gateway("generation endpoint rejected".into()));
        }
        Ok(())
    }

    async fn get_plan(&self, plan_id: &str) -> Result<PlanRecord, ServiceError> {
        self.get_plan_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get_plan.load(Ordering::SeqCst) {
            return Err(ServiceError::Gateway("plan endpoint unreachable".into()));
        }
        let status = {
            let mut current = self.current_plan_status.lock().unwrap();
            if let Some(next) = self.plan_statuses.lock().unwrap().pop_front() {
                *current = next;
            }
            *current
        };
        Ok(PlanRecord {
            plan_id: plan_id.to_string(),
            plan_type: *self.plan_type.lock().unwrap(),
            status,
            artifact_refs: match status {
                PlanStatus::Completed => vec!["artifact-1.pdf".to_string()],
                _ => Vec::new(),
            },
        })
    }
}

/// One test's worth of wiring around the scripted service.
pub struct TestHarness {
    pub service: Arc<ScriptedPlanService>,
    pub store: Arc<InMemorySessionStore>,
    pub events: EventSender,
    pub rx: mpsc::Receiver<Event>,
    pub config: LifecycleConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        let (events, rx) = events::channel(256);
        Self {
            service: Arc::new(ScriptedPlanService::new()),
            store: Arc::new(InMemorySessionStore::new()),
            events,
            rx,
            config: LifecycleConfig::default(),
        }
    }

    pub fn orchestrator(&self, plan_id: &str, plan_type: PlanType) -> PaymentOrchestrator {
        PaymentOrchestrator::new(
            plan_id,
            plan_type,
            self.service.clone(),
            self.store.clone(),
            self.events.clone(),
            self.config.clone(),
        )
    }

    pub fn poller(&self, plan_id: &str, plan_type: PlanType) -> GenerationPoller {
        GenerationPoller::new(
            plan_id,
            plan_type,
            self.service.clone(),
            self.events.clone(),
            self.config.clone(),
        )
    }

    /// Drains every event emitted so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            drained.push(event);
        }
        drained
    }
}

/// Mints a unique plan identifier, mirroring the opaque keys the real
/// backends hand out.
pub fn unique_plan_id() -> String {
    format!("plan-{}", uuid::Uuid::new_v4())
}

/// Lets spawned lifecycle tasks run to their next await point.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Advances paused time in whole-second steps so no scheduled tick is skipped.
pub async fn advance_secs(secs: u64) {
    for _ in 0..secs {
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
    }
}
