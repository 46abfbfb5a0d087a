/*!
 * # Payment Orchestrator
 *
 * Owns one plan's payment session end to end: idempotent creation guarded
 * against presenter re-render churn, a countdown to session expiry, an
 * automatic polling loop with a grace delay, manual checks, a test-mode
 * simulate-approval action, and a retry path from failed states.
 *
 * Terminal states are sticky: whichever check observes a terminal gateway
 * status first wins, and every later response for the same session is ignored.
 */

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::LifecycleConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::lifecycle::{payment_transition, PaymentEvent, PaymentStatus};
use crate::scheduler::{PollHandle, PollingScheduler};
use crate::services::facade::{GatewayStatus, PlanService, PlanType};
use crate::session_store::{PersistedSession, SessionStore};

/// The payment session handed out by the gateway. Owned exclusively by the
/// orchestrator; `external_reference` is immutable once assigned and the whole
/// session is discarded on retry.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub external_reference: String,
    pub qr_code: Option<String>,
    pub pix_payload: Option<String>,
    pub checkout_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Read-only view of the orchestrator for the presenter.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSnapshot {
    pub plan_id: String,
    pub plan_type: PlanType,
    pub status: PaymentStatus,
    pub external_reference: Option<String>,
    pub qr_code: Option<String>,
    pub pix_payload: Option<String>,
    pub checkout_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub countdown_secs: i64,
    pub poll_attempts: u32,
    pub can_simulate: bool,
    pub last_message: Option<String>,
}

/// Result of a user-initiated status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualCheckOutcome {
    Approved,
    Rejected,
    /// Gateway answered but the payment is not confirmed yet.
    StillPending,
}

#[derive(Debug, Clone, Copy)]
enum CheckSource {
    Automatic,
    Manual,
    Simulated,
}

/// What a gateway response did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Approved,
    Rejected,
    Pending,
    /// A terminal state was already set; the response was discarded.
    Ignored,
}

struct PaymentState {
    status: PaymentStatus,
    session: Option<PaymentSession>,
    countdown_secs: i64,
    last_message: Option<String>,
    can_simulate: bool,
}

#[derive(Default)]
struct Timers {
    countdown: PollHandle,
    auto_poll: PollHandle,
}

struct Inner {
    plan_id: String,
    plan_type: PlanType,
    service: Arc<dyn PlanService>,
    store: Arc<dyn SessionStore>,
    events: EventSender,
    config: LifecycleConfig,
    /// One-shot guard: presenter re-renders cannot issue a second
    /// `create_payment`. Released only when initialization fails.
    started: AtomicBool,
    attempts: AtomicU32,
    state: Mutex<PaymentState>,
    timers: Mutex<Timers>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Orchestrates the payment phase of a single plan's lifecycle.
pub struct PaymentOrchestrator {
    inner: Arc<Inner>,
}

impl PaymentOrchestrator {
    pub fn new(
        plan_id: impl Into<String>,
        plan_type: PlanType,
        service: Arc<dyn PlanService>,
        store: Arc<dyn SessionStore>,
        events: EventSender,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                plan_id: plan_id.into(),
                plan_type,
                service,
                store,
                events,
                config,
                started: AtomicBool::new(false),
                attempts: AtomicU32::new(0),
                state: Mutex::new(PaymentState {
                    status: PaymentStatus::Uninitialized,
                    session: None,
                    countdown_secs: 0,
                    last_message: None,
                    can_simulate: false,
                }),
                timers: Mutex::new(Timers::default()),
            }),
        }
    }

    /// Creates the payment session, or resumes a persisted one.
    ///
    /// Idempotent: while the session is initializing, awaiting action or
    /// approved, further calls are no-ops returning the current snapshot.
    #[instrument(skip(self, description, amount), fields(plan_id = %self.inner.plan_id, plan_type = %self.inner.plan_type))]
    pub async fn initialize(
        &self,
        description: &str,
        amount: Decimal,
    ) -> Result<PaymentSnapshot, ServiceError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("initialize called on a started session; ignoring");
            return Ok(self.snapshot());
        }

        if description.trim().is_empty() {
            self.inner.started.store(false, Ordering::SeqCst);
            return Err(ServiceError::validation("description must not be empty"));
        }
        if amount <= Decimal::ZERO {
            self.inner.started.store(false, Ordering::SeqCst);
            return Err(ServiceError::validation("amount must be greater than 0"));
        }

        if self.try_resume().await? {
            return Ok(self.snapshot());
        }

        {
            let mut state = lock(&self.inner.state);
            begin_initializing(&mut state)?;
        }
        self.create_session(description, amount).await
    }

    /// Resumes an in-flight session persisted by a previous page load instead
    /// of creating a duplicate one.
    async fn try_resume(&self) -> Result<bool, ServiceError> {
        let Some(persisted) = self.inner.store.load(&self.inner.plan_id) else {
            return Ok(false);
        };
        if persisted.plan_type != self.inner.plan_type {
            warn!(
                stored = %persisted.plan_type,
                "persisted session belongs to a different plan type; discarding"
            );
            self.inner.store.clear(&self.inner.plan_id);
            return Ok(false);
        }

        info!(
            external_reference = %persisted.external_reference,
            "resuming persisted payment session"
        );
        {
            let mut state = lock(&self.inner.state);
            begin_initializing(&mut state)?;
            state.status = payment_transition(state.status, PaymentEvent::SessionCreated)
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            state.session = Some(PaymentSession {
                external_reference: persisted.external_reference.clone(),
                qr_code: None,
                pix_payload: None,
                checkout_url: None,
                expires_at: Utc::now() + self.inner.config.payment_expiry(),
            });
            state.countdown_secs = self.inner.config.payment_expiry_secs;
        }
        self.inner.refresh_simulate_capability().await;
        Inner::start_timers(&self.inner);
        self.inner
            .events
            .emit(Event::PaymentSessionResumed {
                plan_id: self.inner.plan_id.clone(),
                external_reference: persisted.external_reference,
            })
            .await;
        Ok(true)
    }

    async fn create_session(
        &self,
        description: &str,
        amount: Decimal,
    ) -> Result<PaymentSnapshot, ServiceError> {
        info!(%amount, "creating payment session");
        let created = self
            .inner
            .service
            .create_payment(&self.inner.plan_id, description, amount)
            .await;

        let init = match created {
            Ok(init) => init,
            Err(e) => {
                let reason = e.to_string();
                {
                    let mut state = lock(&self.inner.state);
                    match payment_transition(state.status, PaymentEvent::InitError) {
                        Ok(next) => state.status = next,
                        Err(t) => warn!(detail = %t, "ignoring illegal transition"),
                    }
                    state.last_message = Some(reason.clone());
                }
                // release the guard so a later retry can re-attempt
                self.inner.started.store(false, Ordering::SeqCst);
                warn!(error = %reason, "payment session creation failed");
                self.inner
                    .events
                    .emit(Event::PaymentInitializationFailed {
                        plan_id: self.inner.plan_id.clone(),
                        reason: reason.clone(),
                    })
                    .await;
                return Err(ServiceError::Initialization(reason));
            }
        };

        let persisted = PersistedSession {
            plan_id: self.inner.plan_id.clone(),
            external_reference: init.external_reference.clone(),
            plan_type: self.inner.plan_type,
        };
        if let Err(e) = self.inner.store.save(&persisted) {
            warn!(error = %e, "failed to persist session record; reload recovery unavailable");
        }

        {
            let mut state = lock(&self.inner.state);
            state.status = payment_transition(state.status, PaymentEvent::SessionCreated)
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            state.session = Some(PaymentSession {
                external_reference: init.external_reference.clone(),
                qr_code: init.qr_code,
                pix_payload: init.pix_payload,
                checkout_url: init.checkout_url,
                expires_at: Utc::now() + self.inner.config.payment_expiry(),
            });
            state.countdown_secs = self.inner.config.payment_expiry_secs;
            state.last_message = None;
        }
        self.inner.refresh_simulate_capability().await;
        Inner::start_timers(&self.inner);
        info!(external_reference = %init.external_reference, "payment session ready");
        self.inner
            .events
            .emit(Event::PaymentSessionCreated {
                plan_id: self.inner.plan_id.clone(),
                external_reference: init.external_reference,
            })
            .await;
        Ok(self.snapshot())
    }

    /// User-initiated status check. Valid only while the session is awaiting
    /// action (or already verifying).
    #[instrument(skip(self), fields(plan_id = %self.inner.plan_id))]
    pub async fn check_status_manually(&self) -> Result<ManualCheckOutcome, ServiceError> {
        let external_reference = {
            let mut state = lock(&self.inner.state);
            if !state.status.is_awaiting() {
                return Err(ServiceError::invalid_operation(format!(
                    "manual check is not available while {}",
                    state.status
                )));
            }
            let Some(session) = &state.session else {
                return Err(ServiceError::invalid_operation("no payment session"));
            };
            let external_reference = session.external_reference.clone();
            if state.status == PaymentStatus::AwaitingAction {
                if let Ok(next) = payment_transition(state.status, PaymentEvent::CheckStarted) {
                    state.status = next;
                }
            }
            external_reference
        };

        info!("manual payment status check");
        let gateway_status = match self
            .inner
            .service
            .check_payment_status(&external_reference)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                let mut state = lock(&self.inner.state);
                if state.status == PaymentStatus::Verifying {
                    if let Ok(next) = payment_transition(state.status, PaymentEvent::StillPending) {
                        state.status = next;
                    }
                }
                return Err(ServiceError::ManualCheck(e.to_string()));
            }
        };

        match self
            .inner
            .apply_gateway_status(gateway_status, CheckSource::Manual)
            .await
        {
            Applied::Approved => Ok(ManualCheckOutcome::Approved),
            Applied::Rejected => Ok(ManualCheckOutcome::Rejected),
            Applied::Pending => Ok(ManualCheckOutcome::StillPending),
            Applied::Ignored => {
                // a concurrent check settled the session first; report its result
                let status = lock(&self.inner.state).status;
                match status {
                    PaymentStatus::Approved => Ok(ManualCheckOutcome::Approved),
                    PaymentStatus::Rejected => Ok(ManualCheckOutcome::Rejected),
                    _ => Ok(ManualCheckOutcome::StillPending),
                }
            }
        }
    }

    /// Test-mode backdoor: approves the session without a gateway round-trip,
    /// driving exactly the same transition as a real approval.
    #[instrument(skip(self), fields(plan_id = %self.inner.plan_id))]
    pub async fn simulate_approval(&self) -> Result<PaymentSnapshot, ServiceError> {
        let external_reference = {
            let state = lock(&self.inner.state);
            if !state.can_simulate {
                return Err(ServiceError::invalid_operation(
                    "approval simulation is not available for this backend",
                ));
            }
            if !state.status.is_awaiting() {
                return Err(ServiceError::invalid_operation(format!(
                    "cannot simulate approval while {}",
                    state.status
                )));
            }
            state
                .session
                .as_ref()
                .map(|s| s.external_reference.clone())
                .ok_or_else(|| ServiceError::invalid_operation("no payment session"))?
        };

        info!("simulating payment approval");
        self.inner
            .service
            .simulate_approval(&external_reference)
            .await?;
        self.inner
            .apply_gateway_status(GatewayStatus::Approved, CheckSource::Simulated)
            .await;
        Ok(self.snapshot())
    }

    /// Full reset from `Rejected` or `InitializationFailed`: discards the old
    /// session and creates a new one with a new external reference.
    #[instrument(skip(self, description, amount), fields(plan_id = %self.inner.plan_id))]
    pub async fn retry(
        &self,
        description: &str,
        amount: Decimal,
    ) -> Result<PaymentSnapshot, ServiceError> {
        {
            let mut state = lock(&self.inner.state);
            state.status = payment_transition(state.status, PaymentEvent::Retry)
                .map_err(|e| ServiceError::invalid_operation(e.to_string()))?;
            state.session = None;
            state.countdown_secs = 0;
            state.last_message = None;
        }
        self.inner.store.clear(&self.inner.plan_id);
        self.inner.attempts.store(0, Ordering::SeqCst);
        self.inner.started.store(true, Ordering::SeqCst);
        self.inner.stop_payment_timers();

        info!("retrying payment initialization");
        self.inner
            .events
            .emit(Event::PaymentSessionReset {
                plan_id: self.inner.plan_id.clone(),
            })
            .await;
        self.create_session(description, amount).await
    }

    /// Cancels the countdown and the auto-poll loop. Safe to call any number
    /// of times; must be invoked on every exit path.
    pub fn dispose(&self) {
        self.inner.stop_payment_timers();
    }

    pub fn snapshot(&self) -> PaymentSnapshot {
        let state = lock(&self.inner.state);
        PaymentSnapshot {
            plan_id: self.inner.plan_id.clone(),
            plan_type: self.inner.plan_type,
            status: state.status,
            external_reference: state
                .session
                .as_ref()
                .map(|s| s.external_reference.clone()),
            qr_code: state.session.as_ref().and_then(|s| s.qr_code.clone()),
            pix_payload: state.session.as_ref().and_then(|s| s.pix_payload.clone()),
            checkout_url: state.session.as_ref().and_then(|s| s.checkout_url.clone()),
            expires_at: state.session.as_ref().map(|s| s.expires_at),
            countdown_secs: state.countdown_secs,
            poll_attempts: self.inner.attempts.load(Ordering::SeqCst),
            can_simulate: state.can_simulate,
            last_message: state.last_message.clone(),
        }
    }

    pub fn status(&self) -> PaymentStatus {
        lock(&self.inner.state).status
    }

    pub fn poll_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Whether any payment timer (countdown or auto-poll) is still armed.
    pub fn has_active_timers(&self) -> bool {
        let timers = lock(&self.inner.timers);
        timers.countdown.is_active() || timers.auto_poll.is_active()
    }
}

/// Moves the machine into `Initializing` from whichever entry state applies.
fn begin_initializing(state: &mut PaymentState) -> Result<(), ServiceError> {
    let event = match state.status {
        PaymentStatus::Uninitialized => PaymentEvent::Init,
        PaymentStatus::InitializationFailed | PaymentStatus::Rejected => PaymentEvent::Retry,
        other => {
            return Err(ServiceError::invalid_operation(format!(
                "cannot initialize while {other}"
            )))
        }
    };
    state.status = payment_transition(state.status, event)
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    Ok(())
}

impl Inner {
    /// Arms the countdown and the auto-poll loop. Arming replaces (and
    /// thereby cancels) any handle already held for the same concern.
    fn start_timers(inner: &Arc<Inner>) {
        let mut timers = lock(&inner.timers);

        let weak: Weak<Inner> = Arc::downgrade(inner);
        let tick = inner.config.countdown_tick();
        timers.countdown = PollingScheduler::start(
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.countdown_tick();
                    }
                }
            },
            tick,
            tick,
        );

        let weak: Weak<Inner> = Arc::downgrade(inner);
        timers.auto_poll = PollingScheduler::start(
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.auto_check_tick().await;
                    }
                }
            },
            inner.config.auto_poll_interval(),
            inner.config.auto_poll_delay(),
        );
    }

    fn stop_payment_timers(&self) {
        let mut timers = lock(&self.timers);
        timers.countdown.stop();
        timers.auto_poll.stop();
    }

    /// Countdown runs only inside the awaiting window; hitting zero changes
    /// presentation, never state.
    fn countdown_tick(&self) {
        let mut state = lock(&self.state);
        if !state.status.is_awaiting() {
            return;
        }
        let tick = self.config.countdown_tick_secs as i64;
        state.countdown_secs = (state.countdown_secs - tick).max(0);
    }

    /// One scheduled status check. Transport errors are logged and swallowed;
    /// the loop continues on schedule.
    async fn auto_check_tick(&self) {
        let external_reference = {
            let state = lock(&self.state);
            if !state.status.is_awaiting() {
                return;
            }
            match &state.session {
                Some(session) => session.external_reference.clone(),
                None => return,
            }
        };

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(plan_id = %self.plan_id, attempt, "automatic payment status check");
        match self.service.check_payment_status(&external_reference).await {
            Ok(status) => {
                self.apply_gateway_status(status, CheckSource::Automatic)
                    .await;
            }
            Err(e) => {
                debug!(
                    plan_id = %self.plan_id,
                    attempt,
                    error = %e,
                    "transient poll error; retrying on next tick"
                );
            }
        }
    }

    /// Central sticky-terminal logic shared by every check source. Applies
    /// whichever terminal response arrives first and discards the rest.
    async fn apply_gateway_status(&self, gateway: GatewayStatus, source: CheckSource) -> Applied {
        let (applied, warning) = {
            let mut state = lock(&self.state);
            if state.status.is_terminal() {
                debug!(
                    plan_id = %self.plan_id,
                    status = %state.status,
                    response = %gateway,
                    ?source,
                    "status response after terminal state ignored"
                );
                (Applied::Ignored, None)
            } else {
                match gateway {
                    GatewayStatus::Approved => {
                        match payment_transition(state.status, PaymentEvent::Approved) {
                            Ok(next) => {
                                state.status = next;
                                state.last_message = None;
                                (Applied::Approved, None)
                            }
                            Err(t) => (Applied::Ignored, Some(t.to_string())),
                        }
                    }
                    GatewayStatus::Rejected | GatewayStatus::Cancelled => {
                        match payment_transition(state.status, PaymentEvent::RejectedOrCancelled) {
                            Ok(next) => {
                                state.status = next;
                                (Applied::Rejected, None)
                            }
                            Err(t) => (Applied::Ignored, Some(t.to_string())),
                        }
                    }
                    GatewayStatus::Pending => {
                        if matches!(source, CheckSource::Manual)
                            && state.status == PaymentStatus::Verifying
                        {
                            if let Ok(next) =
                                payment_transition(state.status, PaymentEvent::StillPending)
                            {
                                state.status = next;
                            }
                            state.last_message = Some("Payment not yet confirmed".to_string());
                        }
                        (Applied::Pending, None)
                    }
                }
            }
        };

        if let Some(detail) = warning {
            warn!(plan_id = %self.plan_id, detail = %detail, "ignoring illegal transition");
            self.events
                .emit(Event::ConsistencyWarning {
                    plan_id: self.plan_id.clone(),
                    detail,
                })
                .await;
        }

        match applied {
            Applied::Approved => {
                info!(plan_id = %self.plan_id, ?source, "payment approved");
                self.store.clear(&self.plan_id);
                self.events
                    .emit(Event::PaymentApproved {
                        plan_id: self.plan_id.clone(),
                    })
                    .await;
                self.stop_payment_timers();
            }
            Applied::Rejected => {
                info!(plan_id = %self.plan_id, ?source, "payment rejected or cancelled");
                self.store.clear(&self.plan_id);
                self.events
                    .emit(Event::PaymentRejected {
                        plan_id: self.plan_id.clone(),
                    })
                    .await;
                self.stop_payment_timers();
            }
            Applied::Pending | Applied::Ignored => {}
        }
        applied
    }

    async fn refresh_simulate_capability(&self) {
        match self.service.can_simulate().await {
            Ok(cap) => lock(&self.state).can_simulate = cap.can_simulate,
            Err(e) => {
                debug!(
                    plan_id = %self.plan_id,
                    error = %e,
                    "simulate capability probe failed; assuming unavailable"
                );
            }
        }
    }
}
