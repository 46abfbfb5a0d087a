/*!
 * # Generation Poller
 *
 * After payment approval and an explicit generation request, polls the plan
 * record until the worker reaches a terminal state. State is derived from the
 * backend record rather than kept purely in memory, so a fresh poller
 * instantiated after navigation resumes polling without re-requesting
 * generation.
 */

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::LifecycleConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::lifecycle::{generation_transition, GenerationEvent, GenerationStatus};
use crate::scheduler::{PollHandle, PollingScheduler};
use crate::services::facade::{PlanRecord, PlanService, PlanType};

/// Read-only view of the generation phase for the presenter.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSnapshot {
    pub plan_id: String,
    pub plan_type: PlanType,
    pub status: GenerationStatus,
    pub artifact_refs: Vec<String>,
    pub last_message: Option<String>,
}

struct GenerationState {
    status: GenerationStatus,
    payment_approved: bool,
    artifact_refs: Vec<String>,
    last_message: Option<String>,
}

struct PollerInner {
    plan_id: String,
    plan_type: PlanType,
    service: Arc<dyn PlanService>,
    events: EventSender,
    config: LifecycleConfig,
    state: Mutex<GenerationState>,
    poll: Mutex<PollHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Polls one plan's generation job to a terminal state.
pub struct GenerationPoller {
    inner: Arc<PollerInner>,
}

impl GenerationPoller {
    pub fn new(
        plan_id: impl Into<String>,
        plan_type: PlanType,
        service: Arc<dyn PlanService>,
        events: EventSender,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                plan_id: plan_id.into(),
                plan_type,
                service,
                events,
                config,
                state: Mutex::new(GenerationState {
                    status: GenerationStatus::NotRequested,
                    payment_approved: false,
                    artifact_refs: Vec::new(),
                    last_message: None,
                }),
                poll: Mutex::new(PollHandle::idle()),
            }),
        }
    }

    /// Syncs from the backend record and, when the job is still in flight,
    /// resumes polling. Never issues a generation request.
    #[instrument(skip(self), fields(plan_id = %self.inner.plan_id))]
    pub async fn attach(&self) -> Result<GenerationSnapshot, ServiceError> {
        let record = self.inner.service.get_plan(&self.inner.plan_id).await?;
        let status = {
            let mut state = lock(&self.inner.state);
            self.inner.absorb_record(&mut state, &record);
            state.status
        };
        if status.is_in_flight() {
            info!(status = %status, "resuming generation polling");
            PollerInner::start_polling(&self.inner);
        }
        Ok(self.snapshot())
    }

    /// Asks the worker to generate the document. Valid only for an approved
    /// plan whose generation was never requested or previously failed.
    #[instrument(skip(self), fields(plan_id = %self.inner.plan_id, plan_type = %self.inner.plan_type))]
    pub async fn request_generation(&self) -> Result<GenerationSnapshot, ServiceError> {
        {
            let state = lock(&self.inner.state);
            if !matches!(
                state.status,
                GenerationStatus::NotRequested | GenerationStatus::Failed
            ) {
                return Err(ServiceError::invalid_operation(format!(
                    "generation cannot be requested while {}",
                    state.status
                )));
            }
        }

        // Approval is checked against the backend record, not local memory,
        // so a poller built after navigation still enforces it.
        if !lock(&self.inner.state).payment_approved {
            let record = self.inner.service.get_plan(&self.inner.plan_id).await?;
            let mut state = lock(&self.inner.state);
            self.inner.absorb_record(&mut state, &record);
            if !state.payment_approved {
                return Err(ServiceError::invalid_operation(
                    "generation requires an approved payment",
                ));
            }
        }

        info!("requesting plan generation");
        if let Err(e) = self.inner.service.request_generation(&self.inner.plan_id).await {
            // status unchanged; the request itself may be retried
            warn!(error = %e, "generation request failed");
            return Err(ServiceError::GenerationRequest(e.to_string()));
        }

        {
            let mut state = lock(&self.inner.state);
            match generation_transition(state.status, GenerationEvent::Requested) {
                Ok(next) => state.status = next,
                Err(t) => warn!(detail = %t, "ignoring illegal transition"),
            }
            state.last_message = None;
        }
        PollerInner::start_polling(&self.inner);
        self.inner
            .events
            .emit(Event::GenerationRequested {
                plan_id: self.inner.plan_id.clone(),
            })
            .await;
        Ok(self.snapshot())
    }

    /// Runs a single poll immediately, outside the scheduled cadence.
    pub async fn poll_once(&self) {
        self.inner.poll_tick().await;
    }

    /// Cancels the polling interval. Safe to call any number of times.
    pub fn dispose(&self) {
        lock(&self.inner.poll).stop();
    }

    pub fn snapshot(&self) -> GenerationSnapshot {
        let state = lock(&self.inner.state);
        GenerationSnapshot {
            plan_id: self.inner.plan_id.clone(),
            plan_type: self.inner.plan_type,
            status: state.status,
            artifact_refs: state.artifact_refs.clone(),
            last_message: state.last_message.clone(),
        }
    }

    pub fn status(&self) -> GenerationStatus {
        lock(&self.inner.state).status
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poll).is_active()
    }
}

impl PollerInner {
    /// Arms the poll interval, replacing (and cancelling) any prior handle.
    fn start_polling(inner: &Arc<PollerInner>) {
        let weak: Weak<PollerInner> = Arc::downgrade(inner);
        let interval = inner.config.generation_poll_interval();
        let mut poll = lock(&inner.poll);
        *poll = PollingScheduler::start(
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.poll_tick().await;
                    }
                }
            },
            interval,
            interval,
        );
    }

    /// One scheduled fetch of the plan record. Stops the interval on the
    /// first terminal observation; transport errors are logged and the loop
    /// continues on schedule.
    async fn poll_tick(&self) {
        {
            let state = lock(&self.state);
            if state.status.is_terminal() {
                return;
            }
        }

        let record = match self.service.get_plan(&self.plan_id).await {
            Ok(record) => record,
            Err(e) => {
                debug!(
                    plan_id = %self.plan_id,
                    error = %e,
                    "transient generation poll error; retrying on next tick"
                );
                return;
            }
        };

        let (previous, current) = {
            let mut state = lock(&self.state);
            let previous = state.status;
            self.absorb_record(&mut state, &record);
            (previous, state.status)
        };

        if previous != current {
            debug!(plan_id = %self.plan_id, from = %previous, to = %current, "generation status changed");
        }
        match (previous, current) {
            (GenerationStatus::Queued, GenerationStatus::Generating) => {
                self.events
                    .emit(Event::GenerationStarted {
                        plan_id: self.plan_id.clone(),
                    })
                    .await;
            }
            (_, GenerationStatus::Completed) if previous != GenerationStatus::Completed => {
                info!(plan_id = %self.plan_id, "generation completed");
                self.events
                    .emit(Event::GenerationCompleted {
                        plan_id: self.plan_id.clone(),
                    })
                    .await;
                lock(&self.poll).stop();
            }
            (_, GenerationStatus::Failed) if previous != GenerationStatus::Failed => {
                warn!(plan_id = %self.plan_id, "generation failed");
                self.events
                    .emit(Event::GenerationFailed {
                        plan_id: self.plan_id.clone(),
                    })
                    .await;
                lock(&self.poll).stop();
            }
            _ => {}
        }
    }

    /// Folds a backend record into local state through the lifecycle machine.
    /// Terminal states are sticky; a stale non-terminal record never
    /// downgrades one.
    fn absorb_record(&self, state: &mut GenerationState, record: &PlanRecord) {
        state.payment_approved = record.status.payment_approved();
        state.artifact_refs = record.artifact_refs.clone();

        let observed = record.status.generation_status();
        if state.status == observed || state.status.is_terminal() {
            return;
        }

        use GenerationEvent as E;
        use GenerationStatus as S;
        let events: &[GenerationEvent] = match (state.status, observed) {
            (S::NotRequested, S::Queued) => &[E::Requested],
            (S::NotRequested, S::Generating) => &[E::Requested, E::WorkerPickedUp],
            (S::NotRequested, S::Completed) => &[E::Requested, E::WorkerDone],
            (S::NotRequested, S::Failed) => &[E::Requested, E::WorkerError],
            (S::Queued, S::Generating) => &[E::WorkerPickedUp],
            (S::Queued | S::Generating, S::Completed) => &[E::WorkerDone],
            (S::Queued | S::Generating, S::Failed) => &[E::WorkerError],
            // a stale record showing an earlier phase never moves us back
            _ => &[],
        };

        for &event in events {
            match generation_transition(state.status, event) {
                Ok(next) => state.status = next,
                Err(t) => warn!(plan_id = %self.plan_id, detail = %t, "ignoring illegal transition"),
            }
        }
    }
}
