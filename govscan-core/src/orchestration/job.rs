use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use govscan_model::{
    AccountId, Finding, JobId, JobStatus, JobStatusView, Region, ScanResult,
    TaskError, TaskErrorKind, TaskStatus, TaskSummary,
};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::DeadlinePolicy;
use crate::error::StorageError;
use crate::rules::panic_message;

use super::aggregator;
use super::context::ScanContext;
use super::events::{ScanEvent, ScanEventBus};
use super::task;

/// One (account, region) pair to scan, with the role resolved for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTarget {
    pub account_id: AccountId,
    pub region: Region,
    pub role_name: String,
}

impl TaskTarget {
    pub fn new(
        account_id: AccountId,
        region: Region,
        role_name: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            region,
            role_name: role_name.into(),
        }
    }
}

/// Terminal verdict a task commits for itself.
#[derive(Debug)]
pub(crate) struct TaskOutcome {
    pub status: TaskStatus,
    pub error: Option<TaskError>,
    pub findings: Vec<Finding>,
    pub resources_scanned: usize,
}

#[derive(Debug)]
struct SlotState {
    status: TaskStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<TaskError>,
    resources_scanned: usize,
    findings: Vec<Finding>,
}

/// Per-task state. Only the owning task, the reaper and cancellation write
/// here, always through a compare-and-transition on the current status.
#[derive(Debug)]
pub struct TaskSlot {
    target: TaskTarget,
    state: Mutex<SlotState>,
}

impl TaskSlot {
    fn new(target: TaskTarget) -> Self {
        Self {
            target,
            state: Mutex::new(SlotState {
                status: TaskStatus::Pending,
                started_at: None,
                finished_at: None,
                error: None,
                resources_scanned: 0,
                findings: Vec::new(),
            }),
        }
    }

    pub fn target(&self) -> &TaskTarget {
        &self.target
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    fn start(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Pending {
            return false;
        }
        state.status = TaskStatus::Running;
        state.started_at = Some(Utc::now());
        true
    }

    fn finish(&self, outcome: TaskOutcome) -> bool {
        let mut state = self.state.lock();
        if !state.status.can_transition_to(outcome.status) {
            return false;
        }
        state.status = outcome.status;
        state.finished_at = Some(Utc::now());
        state.error = outcome.error;
        state.resources_scanned = outcome.resources_scanned;
        state.findings = outcome.findings;
        true
    }

    /// Moves a non-terminal slot to `status` without committing findings.
    fn force(&self, status: TaskStatus, error: Option<TaskError>) -> bool {
        let mut state = self.state.lock();
        if !state.status.can_transition_to(status) {
            return false;
        }
        state.status = status;
        state.finished_at = Some(Utc::now());
        state.error = error;
        true
    }

    pub fn summary(&self) -> TaskSummary {
        let state = self.state.lock();
        TaskSummary {
            account_id: self.target.account_id.clone(),
            region: self.target.region.clone(),
            status: state.status,
            started_at: state.started_at,
            finished_at: state.finished_at,
            error: state.error.clone(),
            resources_scanned: state.resources_scanned,
            finding_count: state.findings.len(),
        }
    }

    fn findings(&self) -> Vec<Finding> {
        self.state.lock().findings.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Deadline,
    Cancelled,
}

/// Shared state of one scan job: its task slots, lifecycle status and final
/// result.
pub struct ScanJob {
    id: JobId,
    requested_by: String,
    created_at: DateTime<Utc>,
    slots: Vec<TaskSlot>,
    status: watch::Sender<JobStatus>,
    settled: watch::Sender<bool>,
    deadline_fired: AtomicBool,
    terminal_tasks: AtomicUsize,
    progress: Notify,
    cancel: CancellationToken,
    result: Mutex<Option<ScanResult>>,
    persist_error: Mutex<Option<StorageError>>,
}

impl fmt::Debug for ScanJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanJob")
            .field("id", &self.id)
            .field("requested_by", &self.requested_by)
            .field("status", &*self.status.borrow())
            .field("tasks", &self.slots.len())
            .field(
                "terminal_tasks",
                &self.terminal_tasks.load(Ordering::Relaxed),
            )
            .field("deadline_fired", &self.deadline_fired.load(Ordering::Relaxed))
            .finish()
    }
}

impl ScanJob {
    /// Builds a job with one slot per distinct target, ordered by
    /// (account, region).
    pub fn new(
        id: JobId,
        requested_by: impl Into<String>,
        mut targets: Vec<TaskTarget>,
    ) -> Self {
        targets.sort_by(|a, b| {
            (&a.account_id, &a.region).cmp(&(&b.account_id, &b.region))
        });
        targets.dedup_by(|a, b| a.account_id == b.account_id && a.region == b.region);

        let (status, _) = watch::channel(JobStatus::Created);
        let (settled, _) = watch::channel(false);
        Self {
            id,
            requested_by: requested_by.into(),
            created_at: Utc::now(),
            slots: targets.into_iter().map(TaskSlot::new).collect(),
            status,
            settled,
            deadline_fired: AtomicBool::new(false),
            terminal_tasks: AtomicUsize::new(0),
            progress: Notify::new(),
            cancel: CancellationToken::new(),
            result: Mutex::new(None),
            persist_error: Mutex::new(None),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn slots(&self) -> &[TaskSlot] {
        &self.slots
    }

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn deadline_fired(&self) -> bool {
        self.deadline_fired.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            overall_status: self.status(),
            per_task_status: self.task_summaries(),
        }
    }

    pub fn task_summaries(&self) -> Vec<TaskSummary> {
        self.slots.iter().map(TaskSlot::summary).collect()
    }

    /// Findings committed by tasks that reached a terminal state themselves.
    pub fn committed_findings(&self) -> Vec<Finding> {
        self.slots.iter().flat_map(TaskSlot::findings).collect()
    }

    pub fn result(&self) -> Option<ScanResult> {
        self.result.lock().clone()
    }

    pub fn persist_error(&self) -> Option<StorageError> {
        self.persist_error.lock().clone()
    }

    /// Resolves once the job is terminal and its single persist attempt is
    /// done.
    pub async fn wait(&self) -> Option<ScanResult> {
        let mut settled = self.settled.subscribe();
        if settled.wait_for(|done| *done).await.is_err() {
            return None;
        }
        self.result()
    }

    pub(crate) fn mark_queued(&self) {
        self.status.send_if_modified(|status| {
            if *status == JobStatus::Created {
                *status = JobStatus::Queued;
                true
            } else {
                false
            }
        });
    }

    fn mark_running(&self) {
        self.status.send_if_modified(|status| {
            if status.is_terminal() {
                false
            } else {
                *status = JobStatus::Running;
                true
            }
        });
    }

    pub(crate) fn start_task(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(TaskSlot::start)
    }

    /// Commits a task's own terminal verdict. Returns `false` when the slot
    /// was already reaped or cancelled; the outcome is then discarded.
    pub(crate) fn commit(
        &self,
        index: usize,
        outcome: TaskOutcome,
        events: &ScanEventBus,
    ) -> bool {
        let Some(slot) = self.slots.get(index) else {
            return false;
        };
        let status = outcome.status;
        if !slot.finish(outcome) {
            return false;
        }
        self.record_terminal(slot, status, events);
        true
    }

    fn force_task(
        &self,
        index: usize,
        status: TaskStatus,
        error: Option<TaskError>,
        events: &ScanEventBus,
    ) -> bool {
        let Some(slot) = self.slots.get(index) else {
            return false;
        };
        if !slot.force(status, error) {
            return false;
        }
        self.record_terminal(slot, status, events);
        true
    }

    fn force_remaining(
        &self,
        status: TaskStatus,
        error: Option<TaskError>,
        events: &ScanEventBus,
    ) -> usize {
        (0..self.slots.len())
            .filter(|index| self.force_task(*index, status, error.clone(), events))
            .count()
    }

    fn record_terminal(&self, slot: &TaskSlot, status: TaskStatus, events: &ScanEventBus) {
        self.terminal_tasks.fetch_add(1, Ordering::SeqCst);
        self.progress.notify_waiters();
        events.publish(ScanEvent::TaskFinished {
            job_id: self.id,
            account_id: slot.target.account_id.clone(),
            region: slot.target.region.clone(),
            status,
        });
    }

    async fn all_tasks_terminal(&self) {
        loop {
            let notified = self.progress.notified();
            if self.terminal_tasks.load(Ordering::SeqCst) >= self.slots.len() {
                return;
            }
            notified.await;
        }
    }

    /// Runs every task under the per-job fan-out cap until they all finish,
    /// the deadline passes or the job is cancelled, then publishes the
    /// aggregated result. Persisting it is left to [`ScanJob::persist`].
    pub(crate) async fn run(self: Arc<Self>, ctx: ScanContext) -> ScanResult {
        let config = Arc::clone(&ctx.config);
        let deadline = Instant::now() + config.scan_timeout();
        self.mark_running();
        ctx.events.publish(ScanEvent::JobStarted {
            job_id: self.id,
            task_count: self.slots.len(),
        });
        info!(
            job_id = %self.id,
            tasks = self.slots.len(),
            requested_by = %self.requested_by,
            "scan job started"
        );

        let parallelism = config.task_parallelism.min(self.slots.len()).max(1);
        let permits = Arc::new(Semaphore::new(parallelism));
        let mut tasks = JoinSet::new();

        for (index, slot) in self.slots.iter().enumerate() {
            let span = info_span!(
                "scan_task",
                job_id = %self.id,
                account_id = %slot.target.account_id,
                region = %slot.target.region,
            );
            let job = Arc::clone(&self);
            let ctx = ctx.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(
                async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    let run = AssertUnwindSafe(task::run_task(&job, index, &ctx));
                    if let Err(payload) = run.catch_unwind().await {
                        let message = panic_message(payload);
                        warn!(error = %message, "scan task panicked");
                        job.force_task(
                            index,
                            TaskStatus::Failed,
                            Some(TaskError::new(TaskErrorKind::Internal, message)),
                            &ctx.events,
                        );
                    }
                }
                .instrument(span),
            );
        }

        let stop = tokio::select! {
            biased;
            _ = self.all_tasks_terminal() => None,
            _ = self.cancel.cancelled() => Some(StopReason::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Some(StopReason::Deadline),
        };

        match stop {
            None => while tasks.join_next().await.is_some() {},
            Some(StopReason::Deadline) => {
                self.deadline_fired.store(true, Ordering::SeqCst);
                self.cancel.cancel();
                let reaped = self.force_remaining(TaskStatus::TimedOut, None, &ctx.events);
                warn!(
                    job_id = %self.id,
                    reaped,
                    timeout_ms = config.scan_timeout_ms,
                    "scan deadline reached"
                );
                self.wind_down(tasks, config.deadline_policy, config.request_timeout())
                    .await;
            }
            Some(StopReason::Cancelled) => {
                let reaped = self.force_remaining(
                    TaskStatus::Failed,
                    Some(cancelled_error()),
                    &ctx.events,
                );
                info!(job_id = %self.id, reaped, "scan job cancelled");
                self.wind_down(tasks, DeadlinePolicy::Drain, config.request_timeout())
                    .await;
            }
        }

        self.conclude(&ctx)
    }

    /// Settles a job that never started running.
    pub(crate) async fn abandon(&self, ctx: &ScanContext) {
        self.cancel.cancel();
        let reaped =
            self.force_remaining(TaskStatus::Failed, Some(cancelled_error()), &ctx.events);
        debug!(job_id = %self.id, reaped, "queued scan job abandoned");
        let result = self.conclude(ctx);
        self.persist(&result, ctx).await;
    }

    async fn wind_down(
        &self,
        mut tasks: JoinSet<()>,
        policy: DeadlinePolicy,
        grace: Duration,
    ) {
        match policy {
            DeadlinePolicy::Detach => {
                debug!(job_id = %self.id, detached = tasks.len(), "detaching in-flight tasks");
                tasks.detach_all();
            }
            DeadlinePolicy::Drain => {
                let drained = tokio::time::timeout(grace, async {
                    while tasks.join_next().await.is_some() {}
                })
                .await;
                if drained.is_err() {
                    warn!(
                        job_id = %self.id,
                        remaining = tasks.len(),
                        grace_ms = grace.as_millis() as u64,
                        "aborting tasks that outlived the grace period"
                    );
                    tasks.abort_all();
                }
            }
        }
    }

    /// Aggregates the slots and makes the terminal status visible.
    fn conclude(&self, ctx: &ScanContext) -> ScanResult {
        let result = aggregator::aggregate(self);
        let status = result.overall_status;
        *self.result.lock() = Some(result.clone());
        self.status.send_replace(status);
        ctx.events.publish(ScanEvent::JobFinished {
            job_id: self.id,
            status,
        });
        info!(
            job_id = %self.id,
            status = %status,
            findings = result.findings.len(),
            "scan job finished"
        );
        result
    }

    /// Makes the single persist attempt for a concluded job, then wakes
    /// [`ScanJob::wait`].
    pub(crate) async fn persist(&self, result: &ScanResult, ctx: &ScanContext) {
        if let Err(err) =
            aggregator::persist(result, ctx.store.as_ref(), ctx.config.request_timeout())
                .await
        {
            warn!(job_id = %self.id, error = %err, "failed to persist scan result");
            ctx.events.publish(ScanEvent::PersistFailed {
                job_id: self.id,
                error: err.to_string(),
            });
            *self.persist_error.lock() = Some(err);
        }

        self.settled.send_replace(true);
    }
}

fn cancelled_error() -> TaskError {
    TaskError::new(TaskErrorKind::Cancelled, "scan job cancelled")
}
