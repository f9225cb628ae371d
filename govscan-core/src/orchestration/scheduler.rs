use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use govscan_model::{JobId, RejectReason};
use parking_lot::Mutex;
use tracing::{Instrument, debug, info, info_span};

use crate::config::AdmissionPolicy;

use super::context::ScanContext;
use super::events::ScanEvent;
use super::job::ScanJob;

/// Admission decision for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Started,
    Queued { position: usize },
    Rejected(RejectReason),
}

struct SchedulerState {
    accepting: bool,
    running: HashMap<JobId, Arc<ScanJob>>,
    queue: VecDeque<Arc<ScanJob>>,
}

impl fmt::Debug for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerState")
            .field("accepting", &self.accepting)
            .field("running", &self.running.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// Admits jobs under the global running-job cap and starts queued jobs in
/// FIFO order as slots free up. Admission count and queue share one lock.
pub struct ScanScheduler {
    ctx: ScanContext,
    state: Mutex<SchedulerState>,
}

impl fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.try_lock();
        f.debug_struct("ScanScheduler")
            .field("max_concurrent_scans", &self.ctx.config.max_concurrent_scans)
            .field("admission", &self.ctx.config.admission)
            .field("state", &state.as_deref())
            .finish()
    }
}

impl ScanScheduler {
    pub fn new(ctx: ScanContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            state: Mutex::new(SchedulerState {
                accepting: true,
                running: HashMap::new(),
                queue: VecDeque::new(),
            }),
        })
    }

    pub fn submit(self: &Arc<Self>, job: Arc<ScanJob>) -> Admission {
        let config = &self.ctx.config;
        let mut state = self.state.lock();

        if !state.accepting {
            return Admission::Rejected(RejectReason::ShuttingDown);
        }

        if state.running.len() < config.max_concurrent_scans {
            state.running.insert(job.id(), Arc::clone(&job));
            drop(state);
            self.launch(job);
            return Admission::Started;
        }

        let queue_open = config.admission.policy == AdmissionPolicy::Queue
            && state.queue.len() < config.admission.max_queued_scans;
        if !queue_open {
            debug!(
                job_id = %job.id(),
                running = state.running.len(),
                queued = state.queue.len(),
                "scan job rejected"
            );
            return Admission::Rejected(RejectReason::QueueFull);
        }

        job.mark_queued();
        state.queue.push_back(Arc::clone(&job));
        let position = state.queue.len();
        drop(state);

        self.ctx.events.publish(ScanEvent::JobQueued {
            job_id: job.id(),
            position,
        });
        info!(job_id = %job.id(), position, "scan job queued");
        Admission::Queued { position }
    }

    /// Cancels a queued or running job. Queued jobs settle immediately;
    /// running jobs observe their token.
    pub async fn cancel(&self, job_id: JobId) -> bool {
        let (queued, running) = {
            let mut state = self.state.lock();
            let position = state.queue.iter().position(|job| job.id() == job_id);
            let queued = position.and_then(|index| state.queue.remove(index));
            let running = state.running.get(&job_id).cloned();
            (queued, running)
        };

        if let Some(job) = queued {
            job.abandon(&self.ctx).await;
            return true;
        }
        if let Some(job) = running {
            job.cancel_token().cancel();
            return true;
        }
        false
    }

    /// Stops admissions, cancels everything in flight and waits until every
    /// job has settled.
    pub async fn shutdown(&self) {
        let (queued, running) = {
            let mut state = self.state.lock();
            state.accepting = false;
            let queued: Vec<_> = state.queue.drain(..).collect();
            let running: Vec<_> = state.running.values().cloned().collect();
            (queued, running)
        };
        info!(
            queued = queued.len(),
            running = running.len(),
            "shutting down scan scheduler"
        );

        for job in &running {
            job.cancel_token().cancel();
        }
        for job in queued {
            job.abandon(&self.ctx).await;
        }
        for job in running {
            job.wait().await;
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.state.lock().accepting
    }

    pub fn running_count(&self) -> usize {
        self.state.lock().running.len()
    }

    pub fn queued_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn launch(self: &Arc<Self>, job: Arc<ScanJob>) {
        let scheduler = Arc::clone(self);
        let ctx = self.ctx.clone();
        let span = info_span!("scan_job", job_id = %job.id());
        tokio::spawn(
            async move {
                let job_id = job.id();
                let result = Arc::clone(&job).run(ctx.clone()).await;
                scheduler.release(job_id);
                job.persist(&result, &ctx).await;
            }
            .instrument(span),
        );
    }

    /// Frees the slot held by `job_id` and starts the next queued job.
    fn release(self: &Arc<Self>, job_id: JobId) {
        let next = {
            let mut state = self.state.lock();
            state.running.remove(&job_id);
            if !state.accepting {
                return;
            }
            let next = state.queue.pop_front();
            if let Some(job) = &next {
                state.running.insert(job.id(), Arc::clone(job));
            }
            next
        };

        if let Some(job) = next {
            debug!(job_id = %job.id(), "starting queued scan job");
            self.launch(job);
        }
    }
}
