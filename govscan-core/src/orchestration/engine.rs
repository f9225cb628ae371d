use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use govscan_model::{
    JobId, JobStatusView, Region, RejectReason, ScanRequest, ScanResult,
    SubmitResponse,
};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::collector::{InventoryCollector, InventorySource};
use crate::config::EngineConfig;
use crate::credentials::CredentialProvider;
use crate::error::{Result, StorageError};
use crate::rules::RuleSet;
use crate::storage::ScanStore;

use super::aggregator::aggregate;
use super::context::ScanContext;
use super::events::{ScanEvent, ScanEventBus};
use super::job::{ScanJob, TaskTarget};
use super::scheduler::{Admission, ScanScheduler};

/// External collaborators the engine is wired to.
pub struct EngineParts {
    pub credentials: Arc<dyn CredentialProvider>,
    pub inventory: Arc<dyn InventorySource>,
    pub store: Arc<dyn ScanStore>,
    pub rules: RuleSet,
}

impl fmt::Debug for EngineParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineParts")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct JobRegistry {
    jobs: HashMap<JobId, Arc<ScanJob>>,
    order: VecDeque<JobId>,
}

/// Entry point consumed by the API layer.
pub struct ScanEngine {
    ctx: ScanContext,
    scheduler: Arc<ScanScheduler>,
    registry: RwLock<JobRegistry>,
}

impl fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanEngine")
            .field("scheduler", &self.scheduler)
            .field("jobs", &self.registry.read().jobs.len())
            .finish()
    }
}

impl ScanEngine {
    /// Validates `config` and wires the engine.
    pub fn new(config: EngineConfig, parts: EngineParts) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let ctx = ScanContext {
            collector: Arc::new(InventoryCollector::new(parts.inventory, &config)),
            credentials: parts.credentials,
            rules: Arc::new(parts.rules),
            store: parts.store,
            events: Arc::new(ScanEventBus::new(config.event_channel_capacity)),
            config,
        };
        let scheduler = ScanScheduler::new(ctx.clone());
        Ok(Self {
            ctx,
            scheduler,
            registry: RwLock::new(JobRegistry::default()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Validates and admits a scan request.
    ///
    /// Storage failures other than an unknown account are returned as
    /// errors; every admission outcome is a [`SubmitResponse`].
    pub async fn submit(&self, request: ScanRequest) -> Result<SubmitResponse> {
        if request.account_ids.is_empty() {
            return Ok(rejected(RejectReason::EmptyRequest));
        }
        if !self.scheduler.is_accepting() {
            return Ok(rejected(RejectReason::ShuttingDown));
        }

        let mut targets = Vec::new();
        for account_id in distinct(&request.account_ids) {
            let account = match self.ctx.store.load_account(account_id).await {
                Ok(account) => account,
                Err(StorageError::NotFound(id)) => {
                    debug!(account_id = %id, "scan request names unknown account");
                    return Ok(rejected(RejectReason::UnknownAccount(id)));
                }
                Err(err) => return Err(err.into()),
            };

            let regions = self.resolve_regions(&request.regions, &account.regions);
            let role = account.role_or(&self.ctx.config.aws_scanner_role_name);
            targets.extend(
                regions
                    .into_iter()
                    .map(|region| TaskTarget::new(account.account_id.clone(), region, role)),
            );
        }

        let job = Arc::new(ScanJob::new(JobId::new(), request.requested_by, targets));
        let job_id = job.id();

        let response = match self.scheduler.submit(Arc::clone(&job)) {
            Admission::Started => SubmitResponse::Accepted {
                job_id,
                queued: false,
            },
            Admission::Queued { .. } => SubmitResponse::Accepted {
                job_id,
                queued: true,
            },
            Admission::Rejected(reason) => return Ok(rejected(reason)),
        };
        self.register(job);
        info!(job_id = %job_id, response = ?response, "scan request admitted");
        Ok(response)
    }

    pub fn job_status(&self, job_id: JobId) -> Option<JobStatusView> {
        self.job(job_id).map(|job| job.status_view())
    }

    /// Result of a terminal job, or `None` while it is still in flight.
    pub fn result(&self, job_id: JobId) -> Option<ScanResult> {
        self.job(job_id).and_then(|job| job.result())
    }

    /// Aggregates whatever the job has committed so far. While the job is
    /// in flight the overall status is its lifecycle status, never a
    /// classification.
    pub fn snapshot(&self, job_id: JobId) -> Option<ScanResult> {
        let job = self.job(job_id)?;
        let status = job.status();
        let mut snapshot = aggregate(&job);
        if !status.is_terminal() {
            snapshot.overall_status = status;
        }
        Some(snapshot)
    }

    /// Waits for the job to settle and returns its result.
    pub async fn wait(&self, job_id: JobId) -> Option<ScanResult> {
        let job = self.job(job_id)?;
        job.wait().await
    }

    /// Error from the job's single persist attempt, if it failed.
    pub fn persist_error(&self, job_id: JobId) -> Option<StorageError> {
        self.job(job_id).and_then(|job| job.persist_error())
    }

    /// Requests cancellation. Returns `false` for unknown or finished jobs.
    pub async fn cancel(&self, job_id: JobId) -> bool {
        match self.job(job_id) {
            Some(job) if !job.is_terminal() => self.scheduler.cancel(job_id).await,
            _ => false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.ctx.events.subscribe()
    }

    pub fn running_jobs(&self) -> usize {
        self.scheduler.running_count()
    }

    pub fn queued_jobs(&self) -> usize {
        self.scheduler.queued_count()
    }

    /// Stops admissions, cancels in-flight jobs and waits until every
    /// registered job has made its persist attempt.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        let jobs: Vec<_> = self.registry.read().jobs.values().cloned().collect();
        for job in jobs {
            job.wait().await;
        }
    }

    fn job(&self, job_id: JobId) -> Option<Arc<ScanJob>> {
        self.registry.read().jobs.get(&job_id).cloned()
    }

    /// Request regions win, then the account's own regions, then the
    /// process default.
    fn resolve_regions(&self, requested: &[Region], account: &[Region]) -> Vec<Region> {
        let chosen = if !requested.is_empty() {
            requested
        } else if !account.is_empty() {
            account
        } else {
            std::slice::from_ref(&self.ctx.config.aws_region)
        };
        distinct(chosen).cloned().collect()
    }

    /// Registers a job and evicts the oldest settled jobs past the retention
    /// limit.
    fn register(&self, job: Arc<ScanJob>) {
        let retain = self.ctx.config.retain_finished_jobs;
        let mut registry = self.registry.write();
        let JobRegistry { jobs, order } = &mut *registry;
        order.push_back(job.id());
        jobs.insert(job.id(), job);

        let finished = jobs.values().filter(|job| job.is_terminal()).count();
        let mut excess = finished.saturating_sub(retain);
        if excess == 0 {
            return;
        }
        let evicted = excess;
        order.retain(|id| {
            if excess == 0 {
                return true;
            }
            match jobs.get(id) {
                Some(job) if job.is_terminal() => {
                    jobs.remove(id);
                    excess -= 1;
                    false
                }
                _ => true,
            }
        });
        debug!(evicted, "evicted finished scan jobs");
    }
}

fn rejected(reason: RejectReason) -> SubmitResponse {
    SubmitResponse::Rejected { reason }
}

/// Items in first-seen order with duplicates removed.
fn distinct<T: PartialEq>(items: &[T]) -> impl Iterator<Item = &T> {
    items
        .iter()
        .enumerate()
        .filter(move |(index, item)| !items[..*index].contains(item))
        .map(|(_, item)| item)
}
