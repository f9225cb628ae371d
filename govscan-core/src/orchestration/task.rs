//! Per (account, region) pipeline: credentials, collection, evaluation,
//! commit.

use futures::{StreamExt, pin_mut};
use govscan_model::{Finding, TaskError, TaskErrorKind, TaskStatus};
use tracing::{debug, info, warn};

use crate::credentials::acquire_fresh;
use crate::error::CollectorFailure;
use crate::rules;

use super::context::ScanContext;
use super::job::{ScanJob, TaskOutcome, TaskTarget};

pub(crate) async fn run_task(job: &ScanJob, index: usize, ctx: &ScanContext) {
    if job.cancel_token().is_cancelled() || !job.start_task(index) {
        return;
    }
    let Some(slot) = job.slots().get(index) else {
        return;
    };

    let outcome = execute(job, slot.target(), ctx).await;
    let status = outcome.status;
    let findings = outcome.findings.len();
    let resources = outcome.resources_scanned;

    if job.commit(index, outcome, &ctx.events) {
        info!(status = %status, resources, findings, "scan task finished");
    } else {
        debug!(
            status = %status,
            current = %slot.status(),
            "discarding outcome of a task that was already settled"
        );
    }
}

async fn execute(
    job: &ScanJob,
    target: &TaskTarget,
    ctx: &ScanContext,
) -> TaskOutcome {
    let cancel = job.cancel_token();

    let acquired = tokio::time::timeout(
        ctx.config.request_timeout(),
        acquire_fresh(
            ctx.credentials.as_ref(),
            &target.account_id,
            &target.role_name,
            &target.region,
        ),
    )
    .await;
    let credentials = match acquired {
        Ok(Ok(credentials)) => credentials,
        Ok(Err(err)) => {
            warn!(role = %target.role_name, error = %err, "credential acquisition failed");
            return failed(TaskError::new(TaskErrorKind::Auth, err.to_string()), Vec::new(), 0);
        }
        Err(_) => {
            warn!(role = %target.role_name, "credential acquisition timed out");
            return failed(
                TaskError::new(TaskErrorKind::Auth, "credential acquisition timed out"),
                Vec::new(),
                0,
            );
        }
    };

    let mut findings = Vec::new();
    let mut scanned = 0usize;
    let resources =
        ctx.collector
            .collect(&target.account_id, &target.region, &credentials, cancel);
    pin_mut!(resources);

    while let Some(item) = resources.next().await {
        match item {
            Ok(resource) => {
                if cancel.is_cancelled() {
                    break;
                }
                findings.extend(rules::evaluate(&resource, &ctx.rules));
                scanned += 1;
            }
            Err(error) => {
                let failure = CollectorFailure {
                    error,
                    resources_yielded: scanned,
                };
                return failed(
                    TaskError::new(TaskErrorKind::Collector, failure.to_string()),
                    findings,
                    scanned,
                );
            }
        }
    }

    if cancel.is_cancelled() {
        return failed(
            TaskError::new(TaskErrorKind::Cancelled, "task stopped by cancellation"),
            findings,
            scanned,
        );
    }

    TaskOutcome {
        status: TaskStatus::Succeeded,
        error: None,
        findings,
        resources_scanned: scanned,
    }
}

fn failed(
    error: TaskError,
    findings: Vec<Finding>,
    resources_scanned: usize,
) -> TaskOutcome {
    TaskOutcome {
        status: TaskStatus::Failed,
        error: Some(error),
        findings,
        resources_scanned,
    }
}
