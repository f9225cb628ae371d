use std::cmp::Ordering;
use std::time::Duration;

use chrono::Utc;
use govscan_model::{Finding, JobStatus, ScanResult, TaskStatus, TaskSummary};

use crate::error::StorageError;
use crate::storage::ScanStore;

use super::job::ScanJob;

/// Builds the job's result from its task slots. Calling it again yields the
/// same content; only `generated_at` moves.
pub fn aggregate(job: &ScanJob) -> ScanResult {
    let task_summaries = job.task_summaries();
    let mut findings = job.committed_findings();
    findings.sort_by(compare_findings);

    ScanResult {
        job_id: job.id(),
        requested_by: job.requested_by().to_string(),
        overall_status: classify(job.deadline_fired(), &task_summaries),
        findings,
        task_summaries,
        generated_at: Utc::now(),
    }
}

/// Overall status for a set of task outcomes.
///
/// A fired deadline that left tasks unfinished wins; otherwise the outcome
/// depends on how many tasks succeeded. A job with no tasks is `Failed`.
pub fn classify(deadline_fired: bool, tasks: &[TaskSummary]) -> JobStatus {
    let unfinished = tasks
        .iter()
        .any(|task| task.status == TaskStatus::TimedOut || !task.status.is_terminal());
    if deadline_fired && unfinished {
        return JobStatus::TimedOut;
    }

    let succeeded = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Succeeded)
        .count();
    match succeeded {
        0 => JobStatus::Failed,
        n if n == tasks.len() => JobStatus::Completed,
        _ => JobStatus::PartiallyCompleted,
    }
}

/// Severity descending, then account, region, resource and rule.
pub fn compare_findings(a: &Finding, b: &Finding) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| a.account_id.cmp(&b.account_id))
        .then_with(|| a.region.cmp(&b.region))
        .then_with(|| a.resource_id.cmp(&b.resource_id))
        .then_with(|| a.rule_id.cmp(&b.rule_id))
}

/// Single persistence attempt, bounded by `timeout`.
pub async fn persist(
    result: &ScanResult,
    store: &dyn ScanStore,
    timeout: Duration,
) -> Result<(), StorageError> {
    match tokio::time::timeout(timeout, store.persist(result)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(StorageError::Unavailable(format!(
            "persist did not complete within {timeout:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govscan_model::{AccountId, Region, Severity};

    fn summary(status: TaskStatus) -> TaskSummary {
        TaskSummary {
            account_id: "123456789012".parse().unwrap(),
            region: Region::default(),
            status,
            started_at: None,
            finished_at: None,
            error: None,
            resources_scanned: 0,
            finding_count: 0,
        }
    }

    fn summaries(succeeded: usize, failed: usize) -> Vec<TaskSummary> {
        std::iter::repeat_n(TaskStatus::Succeeded, succeeded)
            .chain(std::iter::repeat_n(TaskStatus::Failed, failed))
            .map(summary)
            .collect()
    }

    #[test]
    fn classification_table() {
        let cases = [
            (0, 0, JobStatus::Failed),
            (3, 0, JobStatus::Completed),
            (2, 1, JobStatus::PartiallyCompleted),
            (1, 4, JobStatus::PartiallyCompleted),
            (0, 2, JobStatus::Failed),
        ];
        for (ok, failed, expected) in cases {
            assert_eq!(
                classify(false, &summaries(ok, failed)),
                expected,
                "{ok} succeeded / {failed} failed"
            );
        }
    }

    #[test]
    fn fired_deadline_with_reaped_tasks_times_out() {
        let mut tasks = summaries(3, 0);
        tasks.push(summary(TaskStatus::TimedOut));
        assert_eq!(classify(true, &tasks), JobStatus::TimedOut);
        assert_eq!(classify(false, &tasks), JobStatus::PartiallyCompleted);
    }

    #[test]
    fn fired_deadline_after_everything_finished_classifies_normally() {
        assert_eq!(classify(true, &summaries(2, 0)), JobStatus::Completed);
    }

    #[test]
    fn findings_sort_by_severity_then_location() {
        let account: AccountId = "123456789012".parse().unwrap();
        let east: Region = "us-east-1".parse().unwrap();
        let west: Region = "us-west-2".parse().unwrap();
        let mut findings = vec![
            Finding::new("b", account.clone(), east.clone(), "r1", Severity::Low, "m"),
            Finding::new("a", account.clone(), west.clone(), "r1", Severity::High, "m"),
            Finding::new("a", account.clone(), east.clone(), "r2", Severity::High, "m"),
            Finding::new("a", account.clone(), east.clone(), "r1", Severity::High, "m"),
        ];
        findings.sort_by(compare_findings);

        let order: Vec<_> = findings
            .iter()
            .map(|f| (f.region.as_str(), f.resource_id.as_str(), f.rule_id.as_str()))
            .collect();
        assert_eq!(
            order,
            [
                ("us-east-1", "a", "r1"),
                ("us-east-1", "a", "r2"),
                ("us-west-2", "a", "r1"),
                ("us-east-1", "b", "r1"),
            ]
        );
    }
}
