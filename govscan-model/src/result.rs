use std::fmt;

use chrono::{DateTime, Utc};

use crate::finding::Finding;
use crate::ids::JobId;
use crate::task::TaskSummary;

/// Overall job status. The last four variants are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum JobStatus {
    Created,
    Queued,
    Running,
    Completed,
    PartiallyCompleted,
    TimedOut,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::PartiallyCompleted
                | JobStatus::TimedOut
                | JobStatus::Failed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::PartiallyCompleted => "partially_completed",
            JobStatus::TimedOut => "timed_out",
            JobStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Final, aggregated outcome of one scan job.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanResult {
    pub job_id: JobId,
    pub requested_by: String,
    pub overall_status: JobStatus,
    pub findings: Vec<Finding>,
    pub task_summaries: Vec<TaskSummary>,
    pub generated_at: DateTime<Utc>,
}

impl ScanResult {
    /// Compares everything except the generation timestamp.
    pub fn same_content(&self, other: &ScanResult) -> bool {
        self.job_id == other.job_id
            && self.requested_by == other.requested_by
            && self.overall_status == other.overall_status
            && self.findings == other.findings
            && self.task_summaries == other.task_summaries
    }

    pub fn findings_for<'a>(
        &'a self,
        account_id: &'a crate::ids::AccountId,
    ) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings
            .iter()
            .filter(move |finding| &finding.account_id == account_id)
    }
}
