use std::fmt;

use crate::ids::{AccountId, JobId, Region};
use crate::result::JobStatus;
use crate::task::TaskSummary;

/// Scan submission as received from the API layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanRequest {
    pub account_ids: Vec<AccountId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub regions: Vec<Region>,
    pub requested_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "reason", content = "detail"))]
pub enum RejectReason {
    QueueFull,
    UnknownAccount(AccountId),
    EmptyRequest,
    ShuttingDown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::QueueFull => f.write_str("scan queue is full"),
            RejectReason::UnknownAccount(id) => {
                write!(f, "account {id} is not registered")
            }
            RejectReason::EmptyRequest => {
                f.write_str("scan request names no accounts")
            }
            RejectReason::ShuttingDown => {
                f.write_str("scan engine is shutting down")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum SubmitResponse {
    Accepted { job_id: JobId, queued: bool },
    Rejected { reason: RejectReason },
}

impl SubmitResponse {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            SubmitResponse::Accepted { job_id, .. } => Some(*job_id),
            SubmitResponse::Rejected { .. } => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitResponse::Accepted { .. })
    }
}

/// Status polling payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobStatusView {
    pub job_id: JobId,
    pub overall_status: JobStatus,
    pub per_task_status: Vec<TaskSummary>,
}
