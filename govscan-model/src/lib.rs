//! Core data model definitions shared across govscan crates.

pub use ::chrono;

pub mod account;
pub mod api;
pub mod credentials;
pub mod error;
pub mod finding;
pub mod ids;
pub mod resource;
pub mod result;
pub mod task;

// Intentionally curated re-exports for downstream consumers.
pub use account::Account;
pub use api::{JobStatusView, RejectReason, ScanRequest, SubmitResponse};
pub use credentials::Credentials;
pub use error::{ModelError, Result as ModelResult};
pub use finding::{Finding, Severity};
pub use ids::{AccountId, JobId, Region};
pub use resource::{Resource, ResourceKind};
pub use result::{JobStatus, ScanResult};
pub use task::{TaskError, TaskErrorKind, TaskStatus, TaskSummary};
