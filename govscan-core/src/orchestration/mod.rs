//! Scan job orchestration: admission, per-job fan-out, deadlines and result
//! aggregation.

pub mod aggregator;
pub mod context;
pub mod engine;
pub mod events;
pub mod job;
pub mod scheduler;
mod task;

pub use aggregator::{aggregate, classify};
pub use context::ScanContext;
pub use engine::{EngineParts, ScanEngine};
pub use events::{ScanEvent, ScanEventBus};
pub use job::{ScanJob, TaskSlot, TaskTarget};
pub use scheduler::{Admission, ScanScheduler};
