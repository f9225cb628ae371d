//! # govscan core
//!
//! Governance scan orchestration for AI/ML resources spread across AWS
//! accounts. The engine discovers resources, evaluates them against a rule
//! set and records findings while bounding concurrency and enforcing a
//! per-scan deadline.
//!
//! ## Architecture
//!
//! - [`credentials`]: credential acquisition port
//! - [`collector`]: paginated, retrying inventory discovery
//! - [`rules`]: pure rule evaluation with contained failures
//! - [`orchestration`]: scheduler, scan jobs, aggregation and the
//!   [`ScanEngine`] facade
//! - [`storage`]: persistence port
//!
//! Every external collaborator sits behind a trait so tests and the CLI run
//! against in-memory implementations.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use govscan_core::{
//!     EngineConfig, EngineParts, InMemoryStore, RuleSet, ScanEngine,
//!     StaticCredentialProvider, StaticInventory,
//! };
//! use govscan_model::{Account, ScanRequest};
//!
//! async fn scan_one() -> govscan_core::Result<()> {
//!     let account = Account::new("123456789012".parse().unwrap());
//!     let engine = ScanEngine::new(
//!         EngineConfig::default(),
//!         EngineParts {
//!             credentials: Arc::new(StaticCredentialProvider::new()),
//!             inventory: Arc::new(StaticInventory::new()),
//!             store: Arc::new(InMemoryStore::with_accounts([account.clone()])),
//!             rules: RuleSet::baseline(),
//!         },
//!     )?;
//!
//!     let response = engine
//!         .submit(ScanRequest {
//!             account_ids: vec![account.account_id],
//!             regions: Vec::new(),
//!             requested_by: "auditor".into(),
//!         })
//!         .await?;
//!     if let Some(job_id) = response.job_id() {
//!         let _result = engine.wait(job_id).await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod credentials;
pub mod error;
pub mod orchestration;
pub mod rules;
pub mod storage;

pub use collector::{
    InventoryCollector, InventorySource, Page, PageRequest, PageSpec, StaticInventory,
};
pub use config::{
    AdmissionConfig, AdmissionPolicy, DeadlinePolicy, EngineConfig, InvalidConfig,
    RetryConfig,
};
pub use credentials::{CredentialProvider, StaticCredentialProvider};
pub use error::{
    AuthError, CollectorError, CollectorFailure, PermanentKind, Result, RuleError,
    ScanError, StorageError, TransientKind,
};
pub use orchestration::{
    EngineParts, ScanEngine, ScanEvent, ScanEventBus, ScanJob, TaskTarget,
};
pub use rules::{AttributeRule, Expectation, Rule, RuleSet, Violation};
pub use storage::{InMemoryStore, ScanStore};
