use std::fmt;
use std::sync::Arc;

use crate::collector::InventoryCollector;
use crate::config::EngineConfig;
use crate::credentials::CredentialProvider;
use crate::rules::RuleSet;
use crate::storage::ScanStore;

use super::events::ScanEventBus;

/// Collaborators shared by the scheduler and every job it runs.
#[derive(Clone)]
pub struct ScanContext {
    pub config: Arc<EngineConfig>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub collector: Arc<InventoryCollector>,
    pub rules: Arc<RuleSet>,
    pub store: Arc<dyn ScanStore>,
    pub events: Arc<ScanEventBus>,
}

impl fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanContext")
            .field("config", &self.config)
            .field("collector", &self.collector)
            .field("rules", &self.rules)
            .field("events", &self.events)
            .finish()
    }
}
