#![allow(dead_code)]

use std::sync::Arc;

use govscan_core::{
    EngineConfig, EngineParts, InMemoryStore, RetryConfig, RuleSet, ScanEngine,
    StaticCredentialProvider, StaticInventory,
};
use govscan_model::{
    Account, AccountId, JobId, Region, Resource, ResourceKind, ScanRequest,
    ScanResult, SubmitResponse,
};
use serde_json::json;

pub struct Harness {
    pub engine: ScanEngine,
    pub store: Arc<InMemoryStore>,
    pub inventory: Arc<StaticInventory>,
}

impl Harness {
    pub fn new(
        config: EngineConfig,
        accounts: Vec<Account>,
        inventory: StaticInventory,
        credentials: StaticCredentialProvider,
    ) -> Self {
        let store = Arc::new(InMemoryStore::with_accounts(accounts));
        let inventory = Arc::new(inventory);
        let engine = ScanEngine::new(
            config,
            EngineParts {
                credentials: Arc::new(credentials),
                inventory: inventory.clone(),
                store: store.clone(),
                rules: RuleSet::baseline(),
            },
        )
        .expect("engine config should be valid");
        Self {
            engine,
            store,
            inventory,
        }
    }

    pub async fn submit(&self, accounts: &[AccountId], regions: &[Region]) -> SubmitResponse {
        self.engine
            .submit(request(accounts, regions))
            .await
            .expect("submit should not hit storage errors")
    }

    pub async fn submit_accepted(&self, accounts: &[AccountId], regions: &[Region]) -> JobId {
        self.submit(accounts, regions)
            .await
            .job_id()
            .expect("scan should be accepted")
    }

    pub async fn run(&self, accounts: &[AccountId], regions: &[Region]) -> ScanResult {
        let job_id = self.submit_accepted(accounts, regions).await;
        self.engine
            .wait(job_id)
            .await
            .expect("job should settle with a result")
    }
}

pub fn account_id(raw: &str) -> AccountId {
    raw.parse().expect("valid account id")
}

pub fn region(raw: &str) -> Region {
    raw.parse().expect("valid region")
}

pub fn request(accounts: &[AccountId], regions: &[Region]) -> ScanRequest {
    ScanRequest {
        account_ids: accounts.to_vec(),
        regions: regions.to_vec(),
        requested_by: "auditor@example.com".into(),
    }
}

/// Fast, deterministic settings: no jitter, short backoff, generous deadline.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        scan_timeout_ms: 60_000,
        request_timeout_ms: 1_000,
        retry: RetryConfig {
            max_attempts_per_page: 3,
            backoff_base_ms: 10,
            backoff_max_ms: 100,
            jitter_ratio: 0.0,
        },
        ..EngineConfig::default()
    }
}

/// Endpoint that satisfies every baseline rule.
pub fn compliant_endpoint(account: &AccountId, region: &Region, name: &str) -> Resource {
    endpoint(account, region, name)
        .with_attribute("kms_key_id", json!("arn:aws:kms:key/1"))
        .with_attribute("tags", json!({ "owner": "ml-platform" }))
}

/// Endpoint missing encryption and an owner tag: two baseline findings.
pub fn noncompliant_endpoint(account: &AccountId, region: &Region, name: &str) -> Resource {
    endpoint(account, region, name)
}

fn endpoint(account: &AccountId, region: &Region, name: &str) -> Resource {
    Resource::new(
        format!("arn:aws:sagemaker:{region}:{account}:endpoint/{name}"),
        ResourceKind::SageMakerEndpoint,
        account.clone(),
        region.clone(),
    )
}
