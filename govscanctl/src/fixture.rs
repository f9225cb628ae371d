//! JSON inventory fixtures for offline scans.
//!
//! A fixture lists the registered accounts, every resource the inventory
//! should return, which accounts refuse credentials and optional listing
//! faults. Resources are grouped per (account, region, kind) and served in
//! pages of `page_size`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use govscan_core::{
    AttributeRule, AuthError, CollectorError, EngineParts, InMemoryStore, PageSpec,
    RuleSet, StaticCredentialProvider, StaticInventory,
};
use govscan_model::{Account, AccountId, Region, Resource, ResourceKind};
use serde::Deserialize;

const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub credential_denials: Vec<CredentialDenial>,
    #[serde(default)]
    pub faults: Vec<ListingFault>,
    /// Replaces the built-in baseline when present.
    #[serde(default)]
    pub rules: Option<Vec<AttributeRule>>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    AccessDenied,
    RoleNotFound,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialDenial {
    pub account_id: AccountId,
    pub reason: DenialReason,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    AccessDenied,
    MalformedResponse,
    Throttled,
    Network,
}

/// Error returned after the listed pages of one (account, region, kind).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListingFault {
    pub account_id: AccountId,
    pub region: Region,
    pub kind: ResourceKind,
    pub error: FaultKind,
    #[serde(default)]
    pub message: Option<String>,
}

impl ListingFault {
    fn collector_error(&self) -> CollectorError {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| format!("{:?} listing {}", self.error, self.kind));
        match self.error {
            FaultKind::AccessDenied => CollectorError::access_denied(message),
            FaultKind::MalformedResponse => CollectorError::malformed(message),
            FaultKind::Throttled => CollectorError::throttled(message),
            FaultKind::Network => CollectorError::network(message),
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

type InventoryKey = (AccountId, Region, ResourceKind);

impl Fixture {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("failed to parse fixture {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn account_ids(&self) -> Vec<AccountId> {
        self.accounts
            .iter()
            .map(|account| account.account_id.clone())
            .collect()
    }

    /// Builds in-memory collaborators serving this fixture. `default_role`
    /// names the role in denial errors for accounts without an override.
    pub fn into_parts(self, default_role: &str) -> Result<(EngineParts, Arc<InMemoryStore>)> {
        let Fixture {
            accounts,
            resources,
            page_size,
            credential_denials,
            faults,
            rules,
        } = self;

        let mut credentials = StaticCredentialProvider::new();
        for denial in credential_denials {
            let role = accounts
                .iter()
                .find(|account| account.account_id == denial.account_id)
                .map(|account| account.role_or(default_role).to_string())
                .unwrap_or_else(|| default_role.to_string());
            let error = match denial.reason {
                DenialReason::AccessDenied => AuthError::AccessDenied {
                    account_id: denial.account_id.clone(),
                    role,
                },
                DenialReason::RoleNotFound => AuthError::RoleNotFound {
                    account_id: denial.account_id.clone(),
                    role,
                },
            };
            credentials = credentials.deny(denial.account_id, error);
        }

        let mut grouped: BTreeMap<InventoryKey, Vec<Resource>> = BTreeMap::new();
        for resource in resources {
            grouped
                .entry((
                    resource.account_id.clone(),
                    resource.region.clone(),
                    resource.kind,
                ))
                .or_default()
                .push(resource);
        }

        let mut pages: BTreeMap<InventoryKey, Vec<PageSpec>> = grouped
            .into_iter()
            .map(|(key, resources)| {
                let specs = resources
                    .chunks(page_size.max(1))
                    .map(|chunk| PageSpec::ok(chunk.to_vec()))
                    .collect();
                (key, specs)
            })
            .collect();
        for fault in faults {
            let error = fault.collector_error();
            pages
                .entry((fault.account_id, fault.region, fault.kind))
                .or_default()
                .push(PageSpec::fail(error));
        }

        let inventory = pages
            .into_iter()
            .fold(StaticInventory::new(), |inventory, ((account, region, kind), specs)| {
                inventory.with_pages(account, region, kind, specs)
            });

        let rules = match rules {
            Some(rules) => RuleSet::from_attribute_rules("fixture", rules)
                .context("fixture rule set is invalid")?,
            None => RuleSet::baseline(),
        };

        let store = Arc::new(InMemoryStore::with_accounts(accounts));
        let parts = EngineParts {
            credentials: Arc::new(credentials),
            inventory: Arc::new(inventory),
            store: store.clone(),
            rules,
        };
        Ok((parts, store))
    }
}
