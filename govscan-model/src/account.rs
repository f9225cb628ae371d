use crate::ids::{AccountId, Region};

/// An AWS account registered for governance scanning.
///
/// `regions` may be empty, in which case the process default region is
/// scanned. `scanner_role_name` falls back to the process default role.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Account {
    pub account_id: AccountId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub regions: Vec<Region>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub scanner_role_name: Option<String>,
}

impl Account {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            regions: Vec::new(),
            scanner_role_name: None,
        }
    }

    pub fn with_regions<I>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = Region>,
    {
        self.regions = regions.into_iter().collect();
        self
    }

    pub fn with_role<S: Into<String>>(mut self, role: S) -> Self {
        self.scanner_role_name = Some(role.into());
        self
    }

    /// Role to assume for this account, preferring the account override.
    pub fn role_or<'a>(&'a self, default_role: &'a str) -> &'a str {
        self.scanner_role_name
            .as_deref()
            .filter(|role| !role.trim().is_empty())
            .unwrap_or(default_role)
    }
}
