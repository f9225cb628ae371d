use std::fmt;

use uuid::Uuid;

use crate::ids::{AccountId, Region};

/// Namespace for deterministic finding identifiers.
const FINDING_NAMESPACE: Uuid = Uuid::from_u128(0x5c1f_8e0a_2b4d_4c7e_9a61_d3f0_47b2_8e19);

/// Finding severity. `Error` is reserved for engine diagnostics raised when a
/// rule could not be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Finding {
    pub finding_id: Uuid,
    pub resource_id: String,
    pub account_id: AccountId,
    pub region: Region,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn new(
        resource_id: impl Into<String>,
        account_id: AccountId,
        region: Region,
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        let resource_id = resource_id.into();
        let rule_id = rule_id.into();
        Self {
            finding_id: Self::stable_id(&resource_id, &rule_id),
            resource_id,
            account_id,
            region,
            rule_id,
            severity,
            message: message.into(),
        }
    }

    /// Same resource and rule always map to the same id.
    pub fn stable_id(resource_id: &str, rule_id: &str) -> Uuid {
        let name = format!("{resource_id}\u{1f}{rule_id}");
        Uuid::new_v5(&FINDING_NAMESPACE, name.as_bytes())
    }

    pub fn is_diagnostic(&self) -> bool {
        self.severity == Severity::Error
    }
}
