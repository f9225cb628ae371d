//! Compliance rule harness.
//!
//! Evaluation is synchronous and pure: the same resource and rule-set
//! version always produce the same findings, in rule id order. A rule that
//! fails on a resource never aborts evaluation of the others.

pub mod attribute;

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use govscan_model::{Finding, Resource, ResourceKind, Severity};
use serde_json::json;
use tracing::warn;

pub use attribute::{AttributeRule, Expectation};

use crate::error::{RuleError, ScanError};

/// Outcome of a rule that found the resource non-compliant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub severity: Severity,
    pub message: String,
}

impl Violation {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

pub trait Rule: Send + Sync {
    fn id(&self) -> &str;

    fn applies_to(&self, kind: ResourceKind) -> bool;

    fn check(&self, resource: &Resource) -> Result<Option<Violation>, RuleError>;
}

/// Versioned, immutable collection of rules with unique ids.
#[derive(Clone)]
pub struct RuleSet {
    version: String,
    rules: Vec<Arc<dyn Rule>>,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.rules.iter().map(|rule| rule.id()).collect();
        f.debug_struct("RuleSet")
            .field("version", &self.version)
            .field("rules", &ids)
            .finish()
    }
}

impl RuleSet {
    pub fn new(
        version: impl Into<String>,
        rules: Vec<Arc<dyn Rule>>,
    ) -> Result<Self, ScanError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if rule.id().trim().is_empty() {
                return Err(ScanError::InvalidRuleSet("rule id must not be empty".into()));
            }
            if !seen.insert(rule.id().to_string()) {
                return Err(ScanError::InvalidRuleSet(format!(
                    "duplicate rule id {}",
                    rule.id()
                )));
            }
        }

        let mut rules = rules;
        rules.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(Self {
            version: version.into(),
            rules,
        })
    }

    pub fn from_attribute_rules(
        version: impl Into<String>,
        rules: Vec<AttributeRule>,
    ) -> Result<Self, ScanError> {
        let rules = rules
            .into_iter()
            .map(|rule| Arc::new(rule) as Arc<dyn Rule>)
            .collect();
        Self::new(version, rules)
    }

    /// Small built-in rule set covering each resource family.
    pub fn baseline() -> Self {
        use ResourceKind::*;

        let rules = vec![
            AttributeRule::new(
                "bedrock-agent-guardrail",
                [BedrockAgent],
                "guardrail_id",
                Expectation::Present,
                Severity::High,
                "agent has no guardrail attached",
            ),
            AttributeRule::new(
                "bedrock-custom-model-kms",
                [BedrockCustomModel],
                "kms_key_arn",
                Expectation::Present,
                Severity::Medium,
                "custom model is not encrypted with a customer managed key",
            ),
            AttributeRule::new(
                "data-bucket-public-access-block",
                [S3DataBucket],
                "public_access_block.block_public_acls",
                Expectation::IsTrue,
                Severity::Critical,
                "training data bucket does not block public ACLs",
            ),
            AttributeRule::new(
                "resource-owner-tag",
                ResourceKind::ALL,
                "tags.owner",
                Expectation::Present,
                Severity::Low,
                "resource has no owner tag",
            ),
            AttributeRule::new(
                "sagemaker-endpoint-kms",
                [SageMakerEndpoint],
                "kms_key_id",
                Expectation::Present,
                Severity::High,
                "endpoint storage is not encrypted with a customer managed key",
            ),
            AttributeRule::new(
                "sagemaker-model-network-isolation",
                [SageMakerModel, SageMakerTrainingJob],
                "enable_network_isolation",
                Expectation::IsTrue,
                Severity::Medium,
                "network isolation is disabled",
            ),
            AttributeRule::new(
                "sagemaker-notebook-no-internet",
                [SageMakerNotebook],
                "direct_internet_access",
                Expectation::Equals(json!("Disabled")),
                Severity::High,
                "notebook instance has direct internet access",
            ),
            AttributeRule::new(
                "sagemaker-notebook-root-access",
                [SageMakerNotebook],
                "root_access",
                Expectation::Equals(json!("Disabled")),
                Severity::Medium,
                "notebook instance grants root access",
            ),
        ];

        // Literal ids above are unique and already in order.
        Self {
            version: "baseline-1".to_string(),
            rules: rules
                .into_iter()
                .map(|rule| Arc::new(rule) as Arc<dyn Rule>)
                .collect(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.id())
    }
}

/// Evaluates every applicable rule against `resource`.
///
/// Rules that error or panic produce a diagnostic finding with
/// [`Severity::Error`] in place of their verdict.
pub fn evaluate(resource: &Resource, rule_set: &RuleSet) -> Vec<Finding> {
    let mut findings = Vec::new();

    for rule in rule_set.rules.iter().filter(|r| r.applies_to(resource.kind)) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| rule.check(resource)))
            .unwrap_or_else(|payload| Err(RuleError::Panicked(panic_message(payload))));

        match outcome {
            Ok(None) => {}
            Ok(Some(violation)) => findings.push(Finding::new(
                resource.resource_id.clone(),
                resource.account_id.clone(),
                resource.region.clone(),
                rule.id(),
                violation.severity,
                violation.message,
            )),
            Err(err) => {
                warn!(
                    rule_id = rule.id(),
                    resource_id = %resource.resource_id,
                    rule_set_version = rule_set.version(),
                    error = %err,
                    "rule could not be evaluated"
                );
                findings.push(Finding::new(
                    resource.resource_id.clone(),
                    resource.account_id.clone(),
                    resource.region.clone(),
                    rule.id(),
                    Severity::Error,
                    format!("rule {} could not be evaluated: {err}", rule.id()),
                ));
            }
        }
    }

    findings
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct PanickingRule;

    impl Rule for PanickingRule {
        fn id(&self) -> &str {
            "aaa-panics"
        }

        fn applies_to(&self, _kind: ResourceKind) -> bool {
            true
        }

        fn check(&self, _resource: &Resource) -> Result<Option<Violation>, RuleError> {
            panic!("rule bug")
        }
    }

    fn endpoint() -> Resource {
        Resource::new(
            "arn:aws:sagemaker:us-east-1:123456789012:endpoint/e",
            ResourceKind::SageMakerEndpoint,
            "123456789012".parse().unwrap(),
            "us-east-1".parse().unwrap(),
        )
    }

    #[test]
    fn baseline_ids_are_unique_and_sorted() {
        let baseline = RuleSet::baseline();
        let ids: Vec<_> = baseline.rule_ids().map(str::to_string).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(ids, sorted);
        assert!(RuleSet::new("copy", baseline.rules.clone()).is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let rule = AttributeRule::new(
            "dup",
            [ResourceKind::S3DataBucket],
            "x",
            Expectation::Present,
            Severity::Low,
            "x",
        );
        let err = RuleSet::from_attribute_rules("v1", vec![rule.clone(), rule])
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidRuleSet(_)));
    }

    #[test]
    fn compliant_endpoint_has_no_findings() {
        let resource = endpoint()
            .with_attribute("kms_key_id", json!("key-1"))
            .with_attribute("tags", json!({ "owner": "ml" }));
        assert!(evaluate(&resource, &RuleSet::baseline()).is_empty());
    }

    #[test]
    fn findings_come_out_in_rule_id_order() {
        let findings = evaluate(&endpoint(), &RuleSet::baseline());
        let ids: Vec<_> = findings.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, ["resource-owner-tag", "sagemaker-endpoint-kms"]);
        assert_eq!(findings, evaluate(&endpoint(), &RuleSet::baseline()));
    }

    #[test]
    fn failing_rules_become_diagnostics() {
        let mut rules: Vec<Arc<dyn Rule>> = vec![Arc::new(PanickingRule)];
        rules.push(Arc::new(AttributeRule::new(
            "typed",
            [ResourceKind::SageMakerEndpoint],
            "kms_key_id",
            Expectation::Equals(json!("key-1")),
            Severity::High,
            "wrong key",
        )));
        let rule_set = RuleSet::new("test", rules).unwrap();
        let resource = endpoint().with_attribute("kms_key_id", json!(42));

        let findings = evaluate(&resource, &rule_set);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(Finding::is_diagnostic));
        assert_eq!(findings[0].rule_id, "aaa-panics");
        assert!(findings[0].message.contains("rule bug"));
        assert_eq!(findings[1].rule_id, "typed");
    }
}
