use govscan_model::{Resource, ResourceKind, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Rule, Violation};
use crate::error::RuleError;

/// What the attribute at `path` must look like for the resource to comply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expect", content = "value", rename_all = "snake_case")]
pub enum Expectation {
    /// Attribute exists and is not null.
    Present,
    /// Attribute is a boolean `true`.
    IsTrue,
    /// Attribute equals the given JSON value.
    Equals(Value),
}

/// Data-driven rule comparing one attribute against an expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRule {
    pub id: String,
    pub kinds: Vec<ResourceKind>,
    pub path: String,
    pub expectation: Expectation,
    pub severity: Severity,
    pub message: String,
}

impl AttributeRule {
    pub fn new(
        id: impl Into<String>,
        kinds: impl IntoIterator<Item = ResourceKind>,
        path: impl Into<String>,
        expectation: Expectation,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kinds: kinds.into_iter().collect(),
            path: path.into(),
            expectation,
            severity,
            message: message.into(),
        }
    }

    fn violation(&self) -> Option<Violation> {
        Some(Violation::new(self.severity, self.message.clone()))
    }
}

impl Rule for AttributeRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn applies_to(&self, kind: ResourceKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn check(&self, resource: &Resource) -> Result<Option<Violation>, RuleError> {
        let actual = resource.attribute(&self.path).filter(|v| !v.is_null());

        match (&self.expectation, actual) {
            (_, None) => Ok(self.violation()),
            (Expectation::Present, Some(_)) => Ok(None),
            (Expectation::IsTrue, Some(Value::Bool(flag))) => {
                Ok(if *flag { None } else { self.violation() })
            }
            (Expectation::IsTrue, Some(_)) => Err(RuleError::UnexpectedType {
                path: self.path.clone(),
                expected: "boolean",
            }),
            (Expectation::Equals(expected), Some(actual)) => {
                if !same_json_type(expected, actual) {
                    return Err(RuleError::UnexpectedType {
                        path: self.path.clone(),
                        expected: json_type_name(expected),
                    });
                }
                Ok(if expected == actual {
                    None
                } else {
                    self.violation()
                })
            }
        }
    }
}

fn same_json_type(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notebook() -> Resource {
        Resource::new(
            "arn:aws:sagemaker:us-east-1:123456789012:notebook-instance/nb",
            ResourceKind::SageMakerNotebook,
            "123456789012".parse().unwrap(),
            "us-east-1".parse().unwrap(),
        )
    }

    fn internet_rule() -> AttributeRule {
        AttributeRule::new(
            "sagemaker-notebook-no-internet",
            [ResourceKind::SageMakerNotebook],
            "direct_internet_access",
            Expectation::Equals(json!("Disabled")),
            Severity::High,
            "notebook has direct internet access",
        )
    }

    #[test]
    fn missing_attribute_is_a_violation() {
        let violation = internet_rule().check(&notebook()).unwrap().unwrap();
        assert_eq!(violation.severity, Severity::High);
    }

    #[test]
    fn matching_value_complies() {
        let resource =
            notebook().with_attribute("direct_internet_access", json!("Disabled"));
        assert_eq!(internet_rule().check(&resource).unwrap(), None);

        let resource =
            notebook().with_attribute("direct_internet_access", json!("Enabled"));
        assert!(internet_rule().check(&resource).unwrap().is_some());
    }

    #[test]
    fn wrong_type_is_a_rule_error() {
        let resource =
            notebook().with_attribute("direct_internet_access", json!(false));
        let err = internet_rule().check(&resource).unwrap_err();
        assert_eq!(
            err,
            RuleError::UnexpectedType {
                path: "direct_internet_access".into(),
                expected: "string",
            }
        );
    }

    #[test]
    fn is_true_requires_boolean() {
        let rule = AttributeRule::new(
            "isolation",
            [ResourceKind::SageMakerNotebook],
            "network.isolated",
            Expectation::IsTrue,
            Severity::Medium,
            "not isolated",
        );
        let ok = notebook().with_attribute("network", json!({ "isolated": true }));
        assert_eq!(rule.check(&ok).unwrap(), None);

        let off = notebook().with_attribute("network", json!({ "isolated": false }));
        assert!(rule.check(&off).unwrap().is_some());

        let odd = notebook().with_attribute("network", json!({ "isolated": "yes" }));
        assert!(rule.check(&odd).is_err());
    }
}
