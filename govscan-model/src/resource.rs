use std::fmt;

use serde_json::{Map, Value};

use crate::ids::{AccountId, Region};

/// AI/ML resource families discovered by the inventory collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResourceKind {
    #[cfg_attr(feature = "serde", serde(rename = "sagemaker_endpoint"))]
    SageMakerEndpoint,
    #[cfg_attr(feature = "serde", serde(rename = "sagemaker_training_job"))]
    SageMakerTrainingJob,
    #[cfg_attr(feature = "serde", serde(rename = "sagemaker_notebook"))]
    SageMakerNotebook,
    #[cfg_attr(feature = "serde", serde(rename = "sagemaker_model"))]
    SageMakerModel,
    BedrockCustomModel,
    BedrockAgent,
    S3DataBucket,
}

impl ResourceKind {
    /// Every kind in the order the collector lists them.
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::SageMakerEndpoint,
        ResourceKind::SageMakerTrainingJob,
        ResourceKind::SageMakerNotebook,
        ResourceKind::SageMakerModel,
        ResourceKind::BedrockCustomModel,
        ResourceKind::BedrockAgent,
        ResourceKind::S3DataBucket,
    ];

    /// AWS service namespace that owns the listing API.
    pub fn service(&self) -> &'static str {
        match self {
            ResourceKind::SageMakerEndpoint
            | ResourceKind::SageMakerTrainingJob
            | ResourceKind::SageMakerNotebook
            | ResourceKind::SageMakerModel => "sagemaker",
            ResourceKind::BedrockCustomModel => "bedrock",
            ResourceKind::BedrockAgent => "bedrock-agent",
            ResourceKind::S3DataBucket => "s3",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::SageMakerEndpoint => "sagemaker_endpoint",
            ResourceKind::SageMakerTrainingJob => "sagemaker_training_job",
            ResourceKind::SageMakerNotebook => "sagemaker_notebook",
            ResourceKind::SageMakerModel => "sagemaker_model",
            ResourceKind::BedrockCustomModel => "bedrock_custom_model",
            ResourceKind::BedrockAgent => "bedrock_agent",
            ResourceKind::S3DataBucket => "s3_data_bucket",
        };
        f.write_str(label)
    }
}

/// A discovered resource. Immutable once produced by the collector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resource {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub account_id: AccountId,
    pub region: Region,
    #[cfg_attr(feature = "serde", serde(default))]
    pub raw_attributes: Map<String, Value>,
}

impl Resource {
    pub fn new(
        resource_id: impl Into<String>,
        kind: ResourceKind,
        account_id: AccountId,
        region: Region,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            kind,
            account_id,
            region,
            raw_attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.raw_attributes.insert(key.to_string(), value);
        self
    }

    /// Looks up a dotted attribute path such as `tags.owner`.
    pub fn attribute(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.raw_attributes.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}
