use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidAccountId(String),
    InvalidRegion(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidAccountId(raw) => {
                write!(f, "invalid AWS account id '{raw}': expected 12 digits")
            }
            ModelError::InvalidRegion(raw) => {
                write!(f, "invalid AWS region '{raw}'")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
