use std::fmt::{self, Display};

use crate::kind::ResourceKind;
use crate::tenant::LifecycleState;

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidIdentifier(String),
    KindMismatch {
        expected: ResourceKind,
        actual: ResourceKind,
    },
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
        desired: LifecycleState,
    },
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidIdentifier(raw) => write!(f, "invalid identifier: {raw}"),
            ModelError::KindMismatch { expected, actual } => {
                write!(f, "resource kind mismatch: expected {expected}, got {actual}")
            }
            ModelError::InvalidTransition { from, to, desired } => write!(
                f,
                "invalid lifecycle transition {from} -> {to} (desired state is {desired})"
            ),
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
