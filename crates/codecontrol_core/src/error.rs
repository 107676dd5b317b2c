//! Locally recovered registry conditions.
//!
//! # Responsibility
//! - Name every misuse/lookup condition the registry and bus recover from.
//! - Provide stable `error_code` strings for structured log lines.
//!
//! # Invariants
//! - These conditions are logged and swallowed by lookups and listener calls;
//!   only `create_with_id` and `reassign_id` return them as `Err`.

use crate::model::id::{ModelId, ModelIdError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ModelResult<T> = Result<T, ModelError>;

/// Registry and bus conditions that never abort the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A required argument was blank or otherwise unusable.
    InvalidArgument {
        operation: &'static str,
        detail: String,
    },
    /// A caller-provided id failed validation.
    InvalidId(ModelIdError),
    /// No live entity carries this id.
    NotFound(ModelId),
    /// The entity exists but has a different concrete type.
    TypeMismatch {
        id: ModelId,
        expected: &'static str,
        actual: &'static str,
    },
    /// Another live entity already owns this id.
    DuplicateId(ModelId),
}

impl ModelError {
    /// Stable machine-readable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::InvalidId(_) => "invalid_id",
            Self::NotFound(_) => "not_found",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::DuplicateId(_) => "duplicate_id",
        }
    }

    pub(crate) fn invalid_argument(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation,
            detail: detail.into(),
        }
    }
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument { operation, detail } => {
                write!(f, "invalid argument for {operation}: {detail}")
            }
            Self::InvalidId(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "model not found: {id}"),
            Self::TypeMismatch {
                id,
                expected,
                actual,
            } => write!(f, "model {id} is a {actual}, expected {expected}"),
            Self::DuplicateId(id) => write!(f, "model id already registered: {id}"),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidId(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ModelIdError> for ModelError {
    fn from(value: ModelIdError) -> Self {
        Self::InvalidId(value)
    }
}
