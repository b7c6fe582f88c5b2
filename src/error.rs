use thiserror::Error;

use crate::term::FormulaType;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: FormulaType,
        actual: FormulaType,
    },

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("theory not supported by this solver: {0}")]
    UnsupportedTheory(String),

    #[error("formula was created by a different solver environment")]
    ForeignValue,

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend could not produce a conclusive answer, or failed while answering.
    #[error("solver failed: {0}")]
    Solver(String),

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SolverError {
    pub fn type_mismatch(expected: &FormulaType, actual: &FormulaType) -> Self {
        SolverError::TypeMismatch {
            expected: expected.clone(),
            actual: actual.clone(),
        }
    }

    /// Errors a caller can recover from, e.g. by retrying with another backend.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SolverError::Solver(_) | SolverError::Interrupted(_))
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
