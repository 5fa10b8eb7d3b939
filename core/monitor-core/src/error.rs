//! Error types for monitor-core operations.
//!
//! All arithmetic in the core is total, so the only failure class is input
//! validation. Callers surface these as bad requests; a rejected call never
//! mutates state.

use crate::interval::EpochMillis;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing device name")]
    MissingDeviceName,

    #[error("Invalid date range: {field} is required")]
    MissingRangeBound { field: &'static str },

    #[error("Invalid date range: {field} must be a positive epoch-millisecond timestamp (got {value})")]
    NonPositiveRangeBound {
        field: &'static str,
        value: EpochMillis,
    },

    #[error("Invalid date range: from ({from}) must be earlier than to ({to})")]
    EmptyRange { from: EpochMillis, to: EpochMillis },
}

impl ValidationError {
    /// Stable machine-readable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingDeviceName => "missing_field",
            ValidationError::MissingRangeBound { .. }
            | ValidationError::NonPositiveRangeBound { .. }
            | ValidationError::EmptyRange { .. } => "invalid_range",
        }
    }
}

pub type Result<T, E = ValidationError> = std::result::Result<T, E>;
