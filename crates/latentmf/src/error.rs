//! Error types for latent factor models.
//!
//! Every failure is detected eagerly and surfaced as a distinct variant.
//! Running out of iterations is not an error; it is reported through
//! [`TerminationReason`](crate::model::TerminationReason).

use thiserror::Error;

/// Errors that can occur while building, training or querying a model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactorizationError {
    /// The rating matrix cannot be used for training.
    ///
    /// Raised when the matrix is empty, holds no observed (nonzero)
    /// entry, or contains a non-finite value.
    #[error("Invalid rating matrix: {reason}")]
    InvalidInput {
        /// Description of why the input is invalid
        reason: String,
    },

    /// A model dimension is not positive.
    #[error("Invalid dimension for {parameter}: {value} (must be positive)")]
    InvalidDimension {
        /// Name of the dimension
        parameter: String,
        /// Value that was rejected
        value: usize,
    },

    /// A hyperparameter is outside its valid range.
    #[error("Invalid configuration for {parameter} = {value}: {reason}")]
    InvalidConfiguration {
        /// Name of the invalid parameter
        parameter: String,
        /// Value that was invalid
        value: String,
        /// Description of the constraint that was violated
        reason: String,
    },

    /// A user or item index lies outside the rating matrix.
    #[error("{axis} index {index} out of range (size {len})")]
    OutOfRange {
        /// Which axis was indexed ("user" or "item")
        axis: &'static str,
        /// The offending index
        index: usize,
        /// Size of the axis
        len: usize,
    },

    /// Learned parameters were requested before `train` was called.
    #[error("Model has not been trained yet")]
    NotTrained,
}

impl FactorizationError {
    /// Create an InvalidInput error with a custom reason.
    pub fn invalid_input<S: Into<String>>(reason: S) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Create an InvalidDimension error.
    pub fn invalid_dimension<S: Into<String>>(parameter: S, value: usize) -> Self {
        Self::InvalidDimension {
            parameter: parameter.into(),
            value,
        }
    }

    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration<S1, S2, S3>(parameter: S1, value: S2, reason: S3) -> Self
    where
        S1: Into<String>,
        S2: std::fmt::Display,
        S3: Into<String>,
    {
        Self::InvalidConfiguration {
            parameter: parameter.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an OutOfRange error for a user index.
    pub fn user_out_of_range(index: usize, len: usize) -> Self {
        Self::OutOfRange {
            axis: "user",
            index,
            len,
        }
    }

    /// Create an OutOfRange error for an item index.
    pub fn item_out_of_range(index: usize, len: usize) -> Self {
        Self::OutOfRange {
            axis: "item",
            index,
            len,
        }
    }
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, FactorizationError>;
