//! Biased latent factor models for sparse rating matrices.
//!
//! This crate factorizes a user × item rating matrix, in which zero marks a
//! missing rating, into user factors `U`, item factors `V`, user biases
//! `bu` and item biases `bi` around the global mean `μ` of the observed
//! ratings:
//!
//! ```text
//! r̂(i, j) = μ + bu[i] + bi[j] + ⟨U[i], V[j]⟩
//! ```
//!
//! Parameters are learned by sequential stochastic gradient descent over
//! uniformly sampled observed ratings, with a periodic full-error check
//! deciding convergence.
//!
//! # Modules
//!
//! - [`callback`]: Observability sink and cancellation for training runs
//! - [`config`]: Model hyperparameters, stopping rule, parallel settings
//! - [`error`]: Error types
//! - [`model`]: The trainable model and its prediction accessors
//! - [`parameters`]: Learned factors and biases
//! - [`ratings`]: Borrowed rating matrix with its mask and global mean
//! - [`types`]: Scalar trait, type aliases and default constants

pub mod callback;
pub mod config;
pub mod error;
pub mod model;
pub mod parameters;
pub mod ratings;
pub mod types;

// Re-export commonly used items at the crate root
pub use error::{FactorizationError, Result};
pub use model::{FactorModel, TerminationReason, TrainingResult};

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use latentmf::prelude::*;
/// ```
pub mod prelude {
    pub use crate::callback::{
        CancellationToken, CheckpointInfo, HistoryCallback, LoggingCallback, NoOpCallback,
        TrainingCallback,
    };
    pub use crate::config::{FactorConfig, ParallelConfig, TrainingConfig};
    pub use crate::error::{FactorizationError, Result};
    pub use crate::model::{FactorModel, TerminationReason, TrainingResult};
    pub use crate::parameters::FactorParameters;
    pub use crate::ratings::RatingMatrix;
    pub use crate::types::{DMatrix, DVector, Scalar};
}
