//! Model and training configuration.
//!
//! Configuration structs follow the builder style used across the crate:
//! `Default` gives the reference hyperparameters and `with_*` setters
//! override individual fields. `validate` is called by the model before
//! any work is done.

use crate::{
    callback::CancellationToken,
    error::{FactorizationError, Result},
    types::{Scalar, DEFAULT_CHECK_INTERVAL, DEFAULT_MAX_ITERATIONS},
};
use num_traits::Float;
use std::time::Duration;

/// Hyperparameters of a biased latent factor model.
///
/// - **n_factors** (K): length of each user and item latent vector
/// - **learning_rate** (a): SGD step size
/// - **regularization** (b): penalty on parameter magnitudes
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FactorConfig<T: Scalar> {
    /// Number of latent factors per user and item
    pub n_factors: usize,

    /// Step size of every SGD update
    pub learning_rate: T,

    /// Regularization strength
    pub regularization: T,

    /// Parallel execution of the error evaluation
    #[cfg_attr(feature = "serde", serde(default))]
    pub parallel: ParallelConfig,
}

impl<T: Scalar> FactorConfig<T> {
    /// Creates a configuration with `n_factors` latent factors and default
    /// learning rate and regularization.
    pub fn new(n_factors: usize) -> Self {
        Self {
            n_factors,
            learning_rate: T::DEFAULT_LEARNING_RATE,
            regularization: T::DEFAULT_REGULARIZATION,
            parallel: ParallelConfig::default(),
        }
    }

    /// Sets the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: T) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the regularization strength.
    pub fn with_regularization(mut self, regularization: T) -> Self {
        self.regularization = regularization;
        self
    }

    /// Sets the parallel execution settings.
    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Checks that every hyperparameter is usable.
    pub fn validate(&self) -> Result<()> {
        if self.n_factors == 0 {
            return Err(FactorizationError::invalid_dimension("n_factors", 0));
        }
        if !<T as Float>::is_finite(self.learning_rate) || self.learning_rate <= T::zero() {
            return Err(FactorizationError::invalid_configuration(
                "learning_rate",
                self.learning_rate,
                "must be positive and finite",
            ));
        }
        if !<T as Float>::is_finite(self.regularization) || self.regularization < T::zero() {
            return Err(FactorizationError::invalid_configuration(
                "regularization",
                self.regularization,
                "must be non-negative and finite",
            ));
        }
        Ok(())
    }
}

/// Stopping rule and runtime options of a training run.
///
/// Training stops at the first of:
/// - two successive error checks differing by less than `tolerance`
/// - `max_iterations` SGD steps
/// - `max_time` elapsed (checked at error checks only)
/// - cancellation through the token or a callback
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrainingConfig<T: Scalar> {
    /// Absolute tolerance on the change of error between two checks
    pub tolerance: T,

    /// Maximum number of SGD steps
    pub max_iterations: usize,

    /// Number of SGD steps between two full error evaluations
    pub check_interval: usize,

    /// Emit every error check through the `log` facade
    pub debug: bool,

    /// Seed of the sampling and initialization RNG; entropy when `None`
    pub seed: Option<u64>,

    /// Wall-clock budget for the run
    pub max_time: Option<Duration>,

    /// External cancellation flag polled between steps
    #[cfg_attr(feature = "serde", serde(skip))]
    pub cancellation: Option<CancellationToken>,
}

impl<T: Scalar> Default for TrainingConfig<T> {
    fn default() -> Self {
        Self {
            tolerance: T::DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            check_interval: DEFAULT_CHECK_INTERVAL,
            debug: false,
            seed: None,
            max_time: None,
            cancellation: None,
        }
    }
}

impl<T: Scalar> TrainingConfig<T> {
    /// Creates a training configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the absolute convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: T) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the maximum number of SGD steps.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets how many SGD steps separate two error checks.
    pub fn with_check_interval(mut self, check_interval: usize) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Enables or disables per-check log output.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Fixes the RNG seed for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the wall-clock budget.
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Attaches an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Checks that the stopping rule is usable.
    pub fn validate(&self) -> Result<()> {
        if !<T as Float>::is_finite(self.tolerance) || self.tolerance < T::zero() {
            return Err(FactorizationError::invalid_configuration(
                "tolerance",
                self.tolerance,
                "must be non-negative and finite",
            ));
        }
        if self.check_interval == 0 {
            return Err(FactorizationError::invalid_configuration(
                "check_interval",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Configuration for parallel error evaluation.
///
/// The full error is a sum over every cell of the rating matrix and costs
/// O(users * items * factors). Above `min_work` it is computed as a
/// row-parallel map-reduce; SGD steps always stay sequential.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParallelConfig {
    /// Allow parallel evaluation at all
    pub enabled: bool,

    /// Minimum users * items * factors product to go parallel
    pub min_work: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_work: 1 << 16,
        }
    }
}

impl ParallelConfig {
    /// Create a new parallel configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that never parallelizes.
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the minimum amount of work for parallel execution.
    pub fn with_min_work(mut self, min_work: usize) -> Self {
        self.min_work = min_work;
        self
    }

    /// Check if an evaluation over the given shape should run in parallel.
    pub fn should_parallelize(&self, n_users: usize, n_items: usize, n_factors: usize) -> bool {
        cfg!(feature = "parallel")
            && self.enabled
            && n_users > 1
            && n_users.saturating_mul(n_items).saturating_mul(n_factors) >= self.min_work
    }
}
