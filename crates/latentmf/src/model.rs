//! Biased latent factor model trained by stochastic gradient descent.
//!
//! # Training
//!
//! Every call to [`FactorModel::train`] starts from fresh parameters
//! (factors uniform in `[0, 1)`, biases zero) and then repeats:
//!
//! 1. draw an observed `(user, item)` pair uniformly, with replacement
//! 2. apply one SGD step to `U[user]`, `V[item]`, `bu[user]`, `bi[item]`
//! 3. every `check_interval` steps, re-evaluate the full error and stop
//!    once it changed by less than the tolerance since the last check
//!
//! Running out of iterations is a normal outcome reported as
//! [`TerminationReason::MaxIterations`]. Whatever the reason, the model
//! is queryable afterwards.
//!
//! # Example
//!
//! ```rust
//! use latentmf::prelude::*;
//!
//! # fn main() -> latentmf::Result<()> {
//! let ratings: DMatrix<f64> = DMatrix::from_row_slice(
//!     3,
//!     4,
//!     &[1.0, 0.0, 0.0, 4.0, 0.0, 3.0, 2.0, 2.0, 3.0, 4.0, 0.0, 0.0],
//! );
//!
//! let mut model = FactorModel::new(&ratings, FactorConfig::new(10))?;
//! let result = model.train(
//!     &TrainingConfig::new()
//!         .with_tolerance(1e-3)
//!         .with_max_iterations(20_000)
//!         .with_seed(42),
//! )?;
//!
//! assert!(result.final_error < result.initial_error);
//! let predicted = model.rating(0, 1)?;
//! assert!(predicted.is_finite());
//! # Ok(())
//! # }
//! ```

use crate::{
    callback::{CheckpointInfo, NoOpCallback, TrainingCallback},
    config::{FactorConfig, TrainingConfig},
    error::{FactorizationError, Result},
    parameters::FactorParameters,
    ratings::RatingMatrix,
    types::{DMatrix, DVector, Scalar},
};
use num_traits::Float;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::{Duration, Instant};

/// Reasons for a training run to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Two successive error checks differed by less than the tolerance
    Converged,
    /// Iteration budget exhausted without convergence
    MaxIterations,
    /// Wall-clock budget exceeded
    MaxTime,
    /// Cancellation token was set
    UserTerminated,
    /// A callback requested early termination
    CallbackRequest,
}

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainingResult<T: Scalar> {
    /// Number of SGD steps performed
    pub iterations: usize,

    /// Error right after initialization
    pub initial_error: T,

    /// Error of the parameters left in the model
    pub final_error: T,

    /// Number of error checks performed
    pub checks: usize,

    /// Wall-clock time of the run
    pub duration: Duration,

    /// Why training stopped
    pub termination_reason: TerminationReason,

    /// True if the tolerance was met
    pub converged: bool,
}

impl<T: Scalar> TrainingResult<T> {
    fn new(
        iterations: usize,
        initial_error: T,
        final_error: T,
        checks: usize,
        duration: Duration,
        termination_reason: TerminationReason,
    ) -> Self {
        Self {
            iterations,
            initial_error,
            final_error,
            checks,
            duration,
            termination_reason,
            converged: termination_reason == TerminationReason::Converged,
        }
    }
}

/// Latent factor model over a borrowed rating matrix.
///
/// The model holds the rating view, the hyperparameters and, once trained,
/// the learned [`FactorParameters`]. Parameters are only reachable through
/// shared borrows; the sole mutators are [`train`](Self::train) and
/// [`sgd`](Self::sgd).
#[derive(Debug, Clone)]
pub struct FactorModel<'a, T: Scalar> {
    ratings: RatingMatrix<'a, T>,
    config: FactorConfig<T>,
    parameters: Option<FactorParameters<T>>,
}

impl<'a, T: Scalar> FactorModel<'a, T> {
    /// Creates an untrained model over `ratings`.
    ///
    /// Zero entries of `ratings` are treated as missing.
    ///
    /// # Errors
    ///
    /// - `InvalidDimension` if `config.n_factors` is zero
    /// - `InvalidConfiguration` for a bad learning rate or regularization
    /// - `InvalidInput` if `ratings` has no observed entry
    pub fn new(ratings: &'a DMatrix<T>, config: FactorConfig<T>) -> Result<Self> {
        config.validate()?;
        let ratings = RatingMatrix::new(ratings)?;

        log::debug!(
            "factor model: {} users, {} items, {} observed, K = {}",
            ratings.n_users(),
            ratings.n_items(),
            ratings.n_observed(),
            config.n_factors
        );

        Ok(Self {
            ratings,
            config,
            parameters: None,
        })
    }

    /// Creates an untrained model with `n_factors` factors and the default
    /// learning rate and regularization.
    pub fn with_rank(ratings: &'a DMatrix<T>, n_factors: usize) -> Result<Self> {
        Self::new(ratings, FactorConfig::new(n_factors))
    }

    /// Trains from fresh parameters.
    pub fn train(&mut self, training: &TrainingConfig<T>) -> Result<TrainingResult<T>> {
        self.train_with_callback(training, &mut NoOpCallback)
    }

    /// Trains from fresh parameters, reporting every error check to
    /// `callback`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for an unusable `training` config and
    /// propagates callback errors. Neither convergence failure nor
    /// cancellation is an error.
    pub fn train_with_callback(
        &mut self,
        training: &TrainingConfig<T>,
        callback: &mut dyn TrainingCallback<T>,
    ) -> Result<TrainingResult<T>> {
        training.validate()?;
        let start = Instant::now();

        let mut rng = match training.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let parallel = self.evaluates_in_parallel();
        let Self {
            ratings,
            config,
            parameters,
        } = self;

        let params = parameters.insert(FactorParameters::random(
            ratings.n_users(),
            ratings.n_items(),
            config.n_factors,
            &mut rng,
        ));

        let mu = ratings.global_mean();
        let learning_rate = config.learning_rate;
        let regularization = config.regularization;
        let pairs = ratings.observed_pairs();

        let initial_error = params.error(ratings, regularization, parallel);
        callback.on_training_start(initial_error)?;
        log::info!(
            "training: {} observed ratings, initial error {}, tolerance {}",
            pairs.len(),
            initial_error,
            training.tolerance
        );

        let mut err_new = initial_error;
        let mut checks = 0;
        let mut performed = 0;
        let mut stale = false;
        let mut reason = TerminationReason::MaxIterations;

        for iteration in 0..training.max_iterations {
            if training
                .cancellation
                .as_ref()
                .is_some_and(|token| token.is_cancelled())
            {
                reason = TerminationReason::UserTerminated;
                break;
            }

            let (user, item) = pairs[rng.gen_range(0..pairs.len())];
            params.sgd_step(
                mu,
                ratings.rating(user, item),
                user,
                item,
                learning_rate,
                regularization,
            );
            performed = iteration + 1;
            stale = true;

            if iteration % training.check_interval != 0 || iteration == 0 {
                continue;
            }

            let err_old = err_new;
            err_new = params.error(ratings, regularization, parallel);
            stale = false;
            checks += 1;

            let change = <T as Float>::abs(err_new - err_old);
            let converged = change < training.tolerance;
            if training.debug {
                log::debug!("iteration {iteration}: error {err_new}");
            }

            let info = CheckpointInfo {
                iteration,
                error: err_new,
                previous_error: err_old,
                change,
                elapsed: start.elapsed(),
                converged,
            };
            let keep_going = callback.on_check(&info)?;

            if converged {
                reason = TerminationReason::Converged;
                break;
            }
            if !keep_going {
                reason = TerminationReason::CallbackRequest;
                break;
            }
            if training
                .max_time
                .is_some_and(|max_time| start.elapsed() >= max_time)
            {
                reason = TerminationReason::MaxTime;
                break;
            }
        }

        let final_error = if stale {
            params.error(ratings, regularization, parallel)
        } else {
            err_new
        };

        let result = TrainingResult::new(
            performed,
            initial_error,
            final_error,
            checks,
            start.elapsed(),
            reason,
        );
        log::info!(
            "training stopped after {} iterations ({:?}), error {} -> {}",
            result.iterations,
            result.termination_reason,
            result.initial_error,
            result.final_error
        );
        callback.on_training_end(&result)?;

        Ok(result)
    }

    /// Applies one SGD step to the observed pair `(user, item)`.
    ///
    /// The caller is responsible for `(user, item)` being an observed
    /// pair; on a missing cell the step pulls the prediction towards zero.
    pub fn sgd(&mut self, user: usize, item: usize) -> Result<()> {
        self.ratings.check_bounds(user, item)?;
        let params = self
            .parameters
            .as_mut()
            .ok_or(FactorizationError::NotTrained)?;

        params.sgd_step(
            self.ratings.global_mean(),
            self.ratings.rating(user, item),
            user,
            item,
            self.config.learning_rate,
            self.config.regularization,
        );
        Ok(())
    }

    /// Regularized error of the current parameters over every observed
    /// rating.
    pub fn error(&self) -> Result<T> {
        let params = self.trained()?;
        Ok(params.error(
            &self.ratings,
            self.config.regularization,
            self.evaluates_in_parallel(),
        ))
    }

    /// Root mean squared residual over the observed ratings, without the
    /// regularization term.
    pub fn observed_rmse(&self) -> Result<T> {
        let params = self.trained()?;
        let squared = params.squared_error(&self.ratings, self.evaluates_in_parallel());
        let count = <T as Scalar>::from_usize(self.ratings.n_observed());
        Ok(<T as Float>::sqrt(squared / count))
    }

    /// Predicted rating of `item` by `user`.
    pub fn rating(&self, user: usize, item: usize) -> Result<T> {
        self.ratings.check_bounds(user, item)?;
        let params = self.trained()?;
        Ok(params.predict(self.ratings.global_mean(), user, item))
    }

    /// Predicted ratings for every `(user, item)`, observed cells included.
    pub fn rating_matrix(&self) -> Result<DMatrix<T>> {
        let params = self.trained()?;
        Ok(params.reconstruct(self.ratings.global_mean()))
    }

    /// User factor matrix `U` (users × K).
    pub fn user_factors(&self) -> Result<&DMatrix<T>> {
        Ok(self.trained()?.user_factors())
    }

    /// Item factor matrix `V` (items × K).
    pub fn item_factors(&self) -> Result<&DMatrix<T>> {
        Ok(self.trained()?.item_factors())
    }

    /// User bias vector `bu`.
    pub fn user_biases(&self) -> Result<&DVector<T>> {
        Ok(self.trained()?.user_biases())
    }

    /// Item bias vector `bi`.
    pub fn item_biases(&self) -> Result<&DVector<T>> {
        Ok(self.trained()?.item_biases())
    }

    /// All learned parameters, `None` before the first training run.
    pub fn parameters(&self) -> Option<&FactorParameters<T>> {
        self.parameters.as_ref()
    }

    /// Whether `train` has been called.
    pub fn is_trained(&self) -> bool {
        self.parameters.is_some()
    }

    /// Mean of the observed ratings.
    pub fn global_mean(&self) -> T {
        self.ratings.global_mean()
    }

    /// The rating view the model trains on.
    pub fn ratings(&self) -> &RatingMatrix<'a, T> {
        &self.ratings
    }

    /// Model hyperparameters.
    pub fn config(&self) -> &FactorConfig<T> {
        &self.config
    }

    /// Number of users.
    pub fn n_users(&self) -> usize {
        self.ratings.n_users()
    }

    /// Number of items.
    pub fn n_items(&self) -> usize {
        self.ratings.n_items()
    }

    /// Number of latent factors K.
    pub fn n_factors(&self) -> usize {
        self.config.n_factors
    }

    /// Number of observed ratings.
    pub fn n_observed(&self) -> usize {
        self.ratings.n_observed()
    }

    fn trained(&self) -> Result<&FactorParameters<T>> {
        self.parameters.as_ref().ok_or(FactorizationError::NotTrained)
    }

    fn evaluates_in_parallel(&self) -> bool {
        self.config.parallel.should_parallelize(
            self.ratings.n_users(),
            self.ratings.n_items(),
            self.config.n_factors,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{CancellationToken, HistoryCallback};
    use approx::assert_relative_eq;

    fn toy() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            3,
            4,
            &[1.0, 0.0, 0.0, 4.0, 0.0, 3.0, 2.0, 2.0, 3.0, 4.0, 0.0, 0.0],
        )
    }

    fn trained(values: &DMatrix<f64>) -> FactorModel<'_, f64> {
        let mut model = FactorModel::with_rank(values, 4).unwrap();
        model
            .train(&TrainingConfig::new().with_max_iterations(500).with_seed(3))
            .unwrap();
        model
    }

    #[test]
    fn test_construction_errors() {
        let zeros = DMatrix::<f64>::zeros(3, 3);
        assert!(matches!(
            FactorModel::with_rank(&zeros, 2),
            Err(FactorizationError::InvalidInput { .. })
        ));

        let values = toy();
        assert!(matches!(
            FactorModel::with_rank(&values, 0),
            Err(FactorizationError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn test_untrained_accessors_fail() {
        let values = toy();
        let mut model = FactorModel::with_rank(&values, 3).unwrap();

        assert!(!model.is_trained());
        assert_eq!(model.error(), Err(FactorizationError::NotTrained));
        assert_eq!(model.rating(0, 0), Err(FactorizationError::NotTrained));
        assert_eq!(model.sgd(0, 0), Err(FactorizationError::NotTrained));
        assert!(model.rating_matrix().is_err());
        assert!(model.user_factors().is_err());
        assert!(model.item_biases().is_err());
        assert!(model.parameters().is_none());
        assert_relative_eq!(model.global_mean(), 19.0 / 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shapes_after_training() {
        let values = toy();
        let model = trained(&values);

        assert!(model.is_trained());
        assert_eq!(model.user_factors().unwrap().shape(), (3, 4));
        assert_eq!(model.item_factors().unwrap().shape(), (4, 4));
        assert_eq!(model.user_biases().unwrap().len(), 3);
        assert_eq!(model.item_biases().unwrap().len(), 4);
        assert_eq!(model.rating_matrix().unwrap().shape(), (3, 4));
    }

    #[test]
    fn test_rating_out_of_range() {
        let values = toy();
        let model = trained(&values);

        assert_eq!(
            model.rating(3, 0),
            Err(FactorizationError::user_out_of_range(3, 3))
        );
        assert_eq!(
            model.rating(0, 4),
            Err(FactorizationError::item_out_of_range(4, 4))
        );
    }

    #[test]
    fn test_max_iterations_is_not_an_error() {
        let values = toy();
        let mut model = FactorModel::with_rank(&values, 4).unwrap();
        let result = model
            .train(
                &TrainingConfig::new()
                    .with_tolerance(0.0)
                    .with_max_iterations(2500)
                    .with_seed(11),
            )
            .unwrap();

        assert_eq!(result.termination_reason, TerminationReason::MaxIterations);
        assert!(!result.converged);
        assert_eq!(result.iterations, 2500);
        // checks at iterations 1000 and 2000
        assert_eq!(result.checks, 2);
        assert_eq!(result.final_error, model.error().unwrap());
    }

    #[test]
    fn test_large_tolerance_converges_at_first_check() {
        let values = toy();
        let mut model = FactorModel::with_rank(&values, 4).unwrap();
        let result = model
            .train(
                &TrainingConfig::new()
                    .with_tolerance(1e6)
                    .with_check_interval(10)
                    .with_seed(5),
            )
            .unwrap();

        assert_eq!(result.termination_reason, TerminationReason::Converged);
        assert!(result.converged);
        assert_eq!(result.iterations, 11);
        assert_eq!(result.checks, 1);
    }

    #[test]
    fn test_cancelled_token_stops_before_first_step() {
        let values = toy();
        let mut model = FactorModel::with_rank(&values, 4).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = model
            .train(&TrainingConfig::new().with_cancellation(token).with_seed(1))
            .unwrap();

        assert_eq!(result.termination_reason, TerminationReason::UserTerminated);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.final_error, result.initial_error);
        assert!(model.rating(1, 1).is_ok());
    }

    #[test]
    fn test_callback_can_stop_training() {
        struct StopAfter(usize);

        impl TrainingCallback<f64> for StopAfter {
            fn on_check(&mut self, _info: &CheckpointInfo<f64>) -> Result<bool> {
                self.0 -= 1;
                Ok(self.0 > 0)
            }
        }

        let values = toy();
        let mut model = FactorModel::with_rank(&values, 4).unwrap();
        let result = model
            .train_with_callback(
                &TrainingConfig::new()
                    .with_tolerance(0.0)
                    .with_check_interval(100)
                    .with_seed(9),
                &mut StopAfter(3),
            )
            .unwrap();

        assert_eq!(result.termination_reason, TerminationReason::CallbackRequest);
        assert_eq!(result.checks, 3);
        assert_eq!(result.iterations, 301);
    }

    #[test]
    fn test_history_matches_result() {
        let values = toy();
        let mut model = FactorModel::with_rank(&values, 4).unwrap();
        let mut history = HistoryCallback::new();
        let result = model
            .train_with_callback(
                &TrainingConfig::new()
                    .with_tolerance(0.0)
                    .with_max_iterations(3001)
                    .with_seed(2),
                &mut history,
            )
            .unwrap();

        let iterations: Vec<usize> = history.history().iter().map(|&(it, _)| it).collect();
        assert_eq!(iterations, vec![0, 1000, 2000, 3000]);
        assert_eq!(history.errors()[0], result.initial_error);
        assert_eq!(*history.errors().last().unwrap(), result.final_error);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let values = toy();
        let training = TrainingConfig::new().with_max_iterations(2000).with_seed(77);

        let mut first = FactorModel::with_rank(&values, 5).unwrap();
        first.train(&training).unwrap();
        let mut second = FactorModel::with_rank(&values, 5).unwrap();
        second.train(&training).unwrap();

        assert_eq!(first.parameters(), second.parameters());
    }

    #[test]
    fn test_retraining_restarts_from_fresh_parameters() {
        let values = toy();
        let mut model = FactorModel::with_rank(&values, 4).unwrap();

        let short = TrainingConfig::new().with_max_iterations(10).with_seed(4);
        model.train(&short).unwrap();
        let once = model.parameters().cloned();

        model.train(&TrainingConfig::new().with_max_iterations(5000).with_seed(8)).unwrap();
        model.train(&short).unwrap();

        assert_eq!(model.parameters().cloned(), once);
    }

    #[test]
    fn test_invalid_training_config_is_rejected() {
        let values = toy();
        let mut model = FactorModel::with_rank(&values, 4).unwrap();
        let err = model
            .train(&TrainingConfig::new().with_check_interval(0))
            .unwrap_err();

        assert!(matches!(err, FactorizationError::InvalidConfiguration { .. }));
        assert!(!model.is_trained());
    }

    #[test]
    fn test_observed_rmse_is_below_regularized_error() {
        let values = toy();
        let model = trained(&values);
        let rmse = model.observed_rmse().unwrap();
        assert!(rmse >= 0.0);
        assert!(rmse * (model.n_observed() as f64).sqrt() <= model.error().unwrap());
    }
}
