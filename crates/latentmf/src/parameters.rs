//! Learned parameters of a biased latent factor model.
//!
//! # Model
//!
//! For user i and item j the predicted rating is
//!
//! ```text
//! r̂(i, j) = μ + bu[i] + bi[j] + ⟨U[i], V[j]⟩
//! ```
//!
//! where μ is the global mean of the observed ratings, `U` (users × K)
//! and `V` (items × K) hold the latent factors, and `bu`, `bi` the biases.
//! The same formula drives the per-pair residual of an SGD step, the full
//! error and the prediction accessors.
//!
//! # Objectives
//!
//! One SGD step on an observed pair descends the per-pair loss
//!
//! ```text
//! e² + b·(‖U[i]‖² + ‖V[j]‖² + bu[i]² + bi[j]²),   e = r(i, j) − r̂(i, j)
//! ```
//!
//! while the reported error is
//!
//! ```text
//! sqrt( Σ_observed e² + (b/2)·(‖U‖² + ‖V‖² + ‖bu‖² + ‖bi‖²) )
//! ```
//!
//! The step penalizes with `b` on every visit while the error penalizes
//! every parameter once with `b/2`. The two are not an exact
//! objective/gradient pair and are kept that way.

use crate::{
    ratings::RatingMatrix,
    types::{DMatrix, DVector, Scalar},
};
use num_traits::Float;
use rand::Rng;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// User and item factors and biases.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorParameters<T: Scalar> {
    user_factors: DMatrix<T>,
    item_factors: DMatrix<T>,
    user_biases: DVector<T>,
    item_biases: DVector<T>,
}

impl<T: Scalar> FactorParameters<T> {
    /// Fresh parameters: factors uniform in `[0, 1)`, biases zero.
    pub fn random<R: Rng + ?Sized>(
        n_users: usize,
        n_items: usize,
        n_factors: usize,
        rng: &mut R,
    ) -> Self {
        let user_factors = DMatrix::from_fn(n_users, n_factors, |_, _| T::sample_unit(&mut *rng));
        let item_factors = DMatrix::from_fn(n_items, n_factors, |_, _| T::sample_unit(&mut *rng));

        Self {
            user_factors,
            item_factors,
            user_biases: DVector::zeros(n_users),
            item_biases: DVector::zeros(n_items),
        }
    }

    /// User factor matrix `U`, one row per user.
    pub fn user_factors(&self) -> &DMatrix<T> {
        &self.user_factors
    }

    /// Item factor matrix `V`, one row per item.
    pub fn item_factors(&self) -> &DMatrix<T> {
        &self.item_factors
    }

    /// User bias vector `bu`.
    pub fn user_biases(&self) -> &DVector<T> {
        &self.user_biases
    }

    /// Item bias vector `bi`.
    pub fn item_biases(&self) -> &DVector<T> {
        &self.item_biases
    }

    /// Number of latent factors K.
    pub fn n_factors(&self) -> usize {
        self.user_factors.ncols()
    }

    /// Predicted rating for `(user, item)` around the global mean `mu`.
    ///
    /// Indices are not checked beyond nalgebra's own bounds assertions.
    #[inline]
    pub fn predict(&self, mu: T, user: usize, item: usize) -> T {
        mu + self.user_biases[user]
            + self.item_biases[item]
            + self.user_factors.row(user).dot(&self.item_factors.row(item))
    }

    /// Full dense reconstruction, observed cells included.
    pub fn reconstruct(&self, mu: T) -> DMatrix<T> {
        DMatrix::from_fn(self.user_factors.nrows(), self.item_factors.nrows(), |user, item| {
            self.predict(mu, user, item)
        })
    }

    /// One gradient step on the per-pair loss of `(user, item)`.
    ///
    /// Every right-hand side reads the values from before the step; in
    /// particular the item update does not see the new user row.
    pub(crate) fn sgd_step(
        &mut self,
        mu: T,
        rating: T,
        user: usize,
        item: usize,
        learning_rate: T,
        regularization: T,
    ) {
        let two = <T as Scalar>::from_f64(2.0);
        let residual = rating - self.predict(mu, user, item);
        let pull = two * residual;

        for k in 0..self.n_factors() {
            let u = self.user_factors[(user, k)];
            let v = self.item_factors[(item, k)];
            self.user_factors[(user, k)] = u - learning_rate * (regularization * u - pull * v);
            self.item_factors[(item, k)] = v - learning_rate * (regularization * v - pull * u);
        }

        let bu = self.user_biases[user];
        let bi = self.item_biases[item];
        self.user_biases[user] = bu - learning_rate * (regularization * bu - pull);
        self.item_biases[item] = bi - learning_rate * (regularization * bi - pull);
    }

    /// Sum of squares of every entry of `U`, `V`, `bu` and `bi`.
    pub fn squared_norm(&self) -> T {
        self.user_factors.norm_squared()
            + self.item_factors.norm_squared()
            + self.user_biases.norm_squared()
            + self.item_biases.norm_squared()
    }

    /// Sum of squared residuals over the observed cells of `ratings`.
    ///
    /// With `parallel` set, the per-row sums are computed on the rayon
    /// pool and then added in row order, so the result is bit-identical to
    /// the sequential evaluation.
    pub fn squared_error(&self, ratings: &RatingMatrix<'_, T>, parallel: bool) -> T {
        let n_users = ratings.n_users();
        let row_error = |user: usize| self.row_squared_error(ratings, user);

        #[cfg(feature = "parallel")]
        {
            if parallel {
                let rows: Vec<T> = (0..n_users).into_par_iter().map(row_error).collect();
                return rows.into_iter().fold(T::zero(), |a, b| a + b);
            }
        }
        #[cfg(not(feature = "parallel"))]
        let _ = parallel;

        (0..n_users).map(row_error).fold(T::zero(), |a, b| a + b)
    }

    fn row_squared_error(&self, ratings: &RatingMatrix<'_, T>, user: usize) -> T {
        let mu = ratings.global_mean();
        let mut acc = T::zero();
        for item in 0..ratings.n_items() {
            if ratings.is_observed(user, item) {
                let residual = ratings.rating(user, item) - self.predict(mu, user, item);
                acc = acc + residual * residual;
            }
        }
        acc
    }

    /// Regularized reconstruction error over the whole matrix.
    pub fn error(&self, ratings: &RatingMatrix<'_, T>, regularization: T, parallel: bool) -> T {
        let half = <T as Scalar>::from_f64(0.5);
        let squared = self.squared_error(ratings, parallel);
        <T as Float>::sqrt(squared + half * regularization * self.squared_norm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn small_parameters() -> FactorParameters<f64> {
        FactorParameters {
            user_factors: DMatrix::from_row_slice(2, 2, &[0.1, 0.2, 0.3, 0.4]),
            item_factors: DMatrix::from_row_slice(3, 2, &[0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
            user_biases: DVector::from_vec(vec![0.1, -0.1]),
            item_biases: DVector::from_vec(vec![0.0, 0.2, -0.2]),
        }
    }

    #[test]
    fn test_random_initialization() {
        let mut rng = StdRng::seed_from_u64(1);
        let params = FactorParameters::<f64>::random(3, 4, 5, &mut rng);

        assert_eq!(params.user_factors().shape(), (3, 5));
        assert_eq!(params.item_factors().shape(), (4, 5));
        assert!(params.user_factors().iter().all(|&x| (0.0..1.0).contains(&x)));
        assert!(params.item_factors().iter().all(|&x| (0.0..1.0).contains(&x)));
        assert!(params.user_biases().iter().all(|&x| x == 0.0));
        assert!(params.item_biases().iter().all(|&x| x == 0.0));
        assert_eq!(params.n_factors(), 5);
    }

    #[test]
    fn test_predict_formula() {
        let params = small_parameters();
        // 2.0 + (-0.1) + (-0.2) + (0.3 * 0.9 + 0.4 * 1.0)
        assert_relative_eq!(params.predict(2.0, 1, 2), 2.37, epsilon = 1e-12);
    }

    #[test]
    fn test_reconstruct_matches_predict() {
        let params = small_parameters();
        let rhat = params.reconstruct(3.0);
        assert_eq!(rhat.shape(), (2, 3));
        for user in 0..2 {
            for item in 0..3 {
                assert_eq!(rhat[(user, item)], params.predict(3.0, user, item));
            }
        }
    }

    #[test]
    fn test_sgd_step_uses_pre_update_values() {
        let mut params = small_parameters();
        let (a, b, mu, r) = (0.1, 0.02, 2.0, 4.0);
        let before = params.clone();
        let e = r - before.predict(mu, 0, 1);

        params.sgd_step(mu, r, 0, 1, a, b);

        for k in 0..2 {
            let u = before.user_factors()[(0, k)];
            let v = before.item_factors()[(1, k)];
            assert_relative_eq!(
                params.user_factors()[(0, k)],
                u - a * (-2.0 * e * v + b * u),
                epsilon = 1e-12
            );
            assert_relative_eq!(
                params.item_factors()[(1, k)],
                v - a * (-2.0 * e * u + b * v),
                epsilon = 1e-12
            );
        }
        assert_relative_eq!(
            params.user_biases()[0],
            0.1 - a * (-2.0 * e + b * 0.1),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            params.item_biases()[1],
            0.2 - a * (-2.0 * e + b * 0.2),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_squared_norm() {
        let params = small_parameters();
        let expected = (0.01 + 0.04 + 0.09 + 0.16)
            + (0.25 + 0.36 + 0.49 + 0.64 + 0.81 + 1.0)
            + (0.01 + 0.01)
            + (0.04 + 0.04);
        assert_relative_eq!(params.squared_norm(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_error_by_hand() {
        let values = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 0.0, 3.0]);
        let ratings = RatingMatrix::new(&values).unwrap();
        let params = small_parameters();
        let mu = ratings.global_mean();

        let e0 = 1.0 - params.predict(mu, 0, 0);
        let e1 = 3.0 - params.predict(mu, 1, 2);
        let expected = (e0 * e0 + e1 * e1 + 0.01 * params.squared_norm()).sqrt();

        assert_relative_eq!(params.error(&ratings, 0.02, false), expected, epsilon = 1e-12);
        assert_eq!(
            params.error(&ratings, 0.02, true).to_bits(),
            params.error(&ratings, 0.02, false).to_bits()
        );
    }

    #[test]
    fn test_parallel_squared_error_is_repeatable() {
        let values = DMatrix::from_fn(64, 48, |i, j| {
            if (i + j) % 3 == 0 {
                0.0
            } else {
                1.0 + ((i * j) % 5) as f64
            }
        });
        let ratings = RatingMatrix::new(&values).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let params = FactorParameters::<f64>::random(64, 48, 6, &mut rng);

        let sequential = params.squared_error(&ratings, false).to_bits();
        for _ in 0..200 {
            assert_eq!(params.squared_error(&ratings, true).to_bits(), sequential);
        }
    }
}
