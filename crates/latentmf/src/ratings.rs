//! Borrowed view over an observed rating matrix.
//!
//! The rating matrix is owned by the caller. A cell holding exactly zero
//! marks a missing rating; every other value is an observation. Because
//! zero is the sentinel, a genuine zero rating cannot be represented.

use crate::{
    error::{FactorizationError, Result},
    types::{DMatrix, Scalar},
};
use num_traits::Float;

/// Read-only view over a rating matrix together with the statistics
/// derived from it once at construction.
///
/// # Derived data
///
/// - **mask**: `true` where the rating is nonzero
/// - **observed pairs**: row-major list of `(user, item)` coordinates of
///   the observed cells, used for uniform sampling during training
/// - **global mean**: arithmetic mean of the observed ratings
#[derive(Debug, Clone)]
pub struct RatingMatrix<'a, T: Scalar> {
    values: &'a DMatrix<T>,
    mask: DMatrix<bool>,
    observed: Vec<(usize, usize)>,
    global_mean: T,
}

impl<'a, T: Scalar> RatingMatrix<'a, T> {
    /// Wraps a rating matrix and computes its mask and global mean.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the matrix has no rows or columns,
    /// contains a NaN or infinite entry, or has no nonzero entry at all.
    pub fn new(values: &'a DMatrix<T>) -> Result<Self> {
        let (n_users, n_items) = values.shape();
        if n_users == 0 || n_items == 0 {
            return Err(FactorizationError::invalid_input(format!(
                "matrix of shape {n_users}x{n_items} has no cells"
            )));
        }

        let mut mask = DMatrix::from_element(n_users, n_items, false);
        let mut observed = Vec::new();
        let mut sum = T::zero();

        for user in 0..n_users {
            for item in 0..n_items {
                let rating = values[(user, item)];
                if !<T as Float>::is_finite(rating) {
                    return Err(FactorizationError::invalid_input(format!(
                        "non-finite rating {rating} at ({user}, {item})"
                    )));
                }
                if rating != T::zero() {
                    mask[(user, item)] = true;
                    observed.push((user, item));
                    sum = sum + rating;
                }
            }
        }

        if observed.is_empty() {
            return Err(FactorizationError::invalid_input(
                "no observed (nonzero) ratings, global mean is undefined",
            ));
        }

        let global_mean = sum / <T as Scalar>::from_usize(observed.len());
        log::trace!(
            "rating matrix {}x{}: {} observed, mean {}",
            n_users,
            n_items,
            observed.len(),
            global_mean
        );

        Ok(Self {
            values,
            mask,
            observed,
            global_mean,
        })
    }

    /// The underlying rating matrix.
    pub fn values(&self) -> &'a DMatrix<T> {
        self.values
    }

    /// Number of users (rows).
    pub fn n_users(&self) -> usize {
        self.values.nrows()
    }

    /// Number of items (columns).
    pub fn n_items(&self) -> usize {
        self.values.ncols()
    }

    /// Number of observed ratings.
    pub fn n_observed(&self) -> usize {
        self.observed.len()
    }

    /// Mean of the observed ratings.
    pub fn global_mean(&self) -> T {
        self.global_mean
    }

    /// Observed-mask, `true` where a rating exists.
    pub fn mask(&self) -> &DMatrix<bool> {
        &self.mask
    }

    /// Row-major coordinates of all observed ratings.
    pub fn observed_pairs(&self) -> &[(usize, usize)] {
        &self.observed
    }

    /// Whether `(user, item)` holds an observed rating.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn is_observed(&self, user: usize, item: usize) -> bool {
        self.mask[(user, item)]
    }

    /// Raw rating at `(user, item)`; zero when unobserved.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn rating(&self, user: usize, item: usize) -> T {
        self.values[(user, item)]
    }

    /// Verifies that `(user, item)` addresses a cell of the matrix.
    pub fn check_bounds(&self, user: usize, item: usize) -> Result<()> {
        if user >= self.n_users() {
            return Err(FactorizationError::user_out_of_range(user, self.n_users()));
        }
        if item >= self.n_items() {
            return Err(FactorizationError::item_out_of_range(item, self.n_items()));
        }
        Ok(())
    }
}
