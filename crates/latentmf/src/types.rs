//! Type definitions and aliases for latent factor models.
//!
//! This module provides the scalar trait shared by every model type,
//! matrix and vector aliases, and the default hyperparameters.

use nalgebra::{Dyn, OMatrix, OVector, RealField, Scalar as NalgebraScalar};
use num_traits::{Float, FromPrimitive};
use rand::Rng;
use std::fmt::{Debug, Display};

/// Trait for scalar types used by factor models (f32 or f64).
///
/// This trait combines all the numeric traits needed by the SGD update,
/// the error evaluation and the parallel reductions.
pub trait Scalar:
    NalgebraScalar
    + RealField
    + Float
    + FromPrimitive
    + Display
    + Debug
    + Default
    + Copy
    + Send
    + Sync
    + 'static
{
    /// Default SGD learning rate.
    const DEFAULT_LEARNING_RATE: Self;

    /// Default regularization strength.
    const DEFAULT_REGULARIZATION: Self;

    /// Default absolute tolerance between two successive error checks.
    const DEFAULT_TOLERANCE: Self;

    /// Draw a value uniformly from `[0, 1)` at this type's native precision.
    fn sample_unit<R: Rng + ?Sized>(rng: &mut R) -> Self;

    /// Numeric constant of the model formulas, e.g. `2` in the gradient.
    ///
    /// # Panics
    ///
    /// Panics if `v` has no representation in `Self`, which cannot happen
    /// for the finite constants used by this crate.
    fn from_f64(v: f64) -> Self {
        <Self as FromPrimitive>::from_f64(v).expect("constant representable as float")
    }

    /// Observation count as a scalar, for averages.
    fn from_usize(v: usize) -> Self {
        <Self as FromPrimitive>::from_usize(v).expect("count representable as float")
    }
}

impl Scalar for f32 {
    const DEFAULT_LEARNING_RATE: Self = 2e-4;
    const DEFAULT_REGULARIZATION: Self = 0.02;
    const DEFAULT_TOLERANCE: Self = 1.0;

    fn sample_unit<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.gen()
    }
}

impl Scalar for f64 {
    const DEFAULT_LEARNING_RATE: Self = 2e-4;
    const DEFAULT_REGULARIZATION: Self = 0.02;
    const DEFAULT_TOLERANCE: Self = 1.0;

    fn sample_unit<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.gen()
    }
}

/// Type alias for a dynamically-sized matrix.
pub type DMatrix<T> = OMatrix<T, Dyn, Dyn>;

/// Type alias for a dynamically-sized vector.
pub type DVector<T> = OVector<T, Dyn>;

/// Default number of SGD steps before training gives up.
pub const DEFAULT_MAX_ITERATIONS: usize = 2_000_000;

/// Default number of SGD steps between two full error evaluations.
pub const DEFAULT_CHECK_INTERVAL: usize = 1000;
