//! Seeded Gaussian deviates.
//!
//! Every random draw in the completeness engine comes from here so that a
//! given seed always reproduces the same array regardless of thread count.
//! The generator is ChaCha8, whose stream is stable across platforms and
//! crate versions.

use ndarray::{Array, Array1, Dimension, ShapeBuilder};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Fill an array of the given shape with N(0, 1) draws from `seed`.
///
/// Values are drawn in row-major (logical) order.
pub fn standard_normal<Sh, D>(shape: Sh, seed: u64) -> Array<f64, D>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
{
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array::from_shape_simple_fn(shape, || StandardNormal.sample(&mut rng))
}

/// 1D convenience wrapper around [`standard_normal`].
pub fn standard_normal_1d(len: usize, seed: u64) -> Array1<f64> {
    standard_normal(len, seed)
}
