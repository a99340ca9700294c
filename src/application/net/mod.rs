// Recurrent sequence model used by the volatility forecaster.

pub mod adam;
pub mod dense;
pub mod lstm;
pub mod model;

pub use model::{EpochStats, SequenceRegressor, TrainOptions};

use ndarray::{Array1, Array2, Axis};

/// Outer product of two column vectors, the shape every weight gradient
/// accumulation in this module takes.
pub(crate) fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let a2 = a.view().insert_axis(Axis(1));
    let b2 = b.view().insert_axis(Axis(0));
    a2.dot(&b2)
}
