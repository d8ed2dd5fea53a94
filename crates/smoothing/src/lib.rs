//! Causal scalar smoothing filters used to condition tracking signals.
//!
//! Every filter implements [`Smoother`], consuming one measurement and the
//! elapsed time since the previous one. The filters differ in their lag/noise
//! trade-off:
//! - `ema`: single, double and triple exponential moving averages.
//! - `one_euro`: adaptive low-pass whose cutoff follows signal speed.
//! - `kalman`: fixed-matrix position/velocity Kalman filter.
//! - `spec`: serde-friendly descriptions used by configuration files.

pub mod ema;
pub mod kalman;
pub mod one_euro;
pub mod spec;

pub use ema::{DoubleEma, Ema, TripleEma, ema};
pub use kalman::KalmanSmoother;
pub use one_euro::OneEuroFilter;
pub use spec::{SmootherError, SmootherSpec};

/// A stateful filter over a single scalar channel.
///
/// `update` folds the measurement into the filter and returns the new output,
/// which is also available afterwards through `state`. When no measurement
/// arrives the caller simply does not call `update`; the filter keeps
/// reporting its last output.
pub trait Smoother: Send {
    fn update(&mut self, measurement: f64, dt: f64) -> f64;

    fn state(&self) -> f64;
}

impl<S: Smoother + ?Sized> Smoother for Box<S> {
    fn update(&mut self, measurement: f64, dt: f64) -> f64 {
        (**self).update(measurement, dt)
    }

    fn state(&self) -> f64 {
        (**self).state()
    }
}
