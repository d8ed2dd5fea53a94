//! Discrete Kalman smoother over a 2-D position/velocity state.
//!
//! The model is fixed: transition `[[1, 1], [0, 1]]`, measurement `[[1, 1]]`,
//! process noise `0.1 * I` and measurement noise `0.1`. State and error
//! covariance start at zero. The model has no notion of elapsed time, so the
//! `dt` handed to [`Smoother::update`] is ignored.

use nalgebra::{Matrix2, RowVector2, Vector2};

use crate::Smoother;

const PROCESS_NOISE: f64 = 0.1;
const MEASUREMENT_NOISE: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct KalmanSmoother {
    /// `[position, velocity]` after the last correction.
    state: Vector2<f64>,
    /// Error covariance after the last correction.
    covariance: Matrix2<f64>,
    transition: Matrix2<f64>,
    observation: RowVector2<f64>,
    process_noise: Matrix2<f64>,
    measurement_noise: f64,
}

impl Default for KalmanSmoother {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanSmoother {
    pub fn new() -> Self {
        Self {
            state: Vector2::zeros(),
            covariance: Matrix2::zeros(),
            transition: Matrix2::new(1.0, 1.0, 0.0, 1.0),
            observation: RowVector2::new(1.0, 1.0),
            process_noise: Matrix2::identity() * PROCESS_NOISE,
            measurement_noise: MEASUREMENT_NOISE,
        }
    }

    pub fn velocity(&self) -> f64 {
        self.state[1]
    }

    fn predict(&mut self) {
        let f = self.transition;
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise;
    }

    fn correct(&mut self, measurement: f64) {
        let h = self.observation;
        let innovation = measurement - (h * self.state)[0];
        let innovation_cov = (h * self.covariance * h.transpose())[0] + self.measurement_noise;
        let gain: Vector2<f64> = self.covariance * h.transpose() / innovation_cov;

        self.state += gain * innovation;
        self.covariance = (Matrix2::identity() - gain * h) * self.covariance;
    }
}

impl Smoother for KalmanSmoother {
    fn update(&mut self, measurement: f64, _dt: f64) -> f64 {
        self.predict();
        self.correct(measurement);
        self.state[0]
    }

    fn state(&self) -> f64 {
        self.state[0]
    }
}
