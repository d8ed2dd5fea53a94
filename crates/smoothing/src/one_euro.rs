//! One-Euro filter (Casiez et al.): a low-pass whose cutoff rises with the
//! speed of the signal, trading jitter at rest for low lag in motion.

use std::f64::consts::PI;

use crate::Smoother;

fn smoothing_factor(dt: f64, cutoff: f64) -> f64 {
    let r = 2.0 * PI * cutoff * dt;
    r / (r + 1.0)
}

#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    x_prev: Option<f64>,
    dx_prev: f64,
}

impl OneEuroFilter {
    pub fn new(min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            x_prev: None,
            dx_prev: 0.0,
        }
    }

    /// Cutoff frequency the filter would use for the current derivative estimate.
    pub fn current_cutoff(&self) -> f64 {
        self.min_cutoff + self.beta * self.dx_prev.abs()
    }
}

impl Smoother for OneEuroFilter {
    fn update(&mut self, measurement: f64, dt: f64) -> f64 {
        let Some(x_prev) = self.x_prev else {
            self.x_prev = Some(measurement);
            return measurement;
        };
        // The derivative is undefined without elapsed time; hold the output.
        if dt <= 0.0 || !dt.is_finite() {
            return x_prev;
        }

        let dx = (measurement - x_prev) / dt;
        let dx_hat = self.dx_prev + smoothing_factor(dt, self.d_cutoff) * (dx - self.dx_prev);
        self.dx_prev = dx_hat;

        let cutoff = self.min_cutoff + self.beta * dx_hat.abs();
        let x_hat = x_prev + smoothing_factor(dt, cutoff) * (measurement - x_prev);
        self.x_prev = Some(x_hat);
        x_hat
    }

    fn state(&self) -> f64 {
        self.x_prev.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dt_does_not_divide() {
        let mut filter = OneEuroFilter::new(1.0, 0.5, 1.0);
        filter.update(1.0, 1.0 / 30.0);
        let held = filter.update(50.0, 0.0);
        assert!(held.is_finite());
        assert_eq!(held, 1.0);
        assert!(filter.update(50.0, -1.0).is_finite());
        assert!(filter.update(50.0, f64::NAN).is_finite());
    }

    #[test]
    fn first_sample_seeds_state_even_without_dt() {
        let mut filter = OneEuroFilter::new(1.0, 0.0, 1.0);
        assert_eq!(filter.update(3.5, 0.0), 3.5);
        assert_eq!(filter.state(), 3.5);
    }

    #[test]
    fn static_input_converges_and_holds() {
        let mut filter = OneEuroFilter::new(1.0, 0.1, 1.0);
        filter.update(0.0, 1.0 / 30.0);
        for _ in 0..300 {
            filter.update(2.0, 1.0 / 30.0);
        }
        let settled = filter.state();
        assert!((settled - 2.0).abs() < 1e-6);
        for _ in 0..300 {
            filter.update(2.0, 1.0 / 30.0);
        }
        assert!((filter.state() - settled).abs() < 1e-9);
    }

    #[test]
    fn fast_motion_raises_cutoff() {
        let mut filter = OneEuroFilter::new(1.0, 0.5, 1.0);
        filter.update(0.0, 0.01);
        for step in 1..20 {
            filter.update(step as f64 * 10.0, 0.01);
        }
        assert!(filter.current_cutoff() > 1.0);
    }
}
