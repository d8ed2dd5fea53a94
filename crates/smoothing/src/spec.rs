//! Declarative filter descriptions, deserialized from configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DoubleEma, Ema, KalmanSmoother, OneEuroFilter, Smoother, TripleEma};

#[derive(Debug, Error, PartialEq)]
pub enum SmootherError {
    #[error("smoothing coefficient must be in (0, 1], got {0}")]
    Alpha(f64),
    #[error("{name} must be a positive, finite frequency, got {value}")]
    Cutoff { name: &'static str, value: f64 },
    #[error("beta must be non-negative, got {0}")]
    Beta(f64),
}

/// Which filter to run on a channel, with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SmootherSpec {
    Ema {
        alpha: f64,
    },
    Dema {
        alpha: f64,
    },
    Tema {
        alpha: f64,
    },
    OneEuro {
        min_cutoff: f64,
        beta: f64,
        #[serde(default = "default_d_cutoff")]
        d_cutoff: f64,
    },
    Kalman,
}

fn default_d_cutoff() -> f64 {
    1.0
}

impl SmootherSpec {
    pub fn validate(&self) -> Result<(), SmootherError> {
        match *self {
            SmootherSpec::Ema { alpha }
            | SmootherSpec::Dema { alpha }
            | SmootherSpec::Tema { alpha } => {
                if !(alpha > 0.0 && alpha <= 1.0) {
                    return Err(SmootherError::Alpha(alpha));
                }
            }
            SmootherSpec::OneEuro {
                min_cutoff,
                beta,
                d_cutoff,
            } => {
                for (name, value) in [("min_cutoff", min_cutoff), ("d_cutoff", d_cutoff)] {
                    if !(value > 0.0 && value.is_finite()) {
                        return Err(SmootherError::Cutoff { name, value });
                    }
                }
                if !(beta >= 0.0 && beta.is_finite()) {
                    return Err(SmootherError::Beta(beta));
                }
            }
            SmootherSpec::Kalman => {}
        }
        Ok(())
    }

    /// Validate the parameters and construct a fresh filter.
    pub fn build(&self) -> Result<Box<dyn Smoother>, SmootherError> {
        self.validate()?;
        Ok(self.instantiate())
    }

    /// Construct a fresh filter without checking the parameters.
    ///
    /// Call [`SmootherSpec::validate`] once before stamping out many filters.
    pub fn instantiate(&self) -> Box<dyn Smoother> {
        match *self {
            SmootherSpec::Ema { alpha } => Box::new(Ema::new(alpha)),
            SmootherSpec::Dema { alpha } => Box::new(DoubleEma::new(alpha)),
            SmootherSpec::Tema { alpha } => Box::new(TripleEma::new(alpha)),
            SmootherSpec::OneEuro {
                min_cutoff,
                beta,
                d_cutoff,
            } => Box::new(OneEuroFilter::new(min_cutoff, beta, d_cutoff)),
            SmootherSpec::Kalman => Box::new(KalmanSmoother::new()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SmootherSpec::Ema { .. } => "ema",
            SmootherSpec::Dema { .. } => "dema",
            SmootherSpec::Tema { .. } => "tema",
            SmootherSpec::OneEuro { .. } => "one_euro",
            SmootherSpec::Kalman => "kalman",
        }
    }
}
