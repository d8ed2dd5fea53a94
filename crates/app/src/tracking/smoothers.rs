use face_core::{FeatureSample, IrisRatio, MouthShape, PoseEstimate};
use smoothing::{Smoother, SmootherError, SmootherSpec};

use super::{config::SmoothingConfig, data::TrackedState};

type Filter = Box<dyn Smoother>;

/// The per-signal filters of the processing stage.
///
/// Filters are only updated with real measurements; between faces the bank
/// simply holds its state.
pub struct SmootherBank {
    head_rotation: [Filter; 3],
    head_translation: [Filter; 3],
    /// Width, then openness.
    mouth: [Filter; 2],
    left_iris: [Filter; 2],
    right_iris: [Filter; 2],
    eye: [Filter; 2],
}

fn filters<const N: usize>(spec: &SmootherSpec) -> Result<[Filter; N], SmootherError> {
    spec.validate()?;
    Ok(std::array::from_fn(|_| spec.instantiate()))
}

fn feed<const N: usize>(filters: &mut [Filter; N], values: [f64; N], dt: f64) -> [f64; N] {
    let mut out = [0.0; N];
    for ((filter, value), slot) in filters.iter_mut().zip(values).zip(out.iter_mut()) {
        *slot = filter.update(value, dt);
    }
    out
}

fn read<const N: usize>(filters: &[Filter; N]) -> [f64; N] {
    std::array::from_fn(|i| filters[i].state())
}

impl SmootherBank {
    pub fn new(config: &SmoothingConfig) -> Result<Self, SmootherError> {
        Ok(Self {
            head_rotation: filters(&config.head_rotation)?,
            head_translation: filters(&config.head_translation)?,
            mouth: filters(&config.mouth)?,
            left_iris: filters(&config.iris)?,
            right_iris: filters(&config.iris)?,
            eye: filters(&config.eye)?,
        })
    }

    /// Feed one face's measurements and return the smoothed values.
    pub fn update(&mut self, pose: &PoseEstimate, sample: &FeatureSample, dt: f64) -> TrackedState {
        let head_rotation = feed(&mut self.head_rotation, pose.rotation(), dt);
        let head_translation = feed(&mut self.head_translation, pose.translation, dt);
        let [width, open] = feed(
            &mut self.mouth,
            [sample.mouth.width, sample.mouth.open],
            dt,
        );
        let left = sample.left_eye.iris;
        let right = sample.right_eye.iris;
        let [lx, ly] = feed(&mut self.left_iris, [left.x, left.y], dt);
        let [rx, ry] = feed(&mut self.right_iris, [right.x, right.y], dt);
        let eye_openness = feed(
            &mut self.eye,
            [sample.left_eye.openness, sample.right_eye.openness],
            dt,
        );

        TrackedState {
            head_rotation,
            head_translation,
            mouth: MouthShape { width, open },
            left_iris: IrisRatio::new(lx, ly),
            right_iris: IrisRatio::new(rx, ry),
            eye_openness,
        }
    }

    /// Current filter states without feeding a measurement.
    pub fn state(&self) -> TrackedState {
        let [width, open] = read(&self.mouth);
        let [lx, ly] = read(&self.left_iris);
        let [rx, ry] = read(&self.right_iris);
        TrackedState {
            head_rotation: read(&self.head_rotation),
            head_translation: read(&self.head_translation),
            mouth: MouthShape { width, open },
            left_iris: IrisRatio::new(lx, ly),
            right_iris: IrisRatio::new(rx, ry),
            eye_openness: read(&self.eye),
        }
    }
}

#[cfg(test)]
mod tests {
    use face_core::EyeState;

    use super::*;

    fn sample(value: f64) -> FeatureSample {
        let eye = EyeState {
            iris: IrisRatio::new(value, -value),
            aspect_ratio: 2.0,
            openness: 1.0,
        };
        FeatureSample {
            mouth: MouthShape {
                width: value,
                open: value,
            },
            left_eye: eye,
            right_eye: eye,
        }
    }

    fn pose(value: f64) -> PoseEstimate {
        PoseEstimate {
            pitch: value,
            yaw: value,
            roll: value,
            translation: [value; 3],
        }
    }

    #[test]
    fn starts_at_zero() {
        let bank = SmootherBank::new(&SmoothingConfig::default()).unwrap();
        assert_eq!(bank.state(), TrackedState::default());
    }

    #[test]
    fn update_matches_state_and_converges() {
        let mut bank = SmootherBank::new(&SmoothingConfig::default()).unwrap();
        let mut last = TrackedState::default();
        for _ in 0..400 {
            last = bank.update(&pose(10.0), &sample(0.5), 1.0 / 30.0);
        }
        assert_eq!(last, bank.state());
        assert!((last.head_rotation[1] - 10.0).abs() < 1e-3);
        assert!((last.head_translation[2] - 10.0).abs() < 1e-3);
        assert!((last.mouth.open - 0.5).abs() < 1e-3);
        assert!((last.left_iris.y + 0.5).abs() < 1e-3);
        assert!((last.eye_openness[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn iris_filters_lag_head_filters() {
        let mut bank = SmootherBank::new(&SmoothingConfig::default()).unwrap();
        let state = bank.update(&pose(1.0), &sample(1.0), 1.0 / 30.0);
        assert!(state.left_iris.x < state.head_rotation[0]);
        assert_eq!(state.left_iris.x, state.right_iris.x);
    }

    #[test]
    fn invalid_spec_is_rejected() {
        let config = SmoothingConfig {
            eye: SmootherSpec::Ema { alpha: 1.5 },
            ..SmoothingConfig::default()
        };
        assert!(SmootherBank::new(&config).is_err());
    }
}
