//! Landmark sets for tests of code built on top of this crate.

use crate::landmarks::{LandmarkSet, NORMALIZED_LANDMARKS};

/// Front-facing face with open eyes, centred irises and a closed mouth.
pub fn neutral_face() -> LandmarkSet {
    let mut n = vec![[0.5, 0.5, 0.0]; NORMALIZED_LANDMARKS];
    // left eye: width 0.10, height 0.04
    n[33] = [0.35, 0.40, 0.0];
    n[133] = [0.45, 0.40, 0.0];
    n[159] = [0.40, 0.38, 0.0];
    n[145] = [0.40, 0.42, 0.0];
    n[468] = [0.40, (0.40 + 0.40 + 0.38) / 3.0, 0.0];
    // right eye
    n[362] = [0.55, 0.40, 0.0];
    n[263] = [0.65, 0.40, 0.0];
    n[386] = [0.60, 0.38, 0.0];
    n[374] = [0.60, 0.42, 0.0];
    n[473] = [0.60, (0.40 + 0.40 + 0.38) / 3.0, 0.0];
    n[130] = [0.34, 0.40, 0.0];
    // closed mouth
    n[13] = [0.50, 0.70, 0.0];
    n[14] = [0.50, 0.70, 0.0];
    n[81] = [0.48, 0.69, 0.0];
    n[178] = [0.48, 0.69, 0.0];
    n[311] = [0.52, 0.69, 0.0];
    n[402] = [0.52, 0.69, 0.0];
    n[78] = [0.45, 0.70, 0.0];
    n[308] = [0.55, 0.70, 0.0];
    n[61] = [0.44, 0.70, 0.0];
    n[291] = [0.56, 0.70, 0.0];
    LandmarkSet::from_normalized(n, 640, 480)
}
