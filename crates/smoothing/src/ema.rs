//! Exponential moving averages and their lag-compensated cascades.

use crate::Smoother;

/// One EMA step: blend `measurement` into `state` with weight `a`.
pub fn ema(a: f64, measurement: f64, state: f64) -> f64 {
    a * measurement + (1.0 - a) * state
}

/// Plain exponential moving average. Starts from zero.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    state: f64,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, state: 0.0 }
    }
}

impl Smoother for Ema {
    fn update(&mut self, measurement: f64, _dt: f64) -> f64 {
        self.state = ema(self.alpha, measurement, self.state);
        self.state
    }

    fn state(&self) -> f64 {
        self.state
    }
}

/// Double EMA: `2*ema - ema(ema)`.
///
/// Cancels the first-order lag of a plain EMA on ramps at the cost of a mild
/// overshoot on steps.
#[derive(Debug, Clone)]
pub struct DoubleEma {
    alpha: f64,
    ema: f64,
    ema_ema: f64,
    state: f64,
}

impl DoubleEma {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            ema: 0.0,
            ema_ema: 0.0,
            state: 0.0,
        }
    }
}

impl Smoother for DoubleEma {
    fn update(&mut self, measurement: f64, _dt: f64) -> f64 {
        self.ema = ema(self.alpha, measurement, self.ema);
        self.ema_ema = ema(self.alpha, self.ema, self.ema_ema);
        self.state = 2.0 * self.ema - self.ema_ema;
        self.state
    }

    fn state(&self) -> f64 {
        self.state
    }
}

/// Triple EMA: `3*e1 - 3*e2 + e3` over three cascaded averages.
#[derive(Debug, Clone)]
pub struct TripleEma {
    alpha: f64,
    ema: f64,
    ema_ema: f64,
    ema_ema_ema: f64,
    state: f64,
}

impl TripleEma {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            ema: 0.0,
            ema_ema: 0.0,
            ema_ema_ema: 0.0,
            state: 0.0,
        }
    }
}

impl Smoother for TripleEma {
    fn update(&mut self, measurement: f64, _dt: f64) -> f64 {
        self.ema = ema(self.alpha, measurement, self.ema);
        self.ema_ema = ema(self.alpha, self.ema, self.ema_ema);
        self.ema_ema_ema = ema(self.alpha, self.ema_ema, self.ema_ema_ema);
        self.state = 3.0 * self.ema - 3.0 * self.ema_ema + self.ema_ema_ema;
        self.state
    }

    fn state(&self) -> f64 {
        self.state
    }
}
