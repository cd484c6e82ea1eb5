//! Price increase draws

use rand::rngs::{StdRng, ThreadRng};
use rand::{Rng, SeedableRng};

use super::units::round2;

/// Source of increase percentages, one draw per modified price
pub trait IncreaseSource {
    /// Draw a percentage in `[min, max]`
    fn next_percent(&mut self, min: f64, max: f64) -> f64;
}

impl<S: IncreaseSource + ?Sized> IncreaseSource for &mut S {
    fn next_percent(&mut self, min: f64, max: f64) -> f64 {
        (**self).next_percent(min, max)
    }
}

impl<S: IncreaseSource + ?Sized> IncreaseSource for Box<S> {
    fn next_percent(&mut self, min: f64, max: f64) -> f64 {
        (**self).next_percent(min, max)
    }
}

/// Uniform draws from a random number generator
#[derive(Debug, Clone)]
pub struct RandomIncrease<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomIncrease<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomIncrease<ThreadRng> {
    /// Draws from the thread-local generator
    pub fn from_entropy() -> Self {
        Self::new(rand::thread_rng())
    }
}

impl RandomIncrease<StdRng> {
    /// Reproducible draws
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> IncreaseSource for RandomIncrease<R> {
    fn next_percent(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }
}

/// Cycles through a fixed list of percentages, clamped to the requested range
#[derive(Debug, Clone)]
pub struct FixedIncrease {
    percents: Vec<f64>,
    next: usize,
}

impl FixedIncrease {
    pub fn new(percents: impl Into<Vec<f64>>) -> Self {
        Self {
            percents: percents.into(),
            next: 0,
        }
    }

    /// Always the same percentage
    pub fn constant(percent: f64) -> Self {
        Self::new(vec![percent])
    }
}

impl IncreaseSource for FixedIncrease {
    fn next_percent(&mut self, min: f64, max: f64) -> f64 {
        if self.percents.is_empty() {
            return min;
        }
        let percent = self.percents[self.next % self.percents.len()];
        self.next += 1;
        percent.max(min).min(max.max(min))
    }
}

/// Apply `percent` to `price`, rounded to two decimals
pub fn apply_increase(price: f64, percent: f64) -> f64 {
    round2(price * (1.0 + percent / 100.0))
}
