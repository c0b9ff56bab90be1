//! Exponential inter-arrival delays for the cycle scheduler.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

/// Delay sampler whose mean grows with the cycle index: cycle `c` waits an
/// exponentially distributed delay with mean `lambda * c` milliseconds.
#[derive(Debug)]
pub struct PoissonArrivals {
    lambda_ms: f64,
    rng: Mutex<StdRng>,
}

impl PoissonArrivals {
    pub fn new(lambda_ms: f64) -> Self {
        Self {
            lambda_ms,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(lambda_ms: f64, seed: u64) -> Self {
        Self {
            lambda_ms,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn lambda_ms(&self) -> f64 {
        self.lambda_ms
    }

    pub fn mean_for(&self, cycle: u32) -> f64 {
        self.lambda_ms * f64::from(cycle)
    }

    pub fn sample_delay(&self, cycle: u32) -> Duration {
        let mean_ms = self.mean_for(cycle);
        if !(mean_ms > 0.0) {
            return Duration::ZERO;
        }
        let u = match self.rng.lock() {
            Ok(mut rng) => rng.gen::<f64>(),
            Err(poisoned) => poisoned.into_inner().gen::<f64>(),
        };
        let u = u.clamp(f64::MIN_POSITIVE, 1.0);
        Duration::from_secs_f64(-u.ln() * mean_ms / 1_000.0)
    }
}
