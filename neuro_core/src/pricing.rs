use crate::balance::Stars;

/// Stars charged per training step unless configured otherwise.
pub const DEFAULT_STEP_RATE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub stars_per_step: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            stars_per_step: DEFAULT_STEP_RATE,
        }
    }
}

impl Pricing {
    pub fn new(stars_per_step: f64) -> Self {
        Self { stars_per_step }
    }

    /// Cost of a training run, rounded up to whole stars.
    pub fn training_cost(&self, steps: u32) -> Stars {
        let rate = if self.stars_per_step.is_finite() && self.stars_per_step > 0.0 {
            self.stars_per_step
        } else {
            DEFAULT_STEP_RATE
        };
        Stars((f64::from(steps) * rate).ceil() as i64)
    }
}
