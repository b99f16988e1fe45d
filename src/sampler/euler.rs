//! Flow-matching Euler sampler.
//!
//! The denoiser predicts the velocity `v = noise − x0`, so integrating from
//! σ = 1 down to σ = 0:
//!
//! ```text
//! σ_i    = shift(1 − i / steps),  i = 0..=steps
//! x_next = x + (σ_{i+1} − σ_i) · v
//! ```
//!
//! `shift(σ) = s·σ / (1 + (s − 1)·σ)` keeps both endpoints fixed and spends more
//! steps at high noise for `s > 1`.

use candle_core::Tensor;

use super::{Denoiser, Sampler, check_steps, timestep};
use crate::Result;

#[derive(Debug, Clone, Copy)]
pub struct FlowEulerSampler {
    shift: f64,
}

impl Default for FlowEulerSampler {
    fn default() -> Self {
        Self { shift: 1.0 }
    }
}

impl FlowEulerSampler {
    pub fn new(shift: f64) -> Self {
        Self { shift }
    }

    /// `σ' = shift * σ / (1 + (shift - 1) * σ)`
    pub fn shift_sigma(&self, sigma: f64) -> f64 {
        self.shift * sigma / (1.0 + (self.shift - 1.0) * sigma)
    }

    /// `steps + 1` sigmas from 1 to exactly 0.
    pub fn sigmas(&self, steps: usize) -> Vec<f64> {
        (0..=steps)
            .map(|i| self.shift_sigma(1.0 - i as f64 / steps as f64))
            .collect()
    }
}

impl Sampler for FlowEulerSampler {
    fn sample(
        &self,
        denoiser: &dyn Denoiser,
        noise: &Tensor,
        steps: usize,
        eta: f64,
        cond: &Tensor,
    ) -> Result<Tensor> {
        check_steps(steps)?;
        if eta != 0.0 {
            tracing::debug!(eta, "flow euler sampler is deterministic, ignoring eta");
        }
        let sigmas = self.sigmas(steps);
        let mut x = noise.clone();
        for (i, pair) in sigmas.windows(2).enumerate() {
            let (sigma, sigma_next) = (pair[0], pair[1]);
            let v = denoiser.forward(&x, &timestep(sigma, &x)?, cond)?;
            x = (x + (v * (sigma_next - sigma))?)?;
            tracing::trace!(step = i, sigma, sigma_next, "euler step");
        }
        Ok(x)
    }
}
