//! v-objective DDIM sampler.
//!
//! ```text
//! t_i      = linspace(1, 0, steps + 1)[i],  i < steps
//! α_i, σ_i = cos(t_i·π/2), sin(t_i·π/2)
//! pred     = x·α_i − v·σ_i
//! eps      = x·σ_i + v·α_i
//! x        = pred·α_{i+1} + eps·√(σ_{i+1}² − σ_ddim²) + σ_ddim·z
//! σ_ddim   = η · √(σ_{i+1}² / σ_i²) · √(1 − α_i² / α_{i+1}²)
//! ```
//!
//! The last step returns `pred` directly, i.e. the estimate at noise level zero.

use std::f64::consts::FRAC_PI_2;

use candle_core::Tensor;

use super::{Denoiser, Sampler, check_steps, timestep};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct VDdimSampler;

impl VDdimSampler {
    /// Noise levels visited by a run of `steps` updates.
    pub fn schedule(steps: usize) -> Vec<f64> {
        (0..steps)
            .map(|i| 1.0 - i as f64 / steps as f64)
            .collect()
    }

    fn alpha_sigma(t: f64) -> (f64, f64) {
        ((t * FRAC_PI_2).cos(), (t * FRAC_PI_2).sin())
    }
}

impl Sampler for VDdimSampler {
    fn sample(
        &self,
        denoiser: &dyn Denoiser,
        noise: &Tensor,
        steps: usize,
        eta: f64,
        cond: &Tensor,
    ) -> Result<Tensor> {
        check_steps(steps)?;
        if !(0.0..=1.0).contains(&eta) {
            return Err(Error::Contract(format!("ddim eta must be within [0, 1], got {eta}")));
        }
        let ts = Self::schedule(steps);
        let mut x = noise.clone();
        let mut pred = noise.clone();

        for (i, &t) in ts.iter().enumerate() {
            let (alpha, sigma) = Self::alpha_sigma(t);
            let v = denoiser.forward(&x, &timestep(t, &x)?, cond)?;
            pred = ((&x * alpha)? - (&v * sigma)?)?;
            tracing::trace!(step = i, t, alpha, sigma, "ddim step");

            let Some(&t_next) = ts.get(i + 1) else {
                break;
            };
            let eps = ((&x * sigma)? + (&v * alpha)?)?;
            let (alpha_next, sigma_next) = Self::alpha_sigma(t_next);
            let ddim_sigma = eta
                * (sigma_next.powi(2) / sigma.powi(2)).sqrt()
                * (1.0 - alpha.powi(2) / alpha_next.powi(2)).sqrt();
            // Equal at eta = 1 and t = 1; clamp rounding below zero.
            let adjusted_sigma = (sigma_next.powi(2) - ddim_sigma.powi(2)).max(0.0).sqrt();

            x = ((&pred * alpha_next)? + (&eps * adjusted_sigma)?)?;
            if eta > 0.0 {
                let z = x.randn_like(0.0, 1.0)?;
                x = (x + (z * ddim_sigma)?)?;
            }
        }
        Ok(pred)
    }
}
