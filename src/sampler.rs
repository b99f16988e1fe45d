//! Iterative denoising samplers for the diffusion decode path.
//!
//! Two samplers share one contract: start from a noise tensor, call the
//! denoiser once per step with the current noise level, and return an estimate
//! at noise level zero.
//!
//! - [`ddim`]: v-objective DDIM on a cosine schedule (`alpha = cos(t·π/2)`)
//! - [`euler`]: flow-matching Euler on a shifted linear sigma schedule
//!
//! `t` is passed to the denoiser as a `[batch]` tensor in `[0, 1]`.

pub mod ddim;
pub mod euler;

use std::fmt::Debug;
use std::sync::Arc;

use candle_core::{DType, Device, Shape, Tensor};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::config::SamplerConfig;
use crate::{Error, Result};

pub use ddim::VDdimSampler;
pub use euler::FlowEulerSampler;

/// Predicts the denoising target for `xs` at noise level `t`, given `cond`.
pub trait Denoiser: Debug + Send + Sync {
    fn forward(&self, xs: &Tensor, t: &Tensor, cond: &Tensor) -> Result<Tensor>;
}

pub trait Sampler: Debug + Send + Sync {
    /// Run `steps` denoising updates starting from `noise`.
    ///
    /// `eta` controls the stochasticity of each update; `0.0` is deterministic.
    fn sample(
        &self,
        denoiser: &dyn Denoiser,
        noise: &Tensor,
        steps: usize,
        eta: f64,
        cond: &Tensor,
    ) -> Result<Tensor>;
}

/// Build the sampler selected by the model config.
pub fn from_config(cfg: &SamplerConfig) -> Arc<dyn Sampler> {
    match *cfg {
        SamplerConfig::VDdim => Arc::new(VDdimSampler),
        SamplerConfig::FlowEuler { shift } => Arc::new(FlowEulerSampler::new(shift)),
    }
}

pub(crate) fn check_steps(steps: usize) -> Result<()> {
    if steps == 0 {
        return Err(Error::Contract("sampler needs at least one step".into()));
    }
    Ok(())
}

/// `[batch]` tensor filled with `t`.
pub(crate) fn timestep(t: f64, xs: &Tensor) -> Result<Tensor> {
    let batch = xs.dim(0)?;
    Ok(Tensor::full(t as f32, batch, xs.device())?.to_dtype(xs.dtype())?)
}

/// Standard normal noise. A `seed` makes the draw reproducible across runs and
/// devices; without one the device RNG is used.
pub fn gaussian_noise(
    shape: impl Into<Shape>,
    seed: Option<u64>,
    dtype: DType,
    device: &Device,
) -> Result<Tensor> {
    let shape = shape.into();
    let noise = match seed {
        Some(seed) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let data: Vec<f32> = (0..shape.elem_count())
                .map(|_| rng.sample(StandardNormal))
                .collect();
            Tensor::from_vec(data, shape, device)?
        }
        None => Tensor::randn(0f32, 1.0, shape, device)?,
    };
    Ok(noise.to_dtype(dtype)?)
}
