//! Latent bottlenecks applied between the encoder and the decoder.
//!
//! A bottleneck may reshape or regularise the latents on the way in and undo
//! that on the way out. Auxiliary values (e.g. the VAE KL term) are returned in
//! a [`BottleneckInfo`] map.

use std::collections::BTreeMap;
use std::fmt::Debug;

use candle_core::Tensor;

use crate::{Error, Result};

/// Named auxiliary tensors produced by [`Bottleneck::encode`].
pub type BottleneckInfo = BTreeMap<String, Tensor>;

pub trait Bottleneck: Debug + Send + Sync {
    fn encode(&self, latents: &Tensor) -> Result<(Tensor, BottleneckInfo)>;
    fn decode(&self, latents: &Tensor) -> Result<Tensor>;
}

/// `tanh` squashing, no info.
#[derive(Debug, Clone, Copy, Default)]
pub struct TanhBottleneck;

impl Bottleneck for TanhBottleneck {
    fn encode(&self, latents: &Tensor) -> Result<(Tensor, BottleneckInfo)> {
        Ok((latents.tanh()?, BottleneckInfo::new()))
    }

    fn decode(&self, latents: &Tensor) -> Result<Tensor> {
        Ok(latents.clone())
    }
}

// ---------------------------------------------------------------------------
// VAE
// ---------------------------------------------------------------------------

/// Reparameterised Gaussian bottleneck.
///
/// The incoming channels are split in half into `mean` and `scale`;
/// `std = softplus(scale) + 1e-4` and the sample is `mean + std * eps`.
/// The encoder therefore has to emit twice the model's latent width.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaeBottleneck;

fn softplus(xs: &Tensor) -> candle_core::Result<Tensor> {
    // log(1 + e^x) = max(x, 0) + log(1 + e^-|x|)
    let tail = (xs.abs()?.neg()?.exp()? + 1.0)?.log()?;
    xs.relu()? + tail
}

impl VaeBottleneck {
    /// Returns `(latents, kl)`.
    pub fn sample(mean: &Tensor, scale: &Tensor) -> Result<(Tensor, Tensor)> {
        let stdev = (softplus(scale)? + 1e-4)?;
        let var = stdev.sqr()?;
        let logvar = var.log()?;
        let eps = mean.randn_like(0.0, 1.0)?;
        let latents = (eps * &stdev)?.add(mean)?;

        let kl = ((mean.sqr()? + &var)? - logvar)?
            .affine(1.0, -1.0)?
            .sum(1)?
            .mean_all()?;
        Ok((latents, kl))
    }
}

impl Bottleneck for VaeBottleneck {
    fn encode(&self, latents: &Tensor) -> Result<(Tensor, BottleneckInfo)> {
        let channels = latents.dim(1)?;
        if channels % 2 != 0 {
            return Err(Error::Contract(format!(
                "vae bottleneck needs an even channel count (mean and scale halves), got {channels}"
            )));
        }
        let half = channels / 2;
        let mean = latents.narrow(1, 0, half)?;
        let scale = latents.narrow(1, half, half)?;
        let (sampled, kl) = Self::sample(&mean, &scale)?;

        let mut info = BottleneckInfo::new();
        info.insert("kl".to_string(), kl);
        Ok((sampled, info))
    }

    fn decode(&self, latents: &Tensor) -> Result<Tensor> {
        Ok(latents.clone())
    }
}

// ---------------------------------------------------------------------------
// L2 normalisation
// ---------------------------------------------------------------------------

/// Projects every latent frame onto the unit sphere along the channel axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct L2NormBottleneck;

impl Bottleneck for L2NormBottleneck {
    fn encode(&self, latents: &Tensor) -> Result<(Tensor, BottleneckInfo)> {
        let norm = latents
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .clamp(1e-12, f64::INFINITY)?;
        Ok((latents.broadcast_div(&norm)?, BottleneckInfo::new()))
    }

    fn decode(&self, latents: &Tensor) -> Result<Tensor> {
        Ok(latents.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn tanh_bounds_latents() {
        let dev = Device::Cpu;
        let xs = (Tensor::randn(0f32, 1.0, (2, 4, 8), &dev).unwrap() * 10.0).unwrap();
        let (ys, info) = TanhBottleneck.encode(&xs).unwrap();
        assert!(info.is_empty());
        let max: f32 = ys.abs().unwrap().max_all().unwrap().to_scalar().unwrap();
        assert!(max <= 1.0);
    }

    #[test]
    fn vae_halves_channels_and_reports_kl() {
        let dev = Device::Cpu;
        let xs = Tensor::randn(0f32, 1.0, (2, 8, 5), &dev).unwrap();
        let (ys, info) = VaeBottleneck.encode(&xs).unwrap();
        assert_eq!(ys.dims(), &[2, 4, 5]);
        let kl = info.get("kl").unwrap();
        assert_eq!(kl.rank(), 0);
        let kl: f32 = kl.to_scalar().unwrap();
        assert!(kl.is_finite() && kl >= 0.0);
    }

    #[test]
    fn vae_kl_matches_closed_form() {
        let dev = Device::Cpu;
        let mean = Tensor::full(1f32, (1, 2, 3), &dev).unwrap();
        // softplus(0) = ln 2
        let scale = Tensor::zeros((1, 2, 3), DType::F32, &dev).unwrap();
        let (_, kl) = VaeBottleneck::sample(&mean, &scale).unwrap();
        let std = 2f32.ln() + 1e-4;
        let var = std * std;
        let per_element = 1.0 + var - var.ln() - 1.0;
        let expected = 2.0 * per_element;
        let kl: f32 = kl.to_scalar().unwrap();
        assert!((kl - expected).abs() < 1e-4, "{kl} vs {expected}");
    }

    #[test]
    fn vae_rejects_odd_channels() {
        let dev = Device::Cpu;
        let xs = Tensor::zeros((1, 3, 4), DType::F32, &dev).unwrap();
        assert!(matches!(VaeBottleneck.encode(&xs), Err(Error::Contract(_))));
    }

    #[test]
    fn softplus_is_stable_for_large_inputs() {
        let dev = Device::Cpu;
        let xs = Tensor::new(&[-100f32, 0.0, 100.0], &dev).unwrap();
        let ys: Vec<f32> = softplus(&xs).unwrap().to_vec1().unwrap();
        assert!(ys[0] >= 0.0 && ys[0] < 1e-6);
        assert!((ys[1] - 2f32.ln()).abs() < 1e-6);
        assert!((ys[2] - 100.0).abs() < 1e-4);
    }

    #[test]
    fn l2_norm_gives_unit_frames() {
        let dev = Device::Cpu;
        let xs = Tensor::randn(0f32, 1.0, (1, 6, 7), &dev).unwrap();
        let (ys, _) = L2NormBottleneck.encode(&xs).unwrap();
        let norms: Vec<f32> = ys
            .sqr()
            .unwrap()
            .sum(1)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        for n in norms {
            assert!((n - 1.0).abs() < 1e-5);
        }
    }
}
