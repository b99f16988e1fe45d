//! Outer transforms applied around the core encoder and decoder.
//!
//! Each pretransform declares whether gradients may flow through it
//! ([`Pretransform::enable_grad`]); the autoencoder enforces that policy with
//! [`crate::grad::scoped`].

use std::fmt::Debug;
use std::sync::Arc;

use candle_core::Tensor;

use crate::autoencoder::AudioAutoencoder;
use crate::{Error, Result};

pub trait Pretransform: Debug + Send + Sync {
    fn encode(&self, audio: &Tensor) -> Result<Tensor>;
    fn decode(&self, latents: &Tensor) -> Result<Tensor>;
    fn enable_grad(&self) -> bool;

    /// Input samples per output frame. Inputs must be a multiple of this long.
    fn downsampling_ratio(&self) -> usize {
        1
    }
}

// ---------------------------------------------------------------------------
// Nested autoencoder
// ---------------------------------------------------------------------------

/// A complete (usually frozen) autoencoder used as the outer transform.
#[derive(Debug, Clone)]
pub struct AutoencoderPretransform {
    model: Arc<AudioAutoencoder>,
    scale: f64,
    enable_grad: bool,
}

impl AutoencoderPretransform {
    pub fn new(model: Arc<AudioAutoencoder>, scale: f64, enable_grad: bool) -> Result<Self> {
        if scale == 0.0 || !scale.is_finite() {
            return Err(Error::Config(format!(
                "autoencoder pretransform scale must be finite and non-zero, got {scale}"
            )));
        }
        Ok(Self {
            model,
            scale,
            enable_grad,
        })
    }

    pub fn model(&self) -> &AudioAutoencoder {
        &self.model
    }
}

impl Pretransform for AutoencoderPretransform {
    fn encode(&self, audio: &Tensor) -> Result<Tensor> {
        let latents = self.model.encode(audio)?;
        Ok((latents / self.scale)?)
    }

    fn decode(&self, latents: &Tensor) -> Result<Tensor> {
        let latents = (latents * self.scale)?;
        self.model.decode(&latents)
    }

    fn enable_grad(&self) -> bool {
        self.enable_grad
    }

    fn downsampling_ratio(&self) -> usize {
        self.model.total_downsampling_ratio()
    }
}

// ---------------------------------------------------------------------------
// Patching
// ---------------------------------------------------------------------------

/// Folds `patch_size` consecutive samples into channels:
/// `[b, c, l·p] ↔ [b, c·p, l]`.
#[derive(Debug, Clone, Copy)]
pub struct PatchedPretransform {
    patch_size: usize,
    enable_grad: bool,
}

impl PatchedPretransform {
    pub fn new(patch_size: usize, enable_grad: bool) -> Result<Self> {
        if patch_size == 0 {
            return Err(Error::Config("patch_size must be a positive integer".into()));
        }
        Ok(Self {
            patch_size,
            enable_grad,
        })
    }

    pub fn patch_size(&self) -> usize {
        self.patch_size
    }
}

impl Pretransform for PatchedPretransform {
    fn encode(&self, audio: &Tensor) -> Result<Tensor> {
        let (b, c, len) = audio.dims3()?;
        let p = self.patch_size;
        if len % p != 0 {
            return Err(Error::Contract(format!(
                "audio length {len} is not a multiple of patch size {p}"
            )));
        }
        let l = len / p;
        Ok(audio
            .reshape((b, c, l, p))?
            .permute((0, 1, 3, 2))?
            .reshape((b, c * p, l))?)
    }

    fn decode(&self, latents: &Tensor) -> Result<Tensor> {
        let (b, cp, l) = latents.dims3()?;
        let p = self.patch_size;
        if cp % p != 0 {
            return Err(Error::Contract(format!(
                "{cp} channels cannot be unfolded by patch size {p}"
            )));
        }
        let c = cp / p;
        Ok(latents
            .reshape((b, c, p, l))?
            .permute((0, 1, 3, 2))?
            .reshape((b, c, l * p))?)
    }

    fn enable_grad(&self) -> bool {
        self.enable_grad
    }

    fn downsampling_ratio(&self) -> usize {
        self.patch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn patching_layout() {
        let dev = Device::Cpu;
        // one channel, samples 0..8, patch 2 → channel k holds samples k, k+2, ...
        let xs = Tensor::arange(0f32, 8.0, &dev).unwrap().reshape((1, 1, 8)).unwrap();
        let patched = PatchedPretransform::new(2, true).unwrap();
        let ys = patched.encode(&xs).unwrap();
        assert_eq!(ys.dims(), &[1, 2, 4]);
        let rows: Vec<Vec<f32>> = ys.squeeze(0).unwrap().to_vec2().unwrap();
        assert_eq!(rows[0], vec![0.0, 2.0, 4.0, 6.0]);
        assert_eq!(rows[1], vec![1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn patching_round_trip_is_exact() {
        let dev = Device::Cpu;
        let xs = Tensor::randn(0f32, 1.0, (2, 3, 32), &dev).unwrap();
        let patched = PatchedPretransform::new(4, true).unwrap();
        let ys = patched.decode(&patched.encode(&xs).unwrap()).unwrap();
        assert_eq!(ys.dims(), xs.dims());
        let diff: f32 = (ys - xs).unwrap().abs().unwrap().sum_all().unwrap().to_scalar().unwrap();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn patching_rejects_ragged_length() {
        let dev = Device::Cpu;
        let xs = Tensor::zeros((1, 2, 30), DType::F32, &dev).unwrap();
        let patched = PatchedPretransform::new(4, true).unwrap();
        assert!(matches!(patched.encode(&xs), Err(Error::Contract(_))));
    }

    #[test]
    fn patch_size_is_the_length_factor() {
        let patched = PatchedPretransform::new(4, true).unwrap();
        assert_eq!(patched.downsampling_ratio(), 4);
    }

    #[test]
    fn nested_autoencoder_ratio_includes_its_own_pretransform() {
        let dev = Device::Cpu;
        let vb = candle_nn::VarBuilder::zeros(DType::F32, &dev);
        let cfg = crate::config::AudioEncoderConfig {
            in_channels: 8,
            channels: 2,
            latent_dim: 4,
            c_mults: vec![2],
            strides: vec![2],
        };
        let dec_cfg = crate::config::AudioDecoderConfig {
            out_channels: 8,
            channels: 2,
            latent_dim: 4,
            c_mults: vec![2],
            strides: vec![2],
        };
        let encoder = crate::model::audio_ae::AudioEncoder::new(&cfg, vb.pp("encoder")).unwrap();
        let decoder = crate::model::audio_ae::AudioDecoder::new(&dec_cfg, vb.pp("decoder")).unwrap();
        let inner = AudioAutoencoder::new(
            Arc::new(encoder),
            crate::autoencoder::DecodeStrategy::Direct {
                decoder: Arc::new(decoder),
            },
            crate::autoencoder::AutoencoderDims {
                latent_dim: 4,
                downsampling_ratio: 2,
                io_channels: 8,
            },
        )
        .with_pretransform(Arc::new(PatchedPretransform::new(4, false).unwrap()));
        let outer = AutoencoderPretransform::new(Arc::new(inner), 1.0, false).unwrap();
        assert_eq!(outer.downsampling_ratio(), 8);

        let audio = Tensor::zeros((1, 2, 16), DType::F32, &dev).unwrap();
        assert_eq!(outer.encode(&audio).unwrap().dims(), &[1, 4, 2]);
    }

    #[test]
    fn zero_patch_size_is_a_config_error() {
        assert!(matches!(PatchedPretransform::new(0, true), Err(Error::Config(_))));
    }
}
