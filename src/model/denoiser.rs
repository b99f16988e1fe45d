//! Convolutional denoiser for diffusion decoding (`type: "residual_conv"`).
//!
//! ```text
//! cond [B, C_c, F] ──nearest upsample──► [B, C_c, T] ─┐
//! x    [B, C_io, T] ─────────────────────────────────┴► cat → Conv1d(k=7) → h
//! t    [B] → sinusoidal(embed_dim) → Linear → SiLU → Linear ──► h += temb[:, :, None]
//! h → depth × [ResidualUnit(1), ResidualUnit(3), ResidualUnit(9)] → ELU → Conv1d(k=1) → [B, C_io, T]
//! ```

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{self as nn, Conv1d, Conv1dConfig, VarBuilder};

use super::blocks::ResidualUnit;
use crate::config::ResidualConvDenoiserConfig;
use crate::sampler::Denoiser;
use crate::{Error, Result};

const DILATION_CYCLE: [usize; 3] = [1, 3, 9];

// ---------------------------------------------------------------------------
// Timestep embedding
// ---------------------------------------------------------------------------

/// Sinusoidal timestep features followed by a two-layer MLP.
#[derive(Debug, Clone)]
pub struct TimestepEmbedding {
    linear_1: nn::Linear,
    linear_2: nn::Linear,
    in_channels: usize,
    scale: f64,
}

impl TimestepEmbedding {
    pub fn new(in_channels: usize, embed_dim: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            linear_1: nn::linear(in_channels, embed_dim, vb.pp("linear_1"))?,
            linear_2: nn::linear(embed_dim, embed_dim, vb.pp("linear_2"))?,
            in_channels,
            scale: 1000.0,
        })
    }

    /// `t`: `[B]` in `[0, 1]` → `[B, in_channels]` as `[cos | sin]`.
    fn sinusoidal(&self, t: &Tensor, dev: &Device) -> candle_core::Result<Tensor> {
        let half = self.in_channels / 2;
        let max_period: f64 = 10000.0;
        let freqs: Vec<f32> = (0..half)
            .map(|i| (-(max_period.ln()) * i as f64 / half as f64).exp() as f32)
            .collect();
        let freqs = Tensor::new(freqs.as_slice(), dev)?;

        let t = (t.to_dtype(DType::F32)? * self.scale)?;
        let args = t.unsqueeze(1)?.broadcast_mul(&freqs.unsqueeze(0)?)?;
        Tensor::cat(&[&args.cos()?, &args.sin()?], 1)
    }

    pub fn forward(&self, t: &Tensor) -> candle_core::Result<Tensor> {
        self.sinusoidal(t, t.device())?
            .to_dtype(t.dtype())?
            .apply(&self.linear_1)?
            .silu()?
            .apply(&self.linear_2)
    }
}

// ---------------------------------------------------------------------------
// Denoiser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ResidualConvDenoiser {
    conv_in: Conv1d,
    time_embed: TimestepEmbedding,
    res_units: Vec<ResidualUnit>,
    conv_out: Conv1d,
    cond_dim: usize,
}

impl ResidualConvDenoiser {
    pub fn new(cfg: &ResidualConvDenoiserConfig, vb: VarBuilder) -> Result<Self> {
        if cfg.embed_dim == 0 || cfg.embed_dim % 2 != 0 {
            return Err(Error::Config(format!(
                "embed_dim must be a positive even number (cos and sin halves), got {}",
                cfg.embed_dim
            )));
        }
        let conv_in = nn::conv1d(
            cfg.io_channels + cfg.cond_dim,
            cfg.channels,
            7,
            Conv1dConfig {
                padding: 3,
                ..Default::default()
            },
            vb.pp("conv_in"),
        )?;
        let time_embed = TimestepEmbedding::new(cfg.embed_dim, cfg.channels, vb.pp("time_embed"))?;
        let res_units = (0..cfg.depth)
            .flat_map(|_| DILATION_CYCLE)
            .enumerate()
            .map(|(i, dilation)| ResidualUnit::new(cfg.channels, dilation, vb.pp(format!("res_units.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let conv_out = nn::conv1d(cfg.channels, cfg.io_channels, 1, Default::default(), vb.pp("conv_out"))?;

        tracing::debug!(
            channels = cfg.channels,
            units = res_units.len(),
            cond_dim = cfg.cond_dim,
            "built residual conv denoiser"
        );
        Ok(Self {
            conv_in,
            time_embed,
            res_units,
            conv_out,
            cond_dim: cfg.cond_dim,
        })
    }

    /// Stretch `cond` to `len` frames by repeating the nearest source frame.
    fn upsample_cond(cond: &Tensor, len: usize) -> Result<Tensor> {
        let frames = cond.dim(2)?;
        if frames == len {
            return Ok(cond.clone());
        }
        if frames == 0 {
            return Err(Error::Contract("conditioning signal has no frames".into()));
        }
        let index: Vec<u32> = (0..len).map(|j| (j * frames / len) as u32).collect();
        let index = Tensor::new(index.as_slice(), cond.device())?;
        Ok(cond.index_select(&index, 2)?)
    }
}

impl Denoiser for ResidualConvDenoiser {
    fn forward(&self, xs: &Tensor, t: &Tensor, cond: &Tensor) -> Result<Tensor> {
        let (_, _, len) = xs.dims3()?;
        let h = if self.cond_dim == 0 {
            xs.clone()
        } else {
            let cond_channels = cond.dim(1)?;
            if cond_channels != self.cond_dim {
                return Err(Error::Contract(format!(
                    "denoiser expects {} conditioning channels, got {cond_channels}",
                    self.cond_dim
                )));
            }
            let cond = Self::upsample_cond(cond, len)?.to_dtype(xs.dtype())?;
            Tensor::cat(&[xs, &cond], 1)?
        };

        let temb = self.time_embed.forward(t)?;
        let mut h = h.apply(&self.conv_in)?.broadcast_add(&temb.unsqueeze(2)?)?;
        for unit in &self.res_units {
            h = unit.forward(&h)?.elu(1.0)?;
        }
        Ok(h.apply(&self.conv_out)?)
    }
}
