//! Descript Audio Codec encoder/decoder (`type: "dac"`).
//!
//! Non-causal, Snake-activated stacks with symmetric padding:
//!
//! ```text
//! Encoder: Conv1d(k=7) → per stride s: [Res(1,3,9) → Snake → Conv1d(k=2s, stride=s), ×2 ch]
//!          → Snake → Conv1d(k=3) → d_latent → Conv1d(k=1) → latent_dim
//! Decoder: Conv1d(k=7) → per rate r: [Snake → ConvT(k=2r, stride=r), ÷2 ch → Res(1,3,9)]
//!          → Snake → Conv1d(k=7) → tanh
//! ```
//!
//! All stack convolutions are weight-normalised (`weight_g`, `weight_v`, `bias`)
//! as in DAC checkpoints; the `proj_out` projection is a plain conv.

use candle_core::{D, Module, Result, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, ConvTranspose1d, ConvTranspose1dConfig, VarBuilder};
use candle_transformers::models::encodec;

use super::LatentModule;
use crate::config::{DacDecoderConfig, DacEncoderConfig};

// ---------------------------------------------------------------------------
// Snake1d: x + 1/(alpha + eps) * sin(alpha * x)^2
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Snake1d {
    alpha: Tensor, // [1, channels, 1]
}

impl Snake1d {
    pub fn new(channels: usize, vb: VarBuilder) -> Result<Self> {
        let alpha = vb.get((1, channels, 1), "alpha")?;
        Ok(Self { alpha })
    }
}

impl Module for Snake1d {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let sin_sq = self.alpha.broadcast_mul(xs)?.sin()?.sqr()?;
        let recip_alpha = (&self.alpha + 1e-9)?.recip()?;
        xs + recip_alpha.broadcast_mul(&sin_sq)?
    }
}

fn conv1d(
    in_dim: usize,
    out_dim: usize,
    kernel_size: usize,
    cfg: Conv1dConfig,
    vb: VarBuilder,
) -> Result<Conv1d> {
    encodec::conv1d_weight_norm(in_dim, out_dim, kernel_size, cfg, vb)
}

fn same_padding(kernel_size: usize) -> Conv1dConfig {
    Conv1dConfig {
        padding: kernel_size / 2,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Residual unit: Snake → Conv1d(k=7, dil) → Snake → Conv1d(1) + residual
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DacResidualUnit {
    snake1: Snake1d,
    conv1: Conv1d,
    snake2: Snake1d,
    conv2: Conv1d,
}

impl DacResidualUnit {
    pub fn new(dim: usize, dilation: usize, vb: VarBuilder) -> Result<Self> {
        let cfg1 = Conv1dConfig {
            dilation,
            padding: ((7 - 1) * dilation) / 2,
            ..Default::default()
        };
        Ok(Self {
            snake1: Snake1d::new(dim, vb.pp("snake1"))?,
            conv1: conv1d(dim, dim, 7, cfg1, vb.pp("conv1"))?,
            snake2: Snake1d::new(dim, vb.pp("snake2"))?,
            conv2: conv1d(dim, dim, 1, Default::default(), vb.pp("conv2"))?,
        })
    }
}

impl Module for DacResidualUnit {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = xs
            .apply(&self.snake1)?
            .apply(&self.conv1)?
            .apply(&self.snake2)?
            .apply(&self.conv2)?;
        // Center-crop the skip path if the convs shortened the sequence.
        let pad = (xs.dim(D::Minus1)? - ys.dim(D::Minus1)?) / 2;
        if pad > 0 {
            &ys + xs.narrow(D::Minus1, pad, ys.dim(D::Minus1)?)
        } else {
            ys + xs
        }
    }
}

fn residual_triplet(dim: usize, vb: &VarBuilder) -> Result<[DacResidualUnit; 3]> {
    Ok([
        DacResidualUnit::new(dim, 1, vb.pp("res_unit1"))?,
        DacResidualUnit::new(dim, 3, vb.pp("res_unit2"))?,
        DacResidualUnit::new(dim, 9, vb.pp("res_unit3"))?,
    ])
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DacEncoderBlock {
    res_units: [DacResidualUnit; 3],
    snake1: Snake1d,
    conv1: Conv1d,
}

impl DacEncoderBlock {
    /// Reads `dim / 2` channels, writes `dim`, downsamples by `stride`.
    pub fn new(dim: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let res_units = residual_triplet(dim / 2, &vb)?;
        let snake1 = Snake1d::new(dim / 2, vb.pp("snake1"))?;
        let cfg = Conv1dConfig {
            stride,
            padding: stride.div_ceil(2),
            ..Default::default()
        };
        let conv1 = conv1d(dim / 2, dim, 2 * stride, cfg, vb.pp("conv1"))?;
        Ok(Self {
            res_units,
            snake1,
            conv1,
        })
    }
}

impl Module for DacEncoderBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut h = xs.clone();
        for unit in &self.res_units {
            h = h.apply(unit)?;
        }
        h.apply(&self.snake1)?.apply(&self.conv1)
    }
}

/// DAC encoder with a trailing 1×1 projection to `latent_dim` channels.
#[derive(Debug, Clone)]
pub struct DacEncoder {
    conv1: Conv1d,
    blocks: Vec<DacEncoderBlock>,
    snake1: Snake1d,
    conv2: Conv1d,
    proj_out: Conv1d,
    hop_length: usize,
}

impl DacEncoder {
    pub fn new(cfg: &DacEncoderConfig, vb: VarBuilder) -> Result<Self> {
        let mut d_model = cfg.d_model;
        let conv1 = conv1d(cfg.in_channels, d_model, 7, same_padding(7), vb.pp("conv1"))?;

        let mut blocks = Vec::with_capacity(cfg.strides.len());
        for (i, &stride) in cfg.strides.iter().enumerate() {
            d_model *= 2;
            blocks.push(DacEncoderBlock::new(d_model, stride, vb.pp(format!("block.{i}")))?);
        }

        let snake1 = Snake1d::new(d_model, vb.pp("snake1"))?;
        let conv2 = conv1d(d_model, cfg.d_latent, 3, same_padding(3), vb.pp("conv2"))?;
        let proj_out = candle_nn::conv1d(
            cfg.d_latent,
            cfg.latent_dim,
            1,
            Default::default(),
            vb.pp("proj_out"),
        )?;

        Ok(Self {
            conv1,
            blocks,
            snake1,
            conv2,
            proj_out,
            hop_length: cfg.hop_length(),
        })
    }
}

impl Module for DacEncoder {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut h = xs.apply(&self.conv1)?;
        for block in &self.blocks {
            h = h.apply(block)?;
        }
        h.apply(&self.snake1)?
            .apply(&self.conv2)?
            .apply(&self.proj_out)
    }
}

impl LatentModule for DacEncoder {
    fn hop_length(&self) -> usize {
        self.hop_length
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DacDecoderBlock {
    snake1: Snake1d,
    conv_t1: ConvTranspose1d,
    res_units: [DacResidualUnit; 3],
}

impl DacDecoderBlock {
    pub fn new(in_dim: usize, out_dim: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let snake1 = Snake1d::new(in_dim, vb.pp("snake1"))?;
        // Odd strides need one sample of output padding to land on exactly L*stride.
        let cfg = ConvTranspose1dConfig {
            stride,
            padding: stride.div_ceil(2),
            output_padding: stride % 2,
            ..Default::default()
        };
        let conv_t1 =
            encodec::conv_transpose1d_weight_norm(in_dim, out_dim, 2 * stride, true, cfg, vb.pp("conv_t1"))?;
        let res_units = residual_triplet(out_dim, &vb)?;
        Ok(Self {
            snake1,
            conv_t1,
            res_units,
        })
    }
}

impl Module for DacDecoderBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut h = xs.apply(&self.snake1)?.apply(&self.conv_t1)?;
        for unit in &self.res_units {
            h = h.apply(unit)?;
        }
        Ok(h)
    }
}

/// DAC decoder: `[B, latent_dim, F] → [B, d_out, F * prod(rates)]`, bounded by tanh.
#[derive(Debug, Clone)]
pub struct DacDecoder {
    conv1: Conv1d,
    blocks: Vec<DacDecoderBlock>,
    snake1: Snake1d,
    conv2: Conv1d,
    hop_length: usize,
}

impl DacDecoder {
    pub fn new(cfg: &DacDecoderConfig, vb: VarBuilder) -> Result<Self> {
        let conv1 = conv1d(cfg.latent_dim, cfg.channels, 7, same_padding(7), vb.pp("conv1"))?;

        let mut blocks = Vec::with_capacity(cfg.rates.len());
        let mut in_dim = cfg.channels;
        for (i, &stride) in cfg.rates.iter().enumerate() {
            let out_dim = in_dim / 2;
            blocks.push(DacDecoderBlock::new(in_dim, out_dim, stride, vb.pp(format!("block.{i}")))?);
            in_dim = out_dim;
        }

        let snake1 = Snake1d::new(in_dim, vb.pp("snake1"))?;
        let conv2 = conv1d(in_dim, cfg.d_out, 7, same_padding(7), vb.pp("conv2"))?;

        Ok(Self {
            conv1,
            blocks,
            snake1,
            conv2,
            hop_length: cfg.hop_length(),
        })
    }
}

impl Module for DacDecoder {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut h = xs.apply(&self.conv1)?;
        for block in &self.blocks {
            h = h.apply(block)?;
        }
        h.apply(&self.snake1)?.apply(&self.conv2)?.tanh()
    }
}

impl LatentModule for DacDecoder {
    fn hop_length(&self) -> usize {
        self.hop_length
    }
}
