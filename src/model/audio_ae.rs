//! Native block-stack encoder and decoder (`type: "audio_ae"`).
//!
//! ```text
//! AudioEncoder: [B, in, T]  → CausalConv1d(k=7) → ELU → N× [EncoderBlock → ELU] → CausalConv1d(k=3) → [B, latent, T/hop]
//! AudioDecoder: [B, latent, F] → CausalConv1d(k=7) → ELU → N× [DecoderBlock → ELU] → CausalConv1d(k=7) → [B, out, F*hop]
//! ```
//!
//! With `c = [1] ++ c_mults`, encoder block `i` maps `c[i]*channels → c[i+1]*channels`
//! with `strides[i]`; the decoder walks the same schedule backwards.

use candle_core::{Module, Result, Tensor};
use candle_nn::VarBuilder;

use super::LatentModule;
use super::blocks::{DecoderBlock, EncoderBlock};
use super::conv::{CausalConv1d, CausalConvConfig};
use crate::config::{AudioDecoderConfig, AudioEncoderConfig};

fn channel_schedule(c_mults: &[usize], strides: &[usize]) -> Result<Vec<usize>> {
    if c_mults.len() != strides.len() {
        candle_core::bail!(
            "c_mults has {} entries but strides has {}",
            c_mults.len(),
            strides.len()
        );
    }
    let mut cm = Vec::with_capacity(c_mults.len() + 1);
    cm.push(1);
    cm.extend_from_slice(c_mults);
    Ok(cm)
}

// ---------------------------------------------------------------------------
// AudioEncoder
// ---------------------------------------------------------------------------

/// Waveform → latent sequence.
#[derive(Debug, Clone)]
pub struct AudioEncoder {
    conv_in: CausalConv1d,
    blocks: Vec<EncoderBlock>,
    conv_out: CausalConv1d,
    hop_length: usize,
}

impl AudioEncoder {
    pub fn new(cfg: &AudioEncoderConfig, vb: VarBuilder) -> Result<Self> {
        let cm = channel_schedule(&cfg.c_mults, &cfg.strides)?;
        let channels = cfg.channels;
        let depth = cfg.strides.len();
        let vb = vb.pp("layers");

        let conv_in = CausalConv1d::new(
            cfg.in_channels,
            cm[0] * channels,
            7,
            CausalConvConfig::default(),
            vb.pp(0),
        )?;

        let mut blocks = Vec::with_capacity(depth);
        for (i, &stride) in cfg.strides.iter().enumerate() {
            let block = EncoderBlock::new(
                cm[i] * channels,
                cm[i + 1] * channels,
                stride,
                vb.pp(2 + 2 * i),
            )?;
            blocks.push(block);
        }

        let conv_out = CausalConv1d::new(
            cm[depth] * channels,
            cfg.latent_dim,
            3,
            CausalConvConfig::default(),
            vb.pp(2 + 2 * depth),
        )?;

        Ok(Self {
            conv_in,
            blocks,
            conv_out,
            hop_length: cfg.hop_length(),
        })
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }
}

impl Module for AudioEncoder {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut h = xs.apply(&self.conv_in)?.elu(1.0)?;
        for block in &self.blocks {
            h = h.apply(block)?.elu(1.0)?;
        }
        h.apply(&self.conv_out)
    }
}

impl LatentModule for AudioEncoder {
    fn hop_length(&self) -> usize {
        self.hop_length
    }
}

// ---------------------------------------------------------------------------
// AudioDecoder
// ---------------------------------------------------------------------------

/// Latent sequence → waveform. Structural mirror of [`AudioEncoder`].
#[derive(Debug, Clone)]
pub struct AudioDecoder {
    conv_in: CausalConv1d,
    blocks: Vec<DecoderBlock>,
    conv_out: CausalConv1d,
    hop_length: usize,
}

impl AudioDecoder {
    pub fn new(cfg: &AudioDecoderConfig, vb: VarBuilder) -> Result<Self> {
        let cm = channel_schedule(&cfg.c_mults, &cfg.strides)?;
        let channels = cfg.channels;
        let depth = cfg.strides.len();
        let vb = vb.pp("layers");

        let conv_in = CausalConv1d::new(
            cfg.latent_dim,
            cm[depth] * channels,
            7,
            CausalConvConfig::default(),
            vb.pp(0),
        )?;

        // Block k upsamples schedule entry i = depth - k: cm[i] → cm[i-1] with strides[i-1].
        let mut blocks = Vec::with_capacity(depth);
        for (k, i) in (1..=depth).rev().enumerate() {
            let block = DecoderBlock::new(
                cm[i] * channels,
                cm[i - 1] * channels,
                cfg.strides[i - 1],
                vb.pp(2 + 2 * k),
            )?;
            blocks.push(block);
        }

        let conv_out = CausalConv1d::new(
            cm[0] * channels,
            cfg.out_channels,
            7,
            CausalConvConfig::default(),
            vb.pp(2 + 2 * depth),
        )?;

        Ok(Self {
            conv_in,
            blocks,
            conv_out,
            hop_length: cfg.hop_length(),
        })
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }
}

impl Module for AudioDecoder {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut h = xs.apply(&self.conv_in)?.elu(1.0)?;
        for block in &self.blocks {
            h = h.apply(block)?.elu(1.0)?;
        }
        h.apply(&self.conv_out)
    }
}

impl LatentModule for AudioDecoder {
    fn hop_length(&self) -> usize {
        self.hop_length
    }
}
