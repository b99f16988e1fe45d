//! Residual units and the down/up-sampling blocks built from them.
//!
//! ```text
//! ResidualUnit(d):  x + Conv1d(k=1)(ELU(CausalConv1d(k=7, dilation=d)(x)))
//! EncoderBlock(s):  6× [ResidualUnit(1,3,9,1,3,9) → ELU] → CausalConv1d(k=2s, stride=s)
//! DecoderBlock(s):  CausalConvTranspose1d(k=2s, stride=s) → 6× [ELU → ResidualUnit(1,3,9,1,3,9)]
//! ```
//!
//! Parameter names follow the `nn.Sequential` indices of the exported checkpoints
//! (`layers.{i}`), where the ELU slots are counted but hold no weights.

use candle_core::{Module, Result, Tensor};
use candle_nn::{Conv1d, VarBuilder};

use super::conv::{
    CausalConv1d, CausalConvConfig, CausalConvTranspose1d, CausalConvTransposeConfig,
};

/// Dilations of the six residual units in every block.
pub const RESIDUAL_DILATIONS: [usize; 6] = [1, 3, 9, 1, 3, 9];

const RESIDUAL_KERNEL: usize = 7;

// ---------------------------------------------------------------------------
// ResidualUnit
// ---------------------------------------------------------------------------

/// Dilated causal conv + pointwise projection, summed with the input.
///
/// Input and output share one channel count, so the residual sum is always
/// well-formed.
#[derive(Debug, Clone)]
pub struct ResidualUnit {
    conv: CausalConv1d,
    proj: Conv1d,
    dilation: usize,
}

impl ResidualUnit {
    pub fn new(channels: usize, dilation: usize, vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("layers");
        let conv = CausalConv1d::new(
            channels,
            channels,
            RESIDUAL_KERNEL,
            CausalConvConfig::dilated(dilation),
            vb.pp(0),
        )?;
        let proj = candle_nn::conv1d(channels, channels, 1, Default::default(), vb.pp(2))?;
        Ok(Self {
            conv,
            proj,
            dilation,
        })
    }

    pub fn dilation(&self) -> usize {
        self.dilation
    }
}

impl Module for ResidualUnit {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = xs.apply(&self.conv)?.elu(1.0)?.apply(&self.proj)?;
        xs + ys
    }
}

fn residual_stack(channels: usize, first_index: usize, vb: &VarBuilder) -> Result<Vec<ResidualUnit>> {
    RESIDUAL_DILATIONS
        .iter()
        .enumerate()
        .map(|(i, &dilation)| ResidualUnit::new(channels, dilation, vb.pp(first_index + 2 * i)))
        .collect()
}

// ---------------------------------------------------------------------------
// EncoderBlock
// ---------------------------------------------------------------------------

/// Six residual units at `in_channels`, then a strided causal conv that expands
/// to `out_channels` and downsamples by `stride`.
#[derive(Debug, Clone)]
pub struct EncoderBlock {
    res_units: Vec<ResidualUnit>,
    downsample: CausalConv1d,
}

impl EncoderBlock {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("layers");
        let res_units = residual_stack(in_channels, 0, &vb)?;
        let downsample = CausalConv1d::new(
            in_channels,
            out_channels,
            2 * stride,
            CausalConvConfig::strided(stride),
            vb.pp(2 * RESIDUAL_DILATIONS.len()),
        )?;
        Ok(Self {
            res_units,
            downsample,
        })
    }

    pub fn stride(&self) -> usize {
        self.downsample.stride()
    }
}

impl Module for EncoderBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for unit in &self.res_units {
            xs = xs.apply(unit)?.elu(1.0)?;
        }
        xs.apply(&self.downsample)
    }
}

// ---------------------------------------------------------------------------
// DecoderBlock
// ---------------------------------------------------------------------------

/// Causal transposed conv that contracts to `out_channels` and upsamples by
/// `stride`, then six residual units at `out_channels`.
#[derive(Debug, Clone)]
pub struct DecoderBlock {
    upsample: CausalConvTranspose1d,
    res_units: Vec<ResidualUnit>,
}

impl DecoderBlock {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("layers");
        let upsample = CausalConvTranspose1d::new(
            in_channels,
            out_channels,
            2 * stride,
            CausalConvTransposeConfig::strided(stride),
            vb.pp(0),
        )?;
        let res_units = residual_stack(out_channels, 2, &vb)?;
        Ok(Self {
            upsample,
            res_units,
        })
    }

    pub fn stride(&self) -> usize {
        self.upsample.stride()
    }
}

impl Module for DecoderBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.apply(&self.upsample)?;
        for unit in &self.res_units {
            xs = xs.elu(1.0)?.apply(unit)?;
        }
        Ok(xs)
    }
}
