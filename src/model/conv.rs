//! Strictly causal 1-D convolutions.
//!
//! ```text
//! CausalConv1d:          pad_left(d*(k-1)) → Conv1d                 len = floor((L-1)/s) + 1
//! CausalConvTranspose1d: ConvTranspose1d → trim_end(d*(k-1)+op+1-s) len = L*s   (k = 2s)
//! ```
//!
//! Output sample `t` never depends on an input sample later than `t`
//! (or `t / s` for the upsampling variant).

use candle_core::{D, Module, Result, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, ConvTranspose1d, ConvTranspose1dConfig, VarBuilder};
use candle_transformers::models::encodec;
use serde::{Deserialize, Serialize};

/// Stride/dilation settings shared by the causal convolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CausalConvConfig {
    pub stride: usize,
    pub dilation: usize,
    pub groups: usize,
}

impl Default for CausalConvConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            dilation: 1,
            groups: 1,
        }
    }
}

impl CausalConvConfig {
    pub fn strided(stride: usize) -> Self {
        Self {
            stride,
            ..Default::default()
        }
    }

    pub fn dilated(dilation: usize) -> Self {
        Self {
            dilation,
            ..Default::default()
        }
    }

    fn conv1d(&self) -> Conv1dConfig {
        Conv1dConfig {
            padding: 0,
            stride: self.stride,
            dilation: self.dilation,
            groups: self.groups,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// CausalConv1d
// ---------------------------------------------------------------------------

/// Conv1d left-padded by `dilation * (kernel_size - 1)` zeros.
#[derive(Debug, Clone)]
pub struct CausalConv1d {
    conv: Conv1d,
    causal_padding: usize,
}

impl CausalConv1d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        cfg: CausalConvConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        let conv = candle_nn::conv1d(in_channels, out_channels, kernel_size, cfg.conv1d(), vb)?;
        Ok(Self {
            conv,
            causal_padding: cfg.dilation * (kernel_size - 1),
        })
    }

    /// Weight-normalised variant reading `weight_g`/`weight_v`/`bias` (groups must be 1).
    pub fn new_weight_norm(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        cfg: CausalConvConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        if cfg.groups != 1 {
            candle_core::bail!("weight-normalised causal conv does not support groups ({})", cfg.groups);
        }
        let conv = encodec::conv1d_weight_norm(in_channels, out_channels, kernel_size, cfg.conv1d(), vb)?;
        Ok(Self {
            conv,
            causal_padding: cfg.dilation * (kernel_size - 1),
        })
    }

    /// Build from raw tensors. `weight` is `[out_channels, in_channels / groups, kernel]`.
    pub fn from_weights(weight: Tensor, bias: Option<Tensor>, cfg: CausalConvConfig) -> Result<Self> {
        let kernel_size = weight.dim(2)?;
        let conv = Conv1d::new(weight, bias, cfg.conv1d());
        Ok(Self {
            conv,
            causal_padding: cfg.dilation * (kernel_size - 1),
        })
    }

    /// Number of zeros prepended to the input.
    pub fn causal_padding(&self) -> usize {
        self.causal_padding
    }

    pub fn stride(&self) -> usize {
        self.conv.config().stride
    }
}

impl Module for CausalConv1d {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        xs.pad_with_zeros(D::Minus1, self.causal_padding, 0)?
            .apply(&self.conv)
    }
}

// ---------------------------------------------------------------------------
// CausalConvTranspose1d
// ---------------------------------------------------------------------------

/// Padding mode of the transposed convolution. Only `Zeros` can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingMode {
    #[default]
    Zeros,
    Reflect,
    Replicate,
    Circular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CausalConvTransposeConfig {
    pub stride: usize,
    pub dilation: usize,
    pub output_padding: usize,
    pub padding_mode: PaddingMode,
}

impl Default for CausalConvTransposeConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            dilation: 1,
            output_padding: 0,
            padding_mode: PaddingMode::Zeros,
        }
    }
}

impl CausalConvTransposeConfig {
    pub fn strided(stride: usize) -> Self {
        Self {
            stride,
            ..Default::default()
        }
    }

    fn conv_transpose1d(&self) -> ConvTranspose1dConfig {
        ConvTranspose1dConfig {
            padding: 0,
            output_padding: self.output_padding,
            stride: self.stride,
            dilation: self.dilation,
            groups: 1,
        }
    }

    /// Samples trimmed from the end: `d*(k-1) + output_padding + 1 - s`.
    fn causal_padding(&self, kernel_size: usize) -> Result<usize> {
        let span = self.dilation * (kernel_size - 1) + self.output_padding + 1;
        match span.checked_sub(self.stride) {
            Some(trim) => Ok(trim),
            None => candle_core::bail!(
                "causal transposed conv: stride {} exceeds receptive span {span} (kernel {kernel_size}, dilation {})",
                self.stride,
                self.dilation
            ),
        }
    }
}

/// ConvTranspose1d whose right overhang is trimmed so no future sample leaks in.
#[derive(Debug, Clone)]
pub struct CausalConvTranspose1d {
    conv: ConvTranspose1d,
    causal_padding: usize,
    padding_mode: PaddingMode,
}

impl CausalConvTranspose1d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        cfg: CausalConvTransposeConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        let causal_padding = cfg.causal_padding(kernel_size)?;
        let conv = candle_nn::conv_transpose1d(
            in_channels,
            out_channels,
            kernel_size,
            cfg.conv_transpose1d(),
            vb,
        )?;
        Ok(Self {
            conv,
            causal_padding,
            padding_mode: cfg.padding_mode,
        })
    }

    /// Weight-normalised variant reading `weight_g`/`weight_v`/`bias`.
    pub fn new_weight_norm(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        cfg: CausalConvTransposeConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        let causal_padding = cfg.causal_padding(kernel_size)?;
        let conv = encodec::conv_transpose1d_weight_norm(
            in_channels,
            out_channels,
            kernel_size,
            true,
            cfg.conv_transpose1d(),
            vb,
        )?;
        Ok(Self {
            conv,
            causal_padding,
            padding_mode: cfg.padding_mode,
        })
    }

    /// Build from raw tensors. `weight` is `[in_channels, out_channels, kernel]`.
    pub fn from_weights(
        weight: Tensor,
        bias: Option<Tensor>,
        cfg: CausalConvTransposeConfig,
    ) -> Result<Self> {
        let kernel_size = weight.dim(2)?;
        let causal_padding = cfg.causal_padding(kernel_size)?;
        let conv = ConvTranspose1d::new(weight, bias, cfg.conv_transpose1d());
        Ok(Self {
            conv,
            causal_padding,
            padding_mode: cfg.padding_mode,
        })
    }

    pub fn causal_padding(&self) -> usize {
        self.causal_padding
    }

    pub fn stride(&self) -> usize {
        self.conv.config().stride
    }
}

impl Module for CausalConvTranspose1d {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        if self.padding_mode != PaddingMode::Zeros {
            candle_core::bail!(
                "only `zeros` padding mode is supported for CausalConvTranspose1d, got {:?}",
                self.padding_mode
            );
        }
        let ys = self.conv.forward(xs)?;
        let len = ys.dim(D::Minus1)?;
        ys.narrow(D::Minus1, 0, len - self.causal_padding)
    }
}
