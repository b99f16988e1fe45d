//! SEANet encoder/decoder (`type: "seanet"`), EnCodec style, built on causal convs.
//!
//! Every convolution is weight-normalised (`weight_g`, `weight_v`, `bias`) so
//! EnCodec-layout checkpoints load as exported.
//!
//! ```text
//! Encoder: CausalConv(k) → per ratio r: [ResnetBlock × n → ELU → CausalConv(k=2r, stride=r), ×2 ch]
//!          → LSTM (skip) → ELU → CausalConv(last_k) → [B, dimension, T/hop]
//! Decoder: CausalConv(k) → LSTM (skip) → per ratio r: [ELU → CausalConvT(k=2r, stride=r), ÷2 ch → ResnetBlock × n]
//!          → ELU → CausalConv(last_k) → [B, channels, F*hop]
//! ```

use candle_core::{Module, Result, Tensor};
use candle_nn::{RNN, VarBuilder};

use super::LatentModule;
use super::conv::{
    CausalConv1d, CausalConvConfig, CausalConvTranspose1d, CausalConvTransposeConfig,
};
use crate::config::{SeanetDecoderConfig, SeanetEncoderConfig};

// ---------------------------------------------------------------------------
// Residual block: ELU → CausalConv(k, dil) → ELU → CausalConv(1) + shortcut
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SeanetResnetBlock {
    conv1: CausalConv1d,
    conv2: CausalConv1d,
    shortcut: Option<CausalConv1d>,
}

impl SeanetResnetBlock {
    pub fn new(
        dim: usize,
        kernel_size: usize,
        dilation: usize,
        compress: usize,
        true_skip: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let hidden = dim / compress;
        let conv1 = CausalConv1d::new_weight_norm(
            dim,
            hidden,
            kernel_size,
            CausalConvConfig::dilated(dilation),
            vb.pp("block.1"),
        )?;
        let conv2 =
            CausalConv1d::new_weight_norm(hidden, dim, 1, CausalConvConfig::default(), vb.pp("block.3"))?;
        let shortcut = if true_skip {
            None
        } else {
            Some(CausalConv1d::new_weight_norm(
                dim,
                dim,
                1,
                CausalConvConfig::default(),
                vb.pp("shortcut"),
            )?)
        };
        Ok(Self {
            conv1,
            conv2,
            shortcut,
        })
    }
}

impl Module for SeanetResnetBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = xs
            .elu(1.0)?
            .apply(&self.conv1)?
            .elu(1.0)?
            .apply(&self.conv2)?;
        match &self.shortcut {
            Some(shortcut) => xs.apply(shortcut)? + ys,
            None => xs + ys,
        }
    }
}

// ---------------------------------------------------------------------------
// Unidirectional LSTM over time with a skip connection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SeanetLstm {
    layers: Vec<candle_nn::LSTM>,
}

impl SeanetLstm {
    pub fn new(dim: usize, num_layers: usize, vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("lstm");
        let mut layers = Vec::with_capacity(num_layers);
        for layer_idx in 0..num_layers {
            let config = candle_nn::LSTMConfig {
                layer_idx,
                ..Default::default()
            };
            layers.push(candle_nn::lstm(dim, dim, config, vb.clone())?);
        }
        Ok(Self { layers })
    }
}

impl Module for SeanetLstm {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        // [B, C, T] → [B, T, C]
        let input = xs.transpose(1, 2)?.contiguous()?;
        let mut ys = input.clone();
        for layer in &self.layers {
            let states = layer.seq(&ys)?;
            ys = layer.states_to_tensor(&states)?;
        }
        (ys + input)?.transpose(1, 2)?.contiguous()
    }
}

fn resnet_stack(
    dim: usize,
    n_layers: usize,
    kernel_size: usize,
    dilation_base: usize,
    compress: usize,
    true_skip: bool,
    vb: VarBuilder,
) -> Result<Vec<SeanetResnetBlock>> {
    (0..n_layers)
        .map(|j| {
            SeanetResnetBlock::new(
                dim,
                kernel_size,
                dilation_base.pow(j as u32),
                compress,
                true_skip,
                vb.pp(j),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct SeanetDownBlock {
    resnets: Vec<SeanetResnetBlock>,
    downsample: CausalConv1d,
}

/// SEANet encoder: waveform → `dimension`-channel latents.
#[derive(Debug, Clone)]
pub struct SeanetEncoder {
    conv_in: CausalConv1d,
    blocks: Vec<SeanetDownBlock>,
    lstm: Option<SeanetLstm>,
    conv_out: CausalConv1d,
    hop_length: usize,
}

impl SeanetEncoder {
    pub fn new(cfg: &SeanetEncoderConfig, vb: VarBuilder) -> Result<Self> {
        let nf = cfg.n_filters;
        let conv_in = CausalConv1d::new_weight_norm(
            cfg.channels,
            nf,
            cfg.kernel_size,
            CausalConvConfig::default(),
            vb.pp("conv_in"),
        )?;

        let mut mult = 1;
        let mut blocks = Vec::with_capacity(cfg.ratios.len());
        for (i, &ratio) in cfg.ratios.iter().enumerate() {
            let vb = vb.pp(format!("blocks.{i}"));
            let resnets = resnet_stack(
                mult * nf,
                cfg.n_residual_layers,
                cfg.residual_kernel_size,
                cfg.dilation_base,
                cfg.compress,
                cfg.true_skip,
                vb.pp("resnets"),
            )?;
            let downsample = CausalConv1d::new_weight_norm(
                mult * nf,
                mult * nf * 2,
                2 * ratio,
                CausalConvConfig::strided(ratio),
                vb.pp("downsample"),
            )?;
            blocks.push(SeanetDownBlock {
                resnets,
                downsample,
            });
            mult *= 2;
        }

        let lstm = match cfg.lstm {
            0 => None,
            n => Some(SeanetLstm::new(mult * nf, n, vb.clone())?),
        };
        let conv_out = CausalConv1d::new_weight_norm(
            mult * nf,
            cfg.dimension,
            cfg.last_kernel_size,
            CausalConvConfig::default(),
            vb.pp("conv_out"),
        )?;

        Ok(Self {
            conv_in,
            blocks,
            lstm,
            conv_out,
            hop_length: cfg.hop_length(),
        })
    }
}

impl Module for SeanetEncoder {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut h = xs.apply(&self.conv_in)?;
        for block in &self.blocks {
            for resnet in &block.resnets {
                h = h.apply(resnet)?;
            }
            h = h.elu(1.0)?.apply(&block.downsample)?;
        }
        if let Some(lstm) = &self.lstm {
            h = h.apply(lstm)?;
        }
        h.elu(1.0)?.apply(&self.conv_out)
    }
}

impl LatentModule for SeanetEncoder {
    fn hop_length(&self) -> usize {
        self.hop_length
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct SeanetUpBlock {
    upsample: CausalConvTranspose1d,
    resnets: Vec<SeanetResnetBlock>,
}

/// SEANet decoder: `dimension`-channel latents → waveform.
#[derive(Debug, Clone)]
pub struct SeanetDecoder {
    conv_in: CausalConv1d,
    lstm: Option<SeanetLstm>,
    blocks: Vec<SeanetUpBlock>,
    conv_out: CausalConv1d,
    hop_length: usize,
}

impl SeanetDecoder {
    pub fn new(cfg: &SeanetDecoderConfig, vb: VarBuilder) -> Result<Self> {
        let nf = cfg.n_filters;
        let mut mult = 2usize.pow(cfg.ratios.len() as u32);
        let conv_in = CausalConv1d::new_weight_norm(
            cfg.dimension,
            mult * nf,
            cfg.kernel_size,
            CausalConvConfig::default(),
            vb.pp("conv_in"),
        )?;
        let lstm = match cfg.lstm {
            0 => None,
            n => Some(SeanetLstm::new(mult * nf, n, vb.clone())?),
        };

        let mut blocks = Vec::with_capacity(cfg.ratios.len());
        for (i, &ratio) in cfg.ratios.iter().enumerate() {
            let vb = vb.pp(format!("blocks.{i}"));
            let upsample = CausalConvTranspose1d::new_weight_norm(
                mult * nf,
                mult * nf / 2,
                2 * ratio,
                CausalConvTransposeConfig::strided(ratio),
                vb.pp("upsample"),
            )?;
            let resnets = resnet_stack(
                mult * nf / 2,
                cfg.n_residual_layers,
                cfg.residual_kernel_size,
                cfg.dilation_base,
                cfg.compress,
                cfg.true_skip,
                vb.pp("resnets"),
            )?;
            blocks.push(SeanetUpBlock { upsample, resnets });
            mult /= 2;
        }

        let conv_out = CausalConv1d::new_weight_norm(
            nf,
            cfg.channels,
            cfg.last_kernel_size,
            CausalConvConfig::default(),
            vb.pp("conv_out"),
        )?;

        Ok(Self {
            conv_in,
            lstm,
            blocks,
            conv_out,
            hop_length: cfg.hop_length(),
        })
    }
}

impl Module for SeanetDecoder {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut h = xs.apply(&self.conv_in)?;
        if let Some(lstm) = &self.lstm {
            h = h.apply(lstm)?;
        }
        for block in &self.blocks {
            h = h.elu(1.0)?.apply(&block.upsample)?;
            for resnet in &block.resnets {
                h = h.apply(resnet)?;
            }
        }
        h.elu(1.0)?.apply(&self.conv_out)
    }
}

impl LatentModule for SeanetDecoder {
    fn hop_length(&self) -> usize {
        self.hop_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{Init, VarMap};

    #[test]
    fn encoder_decoder_lengths() {
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let enc_cfg = SeanetEncoderConfig {
            channels: 2,
            dimension: 16,
            n_filters: 4,
            ratios: vec![2, 4, 5],
            lstm: 0,
            ..Default::default()
        };
        let dec_cfg = SeanetDecoderConfig {
            channels: 2,
            dimension: 16,
            n_filters: 4,
            ratios: vec![5, 4, 2],
            lstm: 0,
            ..Default::default()
        };
        let encoder = SeanetEncoder::new(&enc_cfg, vb.pp("encoder")).unwrap();
        let decoder = SeanetDecoder::new(&dec_cfg, vb.pp("decoder")).unwrap();
        assert_eq!(encoder.hop_length(), 40);
        assert_eq!(decoder.hop_length(), 40);

        let xs = Tensor::zeros((1, 2, 400), DType::F32, &dev).unwrap();
        let latents = encoder.forward(&xs).unwrap();
        assert_eq!(latents.dims(), &[1, 16, 10]);
        let ys = decoder.forward(&latents).unwrap();
        assert_eq!(ys.dims(), &[1, 2, 400]);
    }

    #[test]
    fn convolutions_read_weight_norm_parameters() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let cfg = SeanetEncoderConfig {
            channels: 1,
            dimension: 4,
            n_filters: 2,
            ratios: vec![2],
            lstm: 0,
            ..Default::default()
        };
        SeanetEncoder::new(&cfg, vb).unwrap();
        let data = varmap.data().lock().unwrap();
        for name in [
            "conv_in.weight_g",
            "conv_in.weight_v",
            "blocks.0.resnets.0.block.1.weight_v",
            "blocks.0.resnets.0.shortcut.weight_g",
            "blocks.0.downsample.bias",
            "conv_out.weight_v",
        ] {
            assert!(data.contains_key(name), "missing {name}");
        }
        assert!(!data.contains_key("conv_in.weight"));
    }

    #[test]
    fn lstm_keeps_shape() {
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let lstm = SeanetLstm::new(8, 2, vb).unwrap();
        let xs = Tensor::randn(0f32, 1.0, (2, 8, 12), &dev).unwrap();
        let ys = lstm.forward(&xs).unwrap();
        assert_eq!(ys.dims(), &[2, 8, 12]);
    }

    #[test]
    fn true_skip_block_is_identity_with_zero_gain() {
        let dev = Device::Cpu;
        // Non-zero directions keep the weight norm finite; the default zero gains
        // then zero both convolutions.
        let varmap = VarMap::new();
        varmap
            .get((4, 8, 3), "block.1.weight_v", Init::Const(1.0), DType::F32, &dev)
            .unwrap();
        varmap
            .get((8, 4, 1), "block.3.weight_v", Init::Const(1.0), DType::F32, &dev)
            .unwrap();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let block = SeanetResnetBlock::new(8, 3, 2, 2, true, vb).unwrap();
        let xs = Tensor::randn(0f32, 1.0, (1, 8, 20), &dev).unwrap();
        let ys = block.forward(&xs).unwrap();
        let diff: f32 = (ys - &xs).unwrap().abs().unwrap().max_all().unwrap().to_scalar().unwrap();
        assert!(diff < 1e-6);
    }
}
