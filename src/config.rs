//! Configuration for autoencoder models and their components.
//!
//! Mirrors the JSON model configs of the exported checkpoints: every component is a
//! `{"type": ..., "config": {...}}` section, and the model level carries
//! `latent_dim`, `downsampling_ratio` and `io_channels`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ---------------------------------------------------------------------------
// Component sections
// ---------------------------------------------------------------------------

/// A `{"type": ..., "config": {...}}` section selecting one registered family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ComponentConfig {
    pub fn new(kind: &str, config: serde_json::Value) -> Self {
        Self {
            kind: Some(kind.to_string()),
            config,
        }
    }

    /// Parse the nested `config` object, falling back to defaults when it is absent.
    pub fn parse<T: DeserializeOwned + Default>(&self) -> Result<T> {
        parse_section(&self.config)
    }
}

/// Deserialize a section, treating `null` as "all defaults".
pub fn parse_section<T: DeserializeOwned + Default>(value: &serde_json::Value) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value.clone())?)
}

// ---------------------------------------------------------------------------
// Model level
// ---------------------------------------------------------------------------

/// Sampler used by the diffusion decode path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamplerConfig {
    /// v-objective DDIM on a cosine schedule.
    #[default]
    VDdim,
    /// Flow-matching Euler with a shifted sigma schedule.
    FlowEuler {
        #[serde(default = "default_shift")]
        shift: f64,
    },
}

/// Top-level autoencoder model configuration.
///
/// Required fields are kept optional here so that a missing one is reported as
/// a configuration error naming the field, rather than a generic parse error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    pub encoder: Option<ComponentConfig>,
    pub decoder: Option<ComponentConfig>,
    pub latent_dim: Option<usize>,
    pub downsampling_ratio: Option<usize>,
    pub io_channels: Option<usize>,
    #[serde(default)]
    pub bottleneck: Option<ComponentConfig>,
    #[serde(default)]
    pub pretransform: Option<ComponentConfig>,

    // --- Diffusion variant ---
    #[serde(default)]
    pub diffusion: Option<ComponentConfig>,
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// One-time multiplier applied to fresh encoder weights (`null` disables).
    #[serde(default = "default_encoder_init_scale")]
    pub encoder_init_scale: Option<f64>,
}

impl AutoencoderConfig {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn latent_dim(&self) -> Result<usize> {
        require_positive(self.latent_dim, "latent_dim")
    }

    pub fn downsampling_ratio(&self) -> Result<usize> {
        require_positive(self.downsampling_ratio, "downsampling_ratio")
    }

    pub fn io_channels(&self) -> Result<usize> {
        require_positive(self.io_channels, "io_channels")
    }

    pub fn encoder(&self) -> Result<&ComponentConfig> {
        require(self.encoder.as_ref(), "encoder")
    }

    pub fn decoder(&self) -> Result<&ComponentConfig> {
        require(self.decoder.as_ref(), "decoder")
    }

    pub fn diffusion(&self) -> Result<&ComponentConfig> {
        require(self.diffusion.as_ref(), "diffusion")
    }
}

fn require<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::Config(format!("{field} must be specified in model config")))
}

fn require_positive(value: Option<usize>, field: &str) -> Result<usize> {
    match require(value, field)? {
        0 => Err(Error::Config(format!("{field} must be a positive integer"))),
        v => Ok(v),
    }
}

fn default_encoder_init_scale() -> Option<f64> {
    Some(0.5)
}

fn default_shift() -> f64 {
    1.0
}

fn check_strides(strides: &[usize], what: &str) -> Result<()> {
    if strides.contains(&0) {
        return Err(Error::Config(format!("{what} must all be positive, got {strides:?}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Native block stack ("audio_ae")
// ---------------------------------------------------------------------------

/// Encoder half of the native block stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEncoderConfig {
    pub in_channels: usize,
    pub channels: usize,
    pub latent_dim: usize,
    pub c_mults: Vec<usize>,
    pub strides: Vec<usize>,
}

impl Default for AudioEncoderConfig {
    fn default() -> Self {
        Self {
            in_channels: 2,
            channels: 64,
            latent_dim: 32,
            c_mults: vec![2, 4, 8, 16, 32],
            strides: vec![2, 2, 2, 2, 2],
        }
    }
}

impl AudioEncoderConfig {
    /// Total downsampling = product of all strides.
    pub fn hop_length(&self) -> usize {
        self.strides.iter().product()
    }

    pub fn validate(&self) -> Result<()> {
        validate_schedule(&self.c_mults, &self.strides)
    }
}

/// Decoder half of the native block stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDecoderConfig {
    pub out_channels: usize,
    pub channels: usize,
    pub latent_dim: usize,
    pub c_mults: Vec<usize>,
    pub strides: Vec<usize>,
}

impl Default for AudioDecoderConfig {
    fn default() -> Self {
        Self {
            out_channels: 2,
            channels: 64,
            latent_dim: 32,
            c_mults: vec![2, 4, 8, 16, 32],
            strides: vec![2, 2, 2, 2, 2],
        }
    }
}

impl AudioDecoderConfig {
    /// Total upsampling = product of all strides.
    pub fn hop_length(&self) -> usize {
        self.strides.iter().product()
    }

    pub fn validate(&self) -> Result<()> {
        validate_schedule(&self.c_mults, &self.strides)
    }
}

fn validate_schedule(c_mults: &[usize], strides: &[usize]) -> Result<()> {
    if c_mults.len() != strides.len() {
        return Err(Error::Config(format!(
            "channel schedule has {} multipliers but {} strides",
            c_mults.len(),
            strides.len()
        )));
    }
    check_strides(strides, "strides")?;
    check_strides(c_mults, "c_mults")
}

// ---------------------------------------------------------------------------
// SEANet ("seanet")
// ---------------------------------------------------------------------------

/// SEANet encoder. `ratios` are listed in the order the encoder applies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeanetEncoderConfig {
    pub channels: usize,
    pub dimension: usize,
    pub n_filters: usize,
    pub n_residual_layers: usize,
    pub ratios: Vec<usize>,
    pub kernel_size: usize,
    pub last_kernel_size: usize,
    pub residual_kernel_size: usize,
    pub dilation_base: usize,
    pub compress: usize,
    pub true_skip: bool,
    pub lstm: usize,
}

impl Default for SeanetEncoderConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            dimension: 128,
            n_filters: 32,
            n_residual_layers: 1,
            ratios: vec![2, 4, 5, 8],
            kernel_size: 7,
            last_kernel_size: 7,
            residual_kernel_size: 3,
            dilation_base: 2,
            compress: 2,
            true_skip: false,
            lstm: 2,
        }
    }
}

impl SeanetEncoderConfig {
    pub fn hop_length(&self) -> usize {
        self.ratios.iter().product()
    }

    pub fn validate(&self) -> Result<()> {
        check_strides(&self.ratios, "ratios")?;
        if self.compress == 0 {
            return Err(Error::Config("compress must be positive".to_string()));
        }
        Ok(())
    }
}

/// SEANet decoder. `ratios` are listed in the order the decoder applies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeanetDecoderConfig {
    pub channels: usize,
    pub dimension: usize,
    pub n_filters: usize,
    pub n_residual_layers: usize,
    pub ratios: Vec<usize>,
    pub kernel_size: usize,
    pub last_kernel_size: usize,
    pub residual_kernel_size: usize,
    pub dilation_base: usize,
    pub compress: usize,
    pub true_skip: bool,
    pub lstm: usize,
}

impl Default for SeanetDecoderConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            dimension: 128,
            n_filters: 32,
            n_residual_layers: 1,
            ratios: vec![8, 5, 4, 2],
            kernel_size: 7,
            last_kernel_size: 7,
            residual_kernel_size: 3,
            dilation_base: 2,
            compress: 2,
            true_skip: false,
            lstm: 2,
        }
    }
}

impl SeanetDecoderConfig {
    pub fn hop_length(&self) -> usize {
        self.ratios.iter().product()
    }

    pub fn validate(&self) -> Result<()> {
        check_strides(&self.ratios, "ratios")?;
        if self.compress == 0 {
            return Err(Error::Config("compress must be positive".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Descript Audio Codec ("dac")
// ---------------------------------------------------------------------------

/// DAC encoder followed by a 1×1 projection to `latent_dim`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DacEncoderConfig {
    pub latent_dim: usize,
    pub in_channels: usize,
    pub d_model: usize,
    pub strides: Vec<usize>,
    pub d_latent: usize,
}

impl Default for DacEncoderConfig {
    fn default() -> Self {
        Self {
            latent_dim: 32,
            in_channels: 1,
            d_model: 64,
            strides: vec![2, 4, 8, 8],
            d_latent: 64,
        }
    }
}

impl DacEncoderConfig {
    pub fn hop_length(&self) -> usize {
        self.strides.iter().product()
    }

    pub fn validate(&self) -> Result<()> {
        check_strides(&self.strides, "strides")
    }
}

/// DAC decoder reading `latent_dim` input channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DacDecoderConfig {
    pub latent_dim: usize,
    pub channels: usize,
    pub rates: Vec<usize>,
    pub d_out: usize,
}

impl Default for DacDecoderConfig {
    fn default() -> Self {
        Self {
            latent_dim: 32,
            channels: 1536,
            rates: vec![8, 8, 4, 2],
            d_out: 1,
        }
    }
}

impl DacDecoderConfig {
    pub fn hop_length(&self) -> usize {
        self.rates.iter().product()
    }

    pub fn validate(&self) -> Result<()> {
        check_strides(&self.rates, "rates")?;
        let halvings = self.rates.len() as u32;
        if self.channels % 2usize.pow(halvings) != 0 {
            return Err(Error::Config(format!(
                "channels {} must be divisible by 2^{halvings}",
                self.channels
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pretransforms
// ---------------------------------------------------------------------------

/// Nested, usually frozen, autoencoder used as an outer transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoencoderPretransformConfig {
    /// Full model config of the nested autoencoder.
    pub model: serde_json::Value,
    /// Latents are divided by `scale` on encode and multiplied on decode.
    pub scale: f64,
    pub enable_grad: bool,
}

impl Default for AutoencoderPretransformConfig {
    fn default() -> Self {
        Self {
            model: serde_json::Value::Null,
            scale: 1.0,
            enable_grad: false,
        }
    }
}

/// Parameter-free fold of `patch_size` consecutive samples into channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchedPretransformConfig {
    pub patch_size: usize,
    pub enable_grad: bool,
}

impl Default for PatchedPretransformConfig {
    fn default() -> Self {
        Self {
            patch_size: 4,
            enable_grad: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Denoiser ("residual_conv")
// ---------------------------------------------------------------------------

/// Convolutional v-prediction denoiser conditioned on a latent-derived signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualConvDenoiserConfig {
    /// Channels of the noisy waveform (and of the prediction).
    pub io_channels: usize,
    /// Channels of the conditioning signal; 0 disables conditioning.
    pub cond_dim: usize,
    pub channels: usize,
    /// Number of `[1, 3, 9]` dilation cycles.
    pub depth: usize,
    /// Width of the sinusoidal timestep embedding.
    pub embed_dim: usize,
}

impl Default for ResidualConvDenoiserConfig {
    fn default() -> Self {
        Self {
            io_channels: 2,
            cond_dim: 32,
            channels: 64,
            depth: 2,
            embed_dim: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encoder_defaults() {
        let cfg = AudioEncoderConfig::default();
        assert_eq!(cfg.hop_length(), 32);
        assert_eq!(cfg.c_mults.len(), cfg.strides.len());
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_section_fills_defaults() {
        let section = ComponentConfig::new("audio_ae", json!({"channels": 16, "strides": [4, 4, 2, 2, 2]}));
        let cfg: AudioEncoderConfig = section.parse().unwrap();
        assert_eq!(cfg.channels, 16);
        assert_eq!(cfg.in_channels, 2);
        assert_eq!(cfg.hop_length(), 128);
    }

    #[test]
    fn null_section_is_default() {
        let cfg: DacDecoderConfig = parse_section(&serde_json::Value::Null).unwrap();
        assert_eq!(cfg, DacDecoderConfig::default());
        assert_eq!(cfg.hop_length(), 512);
    }

    #[test]
    fn schedule_length_mismatch() {
        let cfg = AudioDecoderConfig {
            c_mults: vec![2, 4],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn missing_required_fields_are_named() {
        let cfg = AutoencoderConfig::from_value(&json!({
            "encoder": {"type": "audio_ae"},
            "decoder": {"type": "audio_ae"},
            "downsampling_ratio": 32,
            "io_channels": 2
        }))
        .unwrap();
        let err = cfg.latent_dim().unwrap_err();
        assert!(err.to_string().contains("latent_dim"), "{err}");
        assert_eq!(cfg.io_channels().unwrap(), 2);
        assert!(cfg.diffusion().is_err());
    }

    #[test]
    fn zero_is_not_a_valid_ratio() {
        let cfg = AutoencoderConfig::from_value(&json!({"downsampling_ratio": 0})).unwrap();
        assert!(matches!(cfg.downsampling_ratio(), Err(Error::Config(_))));
    }

    #[test]
    fn sampler_and_init_scale_defaults() {
        let cfg = AutoencoderConfig::from_value(&json!({})).unwrap();
        assert_eq!(cfg.sampler, SamplerConfig::VDdim);
        assert_eq!(cfg.encoder_init_scale, Some(0.5));

        let cfg = AutoencoderConfig::from_value(&json!({
            "sampler": {"type": "flow_euler", "shift": 3.0},
            "encoder_init_scale": null
        }))
        .unwrap();
        assert_eq!(cfg.sampler, SamplerConfig::FlowEuler { shift: 3.0 });
        assert_eq!(cfg.encoder_init_scale, None);
    }

    #[test]
    fn dac_decoder_channels_must_halve_cleanly() {
        let cfg = DacDecoderConfig {
            channels: 100,
            rates: vec![2, 2, 2, 2],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
