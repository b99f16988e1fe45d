//! Configuration-driven construction.
//!
//! Every component section is `{"type": tag, "config": {...}}`. A [`Registry`]
//! maps tags to constructor functions, so adding a family is one
//! [`Registry::register`] call.
//!
//! ```text
//! model config ─► AutoencoderConfig ─► dims (latent_dim, downsampling_ratio, io_channels)
//!                                   ├► encoders["type"]      (vb: encoder.*)
//!                                   ├► decoders["type"]      (vb: decoder.*)
//!                                   ├► bottlenecks["type"]   (optional)
//!                                   ├► pretransforms["type"] (optional, vb: pretransform.*)
//!                                   └► denoisers["type"]     (diffusion only, vb: diffusion.*)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};

use crate::autoencoder::{AudioAutoencoder, AutoencoderDims, DecodeStrategy};
use crate::bottleneck::{Bottleneck, L2NormBottleneck, TanhBottleneck, VaeBottleneck};
use crate::config::{
    AudioDecoderConfig, AudioEncoderConfig, AutoencoderConfig, AutoencoderPretransformConfig,
    ComponentConfig, DacDecoderConfig, DacEncoderConfig, PatchedPretransformConfig,
    ResidualConvDenoiserConfig, SeanetDecoderConfig, SeanetEncoderConfig,
};
use crate::init::scale_vars;
use crate::model::LatentModule;
use crate::model::audio_ae::{AudioDecoder, AudioEncoder};
use crate::model::dac::{DacDecoder, DacEncoder};
use crate::model::denoiser::ResidualConvDenoiser;
use crate::model::seanet::{SeanetDecoder, SeanetEncoder};
use crate::pretransform::{AutoencoderPretransform, PatchedPretransform, Pretransform};
use crate::sampler::{self, Denoiser};
use crate::{Error, Result};

/// Builds one component from its section.
pub type Constructor<T> = fn(&Factory, &ComponentConfig, VarBuilder) -> Result<T>;

/// Tag → constructor table for one component kind.
pub struct Registry<T> {
    kind: &'static str,
    constructors: BTreeMap<String, Constructor<T>>,
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            constructors: BTreeMap::new(),
        }
    }

    /// Add or replace the constructor for `tag`.
    pub fn register(&mut self, tag: &str, constructor: Constructor<T>) -> &mut Self {
        self.constructors.insert(tag.to_string(), constructor);
        self
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn build(&self, factory: &Factory, section: &ComponentConfig, vb: VarBuilder) -> Result<T> {
        let tag = section
            .kind
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{} type must be specified", self.kind)))?;
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| Error::Config(format!("unknown {} type {tag}", self.kind)))?;
        tracing::debug!(kind = self.kind, tag, "building component");
        constructor(factory, section, vb)
    }
}

pub struct Factory {
    pub encoders: Registry<Arc<dyn LatentModule>>,
    pub decoders: Registry<Arc<dyn LatentModule>>,
    pub bottlenecks: Registry<Arc<dyn Bottleneck>>,
    pub pretransforms: Registry<Arc<dyn Pretransform>>,
    pub denoisers: Registry<Arc<dyn Denoiser>>,
}

impl Default for Factory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory
            .encoders
            .register("audio_ae", build_audio_encoder)
            .register("seanet", build_seanet_encoder)
            .register("dac", build_dac_encoder);
        factory
            .decoders
            .register("audio_ae", build_audio_decoder)
            .register("seanet", build_seanet_decoder)
            .register("dac", build_dac_decoder);
        factory
            .bottlenecks
            .register("tanh", |_, _, _| Ok(Arc::new(TanhBottleneck)))
            .register("vae", |_, _, _| Ok(Arc::new(VaeBottleneck)))
            .register("l2_norm", |_, _, _| Ok(Arc::new(L2NormBottleneck)));
        factory
            .pretransforms
            .register("autoencoder", build_autoencoder_pretransform)
            .register("patched", build_patched_pretransform);
        factory
            .denoisers
            .register("residual_conv", build_residual_conv_denoiser);
        factory
    }
}

impl Factory {
    /// A factory with no registered families.
    pub fn empty() -> Self {
        Self {
            encoders: Registry::new("encoder"),
            decoders: Registry::new("decoder"),
            bottlenecks: Registry::new("bottleneck"),
            pretransforms: Registry::new("pretransform"),
            denoisers: Registry::new("diffusion"),
        }
    }

    /// Autoencoder with a direct decoder.
    pub fn autoencoder(&self, value: &serde_json::Value, vb: VarBuilder) -> Result<AudioAutoencoder> {
        let cfg = AutoencoderConfig::from_value(value)?;
        let dims = model_dims(&cfg)?;

        let encoder = self.encoders.build(self, cfg.encoder()?, vb.pp("encoder"))?;
        check_ratio("encoder", encoder.hop_length(), dims.downsampling_ratio)?;
        let decoder = self.decoders.build(self, cfg.decoder()?, vb.pp("decoder"))?;
        check_ratio("decoder", decoder.hop_length(), dims.downsampling_ratio)?;

        let ae = AudioAutoencoder::new(encoder, DecodeStrategy::Direct { decoder }, dims);
        let ae = self.attach_optional(ae, &cfg, &vb)?;
        tracing::info!(
            latent_dim = dims.latent_dim,
            downsampling_ratio = dims.downsampling_ratio,
            io_channels = dims.io_channels,
            "built autoencoder"
        );
        Ok(ae)
    }

    /// Autoencoder whose decode runs an iterative sampler over a denoiser.
    ///
    /// The `decoder` section is optional here; when present it maps latents to
    /// the denoiser's conditioning signal.
    ///
    /// Parameters are taken from `vb` as-is; see
    /// [`diffusion_autoencoder_from_varmap`](Self::diffusion_autoencoder_from_varmap)
    /// for fresh initialisation with `encoder_init_scale`.
    pub fn diffusion_autoencoder(
        &self,
        value: &serde_json::Value,
        vb: VarBuilder,
    ) -> Result<AudioAutoencoder> {
        let cfg = AutoencoderConfig::from_value(value)?;
        let dims = model_dims(&cfg)?;
        let diffusion = cfg.diffusion()?;

        let encoder = self.encoders.build(self, cfg.encoder()?, vb.pp("encoder"))?;
        check_ratio("encoder", encoder.hop_length(), dims.downsampling_ratio)?;
        let decoder = cfg
            .decoder
            .as_ref()
            .map(|section| self.decoders.build(self, section, vb.pp("decoder")))
            .transpose()?;
        let denoiser = self.denoisers.build(self, diffusion, vb.pp("diffusion"))?;
        let sampler = sampler::from_config(&cfg.sampler);

        let strategy = DecodeStrategy::Diffusion {
            decoder,
            denoiser,
            sampler,
        };
        let ae = AudioAutoencoder::new(encoder, strategy, dims);
        let ae = self.attach_optional(ae, &cfg, &vb)?;
        tracing::info!(
            latent_dim = dims.latent_dim,
            downsampling_ratio = dims.downsampling_ratio,
            io_channels = dims.io_channels,
            sampler = ?cfg.sampler,
            "built diffusion autoencoder"
        );
        Ok(ae)
    }

    /// Fresh diffusion autoencoder backed by `varmap`, with the configured
    /// `encoder_init_scale` applied once to the encoder's variables.
    pub fn diffusion_autoencoder_from_varmap(
        &self,
        value: &serde_json::Value,
        varmap: &VarMap,
        dtype: DType,
        device: &Device,
    ) -> Result<AudioAutoencoder> {
        let vb = VarBuilder::from_varmap(varmap, dtype, device);
        let ae = self.diffusion_autoencoder(value, vb)?;
        let cfg = AutoencoderConfig::from_value(value)?;
        if let Some(scale) = cfg.encoder_init_scale {
            let scaled = scale_vars(varmap, "encoder.", scale)?;
            tracing::info!(scale, scaled, "scaled encoder parameters");
        }
        Ok(ae)
    }

    fn attach_optional(
        &self,
        mut ae: AudioAutoencoder,
        cfg: &AutoencoderConfig,
        vb: &VarBuilder,
    ) -> Result<AudioAutoencoder> {
        if let Some(section) = &cfg.bottleneck {
            ae = ae.with_bottleneck(self.bottlenecks.build(self, section, vb.pp("bottleneck"))?);
        }
        if let Some(section) = &cfg.pretransform {
            ae = ae.with_pretransform(self.pretransforms.build(self, section, vb.pp("pretransform"))?);
        }
        Ok(ae)
    }
}

/// Build a direct autoencoder with the default families.
pub fn create_autoencoder_from_config(
    value: &serde_json::Value,
    vb: VarBuilder,
) -> Result<AudioAutoencoder> {
    Factory::default().autoencoder(value, vb)
}

/// Build a diffusion autoencoder with the default families.
///
/// `encoder_init_scale` is not applied here, since `vb` may hold loaded weights.
/// For freshly initialised models use [`Factory::diffusion_autoencoder_from_varmap`].
pub fn create_diffusion_autoencoder_from_config(
    value: &serde_json::Value,
    vb: VarBuilder,
) -> Result<AudioAutoencoder> {
    Factory::default().diffusion_autoencoder(value, vb)
}

fn model_dims(cfg: &AutoencoderConfig) -> Result<AutoencoderDims> {
    Ok(AutoencoderDims {
        latent_dim: cfg.latent_dim()?,
        downsampling_ratio: cfg.downsampling_ratio()?,
        io_channels: cfg.io_channels()?,
    })
}

fn check_ratio(what: &str, hop_length: usize, downsampling_ratio: usize) -> Result<()> {
    if hop_length != downsampling_ratio {
        return Err(Error::Config(format!(
            "downsampling_ratio is {downsampling_ratio} but the {what} stride schedule multiplies to {hop_length}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Default constructors
// ---------------------------------------------------------------------------

fn build_audio_encoder(_: &Factory, section: &ComponentConfig, vb: VarBuilder) -> Result<Arc<dyn LatentModule>> {
    let cfg: AudioEncoderConfig = section.parse()?;
    cfg.validate()?;
    Ok(Arc::new(AudioEncoder::new(&cfg, vb)?))
}

fn build_audio_decoder(_: &Factory, section: &ComponentConfig, vb: VarBuilder) -> Result<Arc<dyn LatentModule>> {
    let cfg: AudioDecoderConfig = section.parse()?;
    cfg.validate()?;
    Ok(Arc::new(AudioDecoder::new(&cfg, vb)?))
}

fn build_seanet_encoder(_: &Factory, section: &ComponentConfig, vb: VarBuilder) -> Result<Arc<dyn LatentModule>> {
    let cfg: SeanetEncoderConfig = section.parse()?;
    cfg.validate()?;
    Ok(Arc::new(SeanetEncoder::new(&cfg, vb)?))
}

fn build_seanet_decoder(_: &Factory, section: &ComponentConfig, vb: VarBuilder) -> Result<Arc<dyn LatentModule>> {
    let cfg: SeanetDecoderConfig = section.parse()?;
    cfg.validate()?;
    Ok(Arc::new(SeanetDecoder::new(&cfg, vb)?))
}

fn build_dac_encoder(_: &Factory, section: &ComponentConfig, vb: VarBuilder) -> Result<Arc<dyn LatentModule>> {
    let cfg: DacEncoderConfig = section.parse()?;
    cfg.validate()?;
    Ok(Arc::new(DacEncoder::new(&cfg, vb)?))
}

fn build_dac_decoder(_: &Factory, section: &ComponentConfig, vb: VarBuilder) -> Result<Arc<dyn LatentModule>> {
    let cfg: DacDecoderConfig = section.parse()?;
    cfg.validate()?;
    Ok(Arc::new(DacDecoder::new(&cfg, vb)?))
}

fn build_autoencoder_pretransform(
    factory: &Factory,
    section: &ComponentConfig,
    vb: VarBuilder,
) -> Result<Arc<dyn Pretransform>> {
    let cfg: AutoencoderPretransformConfig = section.parse()?;
    if cfg.model.is_null() {
        return Err(Error::Config(
            "model must be specified in autoencoder pretransform config".into(),
        ));
    }
    let model = factory.autoencoder(&cfg.model, vb.pp("model"))?;
    Ok(Arc::new(AutoencoderPretransform::new(
        Arc::new(model),
        cfg.scale,
        cfg.enable_grad,
    )?))
}

fn build_patched_pretransform(
    _: &Factory,
    section: &ComponentConfig,
    _: VarBuilder,
) -> Result<Arc<dyn Pretransform>> {
    let cfg: PatchedPretransformConfig = section.parse()?;
    Ok(Arc::new(PatchedPretransform::new(cfg.patch_size, cfg.enable_grad)?))
}

fn build_residual_conv_denoiser(
    _: &Factory,
    section: &ComponentConfig,
    vb: VarBuilder,
) -> Result<Arc<dyn Denoiser>> {
    let cfg: ResidualConvDenoiserConfig = section.parse()?;
    Ok(Arc::new(ResidualConvDenoiser::new(&cfg, vb)?))
}
