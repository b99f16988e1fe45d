//! Audio autoencoder: waveform ↔ latent sequence.
//!
//! ```text
//! encode: audio → [pretransform.encode] → encode_fn(encoder) → [bottleneck.encode] → latents (+ info)
//! decode: latents → [bottleneck.decode] → decode strategy → [pretransform.decode] → audio
//! ```
//!
//! The decode strategy is fixed at construction:
//!
//! - [`DecodeStrategy::Direct`] runs `decode_fn(decoder)` on the latents.
//! - [`DecodeStrategy::Diffusion`] draws noise of length `frames * downsampling_ratio`
//!   and lets a [`Sampler`] denoise it, conditioned on the latents (optionally
//!   passed through `decode_fn(decoder)` first).
//!
//! Pretransform sub-calls run under [`grad::scoped`] with the pretransform's own
//! gradient policy; the diffusion path always decodes it with gradients disabled.

use std::fmt;
use std::sync::Arc;

use candle_core::{Module, Tensor};

use crate::bottleneck::{Bottleneck, BottleneckInfo};
use crate::grad::{self, GradMode};
use crate::model::LatentModule;
use crate::pretransform::Pretransform;
use crate::sampler::{self, Denoiser, Sampler};
use crate::{Error, Result};

/// Calls the encoder on a (pretransformed) waveform.
pub type EncodeFn = Arc<dyn Fn(&Tensor, &dyn LatentModule) -> Result<Tensor> + Send + Sync>;

/// Calls the decoder on (bottleneck-decoded) latents, receiving the caller's options.
pub type DecodeFn =
    Arc<dyn Fn(&Tensor, &dyn LatentModule, &DecodeOptions) -> Result<Tensor> + Send + Sync>;

pub fn default_encode_fn() -> EncodeFn {
    Arc::new(|audio: &Tensor, encoder: &dyn LatentModule| Ok(encoder.forward(audio)?))
}

pub fn default_decode_fn() -> DecodeFn {
    Arc::new(
        |latents: &Tensor, decoder: &dyn LatentModule, _opts: &DecodeOptions| {
            Ok(decoder.forward(latents)?)
        },
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Merge the bottleneck's auxiliary outputs into [`Encoded::info`].
    pub return_info: bool,
    /// Feed the input straight to the encoder.
    pub skip_pretransform: bool,
}

#[derive(Debug, Clone)]
pub struct Encoded {
    pub latents: Tensor,
    /// Empty unless [`EncodeOptions::return_info`] was set.
    pub info: BottleneckInfo,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
    /// Denoising steps of the diffusion strategy.
    pub steps: usize,
    /// Sampler stochasticity; `0.0` ends fully denoised and is deterministic.
    pub eta: f64,
    /// Seed for the initial diffusion noise.
    pub seed: Option<u64>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            steps: 100,
            eta: 0.0,
            seed: None,
        }
    }
}

#[derive(Clone)]
pub enum DecodeStrategy {
    Direct {
        decoder: Arc<dyn LatentModule>,
    },
    Diffusion {
        /// Turns latents into the conditioning signal; latents are used as-is when absent.
        decoder: Option<Arc<dyn LatentModule>>,
        denoiser: Arc<dyn Denoiser>,
        sampler: Arc<dyn Sampler>,
    },
}

impl fmt::Debug for DecodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { decoder } => f.debug_struct("Direct").field("decoder", decoder).finish(),
            Self::Diffusion {
                decoder,
                denoiser,
                sampler,
            } => f
                .debug_struct("Diffusion")
                .field("decoder", decoder)
                .field("denoiser", denoiser)
                .field("sampler", sampler)
                .finish(),
        }
    }
}

/// Static dimensions of an autoencoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoencoderDims {
    pub latent_dim: usize,
    pub downsampling_ratio: usize,
    pub io_channels: usize,
}

#[derive(Clone)]
pub struct AudioAutoencoder {
    encoder: Arc<dyn LatentModule>,
    strategy: DecodeStrategy,
    dims: AutoencoderDims,
    bottleneck: Option<Arc<dyn Bottleneck>>,
    pretransform: Option<Arc<dyn Pretransform>>,
    encode_fn: EncodeFn,
    decode_fn: DecodeFn,
}

impl fmt::Debug for AudioAutoencoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAutoencoder")
            .field("encoder", &self.encoder)
            .field("strategy", &self.strategy)
            .field("dims", &self.dims)
            .field("bottleneck", &self.bottleneck)
            .field("pretransform", &self.pretransform)
            .finish_non_exhaustive()
    }
}

impl AudioAutoencoder {
    pub fn new(encoder: Arc<dyn LatentModule>, strategy: DecodeStrategy, dims: AutoencoderDims) -> Self {
        Self {
            encoder,
            strategy,
            dims,
            bottleneck: None,
            pretransform: None,
            encode_fn: default_encode_fn(),
            decode_fn: default_decode_fn(),
        }
    }

    pub fn with_bottleneck(mut self, bottleneck: Arc<dyn Bottleneck>) -> Self {
        self.bottleneck = Some(bottleneck);
        self
    }

    pub fn with_pretransform(mut self, pretransform: Arc<dyn Pretransform>) -> Self {
        self.pretransform = Some(pretransform);
        self
    }

    /// Replace the encoder call, e.g. for encoders with a different calling convention.
    pub fn with_encode_fn(mut self, encode_fn: EncodeFn) -> Self {
        self.encode_fn = encode_fn;
        self
    }

    pub fn with_decode_fn(mut self, decode_fn: DecodeFn) -> Self {
        self.decode_fn = decode_fn;
        self
    }

    pub fn dims(&self) -> AutoencoderDims {
        self.dims
    }

    pub fn latent_dim(&self) -> usize {
        self.dims.latent_dim
    }

    pub fn downsampling_ratio(&self) -> usize {
        self.dims.downsampling_ratio
    }

    /// Waveform samples per latent frame, counting the pretransform's own factor.
    ///
    /// Inputs to [`encode`](Self::encode) must be a multiple of this long.
    pub fn total_downsampling_ratio(&self) -> usize {
        let outer = self.pretransform.as_ref().map_or(1, |p| p.downsampling_ratio());
        self.dims.downsampling_ratio * outer
    }

    pub fn io_channels(&self) -> usize {
        self.dims.io_channels
    }

    pub fn strategy(&self) -> &DecodeStrategy {
        &self.strategy
    }

    pub fn is_diffusion(&self) -> bool {
        matches!(self.strategy, DecodeStrategy::Diffusion { .. })
    }

    pub fn bottleneck(&self) -> Option<&dyn Bottleneck> {
        self.bottleneck.as_deref()
    }

    pub fn pretransform(&self) -> Option<&dyn Pretransform> {
        self.pretransform.as_deref()
    }

    // -----------------------------------------------------------------------
    // Encode
    // -----------------------------------------------------------------------

    /// Waveform `[batch, io_channels, samples]` → latents `[batch, latent_dim, frames]`.
    pub fn encode(&self, audio: &Tensor) -> Result<Tensor> {
        Ok(self.encode_with(audio, EncodeOptions::default())?.latents)
    }

    pub fn encode_with(&self, audio: &Tensor, opts: EncodeOptions) -> Result<Encoded> {
        check_rank3(audio, "audio")?;
        tracing::debug!(shape = ?audio.dims(), ?opts, "encode");

        let audio = match &self.pretransform {
            Some(pretransform) if !opts.skip_pretransform => {
                let mode = GradMode::from_enabled(pretransform.enable_grad());
                grad::scoped(mode, || pretransform.encode(audio))?
            }
            _ => audio.clone(),
        };

        let mut latents = (self.encode_fn)(&audio, self.encoder.as_ref())?;
        let mut info = BottleneckInfo::new();
        if let Some(bottleneck) = &self.bottleneck {
            let (bottlenecked, bottleneck_info) = bottleneck.encode(&latents)?;
            latents = bottlenecked;
            if opts.return_info {
                info.extend(bottleneck_info);
            }
        }

        tracing::debug!(shape = ?latents.dims(), info_keys = info.len(), "encoded");
        Ok(Encoded { latents, info })
    }

    // -----------------------------------------------------------------------
    // Decode
    // -----------------------------------------------------------------------

    pub fn decode(&self, latents: &Tensor) -> Result<Tensor> {
        self.decode_with(latents, &DecodeOptions::default())
    }

    pub fn decode_with(&self, latents: &Tensor, opts: &DecodeOptions) -> Result<Tensor> {
        check_rank3(latents, "latents")?;
        tracing::debug!(shape = ?latents.dims(), "decode");

        let latents = match &self.bottleneck {
            Some(bottleneck) => bottleneck.decode(latents)?,
            None => latents.clone(),
        };

        match &self.strategy {
            DecodeStrategy::Direct { decoder } => {
                let decoded = (self.decode_fn)(&latents, decoder.as_ref(), opts)?;
                match &self.pretransform {
                    Some(pretransform) => {
                        let mode = GradMode::from_enabled(pretransform.enable_grad());
                        grad::scoped(mode, || pretransform.decode(&decoded))
                    }
                    None => Ok(decoded),
                }
            }
            DecodeStrategy::Diffusion {
                decoder,
                denoiser,
                sampler,
            } => self.diffusion_decode(&latents, decoder.as_deref(), denoiser.as_ref(), sampler.as_ref(), opts),
        }
    }

    fn diffusion_decode(
        &self,
        latents: &Tensor,
        decoder: Option<&dyn LatentModule>,
        denoiser: &dyn Denoiser,
        sampler: &dyn Sampler,
        opts: &DecodeOptions,
    ) -> Result<Tensor> {
        let (batch, _, frames) = latents.dims3()?;
        let target_len = frames * self.dims.downsampling_ratio;

        let cond = match decoder {
            Some(decoder) => (self.decode_fn)(latents, decoder, opts)?,
            None => latents.clone(),
        };

        let noise = sampler::gaussian_noise(
            (batch, self.dims.io_channels, target_len),
            opts.seed,
            latents.dtype(),
            latents.device(),
        )?;
        tracing::debug!(
            frames,
            target_len,
            steps = opts.steps,
            eta = opts.eta,
            seeded = opts.seed.is_some(),
            "diffusion decode"
        );

        let decoded = sampler.sample(denoiser, &noise, opts.steps, opts.eta, &cond)?;
        match &self.pretransform {
            Some(pretransform) => grad::scoped(GradMode::Disabled, || pretransform.decode(&decoded)),
            None => Ok(decoded),
        }
    }
}

fn check_rank3(xs: &Tensor, what: &str) -> Result<()> {
    if xs.rank() != 3 {
        return Err(Error::Contract(format!(
            "{what} must be [batch, channels, time], got shape {:?}",
            xs.dims()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use candle_core::{DType, Device, Var};
    use candle_nn::VarBuilder;

    use crate::bottleneck::VaeBottleneck;
    use crate::config::{AudioDecoderConfig, AudioEncoderConfig};
    use crate::model::audio_ae::{AudioDecoder, AudioEncoder};
    use crate::sampler::VDdimSampler;

    /// Identity stack with hop length 1.
    #[derive(Debug)]
    struct Identity;

    impl Module for Identity {
        fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
            Ok(xs.clone())
        }
    }

    impl LatentModule for Identity {
        fn hop_length(&self) -> usize {
            1
        }
    }

    /// Multiplies by a trainable scalar in both directions.
    #[derive(Debug)]
    struct Gain {
        gain: Var,
        enable_grad: bool,
    }

    impl Gain {
        fn new(enable_grad: bool) -> Self {
            Self {
                gain: Var::new(&[1.5f32], &Device::Cpu).unwrap(),
                enable_grad,
            }
        }
    }

    impl Pretransform for Gain {
        fn encode(&self, audio: &Tensor) -> Result<Tensor> {
            Ok(audio.broadcast_mul(self.gain.as_tensor())?)
        }

        fn decode(&self, latents: &Tensor) -> Result<Tensor> {
            Ok(latents.broadcast_mul(self.gain.as_tensor())?)
        }

        fn enable_grad(&self) -> bool {
            self.enable_grad
        }
    }

    #[derive(Debug)]
    struct ZeroDenoiser;

    impl Denoiser for ZeroDenoiser {
        fn forward(&self, xs: &Tensor, _t: &Tensor, _cond: &Tensor) -> Result<Tensor> {
            Ok(xs.zeros_like()?)
        }
    }

    /// Returns its noise unchanged and remembers the shape, step count and conditioning.
    #[derive(Debug, Default)]
    struct RecordingSampler {
        calls: Mutex<Vec<(Vec<usize>, usize)>>,
        conds: Mutex<Vec<Tensor>>,
    }

    impl Sampler for RecordingSampler {
        fn sample(
            &self,
            _denoiser: &dyn Denoiser,
            noise: &Tensor,
            steps: usize,
            _eta: f64,
            cond: &Tensor,
        ) -> Result<Tensor> {
            self.calls.lock().unwrap().push((noise.dims().to_vec(), steps));
            self.conds.lock().unwrap().push(cond.clone());
            Ok(noise.clone())
        }
    }

    fn identity_autoencoder(channels: usize) -> AudioAutoencoder {
        AudioAutoencoder::new(
            Arc::new(Identity),
            DecodeStrategy::Direct {
                decoder: Arc::new(Identity),
            },
            AutoencoderDims {
                latent_dim: channels,
                downsampling_ratio: 1,
                io_channels: channels,
            },
        )
    }

    fn diffusion_autoencoder(sampler: Arc<dyn Sampler>, ratio: usize) -> AudioAutoencoder {
        AudioAutoencoder::new(
            Arc::new(Identity),
            DecodeStrategy::Diffusion {
                decoder: None,
                denoiser: Arc::new(ZeroDenoiser),
                sampler,
            },
            AutoencoderDims {
                latent_dim: 4,
                downsampling_ratio: ratio,
                io_channels: 2,
            },
        )
    }

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
        (a - b).unwrap().abs().unwrap().max_all().unwrap().to_scalar().unwrap()
    }

    #[test]
    fn native_stack_shapes() {
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let enc_cfg = AudioEncoderConfig {
            channels: 4,
            c_mults: vec![1, 2, 2, 2, 2],
            ..Default::default()
        };
        let dec_cfg = AudioDecoderConfig {
            channels: 4,
            c_mults: vec![1, 2, 2, 2, 2],
            ..Default::default()
        };
        let ae = AudioAutoencoder::new(
            Arc::new(AudioEncoder::new(&enc_cfg, vb.pp("encoder")).unwrap()),
            DecodeStrategy::Direct {
                decoder: Arc::new(AudioDecoder::new(&dec_cfg, vb.pp("decoder")).unwrap()),
            },
            AutoencoderDims {
                latent_dim: 32,
                downsampling_ratio: 32,
                io_channels: 2,
            },
        );
        let audio = Tensor::zeros((1, 2, 32768), DType::F32, &dev).unwrap();
        let latents = ae.encode(&audio).unwrap();
        assert_eq!(latents.dims(), &[1, 32, 1024]);
        let decoded = ae.decode(&latents).unwrap();
        assert_eq!(decoded.dims(), &[1, 2, 32768]);
    }

    #[test]
    fn identity_round_trip_preserves_shape() {
        let dev = Device::Cpu;
        let ae = identity_autoencoder(3);
        let audio = Tensor::randn(0f32, 1.0, (2, 3, 40), &dev).unwrap();
        let decoded = ae.decode(&ae.encode(&audio).unwrap()).unwrap();
        assert_eq!(decoded.dims(), audio.dims());
        assert!(max_abs_diff(&decoded, &audio) < 1e-6);
    }

    #[test]
    fn bottleneck_info_is_merged_only_on_request() {
        let dev = Device::Cpu;
        let ae = identity_autoencoder(4).with_bottleneck(Arc::new(VaeBottleneck));
        let audio = Tensor::randn(0f32, 1.0, (1, 4, 16), &dev).unwrap();

        let with_info = ae
            .encode_with(
                &audio,
                EncodeOptions {
                    return_info: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(with_info.info.contains_key("kl"));
        assert_eq!(with_info.latents.dims(), &[1, 2, 16]);

        let without = ae.encode_with(&audio, EncodeOptions::default()).unwrap();
        assert!(without.info.is_empty());
    }

    #[test]
    fn skip_pretransform_bypasses_it() {
        let dev = Device::Cpu;
        let ae = identity_autoencoder(2).with_pretransform(Arc::new(Gain::new(true)));
        let audio = Tensor::ones((1, 2, 8), DType::F32, &dev).unwrap();

        let scaled = ae.encode(&audio).unwrap();
        let expected = (&audio * 1.5).unwrap();
        assert!(max_abs_diff(&scaled, &expected) < 1e-6);

        let skipped = ae
            .encode_with(
                &audio,
                EncodeOptions {
                    skip_pretransform: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(max_abs_diff(&skipped.latents, &audio) < 1e-6);
    }

    #[test]
    fn encode_gradient_follows_pretransform_policy() {
        let dev = Device::Cpu;
        let audio = Tensor::randn(0f32, 1.0, (1, 2, 8), &dev).unwrap();
        for enable_grad in [true, false] {
            let gain = Arc::new(Gain::new(enable_grad));
            let ae = identity_autoencoder(2).with_pretransform(gain.clone());
            let loss = ae.encode(&audio).unwrap().sqr().unwrap().sum_all().unwrap();
            let grads = loss.backward().unwrap();
            assert_eq!(
                grads.get(gain.gain.as_tensor()).is_some(),
                enable_grad,
                "enable_grad = {enable_grad}"
            );
        }
    }

    #[test]
    fn decode_gradient_follows_pretransform_policy() {
        let dev = Device::Cpu;
        let latents = Tensor::randn(0f32, 1.0, (1, 2, 8), &dev).unwrap();
        for enable_grad in [true, false] {
            let gain = Arc::new(Gain::new(enable_grad));
            let ae = identity_autoencoder(2).with_pretransform(gain.clone());
            let loss = ae.decode(&latents).unwrap().sum_all().unwrap();
            let grads = loss.backward().unwrap();
            assert_eq!(grads.get(gain.gain.as_tensor()).is_some(), enable_grad);
        }
    }

    #[test]
    fn diffusion_decode_never_tracks_pretransform() {
        let dev = Device::Cpu;
        let gain = Arc::new(Gain::new(true));
        let ae = diffusion_autoencoder(Arc::new(RecordingSampler::default()), 4)
            .with_pretransform(gain.clone());
        let latents = Tensor::randn(0f32, 1.0, (1, 4, 3), &dev).unwrap();
        let loss = ae.decode(&latents).unwrap().sum_all().unwrap();
        let grads = loss.backward().unwrap();
        assert!(grads.get(gain.gain.as_tensor()).is_none());
    }

    #[test]
    fn diffusion_noise_length_is_independent_of_steps() {
        let dev = Device::Cpu;
        let sampler = Arc::new(RecordingSampler::default());
        let ae = diffusion_autoencoder(sampler.clone(), 8);
        let latents = Tensor::zeros((2, 4, 5), DType::F32, &dev).unwrap();
        for steps in [1, 10, 100] {
            let opts = DecodeOptions {
                steps,
                ..Default::default()
            };
            let out = ae.decode_with(&latents, &opts).unwrap();
            assert_eq!(out.dims(), &[2, 2, 40]);
        }
        let calls = sampler.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for (i, steps) in [1, 10, 100].into_iter().enumerate() {
            assert_eq!(calls[i], (vec![2, 2, 40], steps));
        }
    }

    #[test]
    fn seeded_diffusion_decode_is_reproducible() {
        let dev = Device::Cpu;
        let ae = diffusion_autoencoder(Arc::new(VDdimSampler), 4);
        let latents = Tensor::randn(0f32, 1.0, (1, 4, 6), &dev).unwrap();
        let opts = DecodeOptions {
            steps: 3,
            seed: Some(11),
            ..Default::default()
        };
        let a = ae.decode_with(&latents, &opts).unwrap();
        let b = ae.decode_with(&latents, &opts).unwrap();
        assert_eq!(a.dims(), &[1, 2, 24]);
        assert_eq!(max_abs_diff(&a, &b), 0.0);
    }

    #[test]
    fn decode_options_reach_the_decode_fn() {
        let dev = Device::Cpu;
        let seen = Arc::new(Mutex::new(None));
        let seen_in_fn = seen.clone();
        let ae = identity_autoencoder(2).with_decode_fn(Arc::new(
            move |latents: &Tensor, decoder: &dyn LatentModule, opts: &DecodeOptions| {
                *seen_in_fn.lock().unwrap() = Some(*opts);
                Ok(decoder.forward(latents)?)
            },
        ));
        let opts = DecodeOptions {
            steps: 7,
            eta: 0.25,
            seed: Some(3),
        };
        let latents = Tensor::zeros((1, 2, 4), DType::F32, &dev).unwrap();
        ae.decode_with(&latents, &opts).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(opts));
    }

    #[test]
    fn diffusion_conditioning_goes_through_the_decode_fn() {
        let dev = Device::Cpu;
        let sampler = Arc::new(RecordingSampler::default());
        let calls = Arc::new(Mutex::new(0usize));
        let calls_in_fn = calls.clone();
        let ae = AudioAutoencoder::new(
            Arc::new(Identity),
            DecodeStrategy::Diffusion {
                decoder: Some(Arc::new(Identity)),
                denoiser: Arc::new(ZeroDenoiser),
                sampler: sampler.clone(),
            },
            AutoencoderDims {
                latent_dim: 2,
                downsampling_ratio: 1,
                io_channels: 2,
            },
        )
        .with_decode_fn(Arc::new(
            move |latents: &Tensor, decoder: &dyn LatentModule, _opts: &DecodeOptions| {
                *calls_in_fn.lock().unwrap() += 1;
                Ok((decoder.forward(latents)? * 2.0)?)
            },
        ));
        let latents = Tensor::ones((1, 2, 3), DType::F32, &dev).unwrap();
        ae.decode(&latents).unwrap();

        assert_eq!(*calls.lock().unwrap(), 1);
        let conds = sampler.conds.lock().unwrap();
        let expected = Tensor::full(2f32, (1, 2, 3), &dev).unwrap();
        assert!(max_abs_diff(&conds[0], &expected) < 1e-6);
    }

    #[test]
    fn diffusion_without_decoder_conditions_on_latents() {
        let dev = Device::Cpu;
        let sampler = Arc::new(RecordingSampler::default());
        let ae = diffusion_autoencoder(sampler.clone(), 2).with_decode_fn(Arc::new(
            |_: &Tensor, _: &dyn LatentModule, _: &DecodeOptions| {
                Err(Error::Contract("decode_fn must not run without a decoder".into()))
            },
        ));
        let latents = Tensor::ones((1, 4, 3), DType::F32, &dev).unwrap();
        ae.decode(&latents).unwrap();
        let conds = sampler.conds.lock().unwrap();
        assert!(max_abs_diff(&conds[0], &latents) < 1e-6);
    }

    #[test]
    fn patched_model_pads_to_the_total_ratio() {
        let dev = Device::Cpu;
        let ae = AudioAutoencoder::new(
            Arc::new(Identity),
            DecodeStrategy::Direct {
                decoder: Arc::new(Identity),
            },
            AutoencoderDims {
                latent_dim: 8,
                downsampling_ratio: 2,
                io_channels: 8,
            },
        )
        .with_pretransform(Arc::new(crate::pretransform::PatchedPretransform::new(4, true).unwrap()));
        assert_eq!(ae.total_downsampling_ratio(), 8);

        let audio = Tensor::ones((1, 2, 5), DType::F32, &dev).unwrap();
        let (padded, len) = crate::audio::pad_to_multiple(&audio, ae.total_downsampling_ratio()).unwrap();
        assert_eq!(len, 5);
        assert_eq!(padded.dims(), &[1, 2, 8]);
        let latents = ae.encode(&padded).unwrap();
        assert_eq!(latents.dims(), &[1, 8, 2]);
        assert_eq!(ae.decode(&latents).unwrap().dims(), &[1, 2, 8]);
    }

    #[test]
    fn custom_encode_fn_is_used() {
        let dev = Device::Cpu;
        let ae = identity_autoencoder(2)
            .with_encode_fn(Arc::new(|audio: &Tensor, encoder: &dyn LatentModule| {
            Ok((encoder.forward(audio)? * 2.0)?)
        }));
        let audio = Tensor::ones((1, 2, 4), DType::F32, &dev).unwrap();
        let latents = ae.encode(&audio).unwrap();
        let expected = Tensor::full(2f32, (1, 2, 4), &dev).unwrap();
        assert!(max_abs_diff(&latents, &expected) < 1e-6);
    }

    #[test]
    fn non_rank3_input_is_a_contract_error() {
        let dev = Device::Cpu;
        let ae = identity_autoencoder(2);
        let flat = Tensor::zeros((2, 16), DType::F32, &dev).unwrap();
        assert!(matches!(ae.encode(&flat), Err(Error::Contract(_))));
        assert!(matches!(ae.decode(&flat), Err(Error::Contract(_))));
    }
}
