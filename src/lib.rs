//! Causal convolutional audio autoencoders in pure Rust.
//!
//! A candle-based codec that compresses multichannel waveforms into a compact
//! latent sequence and reconstructs them, either with a mirrored decoder or by
//! iterative denoising conditioned on the latents. Models are assembled from
//! JSON configs and load safetensors checkpoints directly.
//!
//! ## Architecture
//!
//! ```text
//! waveform [B, C, T]
//!     → pretransform (optional: patching, nested autoencoder)
//!     → encoder (audio_ae | seanet | dac)          T / downsampling_ratio frames
//!     → bottleneck (optional: tanh, vae, l2_norm)
//!   latents [B, latent_dim, F]
//!     → bottleneck decode
//!     → decoder            (direct)
//!       or sampler(denoiser, noise[B, io_channels, F · ratio])  (diffusion)
//!     → pretransform decode
//! waveform [B, C, F · downsampling_ratio]
//! ```
//!
//! ## Modules
//!
//! - [`model`]: causal convolutions, residual blocks, encoder/decoder families, denoiser
//! - [`autoencoder`]: [`autoencoder::AudioAutoencoder`] encode/decode
//! - [`bottleneck`], [`pretransform`]: optional stages around the core stacks
//! - [`sampler`]: v-DDIM and flow-matching Euler samplers
//! - [`factory`]: construction from model configs
//! - [`grad`], [`init`]: gradient scoping and one-time parameter scaling
//! - [`audio`]: WAV I/O and tensor conversion

pub mod audio;
pub mod autoencoder;
pub mod bottleneck;
pub mod config;
pub mod factory;
pub mod grad;
pub mod init;
pub mod model;
pub mod pretransform;
pub mod sampler;

mod error;

pub use error::{Error, Result};
