//! Neural building blocks of the codec.
//!
//! ## Components
//!
//! - [`conv`]: causal Conv1d / ConvTranspose1d
//! - [`blocks`]: residual units and the encoder/decoder blocks built from them
//! - [`audio_ae`]: native block-stack encoder and decoder (`audio_ae`)
//! - [`seanet`]: SEANet encoder and decoder (`seanet`)
//! - [`dac`]: Descript Audio Codec encoder and decoder (`dac`)
//! - [`denoiser`]: conditional waveform denoiser for diffusion decoding

use std::fmt::Debug;

use candle_core::Module;

pub mod audio_ae;
pub mod blocks;
pub mod conv;
pub mod dac;
pub mod denoiser;
pub mod seanet;

/// An encoder or decoder stack that maps between waveforms and latent frames.
///
/// `hop_length` is the number of waveform samples per latent frame.
pub trait LatentModule: Module + Debug + Send + Sync {
    fn hop_length(&self) -> usize;
}
