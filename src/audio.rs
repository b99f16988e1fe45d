//! Audio I/O and waveform ↔ tensor conversion for the command-line codec.
//!
//! Tensors use the model layout `[batch, channels, samples]`; WAV files store
//! interleaved frames.

mod wav;

use candle_core::{Device, Tensor};

pub use wav::{WavAudio, read_wav, write_wav};

use crate::{Error, Result};

/// Interleaved samples → `[1, channels, samples / channels]`.
pub fn interleaved_to_tensor(samples: &[f32], channels: usize, device: &Device) -> Result<Tensor> {
    if channels == 0 || samples.len() % channels != 0 {
        return Err(Error::Audio(format!(
            "{} samples cannot be split into {channels} channels",
            samples.len()
        )));
    }
    let frames = samples.len() / channels;
    let xs = Tensor::from_slice(samples, (frames, channels), device)?;
    Ok(xs.t()?.contiguous()?.unsqueeze(0)?)
}

/// `[1, channels, samples]` → interleaved samples.
pub fn tensor_to_interleaved(xs: &Tensor) -> Result<Vec<f32>> {
    let (batch, _, _) = xs.dims3()?;
    if batch != 1 {
        return Err(Error::Contract(format!(
            "expected a single waveform, got a batch of {batch}"
        )));
    }
    let frames = xs.squeeze(0)?.t()?.contiguous()?;
    Ok(frames.to_dtype(candle_core::DType::F32)?.flatten_all()?.to_vec1()?)
}

/// Right-pad the time axis with zeros up to a multiple of `multiple`.
///
/// Returns the padded tensor and the original length.
pub fn pad_to_multiple(xs: &Tensor, multiple: usize) -> Result<(Tensor, usize)> {
    if multiple == 0 {
        return Err(Error::Contract("padding multiple must be positive".into()));
    }
    let len = xs.dim(candle_core::D::Minus1)?;
    let padded = len.div_ceil(multiple) * multiple;
    if padded == len {
        return Ok((xs.clone(), len));
    }
    Ok((xs.pad_with_zeros(candle_core::D::Minus1, 0, padded - len)?, len))
}
