//! oobleck-codec CLI: encode a WAV file to latents and decode it back.
//!
//! Builds the model from a JSON model config. With `--weights` the parameters
//! are memory-mapped from a safetensors file; without, the model is freshly
//! initialised (useful for smoke tests of a config).
//!
//! # Output
//!
//! Writes the reconstruction to `--output` and prints a one-line JSON summary:
//!
//! ```json
//! {"path":"out.wav","samples":48000,"latent_frames":1500,"latent_dim":32,"sample_rate":48000,"channels":2,"diffusion":false}
//! ```

use std::path::PathBuf;

use candle_core::{D, DType, Device};
use candle_nn::{VarBuilder, VarMap};
use clap::Parser;
use oobleck_codec::{
    audio::{self, WavAudio},
    autoencoder::{AudioAutoencoder, DecodeOptions},
    factory::Factory,
};

#[derive(Parser, Debug)]
#[command(
    name = "oobleck-codec",
    about = "Round-trip audio through a causal convolutional autoencoder",
    long_about = "Encode a WAV file into latents and decode it back with either the direct\n\
                  decoder or the diffusion decoder. A JSON summary line is printed to stdout."
)]
struct Args {
    /// Model config (JSON).
    #[arg(long)]
    config: PathBuf,

    /// safetensors weights. Omit to run with freshly initialised parameters.
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Input WAV file.
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Output WAV file (32-bit float).
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Build the diffusion variant and decode by iterative denoising.
    #[arg(long)]
    diffusion: bool,

    /// Denoising steps for --diffusion.
    #[arg(long, default_value_t = 100)]
    steps: usize,

    /// Seed for the diffusion noise. Omit for a fresh draw each run.
    #[arg(long, short = 's')]
    seed: Option<u64>,

    /// Pad the input to a multiple of this many samples
    /// (default: downsampling_ratio times the pretransform's own factor).
    #[arg(long)]
    pad_multiple: Option<usize>,
}

fn build_model(
    args: &Args,
    config: &serde_json::Value,
    device: &Device,
    dtype: DType,
) -> anyhow::Result<AudioAutoencoder> {
    let factory = Factory::default();
    let model = match &args.weights {
        Some(path) => {
            tracing::info!("Loading weights from {:?}", path);
            // SAFETY: the file is mapped read-only and must not be modified while the model lives.
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], dtype, device)? };
            if args.diffusion {
                factory.diffusion_autoencoder(config, vb)?
            } else {
                factory.autoencoder(config, vb)?
            }
        }
        None => {
            tracing::warn!("No --weights given, using freshly initialised parameters");
            let varmap = VarMap::new();
            if args.diffusion {
                factory.diffusion_autoencoder_from_varmap(config, &varmap, dtype, device)?
            } else {
                factory.autoencoder(config, VarBuilder::from_varmap(&varmap, dtype, device))?
            }
        }
    };
    Ok(model)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.diffusion && args.steps == 0 {
        anyhow::bail!("--steps must be at least 1");
    }

    let device = Device::cuda_if_available(0)?;
    let dtype = DType::F32;
    tracing::info!("Using device: {:?}", device);

    let config: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&args.config)?)?;
    let model = build_model(&args, &config, &device, dtype)
        .map_err(|e| anyhow::anyhow!("failed to build model: {e}"))?;

    let input = audio::read_wav(&args.input)
        .map_err(|e| anyhow::anyhow!("failed to read {:?}: {e}", args.input))?;
    if model.pretransform().is_none() && input.channels as usize != model.io_channels() {
        anyhow::bail!(
            "model expects {} channels, {:?} has {}",
            model.io_channels(),
            args.input,
            input.channels
        );
    }

    let waveform = audio::interleaved_to_tensor(&input.samples, input.channels as usize, &device)?;
    let multiple = args.pad_multiple.unwrap_or(model.total_downsampling_ratio());
    let (waveform, samples) = audio::pad_to_multiple(&waveform, multiple)?;
    tracing::info!(
        samples,
        padded = waveform.dim(D::Minus1)?,
        sample_rate = input.sample_rate,
        "Encoding"
    );

    let latents = model.encode(&waveform)?;
    let (_, latent_dim, latent_frames) = latents.dims3()?;

    let opts = DecodeOptions {
        steps: args.steps,
        seed: args.seed,
        ..Default::default()
    };
    tracing::info!(latent_frames, diffusion = model.is_diffusion(), "Decoding");
    let decoded = model.decode_with(&latents, &opts)?;
    let decoded = decoded.narrow(D::Minus1, 0, samples.min(decoded.dim(D::Minus1)?))?;

    let output = WavAudio {
        samples: audio::tensor_to_interleaved(&decoded)?,
        sample_rate: input.sample_rate,
        channels: decoded.dim(1)? as u16,
    };
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    audio::write_wav(&args.output, &output)
        .map_err(|e| anyhow::anyhow!("failed to write audio: {e}"))?;

    let summary = serde_json::json!({
        "path": args.output,
        "samples": output.frames(),
        "latent_frames": latent_frames,
        "latent_dim": latent_dim,
        "sample_rate": output.sample_rate,
        "channels": output.channels,
        "diffusion": model.is_diffusion(),
    });
    println!("{summary}");

    Ok(())
}
