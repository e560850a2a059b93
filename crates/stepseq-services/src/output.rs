//! Default output device and sample-rate conversion

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use thiserror::Error;
use tracing::{error, info, warn};

/// Frames fed to the resampler per call
const RESAMPLE_CHUNK: usize = 1024;

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to get default output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
    #[error("Resampling failed: {0}")]
    ResampleError(String),
}

/// Running f32 stream on the default device. Dropping it closes the device.
pub struct OutputStream {
    stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl OutputStream {
    /// Open the default device and start pulling interleaved frames from
    /// `render`, which also receives the channel count.
    pub fn open<F>(mut render: F) -> Result<Self, AudioOutputError>
    where
        F: FnMut(&mut [f32], u16) + Send + 'static,
    {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(AudioOutputError::NoDevices)?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?
            .config();
        let channels = config.channels;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render(data, channels),
                |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels,
            "Output stream open"
        );
        Ok(Self {
            stream,
            sample_rate: config.sample_rate.0,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Stop pulling frames; the device is released on drop
    pub fn pause(&self) {
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause output stream: {}", e);
        }
    }
}

fn resample_err(e: impl std::fmt::Display) -> AudioOutputError {
    AudioOutputError::ResampleError(e.to_string())
}

/// Convert mono samples from `from_rate` to `to_rate`. The output is
/// aligned with the input (resampler delay removed) and has exactly
/// `len * to_rate / from_rate` frames, rounded.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioOutputError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.925,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 128,
        window: WindowFunction::Blackman2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1).map_err(resample_err)?;

    let wanted = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(wanted + delay + RESAMPLE_CHUNK);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let mut frames = resampler.process(&[chunk][..], None).map_err(resample_err)?;
        out.append(&mut frames[0]);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut frames = resampler.process_partial(Some(&[rest][..]), None).map_err(resample_err)?;
        out.append(&mut frames[0]);
    }
    // drain what is still inside the filter
    while out.len() < wanted + delay {
        let mut frames = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(resample_err)?;
        if frames[0].is_empty() {
            break;
        }
        out.append(&mut frames[0]);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(wanted);
    Ok(out)
}
