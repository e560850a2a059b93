//! Offline bounce of a pattern to a WAV file
//!
//! Walks the pattern with a [`Transport`] exactly as the live scheduler does
//! (lane mute/solo/gain and swing included) and mixes the triggered samples
//! at their sample-accurate positions.

use std::path::{Path, PathBuf};

use crossbeam_channel::unbounded;
use stepseq_core::{swing_offset, tick_interval, Catalog, Pattern, Transport};
use thiserror::Error;
use tracing::{info, warn};

use crate::sample_player::{Mixer, SampleBank, VoiceCommand};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub sample_rate: u32,
    /// Times the loop is played; at least once
    pub loops: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            loops: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSummary {
    /// Mono frames written, including the tail of the last samples
    pub frames: usize,
    pub triggers: usize,
    /// Notes without a catalog entry or a loadable sample
    pub skipped: usize,
}

struct Hit {
    frame: usize,
    command: VoiceCommand,
}

/// Mix the pattern into a mono buffer
pub fn render_pattern(
    pattern: &Pattern,
    catalog: &Catalog,
    asset_dir: impl Into<PathBuf>,
    options: RenderOptions,
) -> (Vec<f32>, RenderSummary) {
    let rate = options.sample_rate.max(1);
    let bank = SampleBank::new(asset_dir.into(), rate);
    let interval = tick_interval(pattern.bpm());
    let to_frame = |secs: f64| (secs * rate as f64).round() as usize;

    let ticks = pattern.total_steps() as u64 * options.loops.max(1) as u64;
    let mut summary = RenderSummary::default();
    let mut hits = Vec::new();
    let mut end = to_frame(interval.as_secs_f64() * ticks as f64);

    let mut transport = Transport::new();
    transport.play();
    for n in 0..ticks {
        let Some(tick) = transport.tick(pattern) else {
            break;
        };
        let at = interval.as_secs_f64() * n as f64
            + swing_offset(pattern.bpm(), pattern.swing(), tick.step).as_secs_f64();
        let frame = to_frame(at);

        for note in tick.notes {
            let Some(entry) = catalog.get(&note.name) else {
                summary.skipped += 1;
                continue;
            };
            match bank.load(&entry.file) {
                Ok(data) => {
                    end = end.max(frame + data.len());
                    hits.push(Hit {
                        frame,
                        command: VoiceCommand::Start { data, gain: note.gain },
                    });
                    summary.triggers += 1;
                }
                Err(e) => {
                    warn!(name = %note.name, "Skipping note in render: {}", e);
                    summary.skipped += 1;
                }
            }
        }
    }

    let (tx, rx) = unbounded();
    let mut mixer = Mixer::new(rx);
    let mut buffer = vec![0.0; end];
    let mut position = 0;
    for hit in hits {
        mixer.render(&mut buffer[position..hit.frame], 1);
        let _ = tx.send(hit.command);
        position = hit.frame;
    }
    mixer.render(&mut buffer[position..], 1);

    summary.frames = buffer.len();
    (buffer, summary)
}

/// Render the pattern and write it as a mono 32-bit float WAV
pub fn render_to_wav(
    pattern: &Pattern,
    catalog: &Catalog,
    asset_dir: impl Into<PathBuf>,
    options: RenderOptions,
    path: &Path,
) -> Result<RenderSummary, RenderError> {
    let (samples, summary) = render_pattern(pattern, catalog, asset_dir, options);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: options.sample_rate.max(1),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!(
        path = %path.display(),
        frames = summary.frames,
        triggers = summary.triggers,
        skipped = summary.skipped,
        "Pattern rendered"
    );
    Ok(summary)
}
