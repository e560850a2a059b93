//! Sample playback through a single long-lived output stream
//!
//! [`AudioGraph`] owns the device stream and is built once per session.
//! [`SamplePlayer`] is a cheap, thread-safe handle to it that the scheduler
//! uses as its [`Playback`] collaborator. Samples are decoded by
//! [`AudioGraph::preload`] only; a trigger for an asset that was never
//! preloaded fails with [`PlaybackError::NotLoaded`] instead of decoding on
//! the transport thread.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use stepseq_core::Catalog;
use tracing::{debug, info, warn};

use crate::output::{self, AudioOutputError, OutputStream};
use crate::playback::{Playback, PlaybackError, Trigger};

const MAX_VOICES: usize = 32;

pub(crate) enum VoiceCommand {
    Start { data: Arc<Vec<f32>>, gain: f32 },
    StopAll,
}

struct Voice {
    data: Arc<Vec<f32>>,
    position: usize,
    gain: f32,
}

impl Voice {
    fn next_sample(&mut self) -> Option<f32> {
        let sample = self.data.get(self.position)?;
        self.position += 1;
        Some(sample * self.gain)
    }
}

/// Audio-thread side: sums active voices into the output buffer
pub(crate) struct Mixer {
    commands: Receiver<VoiceCommand>,
    voices: Vec<Voice>,
}

impl Mixer {
    pub(crate) fn new(commands: Receiver<VoiceCommand>) -> Self {
        Self {
            commands,
            voices: Vec::with_capacity(MAX_VOICES),
        }
    }

    pub(crate) fn render(&mut self, buffer: &mut [f32], channels: u16) {
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                VoiceCommand::Start { data, gain } => {
                    // steal the oldest voice when full
                    if self.voices.len() >= MAX_VOICES {
                        self.voices.remove(0);
                    }
                    self.voices.push(Voice { data, position: 0, gain });
                }
                VoiceCommand::StopAll => self.voices.clear(),
            }
        }

        let channels = channels.max(1) as usize;
        for frame in buffer.chunks_mut(channels) {
            let mut sum = 0.0;
            for voice in &mut self.voices {
                sum += voice.next_sample().unwrap_or(0.0);
            }
            frame.fill(sum.clamp(-1.0, 1.0));
        }

        self.voices.retain(|v| v.position < v.data.len());
    }
}

/// Decoded samples keyed by catalog asset reference
pub(crate) struct SampleBank {
    base_dir: PathBuf,
    sample_rate: u32,
    /// `None` marks an asset that failed to load
    cache: Mutex<HashMap<String, Option<Arc<Vec<f32>>>>>,
}

impl SampleBank {
    pub(crate) fn new(base_dir: PathBuf, sample_rate: u32) -> Self {
        Self {
            base_dir,
            sample_rate,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Asset references are relative to the catalog location; a leading `/`
    /// means "from the catalog root", as in the web asset layout.
    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() && path.exists() {
            return path.to_path_buf();
        }
        self.base_dir.join(file.trim_start_matches('/'))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<Arc<Vec<f32>>>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Already decoded sample; never touches the disk
    fn cached(&self, file: &str) -> Result<Arc<Vec<f32>>, PlaybackError> {
        match self.lock().get(file) {
            Some(Some(data)) => Ok(data.clone()),
            Some(None) => Err(PlaybackError::Unavailable(file.to_string())),
            None => Err(PlaybackError::NotLoaded(file.to_string())),
        }
    }

    /// Decode a sample unless it is cached. The cache lock is not held while
    /// decoding, so triggers for loaded samples are never held up.
    pub(crate) fn load(&self, file: &str) -> Result<Arc<Vec<f32>>, PlaybackError> {
        match self.cached(file) {
            Err(PlaybackError::NotLoaded(_)) => {}
            other => return other,
        }

        let loaded = decode_wav(&self.resolve(file), self.sample_rate).map(Arc::new);
        self.lock().insert(file.to_string(), loaded.as_ref().ok().cloned());
        loaded.map_err(|reason| PlaybackError::Load {
            file: file.to_string(),
            reason,
        })
    }
}

/// Read a WAV file as mono f32 at `target_rate`
fn decode_wav(path: &Path, target_rate: u32) -> Result<Vec<f32>, String> {
    let reader = hound::WavReader::open(path).map_err(|e| format!("Failed to open WAV: {e}"))?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let raw_samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| format!("Failed to read WAV: {e}"))?,
        hound::SampleFormat::Int => {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<Result<_, _>>()
                .map_err(|e| format!("Failed to read WAV: {e}"))?
        }
    };

    if raw_samples.is_empty() {
        return Err("WAV file is empty".into());
    }

    let mono: Vec<f32> = if channels == 1 {
        raw_samples
    } else {
        raw_samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    output::resample(&mono, spec.sample_rate, target_rate).map_err(|e| e.to_string())
}

/// Thread-safe trigger handle into an [`AudioGraph`]
#[derive(Clone)]
pub struct SamplePlayer {
    commands: Sender<VoiceCommand>,
    bank: Arc<SampleBank>,
}

impl std::fmt::Debug for SamplePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplePlayer")
            .field("base_dir", &self.bank.base_dir)
            .field("sample_rate", &self.bank.sample_rate)
            .finish()
    }
}

impl Playback for SamplePlayer {
    fn play(&self, trigger: &Trigger) -> Result<(), PlaybackError> {
        let data = self.bank.cached(&trigger.file)?;
        self.commands
            .send(VoiceCommand::Start { data, gain: trigger.gain })
            .map_err(|_| PlaybackError::OutputClosed)
    }

    fn stop_all(&self) {
        let _ = self.commands.send(VoiceCommand::StopAll);
    }
}

/// Output device, mixer and sample bank, built once and torn down explicitly
pub struct AudioGraph {
    stream: Option<OutputStream>,
    player: SamplePlayer,
}

impl AudioGraph {
    /// Open the default output device. Relative asset references are
    /// resolved against `asset_dir`.
    pub fn open(asset_dir: impl Into<PathBuf>) -> Result<Self, AudioOutputError> {
        let (tx, rx) = unbounded();
        let mut mixer = Mixer::new(rx);

        let stream = OutputStream::open(move |buffer, channels| mixer.render(buffer, channels))?;

        let bank = SampleBank::new(asset_dir.into(), stream.sample_rate());
        let player = SamplePlayer {
            commands: tx,
            bank: Arc::new(bank),
        };

        Ok(Self {
            stream: Some(stream),
            player,
        })
    }

    /// Handle to pass to the scheduler
    pub fn player(&self) -> SamplePlayer {
        self.player.clone()
    }

    /// Decode every catalog asset up front. Returns how many loaded.
    /// Only preloaded assets can be triggered.
    pub fn preload(&self, catalog: &Catalog) -> usize {
        let mut loaded = 0;
        for entry in catalog.entries() {
            match self.player.bank.load(&entry.file) {
                Ok(data) => {
                    debug!(name = %entry.name, frames = data.len(), "Sample loaded");
                    loaded += 1;
                }
                Err(e) => warn!(name = %entry.name, "Sample not loaded: {}", e),
            }
        }
        info!(loaded, total = catalog.len(), "Preloaded samples");
        loaded
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Silence all voices and close the device stream
    pub fn shutdown(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        self.player.stop_all();
        stream.pause();
        info!("Audio graph shut down");
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        self.shutdown();
    }
}
