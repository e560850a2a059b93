//! Playback collaborator contract

use thiserror::Error;
use tracing::info;

/// One note to sound, already resolved through the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub name: String,
    /// Asset reference from the catalog entry
    pub file: String,
    /// Linear gain (0.0-1.0)
    pub gain: f32,
    /// Step that caused the trigger (`None` for previews)
    pub step: Option<u32>,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Failed to load asset {file}: {reason}")]
    Load { file: String, reason: String },
    #[error("Asset previously failed to load: {0}")]
    Unavailable(String),
    #[error("Asset was not preloaded: {0}")]
    NotLoaded(String),
    #[error("Audio output is closed")]
    OutputClosed,
}

/// Something that can sound a triggered note.
///
/// Calls are fire-and-forget: implementations must return quickly and must
/// not call back into the scheduler, which invokes them while holding its
/// transport lock.
pub trait Playback: Send + Sync {
    fn play(&self, trigger: &Trigger) -> Result<(), PlaybackError>;

    /// Silence everything currently sounding
    fn stop_all(&self) {}
}

/// Dry-run playback that only logs triggers
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPlayback;

impl Playback for LogPlayback {
    fn play(&self, trigger: &Trigger) -> Result<(), PlaybackError> {
        info!(
            name = %trigger.name,
            file = %trigger.file,
            gain = trigger.gain,
            step = ?trigger.step,
            "Trigger"
        );
        Ok(())
    }

    fn stop_all(&self) {
        info!("Stop all sounds");
    }
}
