//! stepseq-services: Transport scheduler, playback and catalog loading

pub mod catalog_loader;
pub mod output;
pub mod playback;
pub mod render;
pub mod sample_player;
pub mod scheduler;

pub use catalog_loader::{asset_dir, asset_root, fetch_catalog, load_catalog, CatalogLoadError};
pub use output::{AudioOutputError, OutputStream};
pub use playback::{LogPlayback, Playback, PlaybackError, Trigger};
pub use render::{render_pattern, render_to_wav, RenderError, RenderOptions, RenderSummary};
pub use sample_player::{AudioGraph, SamplePlayer};
pub use scheduler::Scheduler;
