//! stepseq-core: Domain types for the stepseq step sequencer

pub mod catalog;
pub mod codec;
pub mod editing;
mod error;
pub mod pattern;
pub mod resolver;
mod store;
mod transport;

pub use catalog::{Catalog, CatalogEntry};
pub use codec::PatternDocument;
pub use editing::Editor;
pub use error::{Result, SequencerError};
pub use pattern::{ActiveStepRange, LaneSettings, Pattern, PatternDefaults, Placement, PlacementKey};
pub use resolver::{audible_at, cell_at, names_at, notes_at, Cell};
pub use store::PatternStore;
pub use transport::{swing_offset, tick_interval, Tick, TickNote, Transport, TransportState};
