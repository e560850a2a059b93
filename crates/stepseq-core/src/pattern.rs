//! Step pattern: note placements on a looping grid
//!
//! A [`Pattern`] is an immutable value. Every editing operation returns a new
//! pattern and leaves the receiver untouched, so a snapshot handed to the
//! transport can never be observed half-updated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SequencerError};

pub const MIN_STEPS: u32 = 1;
pub const MAX_STEPS: u32 = 256;
pub const DEFAULT_STEPS: u32 = 64;

pub const MIN_BPM: u32 = 60;
pub const MAX_BPM: u32 = 240;
pub const DEFAULT_BPM: u32 = 120;

/// Swing amount of a straight pattern
pub const DEFAULT_SWING: f32 = 0.0;

/// Clamp a loop length into `[MIN_STEPS, MAX_STEPS]`
pub fn clamp_steps(steps: u32) -> u32 {
    steps.clamp(MIN_STEPS, MAX_STEPS)
}

/// Clamp a tempo into `[MIN_BPM, MAX_BPM]`
pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// Clamp a swing amount into `[0, 1]`; NaN counts as straight
pub fn clamp_swing(swing: f32) -> f32 {
    if swing.is_nan() {
        return DEFAULT_SWING;
    }
    swing.clamp(0.0, 1.0)
}

/// A note occupying `length` steps starting at `start`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    /// Catalog key of the pitch or instrument
    pub name: String,
    pub start: u32,
    pub length: u32,
}

impl Placement {
    pub fn new(name: impl Into<String>, start: u32, length: u32) -> Self {
        Self {
            name: name.into(),
            start,
            length: length.max(1),
        }
    }

    /// One past the last covered step
    pub fn end(&self) -> u32 {
        self.start + self.length
    }

    /// Last covered step (the resize handle cell)
    pub fn tail(&self) -> u32 {
        self.end() - 1
    }

    pub fn covers(&self, step: u32) -> bool {
        self.start <= step && step < self.end()
    }

    pub fn key(&self) -> PlacementKey {
        PlacementKey::new(self.name.clone(), self.start)
    }

    fn overlaps(&self, other: &Placement) -> bool {
        self.name == other.name && self.start < other.end() && other.start < self.end()
    }
}

/// Reference to a placement. Unique because placements of one name never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlacementKey {
    pub name: String,
    pub start: u32,
}

impl PlacementKey {
    pub fn new(name: impl Into<String>, start: u32) -> Self {
        Self {
            name: name.into(),
            start,
        }
    }
}

/// Inclusive range of steps touched by any placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActiveStepRange {
    pub min: u32,
    pub max: u32,
}

impl ActiveStepRange {
    fn of(placements: &[Placement]) -> Self {
        let min = placements.iter().map(|p| p.start).min();
        let max = placements.iter().map(|p| p.tail()).max();
        match (min, max) {
            (Some(min), Some(max)) => Self { min, max },
            _ => Self::default(),
        }
    }
}

/// Per-lane playback settings (one lane per note name)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneSettings {
    pub muted: bool,
    pub solo: bool,
    /// Linear gain (0.0-1.0)
    pub gain: f32,
}

impl Default for LaneSettings {
    fn default() -> Self {
        Self {
            muted: false,
            solo: false,
            gain: 1.0,
        }
    }
}

impl LaneSettings {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    fn clamped(mut self) -> Self {
        self.gain = if self.gain.is_finite() { self.gain.clamp(0.0, 1.0) } else { 1.0 };
        self
    }
}

/// Values a pattern starts from and returns to on reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternDefaults {
    pub bpm: u32,
    pub total_steps: u32,
}

impl Default for PatternDefaults {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            total_steps: DEFAULT_STEPS,
        }
    }
}

impl PatternDefaults {
    pub fn new(bpm: u32, total_steps: u32) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            total_steps: clamp_steps(total_steps),
        }
    }
}

impl From<&Pattern> for PatternDefaults {
    fn from(pattern: &Pattern) -> Self {
        Self {
            bpm: pattern.bpm,
            total_steps: pattern.total_steps,
        }
    }
}

/// Ordered note placements plus loop length and tempo
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    placements: Vec<Placement>,
    total_steps: u32,
    bpm: u32,
    /// Delay of odd steps as a fraction of half a step
    swing: f32,
    lanes: BTreeMap<String, LaneSettings>,
    active_range: ActiveStepRange,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new(PatternDefaults::default())
    }
}

impl Pattern {
    /// Empty pattern using the given defaults
    pub fn new(defaults: PatternDefaults) -> Self {
        Self {
            placements: Vec::new(),
            total_steps: clamp_steps(defaults.total_steps),
            bpm: clamp_bpm(defaults.bpm),
            swing: DEFAULT_SWING,
            lanes: BTreeMap::new(),
            active_range: ActiveStepRange::default(),
        }
    }

    /// Build a pattern from raw parts, rejecting anything that breaks the
    /// placement invariants. Tempo and length are clamped; lengths running
    /// past the loop end are truncated.
    pub fn from_parts(
        bpm: u32,
        total_steps: u32,
        placements: Vec<Placement>,
        lanes: BTreeMap<String, LaneSettings>,
    ) -> Result<Self> {
        let total_steps = clamp_steps(total_steps);
        let mut accepted: Vec<Placement> = Vec::with_capacity(placements.len());

        for (idx, mut placement) in placements.into_iter().enumerate() {
            if placement.name.is_empty() {
                return Err(SequencerError::invalid_format(format!(
                    "placement {idx} has an empty name"
                )));
            }
            if placement.length == 0 {
                return Err(SequencerError::invalid_format(format!(
                    "placement {idx} ({}) has zero length",
                    placement.name
                )));
            }
            if placement.start >= total_steps {
                return Err(SequencerError::invalid_format(format!(
                    "placement {idx} ({}) starts at step {} but the pattern has {} steps",
                    placement.name, placement.start, total_steps
                )));
            }
            placement.length = placement.length.min(total_steps - placement.start);

            if let Some(other) = accepted.iter().find(|p| p.overlaps(&placement)) {
                return Err(SequencerError::invalid_format(format!(
                    "placement {idx} ({} at {}) overlaps {} at {}",
                    placement.name, placement.start, other.name, other.start
                )));
            }
            accepted.push(placement);
        }

        let lanes = lanes
            .into_iter()
            .map(|(name, settings)| (name, settings.clamped()))
            .filter(|(_, settings)| !settings.is_default())
            .collect();

        Ok(Self::assemble(accepted, total_steps, clamp_bpm(bpm), DEFAULT_SWING, lanes))
    }

    fn assemble(
        placements: Vec<Placement>,
        total_steps: u32,
        bpm: u32,
        swing: f32,
        lanes: BTreeMap<String, LaneSettings>,
    ) -> Self {
        let active_range = ActiveStepRange::of(&placements);
        Self {
            placements,
            total_steps,
            bpm,
            swing,
            lanes,
            active_range,
        }
    }

    fn with_placements(&self, placements: Vec<Placement>) -> Self {
        Self::assemble(placements, self.total_steps, self.bpm, self.swing, self.lanes.clone())
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn swing(&self) -> f32 {
        self.swing
    }

    pub fn active_range(&self) -> ActiveStepRange {
        self.active_range
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    /// Lane settings for a name (defaults when never changed)
    pub fn lane(&self, name: &str) -> LaneSettings {
        self.lanes.get(name).copied().unwrap_or_default()
    }

    /// Lanes whose settings differ from the defaults
    pub fn lanes(&self) -> &BTreeMap<String, LaneSettings> {
        &self.lanes
    }

    /// True when at least one lane is soloed
    pub fn has_solo(&self) -> bool {
        self.lanes.values().any(|l| l.solo)
    }

    /// Whether notes of this lane should be triggered
    pub fn is_audible(&self, name: &str) -> bool {
        let lane = self.lane(name);
        if self.has_solo() {
            return lane.solo;
        }
        !lane.muted
    }

    pub fn find(&self, key: &PlacementKey) -> Option<&Placement> {
        self.placements
            .iter()
            .find(|p| p.name == key.name && p.start == key.start)
    }

    /// Placement of `name` covering `step`, if any
    pub fn covering(&self, name: &str, step: u32) -> Option<&Placement> {
        self.placements
            .iter()
            .find(|p| p.name == name && p.covers(step))
    }

    /// Longest length the placement can take without passing the loop end
    /// or reaching the next placement of the same name
    pub fn max_length_for(&self, key: &PlacementKey) -> u32 {
        let limit = self
            .placements
            .iter()
            .filter(|p| p.name == key.name && p.start > key.start)
            .map(|p| p.start)
            .min()
            .unwrap_or(self.total_steps)
            .min(self.total_steps);
        limit.saturating_sub(key.start).max(1)
    }

    /// Remove the placement of `name` covering `step`, or insert a one-step
    /// placement there. Out-of-range steps are ignored.
    #[must_use]
    pub fn toggle_note(&self, step: u32, name: &str) -> Self {
        if step >= self.total_steps || name.is_empty() {
            return self.clone();
        }

        let placements = match self.covering(name, step) {
            Some(existing) => {
                let key = existing.key();
                self.placements
                    .iter()
                    .filter(|p| !(p.name == key.name && p.start == key.start))
                    .cloned()
                    .collect()
            }
            None => {
                let mut placements = self.placements.clone();
                placements.push(Placement::new(name, step, 1));
                placements
            }
        };
        self.with_placements(placements)
    }

    /// Set the length of a placement, never below one step and never past
    /// the loop end or into the next placement of the same name
    #[must_use]
    pub fn resize_note(&self, key: &PlacementKey, new_length: u32) -> Self {
        if self.find(key).is_none() {
            return self.clone();
        }
        let length = new_length.max(1).min(self.max_length_for(key));

        let placements = self
            .placements
            .iter()
            .map(|p| {
                if p.name == key.name && p.start == key.start {
                    Placement { length, ..p.clone() }
                } else {
                    p.clone()
                }
            })
            .collect();
        self.with_placements(placements)
    }

    #[must_use]
    pub fn delete_note(&self, key: &PlacementKey) -> Self {
        if self.find(key).is_none() {
            return self.clone();
        }
        let placements = self
            .placements
            .iter()
            .filter(|p| !(p.name == key.name && p.start == key.start))
            .cloned()
            .collect();
        self.with_placements(placements)
    }

    /// Change the loop length. Placements starting past the new end are
    /// dropped and those crossing it are truncated.
    #[must_use]
    pub fn set_total_steps(&self, steps: u32) -> Self {
        let total_steps = clamp_steps(steps);
        let placements = self
            .placements
            .iter()
            .filter(|p| p.start < total_steps)
            .map(|p| Placement {
                length: p.length.min(total_steps - p.start),
                ..p.clone()
            })
            .collect();
        Self::assemble(placements, total_steps, self.bpm, self.swing, self.lanes.clone())
    }

    #[must_use]
    pub fn set_bpm(&self, bpm: u32) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn set_swing(&self, swing: f32) -> Self {
        Self {
            swing: clamp_swing(swing),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn set_lane(&self, name: &str, settings: LaneSettings) -> Self {
        let mut lanes = self.lanes.clone();
        let settings = settings.clamped();
        if settings.is_default() {
            lanes.remove(name);
        } else {
            lanes.insert(name.to_string(), settings);
        }
        Self {
            lanes,
            ..self.clone()
        }
    }

    /// Empty pattern with tempo and length back at the defaults
    #[must_use]
    pub fn reset(&self, defaults: PatternDefaults) -> Self {
        Self::new(defaults)
    }
}
