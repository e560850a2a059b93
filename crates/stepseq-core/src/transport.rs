//! Transport state and the playback cursor

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pattern::{clamp_swing, Pattern};
use crate::resolver;

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
}

/// A note to trigger on a tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickNote {
    pub name: String,
    /// Lane gain (0.0-1.0)
    pub gain: f32,
}

/// Result of one transport advance
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Step that was played
    pub step: u32,
    /// Audible notes sounding at `step`
    pub notes: Vec<TickNote>,
}

/// Time between ticks. One step is one quarter note.
pub fn tick_interval(bpm: u32) -> Duration {
    Duration::from_secs_f64(60.0 / bpm.max(1) as f64)
}

/// How late `step` sounds relative to its straight position. Odd steps are
/// pushed back by up to half a step; even steps stay on the grid.
pub fn swing_offset(bpm: u32, swing: f32, step: u32) -> Duration {
    if step % 2 == 0 {
        return Duration::ZERO;
    }
    tick_interval(bpm).mul_f32(clamp_swing(swing) / 2.0)
}

/// Play state plus the step cursor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transport {
    pub state: TransportState,
    current_step: u32,
    ticks: u64,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play(&mut self) {
        self.state = TransportState::Running;
    }

    /// Stop without moving the cursor
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    /// Stop and rewind to step 0
    pub fn reset(&mut self) {
        self.state = TransportState::Stopped;
        self.current_step = 0;
    }

    pub fn is_running(&self) -> bool {
        self.state == TransportState::Running
    }

    /// Step the next tick will play
    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    /// Ticks played since creation
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Play the current step of `pattern` and advance the cursor.
    /// Returns `None` while stopped.
    pub fn tick(&mut self, pattern: &Pattern) -> Option<Tick> {
        if !self.is_running() {
            return None;
        }

        let total = pattern.total_steps().max(1);
        // the loop may have shrunk under the cursor
        let step = self.current_step % total;

        let notes = resolver::audible_at(pattern, step)
            .into_iter()
            .map(|p| TickNote {
                name: p.name.clone(),
                gain: pattern.lane(&p.name).gain,
            })
            .collect();

        self.current_step = (step + 1) % total;
        self.ticks += 1;

        Some(Tick { step, notes })
    }
}
