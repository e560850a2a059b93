//! Shared copy-on-write holder for the current pattern

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::pattern::{LaneSettings, Pattern, PatternDefaults, PlacementKey};

/// Owns the current [`Pattern`] and hands out immutable snapshots.
///
/// Mutations compute a fresh pattern from the current one and swap it in;
/// a reader holding an older snapshot keeps seeing a consistent value.
#[derive(Debug)]
pub struct PatternStore {
    current: Mutex<Arc<Pattern>>,
    defaults: PatternDefaults,
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(PatternDefaults::default())
    }
}

impl PatternStore {
    pub fn new(defaults: PatternDefaults) -> Self {
        Self::with_pattern(Pattern::new(defaults), defaults)
    }

    pub fn with_pattern(pattern: Pattern, defaults: PatternDefaults) -> Self {
        Self {
            current: Mutex::new(Arc::new(pattern)),
            defaults,
        }
    }

    pub fn defaults(&self) -> PatternDefaults {
        self.defaults
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Pattern>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current pattern
    pub fn snapshot(&self) -> Arc<Pattern> {
        self.lock().clone()
    }

    /// Replace the pattern with `f(current)` and return the new snapshot
    pub fn update<F>(&self, f: F) -> Arc<Pattern>
    where
        F: FnOnce(&Pattern) -> Pattern,
    {
        let mut current = self.lock();
        let next = f(&current);
        if next != **current {
            *current = Arc::new(next);
        }
        current.clone()
    }

    /// Swap in a whole pattern (e.g. after an import)
    pub fn replace(&self, pattern: Pattern) -> Arc<Pattern> {
        let pattern = Arc::new(pattern);
        *self.lock() = pattern.clone();
        pattern
    }

    pub fn toggle_note(&self, step: u32, name: &str) -> Arc<Pattern> {
        self.update(|p| p.toggle_note(step, name))
    }

    pub fn resize_note(&self, key: &PlacementKey, new_length: u32) -> Arc<Pattern> {
        self.update(|p| p.resize_note(key, new_length))
    }

    pub fn delete_note(&self, key: &PlacementKey) -> Arc<Pattern> {
        self.update(|p| p.delete_note(key))
    }

    pub fn set_total_steps(&self, steps: u32) -> Arc<Pattern> {
        self.update(|p| p.set_total_steps(steps))
    }

    pub fn set_bpm(&self, bpm: u32) -> Arc<Pattern> {
        self.update(|p| p.set_bpm(bpm))
    }

    pub fn set_swing(&self, swing: f32) -> Arc<Pattern> {
        self.update(|p| p.set_swing(swing))
    }

    pub fn set_lane(&self, name: &str, settings: LaneSettings) -> Arc<Pattern> {
        self.update(|p| p.set_lane(name, settings))
    }

    pub fn reset(&self) -> Arc<Pattern> {
        let defaults = self.defaults;
        self.update(|p| p.reset(defaults))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_stable_across_updates() {
        let store = PatternStore::default();
        let before = store.snapshot();
        let after = store.toggle_note(0, "C4");

        assert!(before.is_empty());
        assert_eq!(after.len(), 1);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_noop_keeps_same_snapshot() {
        let store = PatternStore::default();
        let before = store.toggle_note(0, "C4");
        let after = store.toggle_note(500, "C4");
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_reset_uses_store_defaults() {
        let store = PatternStore::new(PatternDefaults::new(100, 16));
        store.set_bpm(180);
        store.set_total_steps(8);
        store.toggle_note(1, "kick");

        let reset = store.reset();
        assert!(reset.is_empty());
        assert_eq!(reset.bpm(), 100);
        assert_eq!(reset.total_steps(), 16);
    }

    #[test]
    fn test_concurrent_readers_see_whole_patterns() {
        let store = Arc::new(PatternStore::new(PatternDefaults::new(120, 256)));
        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let snapshot = store.snapshot();
                    let range = snapshot.active_range();
                    if !snapshot.is_empty() {
                        assert!(snapshot.placements().iter().all(|p| p.start >= range.min));
                    }
                }
            })
        };
        for step in 0..256 {
            store.toggle_note(step, "C4");
        }
        reader.join().unwrap();
        assert_eq!(store.snapshot().len(), 256);
    }
}
