//! Text rendering of the step grid

use std::collections::BTreeSet;
use std::fmt::Write;

use stepseq_core::{cell_at, Catalog, Cell, Pattern};

const EMPTY: char = '.';
const BODY: char = '=';
const TAIL: char = '#';

/// Lanes in catalog order, then any names the catalog does not know
fn lane_names<'a>(pattern: &'a Pattern, catalog: &'a Catalog) -> Vec<&'a str> {
    let mut names: Vec<&str> = catalog.entries().iter().map(|e| e.name.as_str()).collect();
    let unknown: BTreeSet<&str> = pattern
        .placements()
        .iter()
        .map(|p| p.name.as_str())
        .filter(|name| !catalog.contains(name))
        .collect();
    names.extend(unknown);
    names
}

fn lane_flags(pattern: &Pattern, name: &str) -> String {
    let lane = pattern.lane(name);
    let mut flags = String::new();
    if lane.muted {
        flags.push_str(" M");
    }
    if lane.solo {
        flags.push_str(" S");
    }
    if lane.gain < 1.0 {
        let _ = write!(flags, " {:.2}", lane.gain);
    }
    flags
}

/// Render the grid with a ruler, one row per lane and an optional playhead
pub fn render(pattern: &Pattern, catalog: &Catalog, playhead: Option<u32>) -> String {
    let steps = pattern.total_steps();
    let names = lane_names(pattern, catalog);
    let width = names.iter().map(|n| n.len()).max().unwrap_or(0).max(4);

    let mut out = String::new();
    let _ = write!(out, "{} bpm, ", pattern.bpm());
    if pattern.swing() > 0.0 {
        let _ = write!(out, "swing {:.2}, ", pattern.swing());
    }
    let _ = write!(out, "{} steps, {} notes", steps, pattern.len());
    if !pattern.is_empty() {
        let range = pattern.active_range();
        let _ = write!(out, " (steps {}-{})", range.min, range.max);
    }
    out.push('\n');

    let ruler: String = (0..steps).map(|s| if s % 4 == 0 { '|' } else { ' ' }).collect();
    let _ = writeln!(out, "{:width$} {}", "", ruler);

    for name in names {
        let row: String = (0..steps)
            .map(|step| match cell_at(pattern, name, step) {
                Cell::Empty => EMPTY,
                Cell::Body => BODY,
                Cell::Tail => TAIL,
            })
            .collect();
        let _ = writeln!(out, "{:width$} {}{}", name, row, lane_flags(pattern, name));
    }

    if let Some(step) = playhead.filter(|s| *s < steps) {
        let _ = writeln!(out, "{:width$} {}^", "", " ".repeat(step as usize));
    }
    out
}

#[cfg(test)]
mod tests {
    use stepseq_core::{CatalogEntry, LaneSettings, PatternDefaults, PatternStore, PlacementKey};

    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_entries([
            CatalogEntry::new("C4", "/sounds/C4.wav"),
            CatalogEntry::new("D4", "/sounds/D4.wav"),
        ])
    }

    #[test]
    fn test_render_cells() {
        let store = PatternStore::new(PatternDefaults::new(120, 4));
        store.toggle_note(1, "C4");
        let pattern = store.resize_note(&PlacementKey::new("C4", 1), 2);

        let text = render(&pattern, &catalog(), None);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "120 bpm, 4 steps, 1 notes (steps 1-2)");
        assert_eq!(lines[1], "     |   ");
        assert_eq!(lines[2], "C4   .=#.");
        assert_eq!(lines[3], "D4   ....");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_unknown_names_and_lane_flags() {
        let store = PatternStore::new(PatternDefaults::new(90, 4));
        store.toggle_note(0, "clap");
        let pattern = store.set_lane(
            "C4",
            LaneSettings {
                muted: true,
                solo: false,
                gain: 0.5,
            },
        );

        let text = render(&pattern, &catalog(), Some(2));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "C4   .... M 0.50");
        assert_eq!(lines[4], "clap #...");
        assert_eq!(lines[5], "       ^");
    }

    #[test]
    fn test_header_shows_swing() {
        let pattern = Pattern::new(PatternDefaults::new(100, 8)).set_swing(0.25);
        let text = render(&pattern, &Catalog::empty(), None);
        assert_eq!(text.lines().next(), Some("100 bpm, swing 0.25, 8 steps, 0 notes"));
    }

    #[test]
    fn test_playhead_past_end_is_hidden() {
        let pattern = Pattern::new(PatternDefaults::new(120, 4));
        let text = render(&pattern, &Catalog::empty(), Some(9));
        assert_eq!(text.lines().count(), 2);
    }
}
