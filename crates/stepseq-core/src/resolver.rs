//! Step-to-note resolution

use std::collections::BTreeSet;

use crate::pattern::{Pattern, Placement};

/// What a grid cell shows for one lane at one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    /// Covered, but not the last step of the placement
    Body,
    /// Last covered step; pressing here starts a resize
    Tail,
}

/// Every placement sounding at `step`
pub fn notes_at(pattern: &Pattern, step: u32) -> Vec<&Placement> {
    pattern
        .placements()
        .iter()
        .filter(|p| p.covers(step))
        .collect()
}

/// Names sounding at `step`
pub fn names_at(pattern: &Pattern, step: u32) -> BTreeSet<&str> {
    notes_at(pattern, step)
        .into_iter()
        .map(|p| p.name.as_str())
        .collect()
}

/// Sounding placements whose lane is audible (mute/solo applied)
pub fn audible_at(pattern: &Pattern, step: u32) -> Vec<&Placement> {
    notes_at(pattern, step)
        .into_iter()
        .filter(|p| pattern.is_audible(&p.name))
        .collect()
}

pub fn cell_at(pattern: &Pattern, name: &str, step: u32) -> Cell {
    match pattern.covering(name, step) {
        Some(p) if p.tail() == step => Cell::Tail,
        Some(_) => Cell::Body,
        None => Cell::Empty,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::pattern::LaneSettings;

    fn pattern(steps: u32, placements: Vec<Placement>) -> Pattern {
        Pattern::from_parts(120, steps, placements, BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_single_placement_scenario() {
        let p = pattern(4, vec![Placement::new("C4", 1, 2)]);
        assert!(names_at(&p, 0).is_empty());
        assert_eq!(names_at(&p, 1), BTreeSet::from(["C4"]));
        assert_eq!(names_at(&p, 2), BTreeSet::from(["C4"]));
        assert!(names_at(&p, 3).is_empty());
    }

    #[test]
    fn test_notes_at_matches_interval_containment() {
        let p = pattern(
            16,
            vec![
                Placement::new("C4", 0, 4),
                Placement::new("C4", 6, 2),
                Placement::new("E4", 3, 5),
                Placement::new("kick", 15, 1),
            ],
        );
        for step in 0..16 {
            let expected: Vec<&Placement> = p
                .placements()
                .iter()
                .filter(|pl| pl.start <= step && step < pl.start + pl.length)
                .collect();
            assert_eq!(notes_at(&p, step), expected, "step {step}");

            // never two placements of the same lane at once
            let names: Vec<&str> = notes_at(&p, step).iter().map(|pl| pl.name.as_str()).collect();
            assert_eq!(names.len(), names_at(&p, step).len(), "step {step}");
        }
    }

    #[test]
    fn test_cell_at() {
        let p = pattern(8, vec![Placement::new("C4", 2, 3)]);
        assert_eq!(cell_at(&p, "C4", 1), Cell::Empty);
        assert_eq!(cell_at(&p, "C4", 2), Cell::Body);
        assert_eq!(cell_at(&p, "C4", 4), Cell::Tail);
        assert_eq!(cell_at(&p, "D4", 4), Cell::Empty);
    }

    #[test]
    fn test_audible_at_applies_mute() {
        let p = pattern(4, vec![Placement::new("kick", 0, 1), Placement::new("hat", 0, 1)])
            .set_lane("hat", LaneSettings { muted: true, ..Default::default() });
        let audible: Vec<&str> = audible_at(&p, 0).iter().map(|pl| pl.name.as_str()).collect();
        assert_eq!(audible, vec!["kick"]);
        assert_eq!(notes_at(&p, 0).len(), 2);
    }
}
