//! Flat JSON import/export of a pattern
//!
//! Document shape:
//!
//! ```json
//! { "bpm": 120, "totalSteps": 64, "soundTrack": [ { "name": "C4", "start": 0, "length": 2 } ] }
//! ```
//!
//! An optional `"swing"` amount (0.0-1.0) is written only for swung patterns.
//! An optional `"lanes"` object carries mute/solo/gain per note name and is
//! only written when some lane differs from the defaults.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SequencerError};
use crate::pattern::{LaneSettings, Pattern, PatternDefaults, Placement};

/// Serialized form of a [`Pattern`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternDocument {
    pub bpm: u32,
    pub total_steps: u32,
    pub sound_track: Vec<Placement>,
    #[serde(default, skip_serializing_if = "is_straight")]
    pub swing: f32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lanes: BTreeMap<String, LaneSettings>,
}

fn is_straight(swing: &f32) -> bool {
    *swing <= 0.0
}

pub fn export(pattern: &Pattern) -> PatternDocument {
    PatternDocument {
        bpm: pattern.bpm(),
        total_steps: pattern.total_steps(),
        sound_track: pattern.placements().to_vec(),
        swing: pattern.swing(),
        lanes: pattern.lanes().clone(),
    }
}

/// Pretty-printed JSON document for a pattern
pub fn to_json(pattern: &Pattern) -> Result<String> {
    serde_json::to_string_pretty(&export(pattern))
        .map_err(|e| SequencerError::invalid_format(e.to_string()))
}

/// Parse and validate a document. `fallback` supplies tempo and length when
/// the document lacks usable values.
pub fn from_json(json: &str, fallback: PatternDefaults) -> Result<Pattern> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| SequencerError::invalid_format(format!("not valid JSON: {e}")))?;
    from_value(&value, fallback)
}

pub fn from_value(value: &Value, fallback: PatternDefaults) -> Result<Pattern> {
    let doc = value
        .as_object()
        .ok_or_else(|| SequencerError::invalid_format("document is not a JSON object"))?;

    let sound_track = doc
        .get("soundTrack")
        .and_then(Value::as_array)
        .ok_or_else(|| SequencerError::invalid_format("soundTrack must be an array"))?;

    let placements = sound_track
        .iter()
        .enumerate()
        .map(|(idx, item)| parse_placement(idx, item))
        .collect::<Result<Vec<_>>>()?;

    let bpm = doc
        .get("bpm")
        .and_then(loose_count)
        .unwrap_or(fallback.bpm);
    let total_steps = doc
        .get("totalSteps")
        .and_then(loose_count)
        .unwrap_or(fallback.total_steps);

    let swing = doc.get("swing").and_then(loose_fraction).unwrap_or(0.0);

    let lanes = match doc.get("lanes") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(lanes) => serde_json::from_value(lanes.clone())
            .map_err(|e| SequencerError::invalid_format(format!("lanes: {e}")))?,
    };

    Ok(Pattern::from_parts(bpm, total_steps, placements, lanes)?.set_swing(swing))
}

fn parse_placement(idx: usize, item: &Value) -> Result<Placement> {
    let obj = item
        .as_object()
        .ok_or_else(|| SequencerError::invalid_format(format!("soundTrack[{idx}] is not an object")))?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| SequencerError::invalid_format(format!("soundTrack[{idx}].name must be a string")))?;

    let start = obj
        .get("start")
        .and_then(strict_count)
        .ok_or_else(|| {
            SequencerError::invalid_format(format!("soundTrack[{idx}].start must be a non-negative integer"))
        })?;

    let length = obj
        .get("length")
        .and_then(strict_count)
        .filter(|&len| len > 0)
        .ok_or_else(|| {
            SequencerError::invalid_format(format!("soundTrack[{idx}].length must be a positive integer"))
        })?;

    Ok(Placement {
        name: name.to_string(),
        start,
        length,
    })
}

/// Non-negative integral JSON number
fn strict_count(value: &Value) -> Option<u32> {
    let Value::Number(n) = value else {
        return None;
    };
    let n = match n.as_u64() {
        Some(n) => n,
        None => {
            let f = n.as_f64()?;
            if f < 0.0 || f.fract() != 0.0 {
                return None;
            }
            f as u64
        }
    };
    u32::try_from(n).ok()
}

/// Like [`strict_count`] but also accepts numeric strings; zero counts as missing
fn loose_count(value: &Value) -> Option<u32> {
    let n = match value {
        Value::String(s) => s.trim().parse::<u32>().ok(),
        other => strict_count(other),
    }?;
    (n > 0).then_some(n)
}

/// Finite number, or numeric string, later clamped into `[0, 1]`
fn loose_fraction(value: &Value) -> Option<f32> {
    let f = match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => other.as_f64(),
    }?;
    f.is_finite().then_some(f as f32)
}

pub fn export_to_path(pattern: &Pattern, path: &Path) -> Result<()> {
    let json = to_json(pattern)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn import_from_path(path: &Path, fallback: PatternDefaults) -> Result<Pattern> {
    let json = std::fs::read_to_string(path)?;
    from_json(&json, fallback)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::pattern::{MAX_BPM, PlacementKey};

    #[test]
    fn test_import_scenario() {
        let json = r#"{"bpm":140,"totalSteps":8,"soundTrack":[{"name":"kick","start":0,"length":1}]}"#;
        let pattern = from_json(json, PatternDefaults::default()).unwrap();
        assert_eq!(pattern.bpm(), 140);
        assert_eq!(pattern.total_steps(), 8);
        assert_eq!(pattern.placements(), &[Placement::new("kick", 0, 1)]);
    }

    #[test]
    fn test_round_trip() {
        let pattern = Pattern::new(PatternDefaults::new(97, 32))
            .toggle_note(0, "C4")
            .toggle_note(4, "E4")
            .toggle_note(9, "C4")
            .set_lane("E4", LaneSettings { muted: true, solo: false, gain: 0.5 })
            .set_swing(0.5);
        let pattern = pattern.resize_note(&PlacementKey::new("E4", 4), 3);

        let json = to_json(&pattern).unwrap();
        let restored = from_json(&json, PatternDefaults::default()).unwrap();

        assert_eq!(restored.bpm(), pattern.bpm());
        assert_eq!(restored.total_steps(), pattern.total_steps());
        assert_eq!(restored.lanes(), pattern.lanes());
        assert_eq!(restored.swing(), 0.5);
        let a: HashSet<_> = pattern.placements().iter().collect();
        let b: HashSet<_> = restored.placements().iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_export_shape() {
        let pattern = Pattern::default().toggle_note(2, "C4");
        let value: Value = serde_json::from_str(&to_json(&pattern).unwrap()).unwrap();
        assert_eq!(value["bpm"], 120);
        assert_eq!(value["totalSteps"], 64);
        assert_eq!(value["soundTrack"][0]["name"], "C4");
        assert_eq!(value["soundTrack"][0]["start"], 2);
        assert_eq!(value["soundTrack"][0]["length"], 1);
        assert!(value.get("lanes").is_none());
    }

    #[test]
    fn test_missing_tempo_and_length_fall_back() {
        let json = r#"{"soundTrack":[]}"#;
        let pattern = from_json(json, PatternDefaults::new(90, 16)).unwrap();
        assert_eq!(pattern.bpm(), 90);
        assert_eq!(pattern.total_steps(), 16);
    }

    #[test]
    fn test_string_tempo_is_accepted_and_clamped() {
        let json = r#"{"bpm":"300","totalSteps":"12","soundTrack":[]}"#;
        let pattern = from_json(json, PatternDefaults::default()).unwrap();
        assert_eq!(pattern.bpm(), MAX_BPM);
        assert_eq!(pattern.total_steps(), 12);
    }

    #[test]
    fn test_swing_is_optional_and_clamped() {
        let straight = from_json(r#"{"soundTrack":[]}"#, PatternDefaults::default()).unwrap();
        assert_eq!(straight.swing(), 0.0);
        let value: Value = serde_json::from_str(&to_json(&straight).unwrap()).unwrap();
        assert!(value.get("swing").is_none());

        let swung = from_json(r#"{"swing":"0.25","soundTrack":[]}"#, PatternDefaults::default()).unwrap();
        assert_eq!(swung.swing(), 0.25);
        let value: Value = serde_json::from_str(&to_json(&swung).unwrap()).unwrap();
        assert_eq!(value["swing"], 0.25);

        let wild = from_json(r#"{"swing":4,"soundTrack":[]}"#, PatternDefaults::default()).unwrap();
        assert_eq!(wild.swing(), 1.0);
        let junk = from_json(r#"{"swing":"lots","soundTrack":[]}"#, PatternDefaults::default()).unwrap();
        assert_eq!(junk.swing(), 0.0);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let cases = [
            "not json",
            "[]",
            r#"{"bpm":120}"#,
            r#"{"soundTrack":{}}"#,
            r#"{"soundTrack":[1]}"#,
            r#"{"soundTrack":[{"start":0,"length":1}]}"#,
            r#"{"soundTrack":[{"name":"C4","start":-1,"length":1}]}"#,
            r#"{"soundTrack":[{"name":"C4","start":0,"length":0}]}"#,
            r#"{"soundTrack":[{"name":"C4","start":0.5,"length":1}]}"#,
            r#"{"soundTrack":[{"name":"C4","start":"0","length":1}]}"#,
        ];
        for json in cases {
            let err = from_json(json, PatternDefaults::default()).unwrap_err();
            assert!(matches!(err, SequencerError::InvalidFormat(_)), "{json}");
        }
    }

    #[test]
    fn test_rejects_out_of_range_and_overlap() {
        let past_end = r#"{"totalSteps":4,"soundTrack":[{"name":"C4","start":4,"length":1}]}"#;
        assert!(from_json(past_end, PatternDefaults::default()).is_err());

        let overlap = r#"{"soundTrack":[{"name":"C4","start":0,"length":3},{"name":"C4","start":2,"length":1}]}"#;
        assert!(from_json(overlap, PatternDefaults::default()).is_err());
    }

    #[test]
    fn test_long_placement_is_truncated() {
        let json = r#"{"totalSteps":4,"soundTrack":[{"name":"C4","start":2,"length":10}]}"#;
        let pattern = from_json(json, PatternDefaults::default()).unwrap();
        assert_eq!(pattern.placements()[0].length, 2);
    }

    #[test]
    fn test_path_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sequencer-track.json");
        let pattern = Pattern::default().toggle_note(7, "snare");

        export_to_path(&pattern, &path).unwrap();
        let restored = import_from_path(&path, PatternDefaults::default()).unwrap();
        assert_eq!(restored, pattern);
    }
}
