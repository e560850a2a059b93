//! Read-only mapping from note names to playable assets

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SequencerError};

/// One playable asset, e.g. `{"name": "C4", "file": "/sounds/C4.wav"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    /// Asset reference handed to the playback collaborator
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            color: None,
        }
    }
}

/// Catalog entries in document order, indexed by name
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
    duplicates: Vec<String>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from entries. The first entry of a name wins; later ones are
    /// dropped and reported by [`Catalog::duplicates`].
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut catalog = Self::default();
        for entry in entries {
            if catalog.index.contains_key(&entry.name) {
                catalog.duplicates.push(entry.name);
                continue;
            }
            catalog.index.insert(entry.name.clone(), catalog.entries.len());
            catalog.entries.push(entry);
        }
        catalog
    }

    /// Parse a JSON array of entries. Extra fields on an entry are ignored.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(json).map_err(|e| SequencerError::InvalidCatalog(e.to_string()))?;
        Ok(Self::from_entries(entries))
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.index.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Entries in document order (one grid row each)
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Names dropped because an earlier entry already used them
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let json = r##"[
            {"name": "C4", "file": "/sounds/C4.wav", "color": "#ff0000"},
            {"name": "kick", "file": "/sounds/kick.wav", "volume": 0.5}
        ]"##;
        let catalog = Catalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("C4").unwrap().color.as_deref(), Some("#ff0000"));
        assert_eq!(catalog.get("kick").unwrap().file, "/sounds/kick.wav");
        assert!(catalog.get("snare").is_none());
    }

    #[test]
    fn test_first_duplicate_wins() {
        let catalog = Catalog::from_entries([
            CatalogEntry::new("C4", "a.wav"),
            CatalogEntry::new("D4", "b.wav"),
            CatalogEntry::new("C4", "c.wav"),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("C4").unwrap().file, "a.wav");
        assert_eq!(catalog.duplicates(), &["C4".to_string()]);
    }

    #[test]
    fn test_rejects_non_array() {
        let err = Catalog::from_json(r#"{"name": "C4"}"#).unwrap_err();
        assert!(matches!(err, SequencerError::InvalidCatalog(_)));
    }
}
