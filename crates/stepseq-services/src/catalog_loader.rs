//! One-time catalog fetch from a file or an HTTP URL

use std::path::{Path, PathBuf};

use stepseq_core::{Catalog, SequencerError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error(transparent)]
    Parse(#[from] SequencerError),
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Fetch and parse a catalog document
pub fn fetch_catalog(source: &str) -> Result<Catalog, CatalogLoadError> {
    let body = if is_url(source) {
        ureq::get(source)
            .call()
            .map_err(|e| CatalogLoadError::Http(e.to_string()))?
            .into_string()?
    } else {
        std::fs::read_to_string(source)?
    };
    Ok(Catalog::from_json(&body)?)
}

/// Load a catalog, falling back to an empty one on any failure
pub fn load_catalog(source: &str) -> Catalog {
    match fetch_catalog(source) {
        Ok(catalog) => {
            for name in catalog.duplicates() {
                warn!(name = %name, "Duplicate catalog entry ignored");
            }
            info!(source, entries = catalog.len(), "Catalog loaded");
            catalog
        }
        Err(e) => {
            warn!(source, "Error loading catalog, continuing with an empty one: {}", e);
            Catalog::empty()
        }
    }
}

/// Directory that relative asset references in a local catalog resolve
/// against. `None` for a remote catalog, whose assets have no local home.
pub fn asset_dir(source: &str) -> Option<PathBuf> {
    if is_url(source) {
        return None;
    }
    let dir = Path::new(source)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Some(dir)
}

/// Asset root for a run: an explicit directory wins, then the directory of
/// a local catalog. A remote catalog without an explicit root falls back to
/// the working directory.
pub fn asset_root(source: &str, explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    asset_dir(source).unwrap_or_else(|| {
        warn!(
            source,
            "Remote catalog without a local asset directory, resolving assets against the working directory"
        );
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        std::fs::write(
            &path,
            r#"[{"name":"C4","file":"/sounds/C4.wav"},{"name":"D4","file":"/sounds/D4.wav"}]"#,
        )
        .unwrap();

        let catalog = load_catalog(path.to_str().unwrap());
        assert_eq!(catalog.len(), 2);
        assert_eq!(asset_dir(path.to_str().unwrap()).unwrap(), dir.path());
    }

    #[test]
    fn test_missing_file_gives_empty_catalog() {
        let catalog = load_catalog("/definitely/not/here/notes.json");
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_malformed_file_gives_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert!(matches!(
            fetch_catalog(path.to_str().unwrap()),
            Err(CatalogLoadError::Parse(_))
        ));
        assert!(load_catalog(path.to_str().unwrap()).is_empty());
    }

    #[test]
    fn test_asset_dir() {
        assert_eq!(asset_dir("notes.json"), Some(PathBuf::from(".")));
        assert_eq!(asset_dir("kits/notes.json"), Some(PathBuf::from("kits")));
        assert_eq!(asset_dir("https://example.com/notes.json"), None);
    }

    #[test]
    fn test_asset_root_for_remote_catalogs() {
        let url = "https://example.com/kits/notes.json";
        assert_eq!(asset_root(url, None), PathBuf::from("."));
        assert_eq!(asset_root(url, Some(Path::new("/srv/kit"))), PathBuf::from("/srv/kit"));
        assert_eq!(asset_root("kits/notes.json", None), PathBuf::from("kits"));
        assert_eq!(asset_root("kits/notes.json", Some(Path::new("other"))), PathBuf::from("other"));
    }
}
