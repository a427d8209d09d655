//! Synergy Map
//!
//! A synergy is a family of attribute names sharing a capitalized word-root
//! ("Gold" → "Gold Cape", "Golden Crown"). The map is built from the attribute
//! catalog, corrected with curated exceptions and stored as a flat JSON object
//! of sorted name lists, alongside a human-readable text export.
//!
//! ## Pipeline
//!
//! 1. **Builder** - extract roots, associate names, apply exceptions
//! 2. **Index** - invert the map into attribute → roots for scoring

pub mod builder;
pub mod index;

pub use builder::{BuildReport, SynergyExceptions};
pub use index::SynergyIndex;

use crate::error::{Error, Result};
use crate::persist;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

/// root → sorted attribute names
pub type SynergyMap = BTreeMap<String, Vec<String>>;

/// `Root {a, b, c}` per line, roots in order
pub fn text_export(map: &SynergyMap) -> String {
    let mut out = String::new();
    for (root, names) in map {
        out.push_str(root);
        out.push_str(" {");
        out.push_str(&names.join(", "));
        out.push_str("}\n");
    }
    out
}

/// The text export lives next to the JSON file with a `.txt` extension
pub fn text_path(json_path: &Path) -> PathBuf {
    json_path.with_extension("txt")
}

/// Load the persisted map. An absent file is an empty map.
#[instrument]
pub async fn load_map(path: &Path) -> Result<SynergyMap> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Synergy map {} not found, using an empty map", path.display());
            return Ok(SynergyMap::new());
        }
        Err(e) => return Err(Error::io(path, e)),
    };

    let map: SynergyMap = serde_json::from_str(&raw).map_err(|e| Error::InvalidFormat {
        resource: "synergy map",
        message: format!("{}: {}", path.display(), e).into(),
    })?;

    info!("Loaded {} synergies from {}", map.len(), path.display());
    Ok(map)
}

/// Write the JSON artifact and its text export; returns the text file path
#[instrument(skip(map), fields(synergies = map.len()))]
pub async fn save_map(path: &Path, map: &SynergyMap) -> Result<PathBuf> {
    let json_path = path.to_path_buf();
    let text_file = text_path(path);
    let text = text_export(map);
    let json = serde_json::to_vec_pretty(map)?;

    let text_target = text_file.clone();
    tokio::task::spawn_blocking(move || {
        persist::write_atomic(&json_path, &json)?;
        persist::write_atomic(&text_target, text.as_bytes())
    })
    .await??;

    Ok(text_file)
}

/// Exceptions are optional: any read or parse problem means "no exceptions"
#[instrument]
pub async fn load_exceptions(path: &Path) -> SynergyExceptions {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("No synergy exceptions at {} ({}), using none", path.display(), e);
            return SynergyExceptions::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(exceptions) => exceptions,
        Err(e) => {
            error!("Synergy exceptions {} unreadable: {}", path.display(), e);
            SynergyExceptions::default()
        }
    }
}

/// A synergy and the number of names in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynergySize {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynergyMapStats {
    pub total_synergies: usize,
    pub total_attribute_mentions: usize,
    pub unique_attributes: usize,
    pub average_attributes_per_synergy: f64,
    /// Ten largest synergies
    pub top: Vec<SynergySize>,
    /// Ten smallest synergies
    pub bottom: Vec<SynergySize>,
    /// names-per-synergy → number of synergies of that size
    pub size_distribution: BTreeMap<usize, usize>,
}

impl SynergyMapStats {
    pub fn compute(map: &SynergyMap) -> Self {
        let total_attribute_mentions: usize = map.values().map(Vec::len).sum();
        let unique: BTreeSet<&str> = map.values().flatten().map(String::as_str).collect();

        let mut sizes: Vec<SynergySize> = map
            .iter()
            .map(|(name, names)| SynergySize {
                name: name.clone(),
                count: names.len(),
            })
            .collect();
        // Largest first, name order among equals
        sizes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        let mut size_distribution = BTreeMap::new();
        for size in &sizes {
            *size_distribution.entry(size.count).or_insert(0) += 1;
        }

        let top = sizes.iter().take(10).cloned().collect();
        let bottom = sizes.iter().rev().take(10).cloned().collect();

        Self {
            total_synergies: map.len(),
            total_attribute_mentions,
            unique_attributes: unique.len(),
            average_attributes_per_synergy: if map.is_empty() {
                0.0
            } else {
                total_attribute_mentions as f64 / map.len() as f64
            },
            top,
            bottom,
            size_distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> SynergyMap {
        SynergyMap::from([
            (
                "Gold".to_string(),
                vec!["Gold Cape".to_string(), "Gold Ring".to_string(), "Golden Crown".to_string()],
            ),
            ("Ring".to_string(), vec!["Gold Ring".to_string(), "Silver Ring".to_string()]),
        ])
    }

    #[test]
    fn test_text_export_format() {
        assert_eq!(
            text_export(&sample_map()),
            "Gold {Gold Cape, Gold Ring, Golden Crown}\nRing {Gold Ring, Silver Ring}\n"
        );
    }

    #[test]
    fn test_map_is_a_flat_json_object() {
        let json = serde_json::to_value(sample_map()).unwrap();
        assert_eq!(json["Ring"], serde_json::json!(["Gold Ring", "Silver Ring"]));
    }

    #[test]
    fn test_stats() {
        let stats = SynergyMapStats::compute(&sample_map());

        assert_eq!(stats.total_synergies, 2);
        assert_eq!(stats.total_attribute_mentions, 5);
        assert_eq!(stats.unique_attributes, 4);
        assert!((stats.average_attributes_per_synergy - 2.5).abs() < f64::EPSILON);
        assert_eq!(stats.top[0].name, "Gold");
        assert_eq!(stats.bottom[0].name, "Ring");
        assert_eq!(stats.size_distribution, BTreeMap::from([(2, 1), (3, 1)]));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synergy_state.json");

        let text_file = save_map(&path, &sample_map()).await.unwrap();
        assert_eq!(text_file, dir.path().join("synergy_state.txt"));
        assert!(std::fs::read_to_string(&text_file).unwrap().starts_with("Gold {"));

        assert_eq!(load_map(&path).await.unwrap(), sample_map());
    }

    #[tokio::test]
    async fn test_load_map_absent_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synergy_state.json");

        assert!(load_map(&path).await.unwrap().is_empty());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_map(&path).await,
            Err(Error::InvalidFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_exceptions_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synergy_exceptions.json");

        assert!(load_exceptions(&path).await.is_empty());

        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(load_exceptions(&path).await.is_empty());
    }
}
