//! Attribute Catalog
//!
//! Loads the per-attribute rarity data and exposes the lists the search UI
//! offers (skin tones, rarity tiers) plus the value → tier lookup used by the
//! match engine.
//!
//! Source shape:
//!
//! ```json
//! { "attributes_power": { "attributes": { "<category>": { "<value>": "<tier>" } } } }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, instrument, warn};

/// Category that is used as a hard filter and never scored
pub const SKIN_TONE: &str = "Skin Tone";

/// Conventional tier order, rarest first
pub const RARITY_ORDER: [&str; 5] = ["Mythical+", "Mythical", "Legendary", "Epic", "Common"];

/// category -> value -> tier
pub type CategoryMap = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Default, Deserialize)]
struct AttributesFile {
    #[serde(default)]
    attributes_power: AttributesPower,
}

#[derive(Debug, Default, Deserialize)]
struct AttributesPower {
    #[serde(default)]
    attributes: CategoryMap,
}

/// A skin tone together with its own rarity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinTone {
    pub name: String,
    pub rarity: String,
}

/// A catalog entry as shown to one user, carrying that user's selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOption {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    pub selected: bool,
}

/// Normalized attribute value -> rarity tier
#[derive(Debug, Clone, Default)]
pub struct RarityTable {
    tiers: HashMap<String, String>,
}

impl RarityTable {
    /// Lower-case and trim a value the way the table keys are stored
    pub fn normalize(value: &str) -> String {
        value.trim().to_lowercase()
    }

    pub fn insert(&mut self, value: &str, tier: impl Into<String>) {
        self.tiers.insert(Self::normalize(value), tier.into());
    }

    /// Tier of an attribute value, if the catalog knows it
    pub fn get(&self, value: &str) -> Option<&str> {
        self.tiers.get(&Self::normalize(value)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

/// Loaded attribute catalog
#[derive(Debug, Clone, Default)]
pub struct AttributeCatalog {
    categories: CategoryMap,
    skin_tones: Vec<SkinTone>,
    rarities: Vec<String>,
    rarity_table: RarityTable,
}

impl AttributeCatalog {
    /// Build the catalog from already-parsed category data
    pub fn from_categories(categories: CategoryMap) -> Self {
        let skin_tones: Vec<SkinTone> = match categories.get(SKIN_TONE) {
            Some(values) => values
                .iter()
                .map(|(name, rarity)| SkinTone {
                    name: name.clone(),
                    rarity: rarity.clone(),
                })
                .collect(),
            None => {
                warn!("No \"{}\" category in attribute data", SKIN_TONE);
                Vec::new()
            }
        };

        let tiers: BTreeSet<&str> = categories
            .iter()
            .filter(|(category, _)| category.as_str() != SKIN_TONE)
            .flat_map(|(_, values)| values.values().map(String::as_str))
            .collect();
        let rarities = order_rarities(tiers);

        let mut rarity_table = RarityTable::default();
        for values in categories.values() {
            for (value, tier) in values {
                rarity_table.insert(value, tier.clone());
            }
        }

        Self {
            categories,
            skin_tones,
            rarities,
            rarity_table,
        }
    }

    /// Parse the attribute-power JSON document
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        let file: AttributesFile = serde_json::from_str(raw)?;
        Ok(Self::from_categories(file.attributes_power.attributes))
    }

    /// Load the catalog from disk.
    ///
    /// An absent or unparsable file is `MissingSourceData`: nothing downstream
    /// can be built without it.
    #[instrument]
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::missing_source("attribute catalog", path, e.to_string()))?;

        let catalog = Self::parse(&raw).map_err(|e| {
            Error::missing_source("attribute catalog", path, format!("corrupt JSON: {}", e))
        })?;

        info!(
            "Loaded attribute catalog: {} categories, {} skin tones, {} rarity tiers",
            catalog.categories.len(),
            catalog.skin_tones.len(),
            catalog.rarities.len()
        );
        Ok(catalog)
    }

    pub fn skin_tones(&self) -> &[SkinTone] {
        &self.skin_tones
    }

    /// Distinct tiers outside the skin tone category, rarest first
    pub fn rarities(&self) -> &[String] {
        &self.rarities
    }

    pub fn rarity_table(&self) -> &RarityTable {
        &self.rarity_table
    }

    pub fn into_rarity_table(self) -> RarityTable {
        self.rarity_table
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    /// Every attribute value of every category, skin tones included
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.categories
            .values()
            .flat_map(|values| values.keys().map(String::as_str))
    }

    /// Skin tones with `selected` set for the names in `selected`
    pub fn skin_tone_options(&self, selected: &[String]) -> Vec<SelectionOption> {
        self.skin_tones
            .iter()
            .map(|tone| SelectionOption {
                name: tone.name.clone(),
                rarity: Some(tone.rarity.clone()),
                selected: selected.contains(&tone.name),
            })
            .collect()
    }

    /// Rarity tiers with `selected` set for the names in `selected`
    pub fn rarity_options(&self, selected: &[String]) -> Vec<SelectionOption> {
        self.rarities
            .iter()
            .map(|tier| SelectionOption {
                name: tier.clone(),
                rarity: None,
                selected: selected.contains(tier),
            })
            .collect()
    }
}

/// Known tiers in conventional order, unknown ones after them alphabetically
fn order_rarities(tiers: BTreeSet<&str>) -> Vec<String> {
    let mut ordered: Vec<&str> = tiers.into_iter().collect();
    ordered.sort_by_key(|tier| {
        RARITY_ORDER
            .iter()
            .position(|known| known == tier)
            .unwrap_or(RARITY_ORDER.len())
    });
    ordered.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "attributes_power": {
            "attributes": {
                "Skin Tone": { "Martian": "Common", "Golden": "Legendary" },
                "Clothing": { "Gold Cape": "Epic", "Silver Ring": "Common" },
                "Headwear": { "Golden Crown": "Mythical+", "Halo": "Ancient" }
            }
        }
    }"#;

    #[test]
    fn test_parse_splits_skin_tones_from_rarities() {
        let catalog = AttributeCatalog::parse(SAMPLE).unwrap();

        let tones: Vec<&str> = catalog.skin_tones().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tones, vec!["Golden", "Martian"]);

        // Legendary only occurs under Skin Tone, so it is not offered as a tier
        assert_eq!(
            catalog.rarities(),
            &["Mythical+", "Epic", "Common", "Ancient"]
        );
    }

    #[test]
    fn test_rarity_table_normalizes_keys() {
        let catalog = AttributeCatalog::parse(SAMPLE).unwrap();
        let table = catalog.rarity_table();

        assert_eq!(table.get("Gold Cape"), Some("Epic"));
        assert_eq!(table.get("  gold cape "), Some("Epic"));
        assert_eq!(table.get("Martian"), Some("Common"));
        assert_eq!(table.get("Bronze Cape"), None);
    }

    #[test]
    fn test_attribute_names_include_every_category() {
        let catalog = AttributeCatalog::parse(SAMPLE).unwrap();
        let names: Vec<&str> = catalog.attribute_names().collect();
        assert!(names.contains(&"Martian"));
        assert!(names.contains(&"Golden Crown"));
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_missing_skin_tone_category_is_tolerated() {
        let catalog =
            AttributeCatalog::parse(r#"{"attributes_power":{"attributes":{"Eyes":{"Laser":"Epic"}}}}"#)
                .unwrap();
        assert!(catalog.skin_tones().is_empty());
        assert_eq!(catalog.rarities(), &["Epic"]);
    }

    #[test]
    fn test_selection_options_carry_user_selection() {
        let catalog = AttributeCatalog::parse(SAMPLE).unwrap();
        let options = catalog.skin_tone_options(&["Martian".to_string()]);
        assert!(options.iter().any(|o| o.name == "Martian" && o.selected));
        assert!(options.iter().any(|o| o.name == "Golden" && !o.selected));

        let rarities = catalog.rarity_options(&[]);
        assert!(rarities.iter().all(|o| !o.selected && o.rarity.is_none()));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_missing_source_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attributes_power_data.json");

        let err = AttributeCatalog::load(&path).await.unwrap_err();
        assert!(matches!(err, Error::MissingSourceData { .. }));
        assert!(err.to_string().contains("attributes_power_data.json"));
    }
}
