//! NFT records and the collection file they are read from
//!
//! Records are validated one by one at load time. A record that cannot be
//! converted is counted and skipped; a record whose `attributes` is not a list
//! is kept without attributes so the match engine can skip it itself.

use crate::catalog::{RarityTable, SKIN_TONE};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// One `{trait_type, value}` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub trait_type: String,
    pub value: String,
}

impl AttributeRecord {
    pub fn new(trait_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: value.into(),
        }
    }

    pub fn is_skin_tone(&self) -> bool {
        self.trait_type == SKIN_TONE
    }
}

/// Marketplace listing price in the smallest unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePrice {
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
    #[serde(default)]
    pub decimals: u32,
}

/// An NFT as stored in the collection file
///
/// Fields this crate does not interpret (image, owner, marketplace links…)
/// are carried in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NftRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_attributes",
        skip_serializing_if = "Option::is_none"
    )]
    pub attributes: Option<Vec<AttributeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_sale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<SalePrice>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl NftRecord {
    pub fn new(index: i64, address: impl Into<String>, attributes: Vec<AttributeRecord>) -> Self {
        Self {
            index: Some(index),
            address: address.into(),
            name: None,
            attributes: Some(attributes),
            on_sale: None,
            sale_price: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Value of the first `Skin Tone` attribute
    pub fn skin_tone(&self) -> Option<&str> {
        self.attributes
            .as_deref()?
            .iter()
            .find(|a| a.is_skin_tone())
            .map(|a| a.value.as_str())
    }

    pub fn user_friendly_address(&self) -> Option<&str> {
        self.extra.get("user_friendly_address").and_then(Value::as_str)
    }

    fn matches_address(&self, needle: &str) -> bool {
        self.address.contains(needle)
            || self
                .user_friendly_address()
                .map_or(false, |a| a.contains(needle))
    }
}

/// Accept `value: "..."` or `value: 123`
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// A non-list becomes `None`; entries without string-like fields are dropped
fn lenient_attributes<'de, D>(deserializer: D) -> Result<Option<Vec<AttributeRecord>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };

    let attributes = entries
        .into_iter()
        .filter_map(|entry| {
            let trait_type = entry.get("trait_type")?.as_str()?.to_string();
            let value = match entry.get("value")? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(AttributeRecord { trait_type, value })
        })
        .collect();

    Ok(Some(attributes))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nft_quantity: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// The loaded NFT collection
#[derive(Debug, Clone, Default)]
pub struct NftCollection {
    pub nfts: Vec<NftRecord>,
    pub collection_info: Option<CollectionInfo>,
    /// Records that failed shape validation and were skipped
    pub rejected: usize,
}

impl NftCollection {
    /// Convert a parsed collection document record by record
    pub fn from_value(document: Value) -> Self {
        let Value::Object(mut document) = document else {
            warn!("NFT collection is not a JSON object");
            return Self::default();
        };

        let collection_info = document
            .remove("collection_info")
            .and_then(|info| serde_json::from_value(info).ok());

        let Some(Value::Array(raw)) = document.remove("nfts") else {
            warn!("NFT collection has no \"nfts\" list");
            return Self {
                collection_info,
                ..Self::default()
            };
        };

        let mut nfts = Vec::with_capacity(raw.len());
        let mut rejected = 0;
        for (position, record) in raw.into_iter().enumerate() {
            match serde_json::from_value::<NftRecord>(record) {
                Ok(nft) => nfts.push(nft),
                Err(e) => {
                    rejected += 1;
                    debug!("Skipping NFT record #{}: {}", position, e);
                }
            }
        }

        if rejected > 0 {
            warn!("Skipped {} malformed NFT records", rejected);
        }

        Self {
            nfts,
            collection_info,
            rejected,
        }
    }

    /// Load the collection file. Absence or corruption yields an empty collection.
    #[instrument]
    pub async fn load(path: &Path) -> Self {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("NFT collection {} unavailable: {}", path.display(), e);
                return Self::default();
            }
        };

        let document: Value = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(e) => {
                warn!("NFT collection {} is not valid JSON: {}", path.display(), e);
                return Self::default();
            }
        };

        let collection = Self::from_value(document);
        info!("📦 Loaded {} NFTs from {}", collection.nfts.len(), path.display());
        collection
    }

    pub fn is_empty(&self) -> bool {
        self.nfts.is_empty()
    }

    pub fn find(&self, lookup: &NftLookup) -> Option<&NftRecord> {
        match lookup {
            NftLookup::Index(index) => self.nfts.iter().find(|n| n.index == Some(*index)),
            NftLookup::Address(needle) => self.nfts.iter().find(|n| n.matches_address(needle)),
        }
    }

    pub fn stats(&self) -> CollectionStats {
        let with_attributes: Vec<&Vec<AttributeRecord>> = self
            .nfts
            .iter()
            .filter_map(|n| n.attributes.as_ref())
            .filter(|attrs| !attrs.is_empty())
            .collect();

        let total_attributes: usize = with_attributes.iter().map(|a| a.len()).sum();
        let unique: HashSet<&str> = with_attributes
            .iter()
            .flat_map(|attrs| attrs.iter().map(|a| a.value.as_str()))
            .collect();

        let mut skin_tone_distribution = BTreeMap::new();
        for tone in self.nfts.iter().filter_map(NftRecord::skin_tone) {
            *skin_tone_distribution.entry(tone.to_string()).or_insert(0) += 1;
        }

        CollectionStats {
            total_nfts: self.nfts.len(),
            with_attributes: with_attributes.len(),
            average_attributes_per_nft: if with_attributes.is_empty() {
                0.0
            } else {
                total_attributes as f64 / with_attributes.len() as f64
            },
            unique_attribute_values: unique.len(),
            skin_tone_distribution,
            last_updated: self
                .collection_info
                .as_ref()
                .and_then(|info| info.last_updated.clone()),
        }
    }
}

/// How a caller identifies one NFT
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NftLookup {
    Index(i64),
    /// Substring of the raw or user-friendly address
    Address(String),
}

impl NftLookup {
    pub fn parse(key: &str) -> Self {
        let key = key.trim();
        match key.parse::<i64>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Address(key.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RatedAttribute {
    pub trait_type: String,
    pub value: String,
    pub rarity: Option<String>,
}

/// A single NFT with every attribute annotated with its rarity tier
#[derive(Debug, Clone, Serialize)]
pub struct NftDetails {
    pub nft: NftRecord,
    pub attributes: Vec<RatedAttribute>,
}

impl NftDetails {
    pub fn new(nft: NftRecord, rarity: &RarityTable) -> Self {
        let attributes = nft
            .attributes
            .iter()
            .flatten()
            .map(|a| RatedAttribute {
                trait_type: a.trait_type.clone(),
                value: a.value.clone(),
                rarity: rarity.get(&a.value).map(str::to_string),
            })
            .collect();
        Self { nft, attributes }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub total_nfts: usize,
    pub with_attributes: usize,
    pub average_attributes_per_nft: f64,
    pub unique_attribute_values: usize,
    pub skin_tone_distribution: BTreeMap<String, usize>,
    pub last_updated: Option<String>,
}
