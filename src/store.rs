//! Result Store
//!
//! Keeps the current result set of each user, one per kind. Saving overwrites
//! the previous set for the same key; a missing set is a normal outcome.
//!
//! The engine only depends on [`ResultStore`]; [`FileResultStore`] keeps one
//! JSON file per user and kind under the user files directory.

use crate::error::{Error, Result};
use crate::marketplace::OnSaleStats;
use crate::matching::{MatchResult, SynergyHit, Threshold};
use crate::nft::NftRecord;
use crate::persist;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const FILE_PREFIX: &str = "Orc_filtered";
const MAX_SAFE_NAME_LEN: usize = 50;

/// Which result set of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// Every matched NFT
    All,
    /// Matched NFTs currently listed for sale
    OnSale,
}

/// Identity of one stored result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultKey {
    pub user_id: String,
    pub username: Option<String>,
    pub kind: ResultKind,
}

impl ResultKey {
    pub fn new(user_id: impl Into<String>, username: Option<String>, kind: ResultKind) -> Self {
        Self {
            user_id: user_id.into(),
            username,
            kind,
        }
    }

    pub fn with_kind(&self, kind: ResultKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Username restricted to `[A-Za-z0-9_-]`, at most 50 characters
    pub fn safe_username(&self) -> String {
        let safe: String = self
            .username
            .as_deref()
            .unwrap_or_default()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .take(MAX_SAFE_NAME_LEN)
            .collect();

        if safe.is_empty() {
            format!("user_{}", self.user_id)
        } else {
            safe
        }
    }

    pub fn file_name(&self) -> String {
        match self.kind {
            ResultKind::All => {
                format!("{}_{}_{}.json", FILE_PREFIX, self.safe_username(), self.user_id)
            }
            ResultKind::OnSale => format!(
                "{}_onsale_{}_{}.json",
                FILE_PREFIX,
                self.safe_username(),
                self.user_id
            ),
        }
    }
}

/// Which filters the user had enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub all_nfts: bool,
    pub on_sale_only: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            all_nfts: true,
            on_sale_only: false,
        }
    }
}

/// The search a result set came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub synergy_level: Threshold,
    pub selected_skin_tones: Vec<String>,
    pub selected_rarities: Vec<String>,
    pub search_date: DateTime<Utc>,
    pub total_nfts: usize,
    pub found_nfts: usize,
    pub synergy_count: usize,
}

/// Per-NFT annotation written next to the NFT fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynergyInfo {
    pub synergy_score: usize,
    pub skin_tone: String,
    pub matching_synergies: Vec<SynergyHit>,
    pub filtered_attributes_count: usize,
    pub rarity: String,
    pub search_params: SearchParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNft {
    #[serde(flatten)]
    pub nft: NftRecord,
    #[serde(rename = "synergyInfo")]
    pub synergy_info: SynergyInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMetadata {
    pub user_id: String,
    pub username: Option<String>,
    pub file_name: String,
    pub saved_at: DateTime<Utc>,
    pub search_id: Uuid,
    pub search_params: SearchParams,
    pub filter_options: FilterOptions,
    pub nfts_count: usize,
    pub original_results_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_sale_stats: Option<OnSaleStats>,
}

/// A stored result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResultSet {
    pub metadata: SavedMetadata,
    pub nfts: Vec<SavedNft>,
}

impl SavedResultSet {
    /// Attach the search annotation to every result
    pub fn from_matches(
        key: &ResultKey,
        results: &[MatchResult],
        search_id: Uuid,
        search_params: &SearchParams,
        filter_options: FilterOptions,
        original_results_count: usize,
        on_sale_stats: Option<OnSaleStats>,
    ) -> Self {
        let nfts: Vec<SavedNft> = results
            .iter()
            .map(|result| SavedNft {
                nft: result.nft.clone(),
                synergy_info: SynergyInfo {
                    synergy_score: result.synergy_score,
                    skin_tone: result.skin_tone.clone(),
                    matching_synergies: result.matching_synergies.clone(),
                    filtered_attributes_count: result.filtered_attributes_count,
                    rarity: result.rarity.clone(),
                    search_params: search_params.clone(),
                },
            })
            .collect();

        Self {
            metadata: SavedMetadata {
                user_id: key.user_id.clone(),
                username: key.username.clone(),
                file_name: key.file_name(),
                saved_at: Utc::now(),
                search_id,
                search_params: search_params.clone(),
                filter_options,
                nfts_count: nfts.len(),
                original_results_count,
                on_sale_stats,
            },
            nfts,
        }
    }
}

/// Where and how much was saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub kind: ResultKind,
    pub file_name: String,
    pub nfts_count: usize,
}

/// Key-value storage of result sets
pub trait ResultStore: Send + Sync {
    /// Replace the set stored under `key`
    fn put(&self, key: &ResultKey, set: &SavedResultSet) -> Result<SaveOutcome>;

    /// `None` when nothing is stored under `key`
    fn get(&self, key: &ResultKey) -> Result<Option<SavedResultSet>>;

    /// `false` when nothing was stored under `key`
    fn delete(&self, key: &ResultKey) -> Result<bool>;
}

/// One JSON file per user and kind
#[derive(Debug, Clone)]
pub struct FileResultStore {
    dir: PathBuf,
}

impl FileResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &ResultKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl ResultStore for FileResultStore {
    #[instrument(skip(self, set), fields(user_id = %key.user_id, kind = ?key.kind))]
    fn put(&self, key: &ResultKey, set: &SavedResultSet) -> Result<SaveOutcome> {
        let path = self.path_for(key);
        persist::write_json_atomic(&path, set)?;

        info!("💾 Saved {} NFTs to {}", set.nfts.len(), path.display());
        Ok(SaveOutcome {
            kind: key.kind,
            file_name: key.file_name(),
            nfts_count: set.nfts.len(),
        })
    }

    #[instrument(skip(self), fields(user_id = %key.user_id, kind = ?key.kind))]
    fn get(&self, key: &ResultKey) -> Result<Option<SavedResultSet>> {
        let path = self.path_for(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No saved results at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(Error::io(path, e)),
        };

        let set = serde_json::from_str(&raw).map_err(|e| Error::InvalidFormat {
            resource: "saved results",
            message: format!("{}: {}", path.display(), e).into(),
        })?;
        Ok(Some(set))
    }

    #[instrument(skip(self), fields(user_id = %key.user_id, kind = ?key.kind))]
    fn delete(&self, key: &ResultKey) -> Result<bool> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("🗑️ Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nft::AttributeRecord;
    use std::collections::BTreeMap;

    fn params() -> SearchParams {
        SearchParams {
            synergy_level: Threshold::Two,
            selected_skin_tones: vec!["Martian".to_string()],
            selected_rarities: Vec::new(),
            search_date: Utc::now(),
            total_nfts: 10,
            found_nfts: 1,
            synergy_count: 4,
        }
    }

    fn matched() -> MatchResult {
        let hit = SynergyHit {
            synergy_name: "Gold".to_string(),
            count: 2,
            attributes: Vec::new(),
        };
        let mut nft = NftRecord::new(
            7,
            "0:abc",
            vec![
                AttributeRecord::new("Clothing", "Gold Cape"),
                AttributeRecord::new("Headwear", "Golden Crown"),
            ],
        );
        nft.extra
            .insert("image_url".to_string(), serde_json::json!("https://example.org/7.png"));

        MatchResult {
            nft,
            synergy_score: 2,
            skin_tone: "Martian".to_string(),
            matching_synergies: vec![hit.clone()],
            total_attributes: 2,
            filtered_attributes_count: 2,
            rarity: "Epic".to_string(),
            all_synergies: BTreeMap::from([("Gold".to_string(), hit)]),
        }
    }

    #[test]
    fn test_file_names() {
        let key = ResultKey::new("42", Some("Ork Lord!".to_string()), ResultKind::All);
        assert_eq!(key.file_name(), "Orc_filtered_Ork_Lord__42.json");
        assert_eq!(
            key.with_kind(ResultKind::OnSale).file_name(),
            "Orc_filtered_onsale_Ork_Lord__42.json"
        );

        let anonymous = ResultKey::new("42", None, ResultKind::All);
        assert_eq!(anonymous.file_name(), "Orc_filtered_user_42_42.json");

        let long = ResultKey::new("1", Some("x".repeat(80)), ResultKind::All);
        assert_eq!(long.safe_username().len(), 50);
    }

    #[test]
    fn test_saved_document_shape() {
        let key = ResultKey::new("42", Some("orc".to_string()), ResultKind::All);
        let set = SavedResultSet::from_matches(
            &key,
            &[matched()],
            Uuid::new_v4(),
            &params(),
            FilterOptions::default(),
            1,
            None,
        );

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["metadata"]["userId"], "42");
        assert_eq!(json["metadata"]["fileName"], "Orc_filtered_orc_42.json");
        assert_eq!(json["metadata"]["searchParams"]["synergyLevel"], 2);
        assert_eq!(json["metadata"]["filterOptions"]["allNfts"], true);
        assert!(json["metadata"].get("onSaleStats").is_none());

        let nft = &json["nfts"][0];
        assert_eq!(nft["address"], "0:abc");
        assert_eq!(nft["image_url"], "https://example.org/7.png");
        assert_eq!(nft["synergyInfo"]["synergyScore"], 2);
        assert_eq!(nft["synergyInfo"]["matchingSynergies"][0]["synergyName"], "Gold");
    }

    #[test]
    fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(dir.path().join("user_files"));
        let key = ResultKey::new("42", Some("orc".to_string()), ResultKind::All);

        assert_eq!(store.get(&key).unwrap(), None);
        assert!(!store.delete(&key).unwrap());

        let set = SavedResultSet::from_matches(
            &key,
            &[matched()],
            Uuid::new_v4(),
            &params(),
            FilterOptions::default(),
            1,
            None,
        );
        let outcome = store.put(&key, &set).unwrap();
        assert_eq!(outcome.nfts_count, 1);
        assert_eq!(outcome.file_name, "Orc_filtered_orc_42.json");

        let loaded = store.get(&key).unwrap().unwrap();
        assert_eq!(loaded, set);

        // Other kind is independent
        assert_eq!(store.get(&key.with_kind(ResultKind::OnSale)).unwrap(), None);

        assert!(store.delete(&key).unwrap());
        assert_eq!(store.get(&key).unwrap(), None);
    }

    #[test]
    fn test_put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(dir.path());
        let key = ResultKey::new("42", None, ResultKind::All);

        let first = SavedResultSet::from_matches(
            &key,
            &[matched(), matched()],
            Uuid::new_v4(),
            &params(),
            FilterOptions::default(),
            2,
            None,
        );
        let second = SavedResultSet::from_matches(
            &key,
            &[],
            Uuid::new_v4(),
            &params(),
            FilterOptions::default(),
            0,
            None,
        );

        store.put(&key, &first).unwrap();
        store.put(&key, &second).unwrap();

        assert_eq!(store.get(&key).unwrap().unwrap().nfts.len(), 0);
    }
}
