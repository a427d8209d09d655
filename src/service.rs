//! Synergy Service
//!
//! Runs the user-facing operations against the configured data files:
//! rebuilding the synergy map, presenting the catalog, executing a search
//! and managing saved results.
//!
//! The synergy index is cached after first use and replaced wholesale when the
//! map is rebuilt. Matching and file-backed storage run on the blocking pool.

use crate::catalog::AttributeCatalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::marketplace::{self, MarketplaceChecker, OnSaleStats, TonApiClient};
use crate::matching::{
    EmptyReason, MatchCriteria, MatchDiagnostics, MatchEngine, MatchResult, MatchSummary,
    PerformanceTimer, Threshold,
};
use crate::nft::{CollectionStats, NftCollection, NftDetails, NftLookup};
use crate::session::{FileSessionStore, SelectionView};
use crate::store::{
    FileResultStore, FilterOptions, ResultKey, ResultKind, ResultStore, SaveOutcome,
    SavedResultSet, SearchParams,
};
use crate::synergy::{self, builder, BuildReport, SynergyIndex, SynergyMapStats};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Threshold levels a user can pick
pub const SYNERGY_LEVELS: [u8; 2] = [2, 3];

/// A search as submitted by a user
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Validated into a [`Threshold`]
    pub synergy_level: u8,
    #[serde(default)]
    pub skin_tones: Vec<String>,
    #[serde(default)]
    pub rarities: Vec<String>,
    #[serde(default)]
    pub filter_options: FilterOptions,
}

fn default_user_id() -> String {
    "web_user".to_string()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnSaleSearch {
    pub count: usize,
    pub stats: OnSaleStats,
    pub saved: Option<SaveOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub search_id: Uuid,
    /// Best results first, capped to the configured limit
    pub results: Vec<MatchResult>,
    pub total_results: usize,
    pub search_params: SearchParams,
    pub summary: MatchSummary,
    pub diagnostics: MatchDiagnostics,
    pub empty_reason: Option<EmptyReason>,
    /// The main set is written on every search, empty or not
    pub saved: SaveOutcome,
    pub on_sale: Option<OnSaleSearch>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total_nfts: usize,
    pub skin_tone_count: usize,
    pub rarity_count: usize,
    pub synergy_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogView {
    #[serde(flatten)]
    pub selection: SelectionView,
    pub synergy_levels: Vec<u8>,
    pub stats: CatalogStats,
}

/// Both stored result sets of a user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResults {
    pub main: Option<SavedResultSet>,
    pub on_sale: Option<SavedResultSet>,
}

impl UserResults {
    pub fn is_empty(&self) -> bool {
        self.main.is_none() && self.on_sale.is_none()
    }
}

/// Which stored sets a delete applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    Main,
    OnSale,
    Both,
}

impl DeleteTarget {
    pub fn parse(kind: &str) -> Result<Self> {
        match kind {
            "main" => Ok(DeleteTarget::Main),
            "onsale" | "on_sale" => Ok(DeleteTarget::OnSale),
            "all" => Ok(DeleteTarget::Both),
            other => Err(Error::bad_request(format!(
                "unknown result kind '{}', expected main, onsale or all",
                other
            ))),
        }
    }

    fn kinds(self) -> &'static [ResultKind] {
        match self {
            DeleteTarget::Main => &[ResultKind::All],
            DeleteTarget::OnSale => &[ResultKind::OnSale],
            DeleteTarget::Both => &[ResultKind::All, ResultKind::OnSale],
        }
    }
}

/// `None` when that kind was not part of the request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub main: Option<bool>,
    pub on_sale: Option<bool>,
}

impl DeleteOutcome {
    pub fn any_deleted(&self) -> bool {
        self.main == Some(true) || self.on_sale == Some(true)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub collection: CollectionStats,
    pub rejected_records: usize,
    pub skin_tones: usize,
    pub rarities: usize,
    pub synergies: SynergyMapStats,
}

/// Orchestrates catalog, synergy map, matching, storage and marketplace
pub struct SynergyService<C = TonApiClient> {
    config: Arc<Config>,
    store: Arc<dyn ResultStore>,
    sessions: FileSessionStore,
    checker: C,
    index: RwLock<Option<Arc<SynergyIndex>>>,
}

impl SynergyService<TonApiClient> {
    /// File-backed stores and the TonAPI client, all from configuration
    pub fn new(config: Config) -> Result<Self> {
        let checker = TonApiClient::new(&config.marketplace)?;
        let store = Arc::new(FileResultStore::new(&config.data.user_files_dir));
        Ok(Self::with_parts(config, store, checker))
    }
}

impl<C: MarketplaceChecker> SynergyService<C> {
    pub fn with_parts(config: Config, store: Arc<dyn ResultStore>, checker: C) -> Self {
        let sessions = FileSessionStore::new(&config.data.user_state_file);
        Self {
            config: Arc::new(config),
            store,
            sessions,
            checker,
            index: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cached index, loaded from the map file on first use
    async fn index(&self) -> Result<Arc<SynergyIndex>> {
        if let Some(index) = self.index.read().await.as_ref() {
            return Ok(index.clone());
        }

        let mut slot = self.index.write().await;
        if let Some(index) = slot.as_ref() {
            return Ok(index.clone());
        }
        let map = synergy::load_map(&self.config.data.synergy_map_file).await?;
        let index = Arc::new(SynergyIndex::invert(&map));
        *slot = Some(index.clone());
        Ok(index)
    }

    /// Rebuild the synergy map and swap in the new index
    pub async fn build_synergy_map(&self) -> Result<BuildReport> {
        let (map, report) = builder::rebuild(&self.config.data).await?;
        *self.index.write().await = Some(Arc::new(SynergyIndex::invert(&map)));
        Ok(report)
    }

    /// Catalog lists with the user's previous selection
    #[instrument(skip(self))]
    pub async fn catalog(&self, user_id: Option<&str>) -> Result<CatalogView> {
        let catalog = AttributeCatalog::load(&self.config.data.attributes_file).await?;
        let collection = NftCollection::load(&self.config.data.nft_data_file).await;
        let index = self.index().await?;

        let state = match user_id {
            Some(user_id) => {
                let sessions = self.sessions.clone();
                let user_id = user_id.to_string();
                tokio::task::spawn_blocking(move || sessions.load(&user_id)).await?
            }
            None => Default::default(),
        };

        Ok(CatalogView {
            selection: state.apply_to_catalog(&catalog),
            synergy_levels: SYNERGY_LEVELS.to_vec(),
            stats: CatalogStats {
                total_nfts: collection.nfts.len(),
                skin_tone_count: catalog.skin_tones().len(),
                rarity_count: catalog.rarities().len(),
                synergy_count: index.synergy_count(),
            },
        })
    }

    /// Match the collection, save the results and remember the selection
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn execute_search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let threshold = Threshold::try_from(request.synergy_level)?;
        let timer = PerformanceTimer::new("execute_search");

        let collection = NftCollection::load(&self.config.data.nft_data_file).await;
        let rarity = AttributeCatalog::load(&self.config.data.attributes_file)
            .await?
            .into_rarity_table();
        let index = self.index().await?;

        let criteria = MatchCriteria::new(threshold)
            .with_skin_tones(request.skin_tones.iter().cloned())
            .with_rarities(request.rarities.iter().cloned());

        let total_nfts = collection.nfts.len();
        let synergy_count = index.synergy_count();
        let nfts = collection.nfts;
        let outcome = tokio::task::spawn_blocking(move || {
            MatchEngine::new(&index, &rarity).score(&nfts, &criteria)
        })
        .await?;
        timer.log_if_slow(self.config.matching.slow_match_warn);

        let search_id = Uuid::new_v4();
        let search_params = SearchParams {
            synergy_level: threshold,
            selected_skin_tones: request.skin_tones.clone(),
            selected_rarities: request.rarities.clone(),
            search_date: Utc::now(),
            total_nfts,
            found_nfts: outcome.results.len(),
            synergy_count,
        };

        let summary = MatchSummary::from_results(&outcome.results);
        summary.log();

        let key = ResultKey::new(&request.user_id, request.username.clone(), ResultKind::All);

        if let Some(reason) = outcome.empty_reason {
            info!("No matches ({:?}), clearing the stored result set", reason);
        }
        let set = SavedResultSet::from_matches(
            &key,
            &outcome.results,
            search_id,
            &search_params,
            request.filter_options,
            outcome.results.len(),
            None,
        );
        let saved = self.put(key.clone(), set).await?;

        let on_sale = if request.filter_options.on_sale_only && !outcome.results.is_empty() {
            Some(
                self.save_on_sale(&key, &outcome.results, search_id, &search_params, request.filter_options)
                    .await?,
            )
        } else {
            None
        };

        self.remember_search(&request.user_id, &search_params, request.filter_options)
            .await;

        let total_results = outcome.results.len();
        let mut results = outcome.results;
        results.truncate(self.config.api.result_limit);

        Ok(SearchResponse {
            search_id,
            results,
            total_results,
            search_params,
            summary,
            diagnostics: outcome.diagnostics,
            empty_reason: outcome.empty_reason,
            saved,
            on_sale,
        })
    }

    async fn save_on_sale(
        &self,
        key: &ResultKey,
        results: &[MatchResult],
        search_id: Uuid,
        search_params: &SearchParams,
        filter_options: FilterOptions,
    ) -> Result<OnSaleSearch> {
        let report = marketplace::filter_on_sale(
            &self.checker,
            results,
            &self.config.marketplace.pacing,
        )
        .await;

        let saved = if report.on_sale.is_empty() {
            None
        } else {
            let on_sale_key = key.with_kind(ResultKind::OnSale);
            let set = SavedResultSet::from_matches(
                &on_sale_key,
                &report.on_sale,
                search_id,
                search_params,
                filter_options,
                results.len(),
                Some(report.stats.clone()),
            );
            Some(self.put(on_sale_key, set).await?)
        };

        Ok(OnSaleSearch {
            count: report.on_sale.len(),
            stats: report.stats,
            saved,
        })
    }

    async fn put(&self, key: ResultKey, set: SavedResultSet) -> Result<SaveOutcome> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.put(&key, &set)).await?
    }

    /// Session bookkeeping never fails a search
    async fn remember_search(&self, user_id: &str, params: &SearchParams, filters: FilterOptions) {
        let sessions = self.sessions.clone();
        let user_id = user_id.to_string();
        let params = params.clone();

        let result = tokio::task::spawn_blocking(move || {
            sessions.update(&user_id, |state| state.record_search(&params, filters))
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to save session state: {}", e),
            Err(e) => warn!("Session state task failed: {}", e),
        }
    }

    /// Both stored result sets of a user
    #[instrument(skip(self))]
    pub async fn load_results(&self, user_id: &str, username: Option<String>) -> Result<UserResults> {
        let store = self.store.clone();
        let key = ResultKey::new(user_id, username, ResultKind::All);

        tokio::task::spawn_blocking(move || {
            Ok(UserResults {
                main: store.get(&key)?,
                on_sale: store.get(&key.with_kind(ResultKind::OnSale))?,
            })
        })
        .await?
    }

    #[instrument(skip(self))]
    pub async fn delete_results(
        &self,
        user_id: &str,
        username: Option<String>,
        target: DeleteTarget,
    ) -> Result<DeleteOutcome> {
        let store = self.store.clone();
        let key = ResultKey::new(user_id, username, ResultKind::All);

        tokio::task::spawn_blocking(move || {
            let mut outcome = DeleteOutcome::default();
            for kind in target.kinds() {
                let deleted = store.delete(&key.with_kind(*kind))?;
                match kind {
                    ResultKind::All => outcome.main = Some(deleted),
                    ResultKind::OnSale => outcome.on_sale = Some(deleted),
                }
            }
            Ok(outcome)
        })
        .await?
    }

    pub async fn collection_stats(&self) -> Result<StatsReport> {
        let collection = NftCollection::load(&self.config.data.nft_data_file).await;
        let catalog = AttributeCatalog::load(&self.config.data.attributes_file).await?;
        let map = synergy::load_map(&self.config.data.synergy_map_file).await?;

        Ok(StatsReport {
            collection: collection.stats(),
            rejected_records: collection.rejected,
            skin_tones: catalog.skin_tones().len(),
            rarities: catalog.rarities().len(),
            synergies: SynergyMapStats::compute(&map),
        })
    }

    /// One NFT by index or address, with rarity per attribute
    #[instrument(skip(self))]
    pub async fn nft_details(&self, key: &str) -> Result<NftDetails> {
        let collection = NftCollection::load(&self.config.data.nft_data_file).await;
        let nft = collection
            .find(&NftLookup::parse(key))
            .cloned()
            .ok_or_else(|| Error::not_found("nft", key))?;

        let catalog = AttributeCatalog::load(&self.config.data.attributes_file).await?;
        Ok(NftDetails::new(nft, catalog.rarity_table()))
    }

    pub async fn synergy_stats(&self) -> Result<SynergyMapStats> {
        let map = synergy::load_map(&self.config.data.synergy_map_file).await?;
        Ok(SynergyMapStats::compute(&map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, DataConfig, MarketplaceConfig, MatchConfig, Pacing};
    use crate::marketplace::SaleStatus;
    use crate::nft::SalePrice;
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;

    struct ListedOnly(&'static [&'static str]);

    impl MarketplaceChecker for ListedOnly {
        async fn check(&self, address: &str) -> Result<SaleStatus> {
            let listed = self.0.iter().any(|a| *a == address);
            Ok(SaleStatus {
                is_on_sale: listed,
                price: listed.then(|| SalePrice {
                    value: "1000000000".to_string(),
                    decimals: 9,
                }),
            })
        }
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            data: DataConfig::in_dir(dir),
            api: ApiConfig {
                port: 3000,
                host: "127.0.0.1".to_string(),
                request_timeout: Duration::from_secs(30),
                cors_enabled: false,
                result_limit: 100,
            },
            marketplace: MarketplaceConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                api_key: None,
                request_timeout: Duration::from_secs(1),
                pacing: Pacing::immediate(),
            },
            matching: MatchConfig {
                slow_match_warn: Duration::from_secs(1),
            },
        }
    }

    fn write_fixtures(dir: &Path) {
        std::fs::write(
            dir.join("attributes_power_data.json"),
            json!({
                "attributes_power": { "attributes": {
                    "Skin Tone": { "Martian": "Common", "Zombie": "Epic" },
                    "Clothing": { "Gold Cape": "Epic", "Silver Ring": "Common" },
                    "Headwear": { "Golden Crown": "Epic" }
                }}
            })
            .to_string(),
        )
        .unwrap();

        std::fs::write(
            dir.join("all_nft_info.json"),
            json!({
                "nfts": [
                    { "index": 0, "address": "0:aaa", "attributes": [
                        { "trait_type": "Skin Tone", "value": "Martian" },
                        { "trait_type": "Clothing", "value": "Gold Cape" },
                        { "trait_type": "Headwear", "value": "Golden Crown" }
                    ]},
                    { "index": 1, "address": "0:bbb", "attributes": [
                        { "trait_type": "Skin Tone", "value": "Zombie" },
                        { "trait_type": "Clothing", "value": "Silver Ring" }
                    ]},
                    { "index": 2, "address": "0:ccc", "attributes": [
                        { "trait_type": "Skin Tone", "value": "Zombie" },
                        { "trait_type": "Clothing", "value": "Gold Cape" },
                        { "trait_type": "Headwear", "value": "Golden Crown" }
                    ]}
                ]
            })
            .to_string(),
        )
        .unwrap();
    }

    fn service(dir: &Path, listed: &'static [&'static str]) -> SynergyService<ListedOnly> {
        let config = test_config(dir);
        let store = Arc::new(FileResultStore::new(&config.data.user_files_dir));
        SynergyService::with_parts(config, store, ListedOnly(listed))
    }

    fn request(level: u8) -> SearchRequest {
        SearchRequest {
            user_id: "42".to_string(),
            username: Some("orc".to_string()),
            synergy_level: level,
            skin_tones: Vec::new(),
            rarities: Vec::new(),
            filter_options: FilterOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_search_before_rebuild_reports_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let service = service(dir.path(), &[]);

        let response = service.execute_search(request(2)).await.unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.empty_reason, Some(EmptyReason::EmptySynergyMap));
        assert_eq!(response.saved.nfts_count, 0);
    }

    #[tokio::test]
    async fn test_rebuild_then_search_saves_results() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let service = service(dir.path(), &[]);

        let report = service.build_synergy_map().await.unwrap();
        assert!(report.synergy_count >= 1);
        assert!(dir.path().join("synergy_state.json").exists());
        assert!(dir.path().join("synergy_state.txt").exists());

        let response = service.execute_search(request(2)).await.unwrap();
        assert_eq!(response.total_results, 2);
        assert_eq!(response.results[0].matching_synergies[0].synergy_name, "Gold");
        assert_eq!(response.saved.file_name, "Orc_filtered_orc_42.json");

        let stored = service.load_results("42", Some("orc".to_string())).await.unwrap();
        assert_eq!(stored.main.unwrap().nfts.len(), 2);
        assert!(stored.on_sale.is_none());

        // Selection is remembered for the next catalog view
        let catalog = service.catalog(Some("42")).await.unwrap();
        assert_eq!(catalog.selection.synergy_level, Threshold::Two);
        assert_eq!(catalog.stats.total_nfts, 3);
    }

    #[tokio::test]
    async fn test_empty_search_replaces_previous_results() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let service = service(dir.path(), &[]);
        service.build_synergy_map().await.unwrap();

        let first = service.execute_search(request(2)).await.unwrap();
        assert_eq!(first.saved.nfts_count, 2);

        let mut narrow = request(3);
        narrow.skin_tones = vec!["Martian".to_string()];
        let second = service.execute_search(narrow).await.unwrap();
        assert!(second.results.is_empty());
        assert_eq!(second.empty_reason, Some(EmptyReason::NothingMatched));
        assert_eq!(second.saved.nfts_count, 0);

        let stored = service.load_results("42", Some("orc".to_string())).await.unwrap();
        let main = stored.main.unwrap();
        assert!(main.nfts.is_empty());
        assert_eq!(main.metadata.search_params.synergy_level, Threshold::Three);
        assert_eq!(main.metadata.search_params.selected_skin_tones, vec!["Martian"]);
    }

    #[tokio::test]
    async fn test_invalid_level_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let service = service(dir.path(), &[]);

        let err = service.execute_search(request(4)).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_on_sale_only_saves_second_set() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let service = service(dir.path(), &["0:ccc"]);
        service.build_synergy_map().await.unwrap();

        let mut req = request(2);
        req.filter_options = FilterOptions {
            all_nfts: false,
            on_sale_only: true,
        };
        let response = service.execute_search(req).await.unwrap();

        let on_sale = response.on_sale.unwrap();
        assert_eq!(on_sale.count, 1);
        assert_eq!(on_sale.stats.total_checked, 2);

        let stored = service.load_results("42", Some("orc".to_string())).await.unwrap();
        let listed = stored.on_sale.unwrap();
        assert_eq!(listed.nfts[0].nft.address, "0:ccc");
        assert_eq!(listed.nfts[0].nft.on_sale, Some(true));
        assert_eq!(listed.metadata.original_results_count, 2);
        assert!(listed.metadata.on_sale_stats.is_some());

        let deleted = service
            .delete_results("42", Some("orc".to_string()), DeleteTarget::Both)
            .await
            .unwrap();
        assert_eq!(
            deleted,
            DeleteOutcome {
                main: Some(true),
                on_sale: Some(true)
            }
        );
        let again = service
            .delete_results("42", Some("orc".to_string()), DeleteTarget::OnSale)
            .await
            .unwrap();
        assert!(!again.any_deleted());
    }

    #[tokio::test]
    async fn test_nft_details_and_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let service = service(dir.path(), &[]);

        let details = service.nft_details("2").await.unwrap();
        assert_eq!(details.nft.address, "0:ccc");
        assert_eq!(details.attributes[1].rarity.as_deref(), Some("Epic"));

        assert!(matches!(
            service.nft_details("0:zzz").await,
            Err(Error::NotFound { .. })
        ));

        std::fs::remove_file(dir.path().join("attributes_power_data.json")).unwrap();
        assert!(matches!(
            service.build_synergy_map().await,
            Err(Error::MissingSourceData { .. })
        ));
    }

    #[test]
    fn test_delete_target_parse() {
        assert_eq!(DeleteTarget::parse("all").unwrap(), DeleteTarget::Both);
        assert_eq!(DeleteTarget::parse("onsale").unwrap(), DeleteTarget::OnSale);
        assert_eq!(DeleteTarget::parse("main").unwrap(), DeleteTarget::Main);
        assert!(DeleteTarget::parse("everything").is_err());
    }
}
