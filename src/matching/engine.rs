//! Match Engine
//!
//! Scores NFTs against the synergy index. For every NFT the attributes are
//! counted per synergy root; the best root's count is the synergy score and
//! the NFT is kept when it reaches the threshold.
//!
//! Skin tone is a hard filter and never scored. The rarity filter narrows the
//! attributes that are scored, it does not exclude the NFT by itself.
//!
//! Ties are resolved by discovery order: the first root to reach the maximum
//! count wins, the first tier to reach the maximum frequency is the
//! representative rarity, and NFTs with equal scores keep their input order.

use super::metrics::PerformanceTimer;
use crate::catalog::RarityTable;
use crate::error::Error;
use crate::nft::{AttributeRecord, NftRecord};
use crate::synergy::SynergyIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Rarity shown when none of the winning attributes has a known tier
pub const UNKNOWN_RARITY: &str = "Unknown";

/// Skin tone shown for NFTs without one
pub const UNSPECIFIED_SKIN_TONE: &str = "Unspecified";

/// Minimum synergy score for inclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Threshold {
    #[default]
    Two,
    Three,
}

impl Threshold {
    pub fn min_count(self) -> usize {
        match self {
            Threshold::Two => 2,
            Threshold::Three => 3,
        }
    }

    /// Both levels are "at least": Two keeps 2, 3, 4…; Three keeps 3, 4…
    pub fn accepts(self, count: usize) -> bool {
        count >= self.min_count()
    }
}

impl TryFrom<u8> for Threshold {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            2 => Ok(Threshold::Two),
            3 => Ok(Threshold::Three),
            other => Err(Error::bad_request(format!(
                "synergy level must be 2 or 3, got {}",
                other
            ))),
        }
    }
}

impl From<Threshold> for u8 {
    fn from(threshold: Threshold) -> u8 {
        threshold.min_count() as u8
    }
}

/// Filters and threshold of one search
#[derive(Debug, Clone, Default)]
pub struct MatchCriteria {
    pub threshold: Threshold,
    /// Empty means every skin tone
    pub skin_tones: HashSet<String>,
    /// Empty means every rarity
    pub rarities: HashSet<String>,
}

impl MatchCriteria {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn with_skin_tones<I, S>(mut self, tones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skin_tones = tones.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rarities<I, S>(mut self, rarities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rarities = rarities.into_iter().map(Into::into).collect();
        self
    }
}

/// An attribute that counted toward a synergy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitAttribute {
    pub attribute: String,
    pub trait_type: String,
}

/// Count of one NFT's attributes sharing a root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynergyHit {
    pub synergy_name: String,
    pub count: usize,
    pub attributes: Vec<HitAttribute>,
}

/// A qualifying NFT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub nft: NftRecord,
    pub synergy_score: usize,
    pub skin_tone: String,
    /// The winning synergy
    pub matching_synergies: Vec<SynergyHit>,
    pub total_attributes: usize,
    pub filtered_attributes_count: usize,
    pub rarity: String,
    pub all_synergies: BTreeMap<String, SynergyHit>,
}

/// Counters for one run over a collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDiagnostics {
    pub checked: usize,
    pub skipped_without_attributes: usize,
    pub excluded_by_skin_tone: usize,
    /// NFTs left with no attributes by the rarity filter
    pub filtered_out_by_rarity: usize,
    /// NFTs with at least one attribute of a selected rarity
    pub with_rarity_attributes: usize,
    pub matched: usize,
}

/// Why a run returned nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    NoNfts,
    EmptySynergyMap,
    NothingMatched,
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Sorted by synergy score, highest first
    pub results: Vec<MatchResult>,
    pub diagnostics: MatchDiagnostics,
    pub empty_reason: Option<EmptyReason>,
}

/// Stateless scorer over a synergy index and a rarity table
pub struct MatchEngine<'a> {
    index: &'a SynergyIndex,
    rarity: &'a RarityTable,
}

impl<'a> MatchEngine<'a> {
    pub fn new(index: &'a SynergyIndex, rarity: &'a RarityTable) -> Self {
        Self { index, rarity }
    }

    /// Score every NFT and return the qualifying ones, best first
    pub fn score(&self, nfts: &[NftRecord], criteria: &MatchCriteria) -> MatchOutcome {
        let _timer = PerformanceTimer::new("match_engine.score");

        if nfts.is_empty() {
            return MatchOutcome {
                empty_reason: Some(EmptyReason::NoNfts),
                ..MatchOutcome::default()
            };
        }
        if self.index.is_empty() {
            return MatchOutcome {
                empty_reason: Some(EmptyReason::EmptySynergyMap),
                ..MatchOutcome::default()
            };
        }

        let mut diagnostics = MatchDiagnostics::default();
        let mut results = Vec::new();

        for nft in nfts {
            diagnostics.checked += 1;
            if let Some(result) = self.score_nft(nft, criteria, &mut diagnostics) {
                results.push(result);
            }
            if diagnostics.checked % 1000 == 0 {
                debug!(
                    "Checked {}/{} NFTs, {} matched",
                    diagnostics.checked,
                    nfts.len(),
                    results.len()
                );
            }
        }

        // sort_by is stable: equal scores keep collection order
        results.sort_by(|a, b| b.synergy_score.cmp(&a.synergy_score));
        diagnostics.matched = results.len();

        info!(
            "🎯 Matched {} of {} NFTs (threshold {}, {} skin tones, {} rarities)",
            diagnostics.matched,
            diagnostics.checked,
            criteria.threshold.min_count(),
            criteria.skin_tones.len(),
            criteria.rarities.len()
        );

        let empty_reason = results.is_empty().then_some(EmptyReason::NothingMatched);
        MatchOutcome {
            results,
            diagnostics,
            empty_reason,
        }
    }

    fn score_nft(
        &self,
        nft: &NftRecord,
        criteria: &MatchCriteria,
        diagnostics: &mut MatchDiagnostics,
    ) -> Option<MatchResult> {
        let Some(attributes) = nft.attributes.as_deref() else {
            diagnostics.skipped_without_attributes += 1;
            return None;
        };

        let skin_tone = attributes.iter().find(|a| a.is_skin_tone());
        if !criteria.skin_tones.is_empty() {
            let allowed = skin_tone.map_or(false, |tone| criteria.skin_tones.contains(&tone.value));
            if !allowed {
                diagnostics.excluded_by_skin_tone += 1;
                return None;
            }
        }

        let mut working: Vec<&AttributeRecord> =
            attributes.iter().filter(|a| !a.is_skin_tone()).collect();

        if !criteria.rarities.is_empty() {
            let before = working.len();
            working.retain(|a| {
                self.rarity
                    .get(&a.value)
                    .map_or(false, |tier| criteria.rarities.contains(tier))
            });
            if working.is_empty() {
                if before > 0 {
                    diagnostics.filtered_out_by_rarity += 1;
                }
            } else {
                diagnostics.with_rarity_attributes += 1;
            }
        }

        if working.is_empty() {
            return None;
        }

        // Per-root counters in discovery order
        let mut hits: Vec<SynergyHit> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for attribute in &working {
            for root in self.index.roots_for(&attribute.value) {
                let position = *positions.entry(root.as_str()).or_insert_with(|| {
                    hits.push(SynergyHit {
                        synergy_name: root.clone(),
                        count: 0,
                        attributes: Vec::new(),
                    });
                    hits.len() - 1
                });
                let hit = &mut hits[position];
                hit.count += 1;
                hit.attributes.push(HitAttribute {
                    attribute: attribute.value.clone(),
                    trait_type: attribute.trait_type.clone(),
                });
            }
        }

        let mut best: Option<&SynergyHit> = None;
        for hit in &hits {
            if best.map_or(true, |b| hit.count > b.count) {
                best = Some(hit);
            }
        }
        let best = best?;
        if !criteria.threshold.accepts(best.count) {
            return None;
        }

        Some(MatchResult {
            nft: nft.clone(),
            synergy_score: best.count,
            skin_tone: skin_tone
                .map(|tone| tone.value.clone())
                .unwrap_or_else(|| UNSPECIFIED_SKIN_TONE.to_string()),
            matching_synergies: vec![best.clone()],
            total_attributes: attributes.len(),
            filtered_attributes_count: working.len(),
            rarity: self.representative_rarity(best),
            all_synergies: hits
                .iter()
                .map(|hit| (hit.synergy_name.clone(), hit.clone()))
                .collect(),
        })
    }

    /// Most frequent tier among the hit's attributes
    fn representative_rarity(&self, hit: &SynergyHit) -> String {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut best: Option<(&str, usize)> = None;

        for attribute in &hit.attributes {
            let Some(tier) = self.rarity.get(&attribute.attribute) else {
                continue;
            };
            let count = counts.entry(tier).or_insert(0);
            *count += 1;
            if best.map_or(true, |(_, top)| *count > top) {
                best = Some((tier, *count));
            }
        }

        best.map(|(tier, _)| tier.to_string())
            .unwrap_or_else(|| UNKNOWN_RARITY.to_string())
    }
}
