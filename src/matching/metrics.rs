//! Match Metrics
//!
//! Timing for match runs and the distributions shown after a search.

use super::engine::MatchResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: String,
}

impl PerformanceTimer {
    pub fn new(label: &str) -> Self {
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn log_if_slow(&self, threshold: Duration) {
        let elapsed = self.elapsed_ms();
        let threshold_ms = threshold.as_millis() as u64;
        if elapsed > threshold_ms {
            tracing::warn!(
                "⚠️ Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed,
                threshold_ms
            );
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed_ms();
        tracing::debug!("⏱️ {} completed in {}ms", self.label, elapsed);
    }
}

/// Results per score bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDistribution {
    pub level2: usize,
    pub level3: usize,
    pub level4_plus: usize,
}

/// Summary of one result set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub total_found: usize,
    pub synergy_distribution: ScoreDistribution,
    pub rarity_distribution: BTreeMap<String, usize>,
    /// Winning synergy name → number of results
    pub synergy_distribution_by_type: BTreeMap<String, usize>,
}

impl MatchSummary {
    pub fn from_results(results: &[MatchResult]) -> Self {
        let mut summary = Self {
            total_found: results.len(),
            ..Self::default()
        };

        for result in results {
            match result.synergy_score {
                0..=2 => summary.synergy_distribution.level2 += 1,
                3 => summary.synergy_distribution.level3 += 1,
                _ => summary.synergy_distribution.level4_plus += 1,
            }

            *summary
                .rarity_distribution
                .entry(result.rarity.clone())
                .or_insert(0) += 1;

            for hit in &result.matching_synergies {
                *summary
                    .synergy_distribution_by_type
                    .entry(hit.synergy_name.clone())
                    .or_insert(0) += 1;
            }
        }

        summary
    }

    /// Most common winning synergies, name order among equals
    pub fn top_synergies(&self, n: usize) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> = self
            .synergy_distribution_by_type
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(n);
        ranked
    }

    pub fn log(&self) {
        tracing::info!(
            "📊 {} results: {} at 2, {} at 3, {} at 4+",
            self.total_found,
            self.synergy_distribution.level2,
            self.synergy_distribution.level3,
            self.synergy_distribution.level4_plus
        );
        for (name, count) in self.top_synergies(5) {
            tracing::info!("   {}: {} NFTs", name, count);
        }
    }
}
