//! Synergy map construction
//!
//! Roots are found with a prefix heuristic, not a stemmer: a capitalized token
//! that extends an already accepted shorter token by at most
//! [`MAX_SUFFIX_LEN`] characters is treated as a form of that token
//! ("Golden" → "Gold"). This has false positives ("Scarlet" would fold into
//! "Scar") and they are corrected through the curated exceptions file.
//!
//! All three steps are pure; I/O lives in [`rebuild`].

use super::{load_exceptions, save_map, SynergyMap};
use crate::catalog::AttributeCatalog;
use crate::config::DataConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Longest suffix that still makes a token a form of a shorter root
pub const MAX_SUFFIX_LEN: usize = 3;

/// Tokens shorter than this never join a synergy
const MIN_TOKEN_LEN: usize = 2;

/// Curated corrections applied after the map is built
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynergyExceptions {
    #[serde(default)]
    pub add: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub remove: BTreeMap<String, Vec<String>>,
}

impl SynergyExceptions {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// What a rebuild produced
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub candidate_words: usize,
    pub base_roots: usize,
    pub synergy_count: usize,
    pub exceptions_added: usize,
    pub exceptions_removed: usize,
    pub json_file: PathBuf,
    pub text_file: PathBuf,
    /// First lines of the text export
    pub sample: Vec<String>,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn starts_uppercase(token: &str) -> bool {
    token.chars().next().map_or(false, |c| c.is_ascii_uppercase())
}

/// Distinct capitalized tokens, the candidates for roots
pub fn candidate_words<'a, I>(attribute_names: I) -> BTreeSet<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    attribute_names
        .into_iter()
        .flat_map(str::split_whitespace)
        .filter(|token| starts_uppercase(token))
        .collect()
}

/// Capitalized word-roots found across `attribute_names`, sorted
pub fn extract_roots<'a, I>(attribute_names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let unique = candidate_words(attribute_names);

    // Shortest first so every candidate is compared against shorter roots
    let mut candidates: Vec<&str> = unique.into_iter().collect();
    candidates.sort_by_key(|token| char_len(token));

    let mut accepted: Vec<&str> = Vec::new();
    for candidate in candidates {
        let derived = accepted.iter().any(|root| {
            candidate != *root
                && candidate.starts_with(root)
                && char_len(candidate) - char_len(root) <= MAX_SUFFIX_LEN
        });
        if !derived {
            accepted.push(candidate);
        }
    }

    let mut roots: Vec<String> = accepted.into_iter().map(str::to_string).collect();
    roots.sort();
    roots
}

/// Associate every attribute name with the roots its tokens start with.
///
/// Every root is present in the result, possibly with no names.
pub fn build_map<'a, I>(roots: &[String], attribute_names: I) -> SynergyMap
where
    I: IntoIterator<Item = &'a str>,
{
    let mut by_initial: HashMap<char, Vec<&str>> = HashMap::new();
    for root in roots {
        if let Some(initial) = root.chars().next() {
            by_initial.entry(initial).or_default().push(root);
        }
    }

    let mut map: SynergyMap = roots.iter().map(|r| (r.clone(), Vec::new())).collect();

    for name in attribute_names {
        for token in name.split_whitespace() {
            if char_len(token) < MIN_TOKEN_LEN {
                continue;
            }
            let Some(initial) = token.chars().next() else {
                continue;
            };
            let Some(candidates) = by_initial.get(&initial) else {
                continue;
            };

            for root in candidates {
                if !token.starts_with(root) {
                    continue;
                }
                if let Some(names) = map.get_mut(*root) {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
    }

    map
}

/// Apply curated additions then removals, drop roots with fewer than two
/// names and sort every name list.
pub fn apply_exceptions(map: &SynergyMap, exceptions: &SynergyExceptions) -> SynergyMap {
    let mut result = map.clone();

    for (root, names) in &exceptions.add {
        let entry = result.entry(root.clone()).or_default();
        for name in names {
            if !entry.contains(name) {
                entry.push(name.clone());
            }
        }
    }

    for (root, names) in &exceptions.remove {
        if let Some(entry) = result.get_mut(root) {
            entry.retain(|n| !names.contains(n));
        }
    }

    result.retain(|_, names| names.len() > 1);
    for names in result.values_mut() {
        names.sort();
    }
    result
}

/// Rebuild the synergy map from the attribute catalog and write both
/// artifacts. The catalog is required; exceptions are optional.
#[instrument(skip(data))]
pub async fn rebuild(data: &DataConfig) -> Result<(SynergyMap, BuildReport)> {
    info!("🔄 Rebuilding synergy map");

    let catalog = AttributeCatalog::load(&data.attributes_file).await?;
    let exceptions = load_exceptions(&data.exceptions_file).await;

    let names: Vec<&str> = catalog.attribute_names().collect();
    let roots = extract_roots(names.iter().copied());
    debug!("Extracted {} roots from {} attribute names", roots.len(), names.len());

    let base = build_map(&roots, names.iter().copied());
    let map = apply_exceptions(&base, &exceptions);
    let candidates = candidate_words(names.iter().copied()).len();

    let text_file = save_map(&data.synergy_map_file, &map).await?;

    let report = BuildReport {
        candidate_words: candidates,
        base_roots: roots.len(),
        synergy_count: map.len(),
        exceptions_added: exceptions.add.len(),
        exceptions_removed: exceptions.remove.len(),
        json_file: data.synergy_map_file.clone(),
        text_file,
        sample: super::text_export(&map).lines().take(10).map(str::to_string).collect(),
    };

    info!(
        "✅ Synergy map rebuilt: {} synergies from {} roots",
        report.synergy_count, report.base_roots
    );
    Ok((map, report))
}
