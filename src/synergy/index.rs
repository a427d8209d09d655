//! Attribute name → synergy roots lookup

use super::SynergyMap;
use std::collections::HashMap;

/// Inverted synergy map, rebuilt whenever the map changes
#[derive(Debug, Clone, Default)]
pub struct SynergyIndex {
    by_attribute: HashMap<String, Vec<String>>,
    synergy_count: usize,
}

impl SynergyIndex {
    /// Roots are listed per attribute in map order (lexicographic by root)
    pub fn invert(map: &SynergyMap) -> Self {
        let mut by_attribute: HashMap<String, Vec<String>> = HashMap::new();
        for (root, names) in map {
            for name in names {
                by_attribute
                    .entry(name.clone())
                    .or_default()
                    .push(root.clone());
            }
        }

        Self {
            by_attribute,
            synergy_count: map.len(),
        }
    }

    pub fn roots_for(&self, attribute: &str) -> &[String] {
        self.by_attribute
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// No synergies at all; every match against it is empty
    pub fn is_empty(&self) -> bool {
        self.synergy_count == 0
    }

    pub fn synergy_count(&self) -> usize {
        self.synergy_count
    }

    pub fn attribute_count(&self) -> usize {
        self.by_attribute.len()
    }
}
