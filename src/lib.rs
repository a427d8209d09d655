//! Synergy Engine library crate
//!
//! Finds NFTs whose attributes share word-roots ("synergies").
//!
//! # Architecture
//!
//! - **Catalog**: attribute rarity data, skin tones and rarity tiers
//! - **Synergy**: root extraction, the synergy map and its inverted index
//! - **Matching**: scoring NFTs against the index under filters
//! - **Store / Session**: saved result sets and per-user selections
//! - **Marketplace**: on-sale checks against TonAPI
//! - **Service / API**: orchestration and the REST surface for the web UI

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod marketplace;
pub mod matching;
pub mod nft;
pub mod persist;
pub mod service;
pub mod session;
pub mod store;
pub mod synergy;

// Re-export commonly used types
pub use catalog::AttributeCatalog;
pub use config::Config;
pub use error::{Error, Result};
pub use matching::{MatchCriteria, MatchEngine, MatchResult, Threshold};
pub use service::SynergyService;
pub use synergy::{SynergyIndex, SynergyMap};
