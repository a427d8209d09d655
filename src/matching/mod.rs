//! Matching Module
//!
//! Scores an NFT collection against the synergy index.
//!
//! ## Filters
//!
//! - **Skin tone** - hard filter: an NFT without a selected skin tone is excluded
//! - **Rarity** - restricts which attributes are scored
//! - **Threshold** - minimum synergy score, 2 or 3

pub mod engine;
pub mod metrics;

pub use engine::{
    EmptyReason, MatchCriteria, MatchDiagnostics, MatchEngine, MatchOutcome, MatchResult,
    SynergyHit, Threshold,
};
pub use metrics::{MatchSummary, PerformanceTimer};
