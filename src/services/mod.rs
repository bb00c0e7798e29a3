//! Services - exploration state and the logic that drives it
//!
//! - `store` - authoritative cell and tracker state
//! - `scoring` - wavefront scoring of newly visited cells
//! - `ingest` - report intake between transport and scoring
//! - `query` - leaderboard and cell tier views

pub mod ingest;
pub mod query;
pub mod scoring;
pub mod store;

// Re-export commonly used types
pub use ingest::{create_report_channel, IngestionPipeline};
pub use query::{CellClassification, LeaderboardEntry, QueryService, Tier};
pub use scoring::{ScoreOutcome, ScoringEngine};
pub use store::ExplorationStore;
