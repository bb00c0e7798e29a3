//! Read-side views over the exploration store
//!
//! Every view is computed from a single store snapshot, fresh on each call.

use crate::domain::grid::GridIndex;
use crate::domain::types::{score_sum, Cell, DevEui, TrackerRecord};
use crate::services::store::ExplorationStore;
use h3o::CellIndex;
use serde::Serialize;
use std::sync::Arc;

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub display_name: String,
    pub dev_eui: DevEui,
    pub score: u64,
}

impl From<TrackerRecord> for LeaderboardEntry {
    fn from(t: TrackerRecord) -> Self {
        Self { display_name: t.display_name, dev_eui: t.dev_eui, score: t.score }
    }
}

/// Display tier of a visited cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Score 1: edge of the explored area
    Frontier,
    /// Above 1 and at most the mean
    Settled,
    /// Strictly above the mean
    Surge,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Frontier, Tier::Settled, Tier::Surge];

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Frontier => "frontier",
            Tier::Settled => "settled",
            Tier::Surge => "surge",
        }
    }

    /// Rendering style key (fill and stroke colour)
    pub fn style_key(&self) -> &'static str {
        match self {
            Tier::Frontier => "blue",
            Tier::Settled => "green",
            Tier::Surge => "red",
        }
    }

    /// Classify a score against the mean of all visited cells
    pub fn of(score: u64, mean: f64) -> Tier {
        if score == 1 {
            Tier::Frontier
        } else if score as f64 > mean {
            Tier::Surge
        } else {
            Tier::Settled
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedCell {
    pub cell: CellIndex,
    pub score: u64,
    /// Closed `[lng, lat]` ring
    pub boundary: Vec<[f64; 2]>,
}

/// Visited cells split into disjoint tiers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CellClassification {
    pub frontier: Vec<ClassifiedCell>,
    pub settled: Vec<ClassifiedCell>,
    pub surge: Vec<ClassifiedCell>,
    /// Mean score of the snapshot, 0 when empty
    pub mean_score: f64,
}

impl CellClassification {
    pub fn tier(&self, tier: Tier) -> &[ClassifiedCell] {
        match tier {
            Tier::Frontier => &self.frontier,
            Tier::Settled => &self.settled,
            Tier::Surge => &self.surge,
        }
    }

    pub fn len(&self) -> usize {
        self.frontier.len() + self.settled.len() + self.surge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregate counters for display headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExplorationStats {
    pub visited_cells: usize,
    pub trackers: usize,
    pub total_score: u64,
}

pub struct QueryService {
    store: Arc<ExplorationStore>,
    grid: GridIndex,
}

impl QueryService {
    pub fn new(store: Arc<ExplorationStore>, grid: GridIndex) -> Self {
        Self { store, grid }
    }

    /// Trackers by score, highest first. Equal scores keep first-sighting order.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut trackers = self.store.list_trackers();
        // sort_by is stable
        trackers.sort_by(|a, b| b.score.cmp(&a.score));
        trackers.into_iter().map(LeaderboardEntry::from).collect()
    }

    pub fn classify_cells(&self) -> CellClassification {
        classify(&self.grid, &self.store.list_visited_cells())
    }

    pub fn visited_cell_count(&self) -> usize {
        self.store.visited_cell_count()
    }

    pub fn stats(&self) -> ExplorationStats {
        let snapshot = self.store.snapshot();
        ExplorationStats {
            visited_cells: snapshot.cells.len(),
            trackers: snapshot.trackers.len(),
            total_score: score_sum(snapshot.cells.iter().map(|c| c.score)),
        }
    }
}

fn classify(grid: &GridIndex, cells: &[Cell]) -> CellClassification {
    if cells.is_empty() {
        return CellClassification::default();
    }

    // Summed in f64: saturated cells would otherwise pin the mean at the u64 limit
    let mean = cells.iter().map(|c| c.score as f64).sum::<f64>() / cells.len() as f64;

    let mut out = CellClassification { mean_score: mean, ..Default::default() };
    for cell in cells {
        let classified =
            ClassifiedCell { cell: cell.id, score: cell.score, boundary: grid.boundary(cell.id) };
        match Tier::of(cell.score, mean) {
            Tier::Frontier => out.frontier.push(classified),
            Tier::Settled => out.settled.push(classified),
            Tier::Surge => out.surge.push(classified),
        }
    }
    out
}
