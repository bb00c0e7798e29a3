//! Wavefront scoring
//!
//! A cell is scored once, on its first visit by any tracker. A freshly
//! discovered cell scores `1 + sum(scores of visited neighbours)`, and the
//! discovering tracker is credited with the full amount. Later visits to a
//! scored cell change nothing.

use crate::domain::error::Result;
use crate::domain::grid::GridIndex;
use crate::domain::types::{score_sum, DevEui};
use crate::services::store::ExplorationStore;
use h3o::CellIndex;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one discovery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
    /// This report discovered the cell
    Discovered { cell: CellIndex, score: u64 },
    /// The cell had been visited before
    AlreadyVisited { cell: CellIndex },
    /// Another report claimed the cell between our check and our claim
    ClaimLost { cell: CellIndex },
    /// The report carried no usable position
    NoFix,
}

pub struct ScoringEngine {
    grid: GridIndex,
    store: Arc<ExplorationStore>,
}

impl ScoringEngine {
    pub fn new(grid: GridIndex, store: Arc<ExplorationStore>) -> Self {
        Self { grid, store }
    }

    pub fn grid(&self) -> &GridIndex {
        &self.grid
    }

    pub fn store(&self) -> &Arc<ExplorationStore> {
        &self.store
    }

    /// Run one discovery event for `dev_eui` at `fix` (lat, lon).
    ///
    /// The tracker is registered before the position is looked at, so a
    /// first report without a fix still creates it.
    pub fn process(
        &self,
        dev_eui: &DevEui,
        display_name: &str,
        fix: Option<(f64, f64)>,
        timestamp: u64,
    ) -> Result<ScoreOutcome> {
        let upserted = self.store.upsert_tracker_if_absent(dev_eui, display_name)?;
        if upserted.is_created() {
            info!(dev_eui = %dev_eui, name = %display_name, "tracker_registered");
        }

        let Some((latitude, longitude)) = fix else {
            return Ok(ScoreOutcome::NoFix);
        };

        let cell = self.grid.cell_of(latitude, longitude)?;

        if self.store.get_cell(cell).is_some() {
            debug!(dev_eui = %dev_eui, cell = %cell, "cell_already_visited");
            return Ok(ScoreOutcome::AlreadyVisited { cell });
        }

        let score = self.neighbor_sum(cell).saturating_add(1);

        if self.store.claim_and_credit(cell, score, timestamp, dev_eui)? {
            info!(dev_eui = %dev_eui, cell = %cell, score = %score, "cell_discovered");
            Ok(ScoreOutcome::Discovered { cell, score })
        } else {
            debug!(dev_eui = %dev_eui, cell = %cell, "claim_lost");
            Ok(ScoreOutcome::ClaimLost { cell })
        }
    }

    /// Sum of the scores of the visited cells adjacent to `cell`, saturating
    pub fn neighbor_sum(&self, cell: CellIndex) -> u64 {
        score_sum(
            self.grid.ring(cell).into_iter().filter_map(|n| self.store.get_cell(n)).map(|c| c.score),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h3o::Resolution;

    const BASEL: (f64, f64) = (47.5442, 7.5886);
    const ZURICH: (f64, f64) = (47.3769, 8.5417);

    fn engine() -> ScoringEngine {
        ScoringEngine::new(GridIndex::new(Resolution::Eight), Arc::new(ExplorationStore::new()))
    }

    fn eui(s: &str) -> DevEui {
        DevEui::new(s)
    }

    fn assert_sums_balance(engine: &ScoringEngine) {
        let tracker_sum = score_sum(engine.store().list_trackers().iter().map(|t| t.score));
        assert_eq!(tracker_sum, engine.store().total_score());
    }

    #[test]
    fn test_isolated_cell_scores_one() {
        let engine = engine();
        let outcome = engine.process(&eui("a1"), "Noname", Some(BASEL), 1).unwrap();

        assert!(matches!(outcome, ScoreOutcome::Discovered { score: 1, .. }));
        assert_eq!(engine.store().get_tracker(&eui("a1")).unwrap().score, 1);
    }

    #[test]
    fn test_neighbor_inheritance() {
        let engine = engine();
        let target = engine.grid().cell_of(BASEL.0, BASEL.1).unwrap();
        let ring = engine.grid().ring(target);
        engine.store().try_claim_cell(ring[0], 3, 0).unwrap();
        engine.store().try_claim_cell(ring[1], 5, 0).unwrap();

        let outcome = engine.process(&eui("a1"), "Noname", Some(BASEL), 1).unwrap();

        assert_eq!(outcome, ScoreOutcome::Discovered { cell: target, score: 9 });
        assert_eq!(engine.store().get_tracker(&eui("a1")).unwrap().score, 9);
    }

    #[test]
    fn test_score_saturates_at_u64_max() {
        let engine = engine();
        let target = engine.grid().cell_of(BASEL.0, BASEL.1).unwrap();
        let ring = engine.grid().ring(target);
        engine.store().try_claim_cell(ring[0], u64::MAX - 1, 0).unwrap();
        engine.store().try_claim_cell(ring[1], 5, 0).unwrap();

        let outcome = engine.process(&eui("a1"), "Noname", Some(BASEL), 1).unwrap();
        assert_eq!(outcome, ScoreOutcome::Discovered { cell: target, score: u64::MAX });

        // A second saturated discovery keeps the tracker pinned at the limit
        let next = engine.grid().center(ring[2]);
        engine.process(&eui("a1"), "Noname", Some(next), 2).unwrap();
        assert_eq!(engine.store().get_tracker(&eui("a1")).unwrap().score, u64::MAX);
        assert_eq!(engine.store().total_score(), u64::MAX);
    }

    #[test]
    fn test_non_adjacent_cells_do_not_contribute() {
        let engine = engine();
        engine.process(&eui("a1"), "Noname", Some(ZURICH), 1).unwrap();
        let outcome = engine.process(&eui("a1"), "Noname", Some(BASEL), 2).unwrap();
        assert!(matches!(outcome, ScoreOutcome::Discovered { score: 1, .. }));
    }

    #[test]
    fn test_revisit_is_noop() {
        let engine = engine();
        engine.process(&eui("a1"), "Noname", Some(BASEL), 1).unwrap();
        let outcome = engine.process(&eui("b2"), "Noname", Some(BASEL), 2).unwrap();

        assert!(matches!(outcome, ScoreOutcome::AlreadyVisited { .. }));
        assert_eq!(engine.store().get_tracker(&eui("a1")).unwrap().score, 1);
        assert_eq!(engine.store().get_tracker(&eui("b2")).unwrap().score, 0);
        let cell = engine.grid().cell_of(BASEL.0, BASEL.1).unwrap();
        assert_eq!(engine.store().get_cell(cell).unwrap().last_updated, 1);
    }

    #[test]
    fn test_wavefront_along_a_path() {
        let engine = engine();
        let start = engine.grid().cell_of(BASEL.0, BASEL.1).unwrap();
        let next = engine.grid().ring(start)[0];
        let (lat, lng) = engine.grid().center(next);

        engine.process(&eui("a1"), "Noname", Some(BASEL), 1).unwrap();
        let outcome = engine.process(&eui("a1"), "Noname", Some((lat, lng)), 2).unwrap();

        assert_eq!(outcome, ScoreOutcome::Discovered { cell: next, score: 2 });
        assert_eq!(engine.store().get_tracker(&eui("a1")).unwrap().score, 3);
        assert_sums_balance(&engine);
    }

    #[test]
    fn test_no_fix_still_registers_tracker() {
        let engine = engine();
        let outcome = engine.process(&eui("a1"), "Rover", None, 1).unwrap();

        assert_eq!(outcome, ScoreOutcome::NoFix);
        assert_eq!(engine.store().get_tracker(&eui("a1")).unwrap().display_name, "Rover");
        assert_eq!(engine.store().visited_cell_count(), 0);
    }

    #[test]
    fn test_invalid_coordinate_is_error() {
        let engine = engine();
        let result = engine.process(&eui("a1"), "Noname", Some((123.0, 7.0)), 1);
        assert!(result.is_err());
        assert_eq!(engine.store().visited_cell_count(), 0);
    }

    #[test]
    fn test_concurrent_discovery_of_same_cell() {
        let engine = engine();
        let trackers: Vec<DevEui> = (0..8).map(|i| eui(&format!("t{i}"))).collect();

        let outcomes: Vec<(DevEui, ScoreOutcome)> = std::thread::scope(|s| {
            let handles: Vec<_> = trackers
                .iter()
                .map(|t| {
                    let engine = &engine;
                    s.spawn(move || (t.clone(), engine.process(t, "Noname", Some(BASEL), 1).unwrap()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<&DevEui> = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ScoreOutcome::Discovered { .. }))
            .map(|(t, _)| t)
            .collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(engine.store().get_tracker(winners[0]).unwrap().score, 1);
        for (t, o) in &outcomes {
            if t != winners[0] {
                assert!(matches!(
                    o,
                    ScoreOutcome::AlreadyVisited { .. } | ScoreOutcome::ClaimLost { .. }
                ));
                assert_eq!(engine.store().get_tracker(t).unwrap().score, 0);
            }
        }
        assert_sums_balance(&engine);
    }
}
