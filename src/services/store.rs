//! Exploration store - the single owner of cell and tracker state
//!
//! All state sits behind one `RwLock`. Every operation takes the lock once,
//! so callers never observe a half-applied update. Writes are serialized
//! globally; report volume is human-speed so this is not a bottleneck.
//!
//! With a journal attached, each mutation is appended to the journal while
//! the write lock is held and before memory changes. A failed append leaves
//! the store exactly as it was.

use crate::domain::error::{ExplorationError, Result};
use crate::domain::types::{score_sum, Cell, DevEui, TrackerRecord};
use crate::io::journal::{ExplorationJournal, JournalEntry};
use h3o::{CellIndex, Resolution};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

/// Outcome of `upsert_tracker_if_absent`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted {
    Created(TrackerRecord),
    Existing(TrackerRecord),
}

impl Upserted {
    pub fn is_created(&self) -> bool {
        matches!(self, Upserted::Created(_))
    }

    pub fn into_record(self) -> TrackerRecord {
        match self {
            Upserted::Created(r) | Upserted::Existing(r) => r,
        }
    }
}

/// Point-in-time copy of the whole store
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Visited cells in discovery order
    pub cells: Vec<Cell>,
    /// Trackers in first-sighting order
    pub trackers: Vec<TrackerRecord>,
}

#[derive(Default)]
struct StoreState {
    cells: FxHashMap<CellIndex, Cell>,
    cell_order: Vec<CellIndex>,
    trackers: Vec<TrackerRecord>,
    tracker_index: FxHashMap<DevEui, usize>,
}

impl StoreState {
    fn has_tracker(&self, dev_eui: &DevEui) -> bool {
        self.tracker_index.contains_key(dev_eui)
    }

    fn tracker(&self, dev_eui: &DevEui) -> Option<&TrackerRecord> {
        self.tracker_index.get(dev_eui).map(|&i| &self.trackers[i])
    }

    fn insert_tracker(&mut self, record: TrackerRecord) {
        self.tracker_index.insert(record.dev_eui.clone(), self.trackers.len());
        self.trackers.push(record);
    }

    fn insert_cell(&mut self, cell: Cell) {
        self.cell_order.push(cell.id);
        self.cells.insert(cell.id, cell);
    }

    fn credit(&mut self, dev_eui: &DevEui, delta: u64) -> bool {
        match self.tracker_index.get(dev_eui) {
            Some(&i) => {
                let tracker = &mut self.trackers[i];
                tracker.score = tracker.score.saturating_add(delta);
                true
            }
            None => false,
        }
    }

    /// Apply a replayed journal entry
    fn apply(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Tracker { dev_eui, name } => {
                if !self.has_tracker(&dev_eui) {
                    self.insert_tracker(TrackerRecord::new(dev_eui, name));
                }
            }
            JournalEntry::Claim { cell, score, ts } => {
                if !self.cells.contains_key(&cell) {
                    self.insert_cell(Cell { id: cell, score, last_updated: ts });
                }
            }
            JournalEntry::Credit { dev_eui, delta } => {
                self.credit(&dev_eui, delta);
            }
            JournalEntry::Discovery { cell, score, ts, dev_eui } => {
                if !self.cells.contains_key(&cell) && self.has_tracker(&dev_eui) {
                    self.insert_cell(Cell { id: cell, score, last_updated: ts });
                    self.credit(&dev_eui, score);
                }
            }
        }
    }
}

/// Authoritative cell and tracker state
pub struct ExplorationStore {
    state: RwLock<StoreState>,
    journal: Option<Box<dyn ExplorationJournal>>,
}

impl Default for ExplorationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplorationStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self { state: RwLock::new(StoreState::default()), journal: None }
    }

    /// Open a journal-backed store, rebuilding state from the journal.
    ///
    /// Cell ids only mean something at the resolution they were computed at,
    /// so a journal written at another resolution is refused.
    pub fn open(journal: Box<dyn ExplorationJournal>, resolution: Resolution) -> Result<Self> {
        let mut state = StoreState::default();
        for entry in journal.replay()? {
            if let Some(cell) = entry.cell() {
                if cell.resolution() != resolution {
                    return Err(ExplorationError::ResolutionMismatch {
                        cell,
                        found: u8::from(cell.resolution()),
                        expected: u8::from(resolution),
                    });
                }
            }
            state.apply(entry);
        }

        info!(cells = %state.cells.len(), trackers = %state.trackers.len(), "store_restored");

        Ok(Self { state: RwLock::new(state), journal: Some(journal) })
    }

    fn record(&self, entry: &JournalEntry) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.append(entry).inspect_err(|e| {
                warn!(error = %e, "journal_append_failed");
            })?;
        }
        Ok(())
    }

    pub fn get_cell(&self, id: CellIndex) -> Option<Cell> {
        self.state.read().cells.get(&id).copied()
    }

    pub fn get_tracker(&self, dev_eui: &DevEui) -> Option<TrackerRecord> {
        self.state.read().tracker(dev_eui).cloned()
    }

    /// Create the tracker with score 0 unless it already exists.
    /// An existing tracker is returned unchanged, including its name.
    pub fn upsert_tracker_if_absent(&self, dev_eui: &DevEui, default_name: &str) -> Result<Upserted> {
        // Fast path for the common case: the tracker is known
        if let Some(existing) = self.get_tracker(dev_eui) {
            return Ok(Upserted::Existing(existing));
        }

        let mut state = self.state.write();
        if let Some(existing) = state.tracker(dev_eui) {
            return Ok(Upserted::Existing(existing.clone()));
        }

        self.record(&JournalEntry::Tracker {
            dev_eui: dev_eui.clone(),
            name: default_name.to_string(),
        })?;

        let record = TrackerRecord::new(dev_eui.clone(), default_name);
        state.insert_tracker(record.clone());
        Ok(Upserted::Created(record))
    }

    /// Create the cell with `score` iff it does not exist yet.
    /// Returns whether this call claimed it.
    pub fn try_claim_cell(&self, id: CellIndex, score: u64, timestamp: u64) -> Result<bool> {
        let mut state = self.state.write();
        if state.cells.contains_key(&id) {
            return Ok(false);
        }

        self.record(&JournalEntry::Claim { cell: id, score, ts: timestamp })?;
        state.insert_cell(Cell { id, score, last_updated: timestamp });
        Ok(true)
    }

    /// Increase a tracker's cumulative score. Returns false for unknown trackers.
    pub fn add_tracker_score(&self, dev_eui: &DevEui, delta: u64) -> Result<bool> {
        let mut state = self.state.write();
        if !state.has_tracker(dev_eui) {
            return Ok(false);
        }

        self.record(&JournalEntry::Credit { dev_eui: dev_eui.clone(), delta })?;
        Ok(state.credit(dev_eui, delta))
    }

    /// Claim a cell and credit its score to `dev_eui` in one critical section.
    ///
    /// Readers never see the claimed cell without the matching credit.
    /// Returns false if the cell was already claimed or the tracker is unknown.
    pub fn claim_and_credit(
        &self,
        id: CellIndex,
        score: u64,
        timestamp: u64,
        dev_eui: &DevEui,
    ) -> Result<bool> {
        let mut state = self.state.write();
        if state.cells.contains_key(&id) {
            return Ok(false);
        }
        if !state.has_tracker(dev_eui) {
            warn!(dev_eui = %dev_eui, cell = %id, "claim_for_unknown_tracker");
            return Ok(false);
        }

        self.record(&JournalEntry::Discovery {
            cell: id,
            score,
            ts: timestamp,
            dev_eui: dev_eui.clone(),
        })?;
        state.insert_cell(Cell { id, score, last_updated: timestamp });
        state.credit(dev_eui, score);
        Ok(true)
    }

    /// Visited cells in discovery order
    pub fn list_visited_cells(&self) -> Vec<Cell> {
        let state = self.state.read();
        state.cell_order.iter().filter_map(|id| state.cells.get(id).copied()).collect()
    }

    /// Trackers in first-sighting order
    pub fn list_trackers(&self) -> Vec<TrackerRecord> {
        self.state.read().trackers.clone()
    }

    /// Cells and trackers read under a single lock
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read();
        StoreSnapshot {
            cells: state.cell_order.iter().filter_map(|id| state.cells.get(id).copied()).collect(),
            trackers: state.trackers.clone(),
        }
    }

    pub fn visited_cell_count(&self) -> usize {
        self.state.read().cells.len()
    }

    pub fn tracker_count(&self) -> usize {
        self.state.read().trackers.len()
    }

    /// Sum of all cell scores, saturating at `u64::MAX`
    pub fn total_score(&self) -> u64 {
        score_sum(self.state.read().cells.values().map(|c| c.score))
    }
}
