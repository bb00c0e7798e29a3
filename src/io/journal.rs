//! Exploration journal - append-only JSONL record of store mutations
//!
//! Every mutating store operation appends one entry before touching memory.
//! Replaying the file on startup rebuilds the store.

use crate::domain::types::DevEui;
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One store mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum JournalEntry {
    Tracker { dev_eui: DevEui, name: String },
    Claim { cell: CellIndex, score: u64, ts: u64 },
    Credit { dev_eui: DevEui, delta: u64 },
    /// Claim and credit committed together
    Discovery { cell: CellIndex, score: u64, ts: u64, dev_eui: DevEui },
}

impl JournalEntry {
    /// Cell claimed by this entry, if any
    pub fn cell(&self) -> Option<CellIndex> {
        match self {
            JournalEntry::Claim { cell, .. } | JournalEntry::Discovery { cell, .. } => Some(*cell),
            JournalEntry::Tracker { .. } | JournalEntry::Credit { .. } => None,
        }
    }
}

/// Durable backing for the exploration store
pub trait ExplorationJournal: Send + Sync {
    /// Persist one entry. An error means the entry was not recorded.
    fn append(&self, entry: &JournalEntry) -> io::Result<()>;

    /// All previously recorded entries, oldest first
    fn replay(&self) -> io::Result<Vec<JournalEntry>>;
}

/// JSONL file journal
pub struct FileJournal {
    path: PathBuf,
}

impl FileJournal {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        info!(file_path = %path.display(), "journal_initialized");
        Self { path }
    }
}

impl ExplorationJournal for FileJournal {
    fn append(&self, entry: &JournalEntry) -> io::Result<()> {
        let line = serde_json::to_string(entry)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        // Single write so a failed append never leaves half a line behind a good one
        file.write_all(format!("{line}\n").as_bytes())?;
        debug!(file = %self.path.display(), bytes = %line.len(), "journal_written");

        Ok(())
    }

    fn replay(&self) -> io::Result<Vec<JournalEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(line = %(line_no + 1), error = %e, "journal_line_skipped");
                }
            }
        }

        info!(file = %self.path.display(), entries = %entries.len(), "journal_replayed");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h3o::{LatLng, Resolution};
    use tempfile::tempdir;

    fn cell() -> CellIndex {
        LatLng::new(47.5442, 7.5886).unwrap().to_cell(Resolution::Eight)
    }

    #[test]
    fn test_replay_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let journal = FileJournal::new(dir.path().join("none.jsonl"));
        assert!(journal.replay().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_replay_in_order() {
        let dir = tempdir().unwrap();
        let journal = FileJournal::new(dir.path().join("exploration.jsonl"));

        let entries = vec![
            JournalEntry::Tracker { dev_eui: DevEui::new("a1"), name: "Noname".to_string() },
            JournalEntry::Discovery { cell: cell(), score: 1, ts: 1000, dev_eui: DevEui::new("a1") },
        ];
        for entry in &entries {
            journal.append(entry).unwrap();
        }

        assert_eq!(journal.replay().unwrap(), entries);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("exploration.jsonl");
        let journal = FileJournal::new(&path);

        journal
            .append(&JournalEntry::Credit { dev_eui: DevEui::new("a1"), delta: 3 })
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_replay_skips_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exploration.jsonl");
        fs::write(
            &path,
            "{\"t\":\"credit\",\"dev_eui\":\"a1\",\"delta\":2}\nnot json\n\n{\"t\":\"bogus\"}\n",
        )
        .unwrap();

        let entries = FileJournal::new(&path).replay().unwrap();
        assert_eq!(entries, vec![JournalEntry::Credit { dev_eui: DevEui::new("a1"), delta: 2 }]);
    }

    #[test]
    fn test_append_to_unwritable_path_fails() {
        let dir = tempdir().unwrap();
        // A directory where the file should be
        let journal = FileJournal::new(dir.path());
        let result = journal.append(&JournalEntry::Credit { dev_eui: DevEui::new("a1"), delta: 1 });
        assert!(result.is_err());
    }
}
