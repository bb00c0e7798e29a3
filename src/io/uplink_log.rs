//! Raw uplink log - appends every payload that parsed as an uplink to a JSONL file
//!
//! Useful for replaying field sessions and checking RF conditions.
//! Payloads that are valid JSON are re-serialized onto a single line.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct UplinkLog {
    file_path: String,
}

impl UplinkLog {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "uplink_log_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write one payload. Returns true if successful.
    pub fn write(&self, payload: &str) -> bool {
        let line = match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => value.to_string(),
            Err(_) => payload.replace('\n', " "),
        };

        match self.append_line(&line) {
            Ok(()) => true,
            Err(e) => {
                error!(file = %self.file_path, error = %e, "uplink_log_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "uplink_logged");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_write_compacts_json() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("uplinks.jsonl");
        let log = UplinkLog::new(file_path.to_str().unwrap());

        assert!(log.write("{\n  \"deviceInfo\": {\"devEui\": \"a1\"}\n}"));
        assert!(log.write("{\"deviceInfo\": {\"devEui\": \"b2\"}}"));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["deviceInfo"]["devEui"], "a1");
    }

    #[test]
    fn test_non_json_kept_on_one_line() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("uplinks.jsonl");
        let log = UplinkLog::new(file_path.to_str().unwrap());

        log.write("garbage\nmore");
        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content, "garbage more\n");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("uplinks.jsonl");
        let log = UplinkLog::new(nested.to_str().unwrap());

        assert!(log.write("{}"));
        assert!(nested.exists());
    }
}
