//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client for receiving ChirpStack tracker uplinks
//! - `uplink_log` - Raw uplink debug log (JSONL)
//! - `journal` - Append-only store journal (JSONL)
//! - `http` - HTTP API and map page
//! - `geojson` - GeoJSON rendering of classified cells
//! - `prometheus` - Prometheus text exposition

pub mod geojson;
pub mod http;
pub mod journal;
pub mod mqtt;
pub mod prometheus;
pub mod uplink_log;

// Re-export commonly used types
pub use http::{start_http_server, ApiState};
pub use journal::{ExplorationJournal, FileJournal, JournalEntry};
pub use uplink_log::UplinkLog;
