//! Domain models - core exploration types and the hexagonal grid
//!
//! - `types` - trackers, cells, location reports, uplink wire format
//! - `grid` - coordinate to H3 cell mapping and neighbour rings
//! - `error` - domain error type

pub mod error;
pub mod grid;
pub mod types;

pub use error::ExplorationError;
pub use grid::GridIndex;
pub use types::{Cell, DevEui, LocationReport, TrackerRecord};
