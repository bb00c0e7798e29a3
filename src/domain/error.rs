//! Domain errors

use h3o::CellIndex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExplorationError {
    /// Coordinate outside the valid WGS84 range or not a number
    #[error("invalid coordinate: lat={latitude}, lon={longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// The backing journal rejected a write; the store was left unchanged
    #[error("exploration store unavailable: {0}")]
    StoreUnavailable(#[from] std::io::Error),

    /// The journal holds cells from a different grid resolution
    #[error("journal cell {cell} has resolution {found}, grid is configured for {expected}")]
    ResolutionMismatch { cell: CellIndex, found: u8, expected: u8 },
}

pub type Result<T> = std::result::Result<T, ExplorationError>;
