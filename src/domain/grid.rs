//! Hexagonal grid indexing on top of H3
//!
//! The resolution is fixed for the lifetime of the process. Cell identifiers
//! are resolution-specific, so changing it orphans every stored cell.

use crate::domain::error::{ExplorationError, Result};
use h3o::{CellIndex, LatLng, Resolution};
use smallvec::SmallVec;

/// Cells adjacent to a cell. Six for hexagons, five around pentagons.
pub type Ring = SmallVec<[CellIndex; 6]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridIndex {
    resolution: Resolution,
}

impl GridIndex {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Cell containing the coordinate (degrees)
    pub fn cell_of(&self, latitude: f64, longitude: f64) -> Result<CellIndex> {
        let invalid = || ExplorationError::InvalidCoordinate { latitude, longitude };

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid());
        }
        let lat_lng = LatLng::new(latitude, longitude).map_err(|_| invalid())?;

        Ok(lat_lng.to_cell(self.resolution))
    }

    /// Cells at grid distance exactly 1
    pub fn ring(&self, cell: CellIndex) -> Ring {
        cell.grid_disk::<Vec<_>>(1).into_iter().filter(|&c| c != cell).collect()
    }

    /// Cell outline as a closed GeoJSON linear ring of `[lng, lat]` pairs
    pub fn boundary(&self, cell: CellIndex) -> Vec<[f64; 2]> {
        let boundary = cell.boundary();
        let mut ring: Vec<[f64; 2]> = boundary.iter().map(|ll| [ll.lng(), ll.lat()]).collect();
        if let Some(&first) = ring.first() {
            ring.push(first);
        }
        ring
    }

    /// Cell centre as `(lat, lng)` in degrees
    pub fn center(&self, cell: CellIndex) -> (f64, f64) {
        let ll = LatLng::from(cell);
        (ll.lat(), ll.lng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridIndex {
        GridIndex::new(Resolution::Eight)
    }

    #[test]
    fn test_cell_of_is_deterministic() {
        let a = grid().cell_of(47.5442, 7.5886).unwrap();
        let b = grid().cell_of(47.5442, 7.5886).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.resolution(), Resolution::Eight);
    }

    #[test]
    fn test_cell_of_depends_on_resolution() {
        let coarse = GridIndex::new(Resolution::Five).cell_of(47.5442, 7.5886).unwrap();
        let fine = grid().cell_of(47.5442, 7.5886).unwrap();
        assert_ne!(coarse, fine);
    }

    #[test]
    fn test_cell_of_rejects_out_of_range() {
        assert!(matches!(
            grid().cell_of(91.0, 7.0),
            Err(ExplorationError::InvalidCoordinate { .. })
        ));
        assert!(grid().cell_of(-90.5, 7.0).is_err());
        assert!(grid().cell_of(47.0, 180.5).is_err());
        assert!(grid().cell_of(f64::NAN, 7.0).is_err());
        assert!(grid().cell_of(47.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_ring_has_six_distinct_neighbors() {
        let cell = grid().cell_of(47.5442, 7.5886).unwrap();
        let ring = grid().ring(cell);
        assert_eq!(ring.len(), 6);
        assert!(!ring.contains(&cell));
        for n in &ring {
            assert_eq!(cell.grid_distance(*n).unwrap(), 1);
        }
    }

    #[test]
    fn test_ring_is_symmetric() {
        let cell = grid().cell_of(47.5442, 7.5886).unwrap();
        for n in grid().ring(cell) {
            assert!(grid().ring(n).contains(&cell));
        }
    }

    #[test]
    fn test_center_maps_back_to_cell() {
        let cell = grid().cell_of(47.5442, 7.5886).unwrap();
        let (lat, lng) = grid().center(cell);
        assert_eq!(grid().cell_of(lat, lng).unwrap(), cell);
    }

    #[test]
    fn test_boundary_is_closed() {
        let cell = grid().cell_of(47.5442, 7.5886).unwrap();
        let ring = grid().boundary(cell);
        assert_eq!(ring.len(), 7);
        assert_eq!(ring.first(), ring.last());
    }
}
