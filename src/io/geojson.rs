//! GeoJSON rendering of classified cells
//!
//! One MultiPolygon feature per tier, styled by the tier's colour key.

use crate::services::query::{CellClassification, Tier};
use serde_json::{json, Value};

/// Build a FeatureCollection, or `None` when no cell has been visited
pub fn feature_collection(classes: &CellClassification) -> Option<Value> {
    if classes.is_empty() {
        return None;
    }

    let features: Vec<Value> = Tier::ALL
        .iter()
        .map(|&tier| {
            let polygons: Vec<Value> =
                classes.tier(tier).iter().map(|c| json!([c.boundary])).collect();
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": polygons,
                },
                "properties": {
                    "tier": tier.label(),
                    "fill": tier.style_key(),
                    "stroke": tier.style_key(),
                },
            })
        })
        .collect();

    Some(json!({
        "type": "FeatureCollection",
        "features": features,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::grid::GridIndex;
    use crate::services::query::ClassifiedCell;
    use h3o::{LatLng, Resolution};

    fn classified(lat: f64, score: u64) -> ClassifiedCell {
        let grid = GridIndex::new(Resolution::Eight);
        let cell = LatLng::new(lat, 7.0).unwrap().to_cell(Resolution::Eight);
        ClassifiedCell { cell, score, boundary: grid.boundary(cell) }
    }

    #[test]
    fn test_empty_is_none() {
        assert!(feature_collection(&CellClassification::default()).is_none());
    }

    #[test]
    fn test_one_feature_per_tier() {
        let classes = CellClassification {
            frontier: vec![classified(45.0, 1), classified(46.0, 1)],
            settled: vec![],
            surge: vec![classified(47.0, 5)],
            mean_score: 7.0 / 3.0,
        };

        let fc = feature_collection(&classes).unwrap();
        assert_eq!(fc["type"], "FeatureCollection");
        let features = fc["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);

        assert_eq!(features[0]["properties"]["tier"], "frontier");
        assert_eq!(features[0]["properties"]["fill"], "blue");
        assert_eq!(features[0]["geometry"]["type"], "MultiPolygon");
        assert_eq!(features[0]["geometry"]["coordinates"].as_array().unwrap().len(), 2);

        assert_eq!(features[1]["properties"]["stroke"], "green");
        assert!(features[1]["geometry"]["coordinates"].as_array().unwrap().is_empty());

        // polygon -> ring -> [lng, lat]
        let ring = &features[2]["geometry"]["coordinates"][0][0];
        assert_eq!(ring.as_array().unwrap().len(), 7);
        assert_eq!(ring[0].as_array().unwrap().len(), 2);
    }
}
