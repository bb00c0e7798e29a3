//! Shared types for the exploration service

use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Sum scores, clamping at `u64::MAX`.
///
/// Wavefront scores grow exponentially with the explored area, so a large
/// sweep reaches the top of the range. Clamping keeps the cell-sum equal to
/// the tracker-sum: both saturate together.
pub fn score_sum(scores: impl IntoIterator<Item = u64>) -> u64 {
    scores.into_iter().fold(0, u64::saturating_add)
}

/// Stable LoRaWAN device identifier of a tracker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevEui(pub String);

impl DevEui {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DevEui {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A visited grid cell. Cells only exist in the store once discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellIndex,
    pub score: u64,
    /// Epoch ms of the report that discovered the cell
    pub last_updated: u64,
}

/// A tracker and its cumulative exploration score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRecord {
    pub dev_eui: DevEui,
    pub display_name: String,
    pub score: u64,
}

impl TrackerRecord {
    pub fn new(dev_eui: DevEui, display_name: impl Into<String>) -> Self {
        Self { dev_eui, display_name: display_name.into(), score: 0 }
    }
}

/// A decoded location report as handed over by the transport adapter
#[derive(Debug, Clone, PartialEq)]
pub struct LocationReport {
    pub dev_eui: DevEui,
    pub display_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Epoch ms
    pub timestamp: u64,
}

impl LocationReport {
    /// Coordinate pair if the tracker had a GPS fix.
    ///
    /// Missing coordinates and the `(0, 0)` sentinel both mean "no fix".
    pub fn fix(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if !(lat == 0.0 && lon == 0.0) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// ChirpStack uplink event, reduced to the fields we use
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UplinkMessage {
    pub device_info: DeviceInfo,
    /// Uplink time as RFC 3339 string
    #[serde(default)]
    pub time: Option<String>,
    /// Payload decoded by the device profile codec
    #[serde(default)]
    pub object: Option<UplinkObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub dev_eui: String,
    #[serde(default)]
    pub device_name: Option<String>,
}

/// Decoded tracker payload. Join messages and battery-only uplinks carry no location.
#[derive(Debug, Default, Deserialize)]
pub struct UplinkObject {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_sum_saturates() {
        assert_eq!(score_sum([]), 0);
        assert_eq!(score_sum([1, 2, 3]), 6);
        assert_eq!(score_sum([u64::MAX - 1, 1, 1]), u64::MAX);
        assert_eq!(score_sum([u64::MAX, u64::MAX]), u64::MAX);
    }

    fn report(lat: Option<f64>, lon: Option<f64>) -> LocationReport {
        LocationReport {
            dev_eui: DevEui::new("a840411f61847b6c"),
            display_name: None,
            latitude: lat,
            longitude: lon,
            timestamp: 0,
        }
    }

    #[test]
    fn test_fix_present() {
        assert_eq!(report(Some(47.54), Some(7.59)).fix(), Some((47.54, 7.59)));
    }

    #[test]
    fn test_fix_missing() {
        assert_eq!(report(None, None).fix(), None);
        assert_eq!(report(Some(47.54), None).fix(), None);
        assert_eq!(report(None, Some(7.59)).fix(), None);
    }

    #[test]
    fn test_fix_zero_sentinel() {
        assert_eq!(report(Some(0.0), Some(0.0)).fix(), None);
        // Only the pair is the sentinel; the equator alone is a real location
        assert_eq!(report(Some(0.0), Some(7.59)).fix(), Some((0.0, 7.59)));
    }

    #[test]
    fn test_parse_uplink() {
        let json = r#"{
            "deviceInfo": {"devEui": "a840411f61847b6c", "deviceName": "t1000-a"},
            "time": "2026-01-05T16:41:30.048+00:00",
            "object": {"latitude": 47.5442, "longitude": 7.5886, "battery": 87}
        }"#;
        let msg: UplinkMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.device_info.dev_eui, "a840411f61847b6c");
        assert_eq!(msg.device_info.device_name.as_deref(), Some("t1000-a"));
        let object = msg.object.unwrap();
        assert_eq!(object.latitude, Some(47.5442));
        assert_eq!(object.longitude, Some(7.5886));
    }

    #[test]
    fn test_parse_uplink_without_object() {
        let json = r#"{"deviceInfo": {"devEui": "a840411f61847b6c"}}"#;
        let msg: UplinkMessage = serde_json::from_str(json).unwrap();
        assert!(msg.object.is_none());
        assert!(msg.device_info.device_name.is_none());
        assert!(msg.time.is_none());
    }
}
