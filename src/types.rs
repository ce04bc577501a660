use serde::{Deserialize, Serialize};

use crate::error::FixError;

/// A single timestamped GPS reading for one session.
///
/// Immutable once constructed. Timestamps are epoch seconds and must be
/// strictly increasing per session (enforced by ingest, not here).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters as reported by the device.
    pub accuracy_m: f64,
    /// Heading in degrees, provenance unspecified (GPS course or compass).
    pub heading_deg: Option<f64>,
    /// Device-reported ground speed in m/s, if any.
    pub speed_mps: Option<f64>,
    /// Device hint that a mock-location provider is active.
    pub is_mock: bool,
    /// Epoch seconds.
    pub timestamp: f64,
}

impl LocationFix {
    /// Builds a fix after checking the coordinate invariants. Accuracy
    /// defaults to 0 (unknown/perfect); use struct update syntax for the
    /// optional fields.
    pub fn new(latitude: f64, longitude: f64, timestamp: f64) -> Result<Self, FixError> {
        validate_coordinates(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
            altitude: None,
            accuracy_m: 0.0,
            heading_deg: None,
            speed_mps: None,
            is_mock: false,
            timestamp,
        })
    }
}

/// Coordinate invariants: valid WGS84 ranges, and not the exact (0, 0)
/// "null island" pair that broken clients emit when they have no fix.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), FixError> {
    let in_range = (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
        && latitude.is_finite()
        && longitude.is_finite();
    let null_island = latitude == 0.0 && longitude == 0.0;
    if !in_range || null_island {
        return Err(FixError::InvalidCoordinate {
            latitude,
            longitude,
        });
    }
    Ok(())
}

/// Coin worth tier, owned by the content layer. The engine only carries it
/// through to events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueCategory {
    Bronze,
    Silver,
    Gold,
}

/// A coin candidate placed by the game/content layer.
///
/// The engine reads its geometry and radii; it never mutates a target, and
/// radii do not change mid-hunt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Target {
    pub id: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub value_category: ValueCategory,
    /// Distance at which a materialized coin can be collected.
    pub collection_radius_m: f64,
    /// Distance at which a hidden coin becomes visible.
    pub materialization_radius_m: f64,
    /// Distance past which a visible coin re-hides. Must exceed the
    /// materialization radius; see [`Target::effective_hide_radius`].
    pub hide_radius_m: f64,
}

impl Target {
    /// The hide radius actually used by the state machine. A misconfigured
    /// hide radius (≤ materialization) would make the visible band empty,
    /// so it is corrected to materialization + margin.
    pub fn effective_hide_radius(&self, margin_m: f64) -> f64 {
        if self.hide_radius_m > self.materialization_radius_m {
            self.hide_radius_m
        } else {
            self.materialization_radius_m + margin_m
        }
    }
}

/// Coarse qualitative speed bucket reported back to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Walking,
    Running,
    Driving,
    Suspicious,
}

impl MovementType {
    /// Buckets an implied speed in km/h. A mock-flagged fix is suspicious
    /// regardless of speed.
    pub fn classify(speed_kmh: f64, mock_flagged: bool, cfg: &crate::config::EngineConfig) -> Self {
        if mock_flagged {
            return MovementType::Suspicious;
        }
        if speed_kmh <= cfg.walking_max_kmh {
            MovementType::Walking
        } else if speed_kmh <= cfg.running_max_kmh {
            MovementType::Running
        } else if speed_kmh <= cfg.driving_max_kmh {
            MovementType::Driving
        } else {
            MovementType::Suspicious
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_null_island_rejected() {
        let err = LocationFix::new(0.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, FixError::InvalidCoordinate { .. }));
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(LocationFix::new(91.0, 0.0, 1.0).is_err());
        assert!(LocationFix::new(-91.0, 0.0, 1.0).is_err());
        assert!(LocationFix::new(0.0, 181.0, 1.0).is_err());
        assert!(LocationFix::new(0.0, -181.0, 1.0).is_err());
        assert!(LocationFix::new(f64::NAN, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_zero_lat_nonzero_lon_ok() {
        // Only the exact (0, 0) pair is treated as null island
        assert!(LocationFix::new(0.0, 12.5, 1.0).is_ok());
        assert!(LocationFix::new(51.5, 0.0, 1.0).is_ok());
    }

    #[test]
    fn test_hide_radius_auto_correction() {
        let mut target = Target {
            id: 1,
            latitude: 37.0,
            longitude: -122.0,
            value_category: ValueCategory::Gold,
            collection_radius_m: 5.0,
            materialization_radius_m: 20.0,
            hide_radius_m: 30.0,
        };
        assert_eq!(target.effective_hide_radius(5.0), 30.0);

        // hide <= materialization gets corrected
        target.hide_radius_m = 20.0;
        assert_eq!(target.effective_hide_radius(5.0), 25.0);
        target.hide_radius_m = 10.0;
        assert_eq!(target.effective_hide_radius(5.0), 25.0);
    }

    #[test]
    fn test_movement_type_buckets() {
        let cfg = EngineConfig::default();
        assert_eq!(MovementType::classify(4.0, false, &cfg), MovementType::Walking);
        assert_eq!(MovementType::classify(6.0, false, &cfg), MovementType::Walking);
        assert_eq!(MovementType::classify(12.0, false, &cfg), MovementType::Running);
        assert_eq!(MovementType::classify(120.0, false, &cfg), MovementType::Driving);
        assert_eq!(MovementType::classify(121.0, false, &cfg), MovementType::Suspicious);
        // Mock hint dominates
        assert_eq!(MovementType::classify(4.0, true, &cfg), MovementType::Suspicious);
    }

    #[test]
    fn test_movement_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MovementType::Suspicious).unwrap(),
            "\"suspicious\""
        );
    }
}
