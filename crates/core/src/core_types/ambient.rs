//! Ambient (meteorological) conditions
//!
//! Source modules use these to correct emission factors; dispersion modules
//! pass them to the external model.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Meteorological state at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientCondition {
    /// When the record was observed; `None` for the substituted default
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    /// Air temperature (K)
    pub temperature_k: f64,
    /// Static pressure (Pa)
    pub pressure_pa: f64,
    /// Relative humidity (0-1)
    pub relative_humidity: f64,
    /// Wind speed (m/s)
    pub wind_speed_ms: f64,
    /// Direction the wind blows from (degrees, 0 = north)
    pub wind_direction_deg: f64,
    /// Obukhov length (m); positive stable, negative unstable
    #[serde(default)]
    pub obukhov_length_m: Option<f64>,
    /// Cloud cover (oktas)
    #[serde(default)]
    pub cloud_cover_oktas: Option<f64>,
}

impl AmbientCondition {
    /// ISA sea-level temperature (K)
    pub const ISA_TEMPERATURE_K: f64 = 288.15;
    /// ISA sea-level pressure (Pa)
    pub const ISA_PRESSURE_PA: f64 = 101_325.0;
    /// Default relative humidity when no record exists
    pub const DEFAULT_RELATIVE_HUMIDITY: f64 = 0.6;
    /// Default wind speed when no record exists (m/s)
    pub const DEFAULT_WIND_SPEED_MS: f64 = 5.0;
    /// Default wind direction when no record exists (deg)
    pub const DEFAULT_WIND_DIRECTION_DEG: f64 = 270.0;

    /// Record observed at `timestamp`
    pub fn observed(
        timestamp: NaiveDateTime,
        temperature_k: f64,
        pressure_pa: f64,
        relative_humidity: f64,
        wind_speed_ms: f64,
        wind_direction_deg: f64,
    ) -> Self {
        Self {
            timestamp: Some(timestamp),
            temperature_k,
            pressure_pa,
            relative_humidity,
            wind_speed_ms,
            wind_direction_deg,
            obukhov_length_m: None,
            cloud_cover_oktas: None,
        }
    }

    /// Whether this is the substituted default rather than a stored record
    pub fn is_default(&self) -> bool {
        self.timestamp.is_none()
    }
}

impl Default for AmbientCondition {
    /// ISA sea-level atmosphere with a moderate westerly wind
    fn default() -> Self {
        Self {
            timestamp: None,
            temperature_k: Self::ISA_TEMPERATURE_K,
            pressure_pa: Self::ISA_PRESSURE_PA,
            relative_humidity: Self::DEFAULT_RELATIVE_HUMIDITY,
            wind_speed_ms: Self::DEFAULT_WIND_SPEED_MS,
            wind_direction_deg: Self::DEFAULT_WIND_DIRECTION_DEG,
            obukhov_length_m: None,
            cloud_cover_oktas: None,
        }
    }
}

/// Record with the smallest absolute time difference to `at`
///
/// Ties resolve to the earlier record. Records without a timestamp are ignored.
pub fn nearest_by_time(
    records: &[AmbientCondition],
    at: NaiveDateTime,
) -> Option<&AmbientCondition> {
    records
        .iter()
        .filter_map(|r| r.timestamp.map(|t| (r, (t - at).num_milliseconds().unsigned_abs(), t)))
        .min_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)))
        .map(|(r, _, _)| r)
}
