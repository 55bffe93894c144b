use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// A geographic position in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Build a coordinate, rejecting NaN and out-of-range values
    pub fn checked(lat: f64, lng: f64) -> Result<Self, MapError> {
        let coordinate = Self { lat, lng };
        if coordinate.is_valid() {
            Ok(coordinate)
        } else {
            Err(MapError::InvalidCoordinate { lat, lng })
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Wrap longitude into [-180, 180] and clamp latitude to the Mercator limit
    pub fn normalized(self) -> Self {
        let mut lng = self.lng;
        if lng > 180.0 {
            lng -= 360.0;
        } else if lng < -180.0 {
            lng += 360.0;
        }
        Self {
            lat: self.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT),
            lng,
        }
    }

    /// Human-readable form, e.g. `30.2672°N, 97.7431°W`
    pub fn display(&self) -> String {
        format!(
            "{:.4}°{}, {:.4}°{}",
            self.lat.abs(),
            if self.lat >= 0.0 { "N" } else { "S" },
            self.lng.abs(),
            if self.lng >= 0.0 { "E" } else { "W" }
        )
    }
}

/// Web Mercator stops being useful past this latitude
pub const MAX_MERCATOR_LAT: f64 = 85.05112878;

/// Fast equirectangular distance approximation in kilometers.
/// Good for small distances (<1000km), avoids haversine trig.
#[inline(always)]
pub fn fast_distance_km(a: Coordinate, b: Coordinate) -> f64 {
    const R: f64 = 6371.0;
    const DEG_TO_RAD: f64 = 0.017453292519943295;

    let dlat = (b.lat - a.lat) * DEG_TO_RAD;
    let dlng = (b.lng - a.lng) * DEG_TO_RAD;

    let lat_avg = (a.lat + b.lat) * 0.5 * DEG_TO_RAD;
    let dx = dlng * lat_avg.cos();
    let dy = dlat;

    R * (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_rejects_out_of_range() {
        assert!(Coordinate::checked(30.0, -97.0).is_ok());
        assert_eq!(
            Coordinate::checked(91.0, 0.0),
            Err(MapError::InvalidCoordinate { lat: 91.0, lng: 0.0 })
        );
        assert!(Coordinate::checked(f64::NAN, 0.0).is_err());
        assert!(Coordinate::checked(0.0, 181.0).is_err());
    }

    #[test]
    fn test_normalized_wraps_longitude() {
        let c = Coordinate::new(89.0, 190.0).normalized();
        assert!((c.lng - -170.0).abs() < 1e-9);
        assert!((c.lat - MAX_MERCATOR_LAT).abs() < 1e-9);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Coordinate::new(30.2672, -97.7431).display(),
            "30.2672°N, 97.7431°W"
        );
    }

    #[test]
    fn test_fast_distance_austin_to_san_antonio() {
        let austin = Coordinate::new(30.2672, -97.7431);
        let san_antonio = Coordinate::new(29.4241, -98.4936);
        let d = fast_distance_km(austin, san_antonio);
        assert!(d > 110.0 && d < 125.0, "got {d}");
    }
}
