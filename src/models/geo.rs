use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// A geographic control point.
///
/// Clients send either `{ "lng": .., "lat": .. }` or a `[lng, lat]` pair,
/// the server always answers with the object form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Coordinate {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoordinateWire {
    Object { lng: f64, lat: f64 },
    Pair([f64; 2]),
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match CoordinateWire::deserialize(deserializer)? {
            CoordinateWire::Object { lng, lat } => Ok(Coordinate { lng, lat }),
            CoordinateWire::Pair([lng, lat]) => Ok(Coordinate { lng, lat }),
        }
    }
}

impl Coordinate {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Check that the coordinate is a usable WGS84 position
    pub fn validate(&self) -> Result<(), String> {
        if !self.lng.is_finite() || !self.lat.is_finite() {
            return Err(format!("Coordinate ({}, {}) is not finite", self.lng, self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(format!("Longitude {} is out of range", self.lng));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(format!("Latitude {} is out of range", self.lat));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_object_and_pair_forms() {
        let obj: Coordinate = serde_json::from_str(r#"{"lng": 1.5, "lat": 2.5}"#).unwrap();
        let pair: Coordinate = serde_json::from_str("[1.5, 2.5]").unwrap();
        assert_eq!(obj, pair);
        assert_eq!(
            serde_json::to_value(pair).unwrap(),
            serde_json::json!({"lng": 1.5, "lat": 2.5})
        );
    }

    #[test]
    fn rejects_out_of_range_positions() {
        assert!(Coordinate::new(0.0, 0.0).validate().is_ok());
        assert!(Coordinate::new(181.0, 0.0).validate().is_err());
        assert!(Coordinate::new(0.0, -90.5).validate().is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).validate().is_err());
    }
}
