//! Where the patient is, as a human-readable string for alerts

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Yields the live location string. Never fails: problems are reported
/// as a descriptive string in place of coordinates.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn current_location(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    /// Radius of uncertainty in metres
    pub accuracy_m: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6}, {:.6} (Accuracy: {:.0}m)",
            self.latitude, self.longitude, self.accuracy_m
        )
    }
}

/// Why a position fix could not be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationFailure {
    PermissionDenied,
    Unavailable,
    Timeout,
    Unsupported,
    Other,
}

impl fmt::Display for LocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LocationFailure::PermissionDenied => "Location permission denied",
            LocationFailure::Unavailable => "Location unavailable",
            LocationFailure::Timeout => "Location request timeout",
            LocationFailure::Unsupported => "Geolocation not supported",
            LocationFailure::Other => "Location error",
        };
        f.write_str(text)
    }
}

/// A location that was decided up front, e.g. from a CLI flag
#[derive(Debug, Clone, PartialEq)]
pub struct FixedLocation(pub String);

#[async_trait]
impl LocationSource for FixedLocation {
    async fn current_location(&self) -> String {
        self.0.clone()
    }
}

/// The outcome of a single position request
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFix(pub Result<Coordinates, LocationFailure>);

impl GeoFix {
    pub fn describe(&self) -> String {
        match &self.0 {
            Ok(coords) => coords.to_string(),
            Err(failure) => failure.to_string(),
        }
    }
}

#[async_trait]
impl LocationSource for GeoFix {
    async fn current_location(&self) -> String {
        self.describe()
    }
}

/// Used when the host has no positioning at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

#[async_trait]
impl LocationSource for NoLocation {
    async fn current_location(&self) -> String {
        LocationFailure::Unsupported.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_coordinates_format() {
        let coords = Coordinates {
            latitude: 18.520430,
            longitude: 73.856743,
            accuracy_m: 12.4,
        };
        assert_eq!(coords.to_string(), "18.520430, 73.856743 (Accuracy: 12m)");
    }

    #[tokio::test]
    async fn test_failures_become_descriptions() {
        let fix = GeoFix(Err(LocationFailure::Timeout));
        assert_eq!(fix.current_location().await, "Location request timeout");
        assert_eq!(
            NoLocation.current_location().await,
            "Geolocation not supported"
        );
    }
}
