//! Watermark label text.

use chrono::{DateTime, TimeZone};
use std::fmt;

/// Format of the date line produced by [`WatermarkLabel::for_capture`].
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Returns `None` when either component is out of range or not finite.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// The two lines burned into the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkLabel {
    pub date: String,
    pub coordinates: String,
}

impl WatermarkLabel {
    pub fn new(date: impl Into<String>, coordinates: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            coordinates: coordinates.into(),
        }
    }

    /// Label for a capture taken at `taken_at` (in the capture's local zone)
    /// at `point`.
    pub fn for_capture<Tz>(taken_at: &DateTime<Tz>, point: GeoPoint) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self {
            date: taken_at.format(DATE_FORMAT).to_string(),
            coordinates: point.to_string(),
        }
    }
}
