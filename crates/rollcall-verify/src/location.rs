//! Location assessment of check-ins

use regex::Regex;
use rollcall_api::GeoPoint;
use std::sync::LazyLock;

/// Mean Earth radius used for great-circle distances
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

static NOTE_DISTANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((\d+(?:\.\d+)?)m\)").expect("note distance pattern is valid")
});

/// Judges where a capture happened relative to the class
pub trait LocationAssessor: Send + Sync {
    /// A free-text note about the capture location, or None when unremarkable
    fn assess(&self, class_point: Option<GeoPoint>, captured: Option<GeoPoint>) -> Option<String>;
}

/// Flags captures farther than a fixed radius from the class
#[derive(Debug, Clone)]
pub struct GreatCircleAssessor {
    radius_meters: f64,
    marker: String,
}

impl GreatCircleAssessor {
    pub fn new(radius_meters: f64, marker: impl Into<String>) -> Self {
        Self {
            radius_meters,
            marker: marker.into(),
        }
    }
}

impl LocationAssessor for GreatCircleAssessor {
    fn assess(&self, class_point: Option<GeoPoint>, captured: Option<GeoPoint>) -> Option<String> {
        let (class_point, captured) = (class_point?, captured?);
        let distance = haversine_meters(class_point, captured);

        (distance > self.radius_meters).then(|| far_note(&self.marker, distance))
    }
}

/// Great-circle distance between two points
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

/// `"<marker> (<n>m)"` with the distance rounded to whole meters
pub fn far_note(marker: &str, distance_meters: f64) -> String {
    format!("{} ({:.0}m)", marker, distance_meters)
}

/// Distance carried by a note of the form `... (<n>m)`
pub fn note_distance_meters(note: &str) -> Option<f64> {
    NOTE_DISTANCE
        .captures(note)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
