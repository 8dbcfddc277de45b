/*!
 * Geographic types and calculations.
 *
 * Coordinates come from phone GPS fixes, so everything here is approximate by
 * nature. The great circle distance below is plenty accurate at the sub-kilometer
 * scales station matching works at.
 */
use std::fmt::{self, Display};

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    /// Latitude, positive north.
    pub lat: f64,
    /// Longitude, positive east.
    pub lon: f64,
}

impl Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A geographic bounding box.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    /// The lower left corner.
    pub ll: Coord,
    /// The upper right corner.
    pub ur: Coord,
}

/// Kilometers spanned by one degree of latitude.
const KM_PER_DEG_LAT: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

impl BoundingBox {
    /**
     * Build a box that is guaranteed to contain every point within the given
     * range of the center.
     *
     * Used to narrow database scans before exact distances are computed, so it
     * errs on the large side. Longitude span grows with latitude; near the poles
     * it just covers all longitudes.
     *
     * #Arguments
     * * center - the center point of the box.
     * * range_km - the radius the box must cover, in kilometers.
     */
    pub fn around(center: Coord, range_km: f64) -> Self {
        let dlat = range_km / KM_PER_DEG_LAT;

        let cos_lat = f64::cos(center.lat.to_radians()).abs();
        let dlon = if cos_lat < 1.0e-6 {
            360.0
        } else {
            range_km / (KM_PER_DEG_LAT * cos_lat)
        };

        let ll = Coord {
            lat: f64::max(center.lat - dlat, -90.0),
            lon: f64::max(center.lon - dlon, -180.0),
        };
        let ur = Coord {
            lat: f64::min(center.lat + dlat, 90.0),
            lon: f64::min(center.lon + dlon, 180.0),
        };

        BoundingBox { ll, ur }
    }

    /// Check if a coordinate falls inside this box.
    pub fn contains(&self, coord: Coord) -> bool {
        coord.lat >= self.ll.lat
            && coord.lat <= self.ur.lat
            && coord.lon >= self.ll.lon
            && coord.lon <= self.ur.lon
    }
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/**
 * The simple great circle distance calculation.
 *
 * #Arguments
 * * lat1 - the latitude of the first point in degrees.
 * * lon1 - the longitude of the first point in degrees.
 * * lat2 - the latitude of the second point in degrees.
 * * lon2 - the longitude of the second point in degrees.
 *
 * #Returns
 * The distance between the points in kilometers.
 */
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const DEG2RAD: f64 = 2.0 * std::f64::consts::PI / 360.0;

    let lat1_r = lat1 * DEG2RAD;
    let lon1_r = lon1 * DEG2RAD;
    let lat2_r = lat2 * DEG2RAD;
    let lon2_r = lon2 * DEG2RAD;

    let dlat2 = (lat2_r - lat1_r) / 2.0;
    let dlon2 = (lon2_r - lon1_r) / 2.0;

    let sin2_dlat = f64::powf(f64::sin(dlat2), 2.0);
    let sin2_dlon = f64::powf(f64::sin(dlon2), 2.0);

    let arc = 2.0
        * f64::asin(f64::sqrt(
            sin2_dlat + sin2_dlon * f64::cos(lat1_r) * f64::cos(lat2_r),
        ));

    arc * EARTH_RADIUS_KM
}
