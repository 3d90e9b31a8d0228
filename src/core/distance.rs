/// Earth's radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate the Haversine distance between two points in kilometers
///
/// # Arguments
/// * `lat1` - Latitude of first point in degrees
/// * `lon1` - Longitude of first point in degrees
/// * `lat2` - Latitude of second point in degrees
/// * `lon2` - Longitude of second point in degrees
///
/// # Returns
/// Distance in kilometers
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Location score for a precise distance: 1.0 at the patient, 0.0 at the radius edge
#[inline]
pub fn proximity_score(distance_km: f64, search_radius_km: f64) -> f64 {
    if search_radius_km <= 0.0 {
        return 0.0;
    }
    (1.0 - distance_km / search_radius_km).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance() {
        // Mumbai to Pune is roughly 120 km
        let distance = haversine_distance(19.0760, 72.8777, 18.5204, 73.8567);
        assert!((distance - 120.0).abs() < 10.0, "Distance should be ~120km, got {}", distance);
    }

    #[test]
    fn test_haversine_same_point() {
        assert!(haversine_distance(28.6139, 77.2090, 28.6139, 77.2090) < 1e-9);
    }

    #[test]
    fn test_proximity_score() {
        assert_eq!(proximity_score(0.0, 500.0), 1.0);
        assert!((proximity_score(250.0, 500.0) - 0.5).abs() < 1e-12);
        assert_eq!(proximity_score(600.0, 500.0), 0.0);
    }
}
