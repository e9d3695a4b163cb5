//! Great-circle distance between two coordinates

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers between two (latitude, longitude) pairs in degrees
pub fn km_between(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(km_between((51.5142, -0.0931), (51.5142, -0.0931)), 0.0);
    }

    #[test]
    fn test_known_distance() {
        let d = km_between((47.2513, -122.5154), (51.5142, -0.0931));
        assert_eq!(format!("{:.2}", d), "7740.82");
    }

    #[test]
    fn test_symmetric() {
        let a = (40.7128, -74.0060);
        let b = (35.6762, 139.6503);
        assert!((km_between(a, b) - km_between(b, a)).abs() < 1e-9);
    }
}
