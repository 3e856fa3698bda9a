use crate::model::attendance::Coordinates;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

fn valid_position(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Great-circle distance in metres, or `None` for an impossible position.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<f64> {
    if !valid_position(lat1, lon1) || !valid_position(lat2, lon2) {
        return None;
    }

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    Some(EARTH_RADIUS_METERS * c)
}

/// Inclusive: a point exactly `radius_meters` away is in range. Invalid input
/// is simply out of range.
pub fn within_range(
    student_lat: f64,
    student_lon: f64,
    campus_lat: f64,
    campus_lon: f64,
    radius_meters: f64,
) -> bool {
    if !radius_meters.is_finite() || radius_meters < 0.0 {
        return false;
    }
    distance_meters(student_lat, student_lon, campus_lat, campus_lon)
        .is_some_and(|d| d <= radius_meters)
}

/// The allowed circle around the campus reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    pub center: Coordinates,
    pub radius_meters: f64,
}

impl Geofence {
    pub fn new(center: Coordinates, radius_meters: f64) -> Self {
        Self {
            center,
            radius_meters,
        }
    }

    pub fn contains(&self, position: Coordinates) -> bool {
        within_range(
            position.latitude,
            position.longitude,
            self.center.latitude,
            self.center.longitude,
            self.radius_meters,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMPUS: (f64, f64) = (40.7128, -74.0060);
    // one metre of latitude in degrees
    const METER: f64 = 180.0 / (std::f64::consts::PI * EARTH_RADIUS_METERS);

    #[test]
    fn measures_north_offsets() {
        let d = distance_meters(CAMPUS.0, CAMPUS.1, CAMPUS.0 + 50.0 * METER, CAMPUS.1).unwrap();
        assert!((d - 50.0).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn accepts_inside_and_rejects_outside() {
        assert!(within_range(CAMPUS.0 + 50.0 * METER, CAMPUS.1, CAMPUS.0, CAMPUS.1, 100.0));
        assert!(!within_range(CAMPUS.0 + 500.0 * METER, CAMPUS.1, CAMPUS.0, CAMPUS.1, 100.0));
    }

    #[test]
    fn boundary_is_inclusive() {
        let lat = CAMPUS.0 + 0.0009;
        let lon = CAMPUS.1 + 0.0007;
        let exact = distance_meters(lat, lon, CAMPUS.0, CAMPUS.1).unwrap();

        assert!(within_range(lat, lon, CAMPUS.0, CAMPUS.1, exact));
        assert!(!within_range(lat, lon, CAMPUS.0, CAMPUS.1, exact - 1e-6));
    }

    #[test]
    fn haversine_differs_from_flat_degrees_at_high_latitude() {
        // 0.001 deg of longitude is ~111 m at the equator but ~38 m at 70N
        let d = distance_meters(70.0, 20.0, 70.0, 20.001).unwrap();
        assert!((30.0..45.0).contains(&d), "got {d}");
    }

    #[test]
    fn invalid_input_is_never_in_range() {
        assert!(!within_range(91.0, 0.0, 0.0, 0.0, 1e9));
        assert!(!within_range(0.0, 181.0, 0.0, 0.0, 1e9));
        assert!(!within_range(f64::NAN, 0.0, 0.0, 0.0, 1e9));
        assert!(!within_range(0.0, 0.0, 0.0, f64::INFINITY, 1e9));
        assert!(!within_range(0.0, 0.0, 0.0, 0.0, -1.0));
        assert!(!within_range(0.0, 0.0, 0.0, 0.0, f64::NAN));
        assert!(within_range(0.0, 0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn geofence_wraps_within_range() {
        let fence = Geofence::new(Coordinates::new(CAMPUS.0, CAMPUS.1), 100.0);
        assert!(fence.contains(Coordinates::new(CAMPUS.0 + 99.0 * METER, CAMPUS.1)));
        assert!(!fence.contains(Coordinates::new(CAMPUS.0 + 101.0 * METER, CAMPUS.1)));
    }
}
