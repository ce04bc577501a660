//! Pure geodesy used by the proximity and anti-cheat paths.
//!
//! Everything in here is stateless and deterministic. Distances use the
//! haversine formula on a spherical Earth; the local tangent-plane projection
//! is the flat-earth approximation, which is accurate to well under a meter
//! at AR engagement ranges (< ~200 m) and usable to tens of kilometers.

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two WGS84 coordinates (degrees).
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing (forward azimuth) in degrees from one coordinate to
/// another, normalized to `[0, 360)`. 0 = north, 90 = east.
pub fn initial_bearing_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let numerator = d_lon.sin() * lat2_rad.cos();
    let denominator =
        lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * d_lon.cos();
    let bearing = numerator.atan2(denominator).to_degrees();

    // atan2 gives (-180, 180]; wrap into [0, 360)
    (bearing % 360.0 + 360.0) % 360.0
}

/// Projects a coordinate into meters east/north of an origin coordinate
/// (local tangent plane, ENU without the "up" axis).
pub fn to_local_east_north(
    origin_lat: f64,
    origin_lon: f64,
    lat: f64,
    lon: f64,
) -> (f64, f64) {
    let d_lat = (lat - origin_lat).to_radians();
    let d_lon = (lon - origin_lon).to_radians();
    let east = EARTH_RADIUS_M * d_lon * origin_lat.to_radians().cos();
    let north = EARTH_RADIUS_M * d_lat;
    (east, north)
}

/// Inverse of [`to_local_east_north`]: meters east/north of the origin back
/// to an absolute WGS84 coordinate.
pub fn from_local_east_north(
    origin_lat: f64,
    origin_lon: f64,
    east: f64,
    north: f64,
) -> (f64, f64) {
    let d_lat = north / EARTH_RADIUS_M;
    let d_lon = east / (EARTH_RADIUS_M * origin_lat.to_radians().cos());
    let lat = origin_lat + d_lat.to_degrees();
    let lon = origin_lon + d_lon.to_degrees();
    (lat, lon)
}

/// Compass labels in 45° sector order starting at north.
const CARDINAL_LABELS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Maps a bearing in degrees to one of 8 compass labels. Sectors are 45°
/// wide and centered on the labels, so N covers [337.5, 22.5).
pub fn cardinal_direction(bearing_degrees: f64) -> &'static str {
    let normalized = (bearing_degrees % 360.0 + 360.0) % 360.0;
    let sector = ((normalized + 22.5) / 45.0).floor() as usize % 8;
    CARDINAL_LABELS[sector]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_zero_for_same_point() {
        let d = distance_meters(37.7749, -122.4194, 37.7749, -122.4194);
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = (37.7749, -122.4194); // San Francisco
        let b = (34.0522, -118.2437); // Los Angeles
        let ab = distance_meters(a.0, a.1, b.0, b.1);
        let ba = distance_meters(b.0, b.1, a.0, a.1);
        assert_relative_eq!(ab, ba, epsilon = 1e-9);
        // SF-LA is roughly 559 km great-circle
        assert!(ab > 550_000.0 && ab < 570_000.0);
    }

    #[test]
    fn test_distance_short_range() {
        // 0.0001° of latitude ≈ 11.1 m
        let d = distance_meters(37.7749, -122.4194, 37.7750, -122.4194);
        assert_relative_eq!(d, 11.1, epsilon = 0.1);
    }

    #[test]
    fn test_bearing_cardinal_points() {
        // Due north
        let n = initial_bearing_degrees(37.0, -122.0, 38.0, -122.0);
        assert_relative_eq!(n, 0.0, epsilon = 1e-9);

        // Due south
        let s = initial_bearing_degrees(38.0, -122.0, 37.0, -122.0);
        assert_relative_eq!(s, 180.0, epsilon = 1e-9);

        // Due east at the equator
        let e = initial_bearing_degrees(0.0, 10.0, 0.0, 11.0);
        assert_relative_eq!(e, 90.0, epsilon = 1e-9);

        // Due west at the equator
        let w = initial_bearing_degrees(0.0, 11.0, 0.0, 10.0);
        assert_relative_eq!(w, 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bearing_always_in_range() {
        let points = [
            (37.7749, -122.4194, 34.0522, -118.2437),
            (51.5074, -0.1278, 48.8566, 2.3522),
            (-33.8688, 151.2093, 35.6762, 139.6503),
            (0.0, 179.9, 0.0, -179.9),
            (89.0, 0.0, -89.0, 0.0),
        ];
        for (lat1, lon1, lat2, lon2) in points {
            let b = initial_bearing_degrees(lat1, lon1, lat2, lon2);
            assert!((0.0..360.0).contains(&b), "bearing {} out of range", b);
        }
    }

    #[test]
    fn test_enu_round_trip() {
        let origin = (37.7749, -122.4194);
        let points = [
            (37.7750, -122.4194),  // ~11 m north
            (37.7749, -122.4180),  // ~120 m east
            (37.8200, -122.3700),  // ~6.5 km NE
            (37.3382, -121.8863),  // ~64 km SE (San Jose)
        ];
        for (lat, lon) in points {
            let (east, north) = to_local_east_north(origin.0, origin.1, lat, lon);
            let (lat2, lon2) = from_local_east_north(origin.0, origin.1, east, north);
            assert_relative_eq!(lat, lat2, epsilon = 1e-6);
            assert_relative_eq!(lon, lon2, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_enu_axes() {
        let origin = (37.7749, -122.4194);
        // Point north of origin: positive north, ~zero east
        let (east, north) = to_local_east_north(origin.0, origin.1, 37.7759, -122.4194);
        assert_relative_eq!(east, 0.0, epsilon = 1e-9);
        assert!(north > 100.0 && north < 120.0);

        // Point east of origin: positive east, ~zero north
        let (east, north) = to_local_east_north(origin.0, origin.1, 37.7749, -122.4180);
        assert_relative_eq!(north, 0.0, epsilon = 1e-9);
        assert!(east > 100.0 && east < 140.0);
    }

    #[test]
    fn test_enu_agrees_with_haversine_at_short_range() {
        let origin = (37.7749, -122.4194);
        let point = (37.7756, -122.4181);
        let (east, north) = to_local_east_north(origin.0, origin.1, point.0, point.1);
        let flat = (east * east + north * north).sqrt();
        let great_circle = distance_meters(origin.0, origin.1, point.0, point.1);
        // Under 200 m the two should agree to centimeters
        assert_relative_eq!(flat, great_circle, epsilon = 0.05);
    }

    #[test]
    fn test_cardinal_sector_centers() {
        assert_eq!(cardinal_direction(0.0), "N");
        assert_eq!(cardinal_direction(45.0), "NE");
        assert_eq!(cardinal_direction(90.0), "E");
        assert_eq!(cardinal_direction(135.0), "SE");
        assert_eq!(cardinal_direction(180.0), "S");
        assert_eq!(cardinal_direction(225.0), "SW");
        assert_eq!(cardinal_direction(270.0), "W");
        assert_eq!(cardinal_direction(315.0), "NW");
    }

    #[test]
    fn test_cardinal_sector_boundaries() {
        // Sector edges land on the next label at +22.5°
        assert_eq!(cardinal_direction(22.4), "N");
        assert_eq!(cardinal_direction(22.5), "NE");
        assert_eq!(cardinal_direction(337.4), "NW");
        assert_eq!(cardinal_direction(337.5), "N");
        assert_eq!(cardinal_direction(359.9), "N");
        // Negative and >360 inputs normalize
        assert_eq!(cardinal_direction(-90.0), "W");
        assert_eq!(cardinal_direction(450.0), "E");
    }
}
