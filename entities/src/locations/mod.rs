use serde::{Deserialize, Serialize};

/// Mean Earth radius used for every great-circle computation in the engine.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in miles (haversine).
    pub fn distance_miles(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_MILES * c
    }
}

/// Latitude/longitude box that contains every point within `radius_miles` of a center.
/// Used as a cheap storage-side prefilter before the exact haversine check.
///
/// Longitudes are kept unwrapped, so `min_longitude` may be below -180 or `max_longitude`
/// above 180 when the box crosses the antimeridian. Use [`BoundingBox::longitude_ranges`]
/// to query storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    pub fn around(center: Coordinates, radius_miles: f64) -> Self {
        let angular_radius = radius_miles.max(0.0) / EARTH_RADIUS_MILES;
        let lat_delta = angular_radius.to_degrees();
        let min_latitude = center.latitude - lat_delta;
        let max_latitude = center.latitude + lat_delta;

        // widest longitude span of a spherical cap; a cap over a pole spans them all
        let spread = angular_radius.sin() / center.latitude.to_radians().cos();
        let lon_delta = if min_latitude <= -90.0 || max_latitude >= 90.0 || spread >= 1.0 {
            180.0
        } else {
            spread.asin().to_degrees()
        };

        Self {
            min_latitude: min_latitude.max(-90.0),
            max_latitude: max_latitude.min(90.0),
            min_longitude: center.longitude - lon_delta,
            max_longitude: center.longitude + lon_delta,
        }
    }

    /// The box's longitude span as two inclusive ranges inside [-180, 180]. Both ranges
    /// are the same unless the box crosses the antimeridian.
    pub fn longitude_ranges(&self) -> [(f64, f64); 2] {
        if self.max_longitude - self.min_longitude >= 360.0 {
            return [(-180.0, 180.0); 2];
        }
        if self.min_longitude < -180.0 {
            [(-180.0, self.max_longitude), (self.min_longitude + 360.0, 180.0)]
        } else if self.max_longitude > 180.0 {
            [(self.min_longitude, 180.0), (-180.0, self.max_longitude - 360.0)]
        } else {
            [(self.min_longitude, self.max_longitude); 2]
        }
    }

    pub fn contains(&self, point: &Coordinates) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&point.latitude)
            && self
                .longitude_ranges()
                .iter()
                .any(|(min, max)| (*min..=*max).contains(&point.longitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn close(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn distance_between_identical_points_is_zero() {
        let austin = Coordinates::new(30.2672, -97.7431);
        assert_eq!(austin.distance_miles(&austin), 0.0);
    }

    #[test]
    fn known_city_pair_distance() {
        let new_york = Coordinates::new(40.7128, -74.0060);
        let los_angeles = Coordinates::new(34.0522, -118.2437);
        assert!(close(new_york.distance_miles(&los_angeles), 2445.0, 10.0));
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Coordinates::new(51.5074, -0.1278);
        let b = Coordinates::new(48.8566, 2.3522);
        assert!(close(a.distance_miles(&b), b.distance_miles(&a), 1e-9));
        assert!(close(a.distance_miles(&b), 213.0, 3.0));
    }

    #[test]
    fn bounding_box_contains_points_inside_the_radius() {
        let center = Coordinates::new(30.2672, -97.7431);
        let bbox = BoundingBox::around(center, 10.0);
        let nearby = Coordinates::new(30.3322, -97.7000);
        assert!(center.distance_miles(&nearby) < 10.0);
        assert!(bbox.contains(&nearby));
        assert!(!bbox.contains(&Coordinates::new(31.5, -97.7431)));
    }

    /// Point `distance_miles` away from `origin` along `bearing_degrees`.
    fn destination(origin: Coordinates, bearing_degrees: f64, distance_miles: f64) -> Coordinates {
        let d = distance_miles / EARTH_RADIUS_MILES;
        let bearing = bearing_degrees.to_radians();
        let lat1 = origin.latitude.to_radians();
        let lon1 = origin.longitude.to_radians();
        let lat2 = (lat1.sin() * d.cos() + lat1.cos() * d.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * d.sin() * lat1.cos()).atan2(d.cos() - lat1.sin() * lat2.sin());
        let longitude = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
        Coordinates::new(lat2.to_degrees(), longitude)
    }

    fn points_missed(center: Coordinates, radius_miles: f64, distance_miles: f64) -> Vec<Coordinates> {
        let bbox = BoundingBox::around(center, radius_miles);
        (0..3600)
            .map(|step| destination(center, step as f64 / 10.0, distance_miles))
            .filter(|point| center.distance_miles(point) <= radius_miles)
            .filter(|point| !bbox.contains(point))
            .collect()
    }

    #[rstest]
    #[case(Coordinates::new(65.0, 10.0), 450.0)]
    #[case(Coordinates::new(-72.5, -45.0), 300.0)]
    #[case(Coordinates::new(40.7128, -74.0060), 25.0)]
    #[case(Coordinates::new(0.0, 0.0), 500.0)]
    fn bounding_box_keeps_the_whole_circle(#[case] center: Coordinates, #[case] radius_miles: f64) {
        assert_eq!(points_missed(center, radius_miles, radius_miles - 1.0), vec![]);
    }

    #[rstest]
    #[case(Coordinates::new(-17.7, 179.95), 10.0)]
    #[case(Coordinates::new(51.0, -179.9), 120.0)]
    #[case(Coordinates::new(64.0, 178.0), 400.0)]
    fn bounding_box_wraps_the_antimeridian(#[case] center: Coordinates, #[case] radius_miles: f64) {
        assert_eq!(points_missed(center, radius_miles, radius_miles - 1.0), vec![]);
    }

    #[test]
    fn neighbour_across_the_antimeridian_is_inside() {
        let center = Coordinates::new(-17.7, 179.95);
        let across = Coordinates::new(-17.7, -179.95);
        let bbox = BoundingBox::around(center, 10.0);

        assert!(center.distance_miles(&across) < 10.0);
        assert!(bbox.contains(&across));
        assert_eq!(bbox.longitude_ranges()[0].1, 180.0);
        assert!(!bbox.contains(&Coordinates::new(-17.7, 170.0)));
    }

    #[test]
    fn caps_over_a_pole_span_every_longitude() {
        let bbox = BoundingBox::around(Coordinates::new(89.0, 30.0), 200.0);

        assert_eq!(bbox.longitude_ranges(), [(-180.0, 180.0); 2]);
        assert_eq!(bbox.max_latitude, 90.0);
        assert!(bbox.contains(&Coordinates::new(89.5, -150.0)));
    }
}
