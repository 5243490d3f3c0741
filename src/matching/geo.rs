//! Great-circle distance between two registered or ad-hoc locations.

const EARTH_RADIUS_KM: f64 = 6371.0;

pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (lat1, lng1, lat2, lng2) = (
        lat1.to_radians(),
        lng1.to_radians(),
        lat2.to_radians(),
        lng2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero_distance() {
        assert!(haversine_km(23.03, 72.58, 23.03, 72.58) < 1e-6);
    }

    #[test]
    fn ahmedabad_to_mumbai_is_roughly_right() {
        // Ahmedabad (23.03, 72.58) to Mumbai (19.07, 72.87) ~ 445 km.
        let d = haversine_km(23.03, 72.58, 19.07, 72.87);
        assert!(d > 400.0 && d < 500.0, "unexpected distance: {d}");
    }
}
