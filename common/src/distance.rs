//! Distance calculation is kept behind a small trait so the track-length computation in
//! `tracekit-store` (C7) does not hard-code a particular approximation. The default,
//! [`HaversineStrategy`], treats the earth as a sphere, which is accurate enough for the
//! short inter-fix distances accumulated into a track length.

/// Mean earth radius in metres (IUGG value), used by [`HaversineStrategy`].
const EARTH_RADIUS_METRES: f64 = 6_371_008.8;

/// Computes the distance, in metres, between two WGS84 points.
///
/// Implementations are expected to be cheap and side-effect free; the store calls this
/// once per consecutive pair of cleaned-track locations when recomputing a track's length.
pub trait DistanceCalculationStrategy: Send + Sync {
    fn distance_metres(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64;
}

/// Great-circle distance via the haversine formula.
#[derive(Clone, Copy, Debug, Default)]
pub struct HaversineStrategy;

impl DistanceCalculationStrategy for HaversineStrategy {
    fn distance_metres(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let (lat1, lon1, lat2, lon2) = (
            lat1.to_radians(),
            lon1.to_radians(),
            lat2.to_radians(),
            lon2.to_radians(),
        );
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_METRES * c
    }
}
