//! Initiation metadata (§6): one `x-cy-*` header per field, built from a finished
//! measurement. Track length is the one place C7 depends on C0's distance abstraction
//! (§4.7) rather than reimplementing great-circle distance itself.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracekit_common::DistanceCalculationStrategy;
use tracekit_store::{Location, Measurement};

/// Everything the collector's initiation endpoint needs to know about a measurement before
/// it has seen a single byte of the payload.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadMetadata {
    pub measurement_id: u64,
    pub device_id: String,
    pub format_version: u16,
    pub location_count: usize,
    pub start_time: i64,
    pub end_time: i64,
    pub start_latitude: Option<f64>,
    pub start_longitude: Option<f64>,
    pub end_latitude: Option<f64>,
    pub end_longitude: Option<f64>,
    pub track_length_metres: f64,
    pub os: String,
    pub app_version: String,
    pub modality: String,
}

impl UploadMetadata {
    /// Builds the metadata for `measurement`'s own locations (across every track, in time
    /// order), computing track length via `strategy` over only the cleaned fixes.
    pub fn from_measurement(
        measurement: &Measurement,
        device_id: impl Into<String>,
        format_version: u16,
        os: impl Into<String>,
        app_version: impl Into<String>,
        modality: impl Into<String>,
        strategy: &dyn DistanceCalculationStrategy,
    ) -> Self {
        let locations: Vec<&Location> = measurement.tracks.iter().flat_map(|t| t.locations.iter()).collect();

        let track_length_metres = locations
            .iter()
            .filter(|l| l.is_part_of_cleaned_track)
            .collect::<Vec<_>>()
            .windows(2)
            .map(|w| strategy.distance_metres(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude))
            .sum();

        let first = locations.first();
        let last = locations.last();

        UploadMetadata {
            measurement_id: measurement.id,
            device_id: device_id.into(),
            format_version,
            location_count: locations.len(),
            start_time: measurement.start_time,
            end_time: last.map(|l| l.time).unwrap_or(measurement.start_time),
            start_latitude: first.map(|l| l.latitude),
            start_longitude: first.map(|l| l.longitude),
            end_latitude: last.map(|l| l.latitude),
            end_longitude: last.map(|l| l.longitude),
            track_length_metres,
            os: os.into(),
            app_version: app_version.into(),
            modality: modality.into(),
        }
    }

    /// Renders every field as one `x-cy-*` header, decimal numbers and up to 6 fractional
    /// digits for coordinates (§6).
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let mut put = |name: &'static str, value: String| {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_str(&value).expect("header value is plain ASCII"));
        };

        put("x-cy-measurement-id", self.measurement_id.to_string());
        put("x-cy-device-id", self.device_id.clone());
        put("x-cy-format-version", self.format_version.to_string());
        put("x-cy-location-count", self.location_count.to_string());
        put("x-cy-start-time", self.start_time.to_string());
        put("x-cy-end-time", self.end_time.to_string());
        if let Some(v) = self.start_latitude {
            put("x-cy-start-latitude", format!("{v:.6}"));
        }
        if let Some(v) = self.start_longitude {
            put("x-cy-start-longitude", format!("{v:.6}"));
        }
        if let Some(v) = self.end_latitude {
            put("x-cy-end-latitude", format!("{v:.6}"));
        }
        if let Some(v) = self.end_longitude {
            put("x-cy-end-longitude", format!("{v:.6}"));
        }
        put("x-cy-track-length-metres", format!("{:.3}", self.track_length_metres));
        put("x-cy-os", self.os.clone());
        put("x-cy-app-version", self.app_version.clone());
        put("x-cy-modality", self.modality.clone());
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracekit_common::HaversineStrategy;
    use tracekit_store::Track;

    fn location(lat: f64, lon: f64, time: i64, cleaned: bool) -> Location {
        Location {
            id: 0,
            track_id: 1,
            time,
            latitude: lat,
            longitude: lon,
            horizontal_accuracy: 1.0,
            speed: 0.0,
            altitude: None,
            vertical_accuracy: None,
            is_part_of_cleaned_track: cleaned,
        }
    }

    #[test]
    fn track_length_sums_only_cleaned_fixes() {
        let mut measurement = Measurement::new(1, 0, 12);
        measurement.tracks.push(Track {
            id: 1,
            measurement_id: 1,
            locations: vec![
                location(50.0, 4.0, 0, true),
                location(50.0001, 4.0, 1000, false),
                location(50.001, 4.0, 2000, true),
            ],
            altitudes: vec![],
        });

        let strategy = HaversineStrategy;
        let meta = UploadMetadata::from_measurement(&measurement, "dev-1", 3, "ios", "1.0", "WALKING", &strategy);

        let direct = strategy.distance_metres(50.0, 4.0, 50.001, 4.0);
        assert!((meta.track_length_metres - direct).abs() < 1e-6);
        assert_eq!(meta.location_count, 3);
    }

    #[test]
    fn headers_contain_formatted_coordinates() {
        let mut measurement = Measurement::new(7, 100, 12);
        measurement.tracks.push(Track {
            id: 1,
            measurement_id: 7,
            locations: vec![location(50.85, 4.35, 100, true)],
            altitudes: vec![],
        });

        let strategy = HaversineStrategy;
        let meta = UploadMetadata::from_measurement(&measurement, "dev-1", 3, "ios", "1.0", "WALKING", &strategy);
        let headers = meta.to_headers();
        assert_eq!(headers.get("x-cy-start-latitude").unwrap(), "50.850000");
        assert_eq!(headers.get("x-cy-measurement-id").unwrap(), "7");
    }
}
