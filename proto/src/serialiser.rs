//! The binary serialiser (C6): composes a finished measurement's events, locations and raw
//! sensor-file bytes into a single version-prefixed, DEFLATE-compressed payload, and decodes
//! it back. Current format version is 3; versions 1 and 2 are decode-only (see
//! [`crate::legacy`]).

use std::io::{Read as _, Write as _};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use prost::Message;
use tracekit_codec::{scale, DiffValue};
use tracing::instrument;

use crate::error::SerialisationError;
use crate::legacy;
use crate::pb;

/// The only format version this serialiser ever produces.
pub const CURRENT_FORMAT_VERSION: u16 = 3;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventKind {
    LifecycleStart,
    LifecycleStop,
    LifecyclePause,
    LifecycleResume,
    ModalityTypeChange,
}

impl From<EventKind> for pb::EventType {
    fn from(k: EventKind) -> Self {
        match k {
            EventKind::LifecycleStart => pb::EventType::LifecycleStart,
            EventKind::LifecycleStop => pb::EventType::LifecycleStop,
            EventKind::LifecyclePause => pb::EventType::LifecyclePause,
            EventKind::LifecycleResume => pb::EventType::LifecycleResume,
            EventKind::ModalityTypeChange => pb::EventType::ModalityTypeChange,
        }
    }
}

impl TryFrom<pb::EventType> for EventKind {
    type Error = SerialisationError;

    fn try_from(t: pb::EventType) -> Result<Self, Self::Error> {
        Ok(match t {
            pb::EventType::LifecycleStart => EventKind::LifecycleStart,
            pb::EventType::LifecycleStop => EventKind::LifecycleStop,
            pb::EventType::LifecyclePause => EventKind::LifecyclePause,
            pb::EventType::LifecycleResume => EventKind::LifecycleResume,
            pb::EventType::ModalityTypeChange => EventKind::ModalityTypeChange,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub time: i64,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocationSample {
    pub time: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub speed: f64,
}

/// Everything the serialiser needs from a finished measurement: the parts owned by the
/// entity store (events, locations) plus the raw bytes of the three C2 sensor files.
#[derive(Clone, Debug, PartialEq)]
pub struct SerialisedMeasurement {
    pub format_version: u16,
    pub events: Vec<EventRecord>,
    pub locations: Vec<LocationSample>,
    pub accelerations_binary: Vec<u8>,
    pub rotations_binary: Vec<u8>,
    pub directions_binary: Vec<u8>,
}

/// Encodes `measurement` into the current-version wire payload: a big-endian `u16` format
/// version followed by a DEFLATE-compressed Protobuf `MeasurementBytes`.
#[instrument(skip(measurement), fields(locations = measurement.locations.len(), events = measurement.events.len()))]
pub fn encode(measurement: &SerialisedMeasurement) -> Result<Vec<u8>, SerialisationError> {
    let mut time_enc = DiffValue::<i64>::new();
    let mut lat_enc = DiffValue::<i32>::new();
    let mut lon_enc = DiffValue::<i32>::new();
    let mut acc_enc = DiffValue::<i32>::new();
    let mut speed_enc = DiffValue::<i32>::new();

    let mut timestamp = Vec::with_capacity(measurement.locations.len());
    let mut latitude = Vec::with_capacity(measurement.locations.len());
    let mut longitude = Vec::with_capacity(measurement.locations.len());
    let mut accuracy = Vec::with_capacity(measurement.locations.len());
    let mut speed = Vec::with_capacity(measurement.locations.len());

    for loc in &measurement.locations {
        timestamp.push(time_enc.diff(loc.time)?);
        latitude.push(lat_enc.diff(scale::coord_to_fixed(loc.latitude))?);
        longitude.push(lon_enc.diff(scale::coord_to_fixed(loc.longitude))?);
        accuracy.push(acc_enc.diff(scale::accuracy_to_fixed(loc.accuracy))?);
        speed.push(speed_enc.diff(scale::speed_to_fixed(loc.speed))?);
    }

    let events = measurement
        .events
        .iter()
        .map(|e| pb::Event {
            r#type: pb::EventType::from(e.kind) as i32,
            time: e.time,
            value: e.value.clone(),
        })
        .collect();

    let body = pb::MeasurementBytes {
        format_version: CURRENT_FORMAT_VERSION as u32,
        events,
        location_records: Some(pb::LocationRecords { timestamp, latitude, longitude, accuracy, speed }),
        accelerations_binary: measurement.accelerations_binary.clone(),
        rotations_binary: measurement.rotations_binary.clone(),
        directions_binary: measurement.directions_binary.clone(),
    };

    let plain = body.encode_to_vec();

    let mut encoder = DeflateEncoder::new(Vec::with_capacity(plain.len()), Compression::default());
    encoder
        .write_all(&plain)
        .map_err(|e| SerialisationError::CompressionFailed(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| SerialisationError::CompressionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(2 + compressed.len());
    out.extend_from_slice(&CURRENT_FORMAT_VERSION.to_be_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decodes a payload produced by [`encode`], or one produced by a predecessor format
/// (versions 1 and 2, via [`legacy::decode_legacy`]).
#[instrument(skip(payload), fields(bytes = payload.len()))]
pub fn decode(payload: &[u8]) -> Result<SerialisedMeasurement, SerialisationError> {
    if payload.len() < 2 {
        return Err(SerialisationError::TruncatedLegacyPayload { expected: 2, got: payload.len() });
    }
    let version = u16::from_be_bytes([payload[0], payload[1]]);
    let rest = &payload[2..];

    if version != CURRENT_FORMAT_VERSION {
        return legacy::decode_legacy(version, rest);
    }

    let mut decoder = DeflateDecoder::new(rest);
    let mut plain = Vec::new();
    decoder
        .read_to_end(&mut plain)
        .map_err(|e| SerialisationError::CompressionFailed(e.to_string()))?;

    let body = pb::MeasurementBytes::decode(plain.as_slice())?;

    let recs = body.location_records.unwrap_or_default();
    let n = recs.timestamp.len();
    if recs.latitude.len() != n || recs.longitude.len() != n || recs.accuracy.len() != n || recs.speed.len() != n {
        return Err(SerialisationError::NonSerialisable {
            field: "LocationRecords",
            cause: "field arrays have mismatched lengths".into(),
        });
    }

    let mut time_dec = DiffValue::<i64>::new();
    let mut lat_dec = DiffValue::<i32>::new();
    let mut lon_dec = DiffValue::<i32>::new();
    let mut acc_dec = DiffValue::<i32>::new();
    let mut speed_dec = DiffValue::<i32>::new();

    let mut locations = Vec::with_capacity(n);
    for i in 0..n {
        locations.push(LocationSample {
            time: time_dec.undiff(recs.timestamp[i])?,
            latitude: scale::coord_from_fixed(lat_dec.undiff(recs.latitude[i])?),
            longitude: scale::coord_from_fixed(lon_dec.undiff(recs.longitude[i])?),
            accuracy: scale::accuracy_from_fixed(acc_dec.undiff(recs.accuracy[i])?),
            speed: scale::speed_from_fixed(speed_dec.undiff(recs.speed[i])?),
        });
    }

    let mut events = Vec::with_capacity(body.events.len());
    for e in body.events {
        let kind = pb::EventType::try_from(e.r#type)
            .map_err(|_| SerialisationError::NonSerialisable {
                field: "Event.type",
                cause: format!("unknown event type tag {}", e.r#type),
            })?
            .try_into()?;
        events.push(EventRecord { kind, time: e.time, value: e.value });
    }

    Ok(SerialisedMeasurement {
        format_version: version,
        events,
        locations,
        accelerations_binary: body.accelerations_binary,
        rotations_binary: body.rotations_binary,
        directions_binary: body.directions_binary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn empty_measurement() -> SerialisedMeasurement {
        SerialisedMeasurement {
            format_version: CURRENT_FORMAT_VERSION,
            events: vec![],
            locations: vec![],
            accelerations_binary: vec![],
            rotations_binary: vec![],
            directions_binary: vec![],
        }
    }

    #[test]
    fn empty_measurement_round_trips_with_format_version_3() {
        let m = empty_measurement();
        let payload = encode(&m).unwrap();
        assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 3);

        let back = decode(&payload).unwrap();
        assert_eq!(back.format_version, 3);
        assert!(back.locations.is_empty());
        assert!(back.events.is_empty());
    }

    #[test]
    fn scenario_one_start_stop_no_data() {
        let mut m = empty_measurement();
        m.events = vec![
            EventRecord { kind: EventKind::LifecycleStart, time: 1_000, value: None },
            EventRecord { kind: EventKind::LifecycleStop, time: 2_000, value: None },
        ];
        let payload = encode(&m).unwrap();
        let back = decode(&payload).unwrap();
        assert_eq!(back.events.len(), 2);
        assert_eq!(back.locations.len(), 0);
        assert_eq!(back.format_version, 3);
    }

    #[test]
    fn scenario_two_three_locations_exact_values() {
        let mut m = empty_measurement();
        for t in [10_000, 10_100, 10_200] {
            m.locations.push(LocationSample {
                time: t,
                latitude: 1.0,
                longitude: 1.0,
                accuracy: 1.0,
                speed: 1.0,
            });
        }
        let payload = encode(&m).unwrap();
        let back = decode(&payload).unwrap();
        assert_eq!(back.locations.len(), 3);
        for loc in &back.locations {
            assert!((loc.latitude - 1.0).abs() < 1e-6);
            assert!((loc.longitude - 1.0).abs() < 1e-6);
            assert!((loc.accuracy - 1.0).abs() < 1e-6);
            assert!((loc.speed - 1.0).abs() < 1e-6);
        }
        assert_eq!(back.locations[0].time, 10_000);
        assert_eq!(back.locations[2].time, 10_200);
    }

    proptest! {
        #[test]
        fn round_trips_arbitrary_location_sequences(
            times in prop::collection::vec(0i64..1_000_000, 0..30)
        ) {
            let mut m = empty_measurement();
            let mut t = 0i64;
            for dt in times {
                t += dt;
                m.locations.push(LocationSample {
                    time: t,
                    latitude: 50.0,
                    longitude: 4.0,
                    accuracy: 5.0,
                    speed: 2.5,
                });
            }
            let payload = encode(&m).unwrap();
            let back = decode(&payload).unwrap();
            prop_assert_eq!(back.locations.len(), m.locations.len());
            for (a, b) in back.locations.iter().zip(m.locations.iter()) {
                prop_assert_eq!(a.time, b.time);
            }
        }
    }
}
