//! Decode-only support for the two wire formats that predate the current Protobuf framing.
//! Nothing in this crate ever *produces* a v1 or v2 payload; this module exists purely so a
//! store that still holds old payloads (from before an app upgrade) can read them once, at
//! which point the store migrator (C9) re-serialises them in the current format.
//!
//! Layout, both versions: `u16 version; u32 locCount; u32 accelCount; u32 rotCount; u32
//! dirCount;` followed by that many fixed-width records per section, location records first,
//! then acceleration, rotation, direction samples, each `i64` timestamp + `i32`×3 axis/fields,
//! absolute (not diff-encoded — that refinement came with format version 3). Version 2 adds a
//! trailing `u32 eventCount` followed by that many `(u8 kind, i64 time, u8 has_value, [u32
//! len, bytes]?)` records; version 1 predates events entirely and always decodes to an empty
//! event list.

use std::convert::TryInto;

use crate::error::SerialisationError;
use crate::serialiser::{EventKind, EventRecord, LocationSample, SerialisedMeasurement};

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn need(&self, n: usize) -> Result<(), SerialisationError> {
        if self.buf.len() - self.pos < n {
            return Err(SerialisationError::TruncatedLegacyPayload {
                expected: self.pos + n,
                got: self.buf.len(),
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, SerialisationError> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn u32(&mut self) -> Result<u32, SerialisationError> {
        self.need(4)?;
        let v = u32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn i32(&mut self) -> Result<i32, SerialisationError> {
        Ok(self.u32()? as i32)
    }

    fn i64(&mut self) -> Result<i64, SerialisationError> {
        self.need(8)?;
        let v = i64::from_be_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], SerialisationError> {
        self.need(n)?;
        let v = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(v)
    }
}

pub fn decode_legacy(version: u16, body: &[u8]) -> Result<SerialisedMeasurement, SerialisationError> {
    if version != 1 && version != 2 {
        return Err(SerialisationError::UnsupportedVersion(version));
    }

    let mut r = Reader::new(body);
    let loc_count = r.u32()? as usize;
    let accel_count = r.u32()? as usize;
    let rot_count = r.u32()? as usize;
    let dir_count = r.u32()? as usize;

    let mut locations = Vec::with_capacity(loc_count);
    for _ in 0..loc_count {
        let time = r.i64()?;
        let latitude = r.i32()? as f64 / tracekit_codec::scale::COORD_SCALE;
        let longitude = r.i32()? as f64 / tracekit_codec::scale::COORD_SCALE;
        let accuracy = r.i32()? as f64 / tracekit_codec::scale::ACCURACY_SCALE;
        locations.push(LocationSample { time, latitude, longitude, accuracy, speed: 0.0 });
    }

    let accelerations_binary = decode_raw_samples_section(&mut r, accel_count)?;
    let rotations_binary = decode_raw_samples_section(&mut r, rot_count)?;
    let directions_binary = decode_raw_samples_section(&mut r, dir_count)?;

    let events = if version >= 2 {
        let event_count = r.u32()? as usize;
        let mut events = Vec::with_capacity(event_count);
        for _ in 0..event_count {
            let kind = match r.u8()? {
                0 => EventKind::LifecycleStart,
                1 => EventKind::LifecycleStop,
                2 => EventKind::LifecyclePause,
                3 => EventKind::LifecycleResume,
                4 => EventKind::ModalityTypeChange,
                other => {
                    return Err(SerialisationError::NonSerialisable {
                        field: "Event.kind",
                        cause: format!("unknown legacy event kind {other}"),
                    })
                }
            };
            let time = r.i64()?;
            let value = if r.u8()? != 0 {
                let len = r.u32()? as usize;
                Some(String::from_utf8_lossy(r.bytes(len)?).into_owned())
            } else {
                None
            };
            events.push(EventRecord { kind, time, value });
        }
        events
    } else {
        Vec::new()
    };

    Ok(SerialisedMeasurement {
        format_version: version,
        events,
        locations,
        accelerations_binary,
        rotations_binary,
        directions_binary,
    })
}

/// Legacy sample sections were never diff-encoded; this re-packs them into the current
/// `AccelerationsBinary` group format so the rest of the pipeline (including the sensor-file
/// store) can treat a freshly-migrated measurement the same as any other.
fn decode_raw_samples_section(r: &mut Reader<'_>, count: usize) -> Result<Vec<u8>, SerialisationError> {
    use prost::Message;
    use tracekit_codec::{scale, DiffValue};

    if count == 0 {
        return Ok(Vec::new());
    }

    let mut raw = Vec::with_capacity(count);
    for _ in 0..count {
        let time = r.i64()?;
        let x = r.i32()?;
        let y = r.i32()?;
        let z = r.i32()?;
        raw.push((time, x, y, z));
    }

    let mut time_enc = DiffValue::<i64>::new();
    let mut x_enc = DiffValue::<i32>::new();
    let mut y_enc = DiffValue::<i32>::new();
    let mut z_enc = DiffValue::<i32>::new();

    let mut timestamp = Vec::with_capacity(count);
    let mut x = Vec::with_capacity(count);
    let mut y = Vec::with_capacity(count);
    let mut z = Vec::with_capacity(count);

    for (t, sx, sy, sz) in raw {
        timestamp.push(time_enc.diff(t)?);
        x.push(x_enc.diff(sx)?);
        y.push(y_enc.diff(sy)?);
        z.push(z_enc.diff(sz)?);
    }
    let _ = scale::SENSOR_SCALE; // legacy axis values are already millimetre-fixed, no rescale

    let group = crate::pb::Accelerations { timestamp, x, y, z };
    let binary = crate::pb::AccelerationsBinary { accelerations: vec![group] };
    Ok(binary.encode_to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_file::SensorFile;
    use rstest::rstest;

    /// Hand-assembles a legacy body: `u32` section counts, one location record, one
    /// acceleration sample, empty rotation/direction, and (for `version == 2`) one event.
    fn legacy_body(version: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_be_bytes()); // locCount
        buf.extend_from_slice(&1u32.to_be_bytes()); // accelCount
        buf.extend_from_slice(&0u32.to_be_bytes()); // rotCount
        buf.extend_from_slice(&0u32.to_be_bytes()); // dirCount

        // one location: time=10_000, lat=1.0, lon=1.0, accuracy=1.0
        buf.extend_from_slice(&10_000i64.to_be_bytes());
        buf.extend_from_slice(&1_000_000i32.to_be_bytes());
        buf.extend_from_slice(&1_000_000i32.to_be_bytes());
        buf.extend_from_slice(&100i32.to_be_bytes());

        // one acceleration sample: time=10_000, x=1000,y=1000,z=1000 (millimetre-fixed already)
        buf.extend_from_slice(&10_000i64.to_be_bytes());
        buf.extend_from_slice(&1_000i32.to_be_bytes());
        buf.extend_from_slice(&1_000i32.to_be_bytes());
        buf.extend_from_slice(&1_000i32.to_be_bytes());

        if version >= 2 {
            buf.extend_from_slice(&1u32.to_be_bytes()); // eventCount
            buf.push(0); // kind = LIFECYCLE_START
            buf.extend_from_slice(&5_000i64.to_be_bytes());
            buf.push(0); // has_value = false
        }

        buf
    }

    #[rstest]
    #[case::v1(1, 0)]
    #[case::v2(2, 1)]
    fn decodes_location_and_acceleration_sections_for_every_supported_version(
        #[case] version: u16,
        #[case] expected_events: usize,
    ) {
        let body = legacy_body(version);
        let measurement = decode_legacy(version, &body).unwrap();

        assert_eq!(measurement.format_version, version);
        assert_eq!(measurement.events.len(), expected_events);
        assert_eq!(measurement.locations.len(), 1);
        assert_eq!(measurement.locations[0].time, 10_000);
        assert!((measurement.locations[0].latitude - 1.0).abs() < 1e-6);
        assert!((measurement.locations[0].longitude - 1.0).abs() < 1e-6);
        assert!((measurement.locations[0].accuracy - 1.0).abs() < 1e-6);
        assert_eq!(measurement.locations[0].speed, 0.0);
        assert!(!measurement.accelerations_binary.is_empty());
        assert!(measurement.rotations_binary.is_empty());
        assert!(measurement.directions_binary.is_empty());
    }

    #[test]
    fn decodes_version_two_event_section() {
        let body = legacy_body(2);
        let measurement = decode_legacy(2, &body).unwrap();

        assert_eq!(measurement.events[0].kind, EventKind::LifecycleStart);
        assert_eq!(measurement.events[0].time, 5_000);
        assert_eq!(measurement.events[0].value, None);
    }

    #[test]
    fn re_packed_acceleration_bytes_decode_through_the_current_sensor_file_reader() {
        let body = legacy_body(1);
        let measurement = decode_legacy(1, &body).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = SensorFile::new(dir.path(), crate::sensor_file::SensorKind::Acceleration).path().to_path_buf();
        std::fs::write(&path, &measurement.accelerations_binary).unwrap();

        let file = SensorFile::new(dir.path(), crate::sensor_file::SensorKind::Acceleration);
        let values = file.read().unwrap();
        assert_eq!(values.len(), 1);
        assert!((values[0].x - 1.0).abs() < 1e-3);
        assert!((values[0].y - 1.0).abs() < 1e-3);
        assert!((values[0].z - 1.0).abs() < 1e-3);
    }

    #[test]
    fn truncated_body_is_rejected_not_panicking() {
        let err = decode_legacy(1, &[0, 0, 0, 1]).unwrap_err();
        assert!(matches!(err, SerialisationError::TruncatedLegacyPayload { .. }));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let err = decode_legacy(4, &[]).unwrap_err();
        assert!(matches!(err, SerialisationError::UnsupportedVersion(4)));
    }
}
