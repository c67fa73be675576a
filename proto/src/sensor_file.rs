//! The sensor-value file store (C2): one append-only file per sensor kind, holding a
//! concatenation of length-delimited `Accelerations` groups. Each `append` call diff-encodes
//! and scales one batch into a fresh group and appends it; `read` decodes every complete
//! group in the file, discarding a truncated trailing one rather than treating it as
//! corruption — this is what lets an append survive a crash mid-write.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use prost::Message;
use tracekit_codec::{scale, DiffValue};
use tracing::{debug, instrument, warn};

use crate::error::SerialisationError;
use crate::pb;
use crate::sensor_value::SensorValue;

/// Which of the three inertial sensors a file holds. Each maps to a fixed on-disk filename
/// and extension.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SensorKind {
    Acceleration,
    Rotation,
    Direction,
}

impl SensorKind {
    pub fn filename(self) -> &'static str {
        match self {
            SensorKind::Acceleration => "accel.cyfa",
            SensorKind::Rotation => "rot.cyfr",
            SensorKind::Direction => "dir.cyfd",
        }
    }
}

/// One append-only sensor-value file, located under a per-measurement directory.
#[derive(Debug)]
pub struct SensorFile {
    path: PathBuf,
}

impl SensorFile {
    /// Opens (without creating) the file for `kind` under `measurement_dir`.
    pub fn new(measurement_dir: impl AsRef<Path>, kind: SensorKind) -> Self {
        SensorFile {
            path: measurement_dir.as_ref().join(kind.filename()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Diff-encodes and scales `batch` into a fresh `Accelerations` group and appends it.
    /// Fails with [`SerialisationError::EmptyBatch`] for an empty batch, matching the
    /// contract that every append represents a real flush.
    #[instrument(skip(self, batch), fields(path = %self.path.display(), len = batch.len()))]
    pub fn append(&self, batch: &[SensorValue]) -> Result<(), SerialisationError> {
        if batch.is_empty() {
            return Err(SerialisationError::EmptyBatch);
        }

        let mut time_enc = DiffValue::<i64>::new();
        let mut x_enc = DiffValue::<i32>::new();
        let mut y_enc = DiffValue::<i32>::new();
        let mut z_enc = DiffValue::<i32>::new();

        let mut timestamp = Vec::with_capacity(batch.len());
        let mut x = Vec::with_capacity(batch.len());
        let mut y = Vec::with_capacity(batch.len());
        let mut z = Vec::with_capacity(batch.len());

        for v in batch {
            timestamp.push(time_enc.diff(v.time)?);
            x.push(x_enc.diff(scale::sensor_to_fixed(v.x))?);
            y.push(y_enc.diff(scale::sensor_to_fixed(v.y))?);
            z.push(z_enc.diff(scale::sensor_to_fixed(v.z))?);
        }

        // One `AccelerationsBinary` carrying a single group encodes as exactly one
        // (field tag, length, payload) entry for the `accelerations` repeated field.
        // Protobuf's wire format concatenates repeated-field entries byte-for-byte, so
        // appending these entries one at a time produces a file whose full contents are a
        // valid `AccelerationsBinary` with all appended groups — no re-encoding of prior
        // groups ever needed.
        let group = pb::Accelerations { timestamp, x, y, z };
        let wrapper = pb::AccelerationsBinary { accelerations: vec![group] };
        let buf = wrapper.encode_to_vec();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SerialisationError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SerialisationError::Io { path: self.path.clone(), source })?;
        file.write_all(&buf).map_err(|source| SerialisationError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(groups_appended = 1, "sensor batch appended");
        Ok(())
    }

    /// Decodes every complete group in the file, in order, and reverses the scaling and
    /// diff-encoding applied by `append`. A truncated trailing group (declared length
    /// running past EOF) is silently dropped.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Vec<SensorValue>, SerialisationError> {
        let data = match fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(SerialisationError::Io { path: self.path.clone(), source }),
        };

        let mut values = Vec::new();
        let mut cursor: &[u8] = &data;

        loop {
            match decode_one_entry(&mut cursor) {
                Ok(Some(group)) => values.extend(decode_group(group)?),
                Ok(None) => break,
                Err(_) => {
                    warn!("dropping truncated trailing group");
                    break;
                }
            }
        }

        Ok(values)
    }

    /// Removes the file; if its parent directory is now empty, removes that too.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn delete(&self) -> Result<(), SerialisationError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(SerialisationError::Io { path: self.path.clone(), source }),
        }

        if let Some(parent) = self.path.parent() {
            if let Ok(mut entries) = fs::read_dir(parent) {
                if entries.next().is_none() {
                    let _ = fs::remove_dir(parent);
                }
            }
        }
        Ok(())
    }
}

/// Parses one `(tag, length, payload)` entry of the `accelerations` repeated field directly
/// off the wire, so a truncated trailing entry can be dropped instead of failing the whole
/// decode the way `AccelerationsBinary::decode` would.
///
/// Returns `Ok(None)` at a clean end of stream (zero bytes remaining before a tag is read).
fn decode_one_entry(cursor: &mut &[u8]) -> Result<Option<pb::Accelerations>, prost::DecodeError> {
    use prost::bytes::Buf;
    use prost::encoding::{decode_key, decode_varint, WireType};

    if !cursor.has_remaining() {
        return Ok(None);
    }

    let (tag, wire_type) = decode_key(cursor)?;
    if tag != 1 || wire_type != WireType::LengthDelimited {
        return Err(prost::DecodeError::new("unexpected field in sensor file"));
    }

    let len = decode_varint(cursor)? as usize;
    if cursor.remaining() < len {
        return Err(prost::DecodeError::new("truncated group"));
    }

    let payload = &cursor[..len];
    let group = pb::Accelerations::decode(payload)?;
    cursor.advance(len);
    Ok(Some(group))
}

fn decode_group(group: pb::Accelerations) -> Result<Vec<SensorValue>, SerialisationError> {
    let mut time_dec = DiffValue::<i64>::new();
    let mut x_dec = DiffValue::<i32>::new();
    let mut y_dec = DiffValue::<i32>::new();
    let mut z_dec = DiffValue::<i32>::new();

    let n = group.timestamp.len();
    if group.x.len() != n || group.y.len() != n || group.z.len() != n {
        return Err(SerialisationError::NonSerialisable {
            field: "Accelerations",
            cause: "axis arrays have mismatched lengths".into(),
        });
    }

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let time = time_dec.undiff(group.timestamp[i])?;
        let x = scale::sensor_from_fixed(x_dec.undiff(group.x[i])?);
        let y = scale::sensor_from_fixed(y_dec.undiff(group.y[i])?);
        let z = scale::sensor_from_fixed(z_dec.undiff(group.z[i])?);
        out.push(SensorValue::new(time, x, y, z));
    }
    Ok(out)
}
