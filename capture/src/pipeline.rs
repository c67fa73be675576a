//! The sampling pipeline (C4): fan-in from five OS sensor-callback sources into four
//! in-memory ring buffers guarded by one mutex, drained by a periodic flusher into C2 (sensor
//! files) and C3 (locations/altitudes). The OS callback contracts themselves are external
//! collaborators (§1); this module only owns what happens once a sample has arrived.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracekit_proto::{SensorFile, SensorKind, SensorValue};
use tracekit_store::{NewAltitude, NewLocation, Store};
use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::lifecycle::{Lifecycle, LifecycleMessage};

/// One geolocation fix as delivered by the host's OS callback, before accuracy/lag
/// filtering. The arrival time is not part of this struct: the pipeline stamps it itself
/// from its shared clock the moment the fix is handed to [`Pipeline::record_location`],
/// rather than trusting a value the host computed (§4.4).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawFix {
    /// The fix's own event time, as reported by the OS.
    pub time: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    pub speed: f64,
    pub altitude: Option<f64>,
    pub vertical_accuracy: Option<f64>,
}

/// Tunables consulted by the pipeline (§6): mirrors `tracekit_common::CaptureConfig`'s
/// capture-relevant fields without coupling this crate to the config file format.
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub flush_interval: Duration,
    /// Horizontal-accuracy rejection threshold, in metres.
    pub location_accuracy_metres: f64,
    /// Maximum age, in seconds, a fix's event time may lag its arrival time.
    pub location_max_lag_seconds: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            flush_interval: Duration::from_millis(1000),
            location_accuracy_metres: 20.0,
            location_max_lag_seconds: 10,
        }
    }
}

#[derive(Default)]
struct Buffers {
    acceleration: Vec<SensorValue>,
    rotation: Vec<SensorValue>,
    direction: Vec<SensorValue>,
    locations: Vec<(RawFix, bool)>,
    altitudes: Vec<(f64, i64)>,
}

/// Owns the four ring buffers and the periodic flusher. Cheap to clone; clones share state
/// and the same background flusher task.
#[derive(Clone)]
pub struct Pipeline {
    store: Store,
    lifecycle: Lifecycle,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    buffers: Arc<Mutex<Buffers>>,
    consecutive_valid_fixes: Arc<AtomicU32>,
}

impl Pipeline {
    pub fn new(store: Store, lifecycle: Lifecycle, clock: Arc<dyn Clock>, config: PipelineConfig) -> Self {
        Pipeline {
            store,
            lifecycle,
            clock,
            config,
            buffers: Arc::new(Mutex::new(Buffers::default())),
            consecutive_valid_fixes: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Spawns the periodic flusher on the current Tokio runtime. The returned handle may be
    /// aborted, but prefer [`Self::stop`] so the final flush happens synchronously first.
    pub fn spawn_flusher(&self) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(pipeline.config.flush_interval);
            loop {
                interval.tick().await;
                if let Err(e) = pipeline.flush().await {
                    warn!(error = %e, "periodic flush failed");
                }
            }
        })
    }

    /// Called by the host from its accelerometer/gyroscope/magnetometer callback. Samples
    /// arriving while no measurement is running are discarded rather than buffered (§5).
    #[instrument(skip(self, value))]
    pub async fn record_sensor(&self, kind: SensorKind, value: SensorValue) {
        if self.lifecycle.current_track_id().is_none() {
            return;
        }
        let mut buffers = self.buffers.lock().await;
        match kind {
            SensorKind::Acceleration => buffers.acceleration.push(value),
            SensorKind::Rotation => buffers.rotation.push(value),
            SensorKind::Direction => buffers.direction.push(value),
        }
    }

    /// Called by the host from its altimeter callback.
    #[instrument(skip(self))]
    pub async fn record_altitude(&self, value: f64, time: i64) {
        if self.lifecycle.current_track_id().is_none() {
            return;
        }
        self.buffers.lock().await.altitudes.push((value, time));
    }

    /// Called by the host from its geolocation callback. Applies the accuracy/lag filter
    /// (§4.4) and updates the hasFix/fixLost transition counter; the fix is buffered either
    /// way, with `isPartOfCleanedTrack` recording the filter's verdict.
    #[instrument(skip(self))]
    pub async fn record_location(&self, fix: RawFix) {
        if self.lifecycle.current_track_id().is_none() {
            return;
        }

        let arrival_time = self.clock.now_millis();
        let lag_ms = (arrival_time - fix.time).max(0);
        let rejected = fix.horizontal_accuracy >= self.config.location_accuracy_metres
            || lag_ms > self.config.location_max_lag_seconds * 1000;

        self.update_fix_transition(!rejected);

        self.buffers.lock().await.locations.push((fix, !rejected));
    }

    fn update_fix_transition(&self, valid: bool) {
        let previous = if valid {
            self.consecutive_valid_fixes.fetch_add(1, Ordering::SeqCst)
        } else {
            self.consecutive_valid_fixes.swap(0, Ordering::SeqCst)
        };

        if valid && previous == 0 {
            self.lifecycle.emit(LifecycleMessage::HasFix);
        } else if !valid && previous >= 1 {
            self.lifecycle.emit(LifecycleMessage::FixLost);
        }
    }

    /// Drains every ring buffer atomically and persists the batch to C2 (sensor files) and
    /// C3 (locations/altitudes). A kind with no buffered samples is simply skipped — an
    /// empty batch would otherwise fail C2's `append` with `EmptyBatch`.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<(), FlushError> {
        let Some((measurement_id, track_id)) = self.lifecycle.current_ids() else {
            return Ok(());
        };

        let mut taken = {
            let mut buffers = self.buffers.lock().await;
            std::mem::take(&mut *buffers)
        };

        if !taken.acceleration.is_empty() {
            self.append_sensor_file(measurement_id, SensorKind::Acceleration, &taken.acceleration).await?;
        }
        if !taken.rotation.is_empty() {
            self.append_sensor_file(measurement_id, SensorKind::Rotation, &taken.rotation).await?;
        }
        if !taken.direction.is_empty() {
            self.append_sensor_file(measurement_id, SensorKind::Direction, &taken.direction).await?;
        }

        for (fix, is_cleaned) in taken.locations.drain(..) {
            self.store
                .append_location(
                    track_id,
                    NewLocation {
                        time: fix.time,
                        latitude: fix.latitude,
                        longitude: fix.longitude,
                        horizontal_accuracy: fix.horizontal_accuracy,
                        speed: fix.speed,
                        altitude: fix.altitude,
                        vertical_accuracy: fix.vertical_accuracy,
                        is_part_of_cleaned_track: is_cleaned,
                    },
                )
                .await?;
        }
        for (value, time) in taken.altitudes.drain(..) {
            self.store.append_altitude(track_id, NewAltitude { value, time }).await?;
        }

        debug!("flush complete");
        Ok(())
    }

    async fn append_sensor_file(&self, measurement_id: u64, kind: SensorKind, batch: &[SensorValue]) -> Result<(), FlushError> {
        let dir = self.store.sensor_dir(measurement_id);
        let batch = batch.to_vec();
        tokio::task::spawn_blocking(move || SensorFile::new(&dir, kind).append(&batch))
            .await
            .map_err(|_| FlushError::WorkerPanicked)??;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error(transparent)]
    Serialisation(#[from] tracekit_proto::SerialisationError),
    #[error(transparent)]
    Store(#[from] tracekit_store::PersistenceError),
    #[error("flush worker panicked")]
    WorkerPanicked,
}
