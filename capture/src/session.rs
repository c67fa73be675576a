//! Glues the lifecycle state machine (C5) to the sampling pipeline (C4): a `Session` is what
//! a UI actually drives (§2: "UI → C5 → C4"). It ensures the pipeline's periodic flusher is
//! running exactly while a measurement is RUNNING, and that pause/stop force a final
//! synchronous flush before the lifecycle transition is allowed to complete, so no buffered
//! sample is ever orphaned by a state change.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracekit_store::Store;
use tracing::warn;

use crate::clock::Clock;
use crate::error::LifecycleError;
use crate::lifecycle::{Lifecycle, LifecycleMessage};
use crate::pipeline::{Pipeline, PipelineConfig};

pub struct Session {
    lifecycle: Lifecycle,
    pipeline: Pipeline,
    flusher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(store: Store, clock: Arc<dyn Clock>, config: PipelineConfig) -> Self {
        let lifecycle = Lifecycle::new(store.clone());
        let pipeline = Pipeline::new(store, lifecycle.clone(), clock, config);
        Session { lifecycle, pipeline, flusher: std::sync::Mutex::new(None) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleMessage> {
        self.lifecycle.subscribe()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn set_flusher(&self, handle: Option<JoinHandle<()>>) {
        let mut guard = self.flusher.lock().expect("flusher mutex poisoned");
        if let Some(old) = guard.take() {
            old.abort();
        }
        *guard = handle;
    }

    pub async fn start(&self, time: i64, modality: &str) -> Result<u64, LifecycleError> {
        let id = self.lifecycle.start(time, modality).await?;
        self.set_flusher(Some(self.pipeline.spawn_flusher()));
        Ok(id)
    }

    pub async fn pause(&self, time: i64) -> Result<(), LifecycleError> {
        self.pipeline.flush().await.map_err(|e| LifecycleError::Flush(e.to_string()))?;
        self.lifecycle.pause(time).await?;
        self.set_flusher(None);
        Ok(())
    }

    pub async fn resume(&self, time: i64) -> Result<(), LifecycleError> {
        self.lifecycle.resume(time).await?;
        self.set_flusher(Some(self.pipeline.spawn_flusher()));
        Ok(())
    }

    /// Forces a final synchronous flush, then transitions to STOPPED. Cancels the flusher
    /// task (§5: "`stop()` cancels pending flush scheduling but first forces a final
    /// synchronous flush").
    pub async fn stop(&self, time: i64) -> Result<(), LifecycleError> {
        if let Err(e) = self.pipeline.flush().await {
            warn!(error = %e, "final flush before stop reported an error");
            return Err(LifecycleError::Flush(e.to_string()));
        }
        self.lifecycle.stop(time).await?;
        self.set_flusher(None);
        Ok(())
    }

    pub async fn change_modality(&self, modality: &str, time: i64) -> Result<(), LifecycleError> {
        self.lifecycle.change_modality(modality, time).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::time::Duration;
    use tracekit_proto::{SensorKind, SensorValue};

    fn config() -> PipelineConfig {
        PipelineConfig { flush_interval: Duration::from_millis(50), ..PipelineConfig::default() }
    }

    #[tokio::test]
    async fn pause_flushes_buffered_samples_before_transition() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new(store.clone(), Arc::new(SystemClock), config());

        let id = session.start(0, "WALKING").await.unwrap();
        session
            .pipeline()
            .record_sensor(SensorKind::Acceleration, SensorValue::new(0, 1.0, 1.0, 1.0))
            .await;
        session.pause(100).await.unwrap();

        let measurement = store.load(id).await.unwrap();
        let dir = store.sensor_dir(id);
        let file = tracekit_proto::SensorFile::new(&dir, SensorKind::Acceleration);
        let values = file.read().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(measurement.tracks.len(), 1);
    }

    #[tokio::test]
    async fn stop_flushes_then_marks_synchronizable() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new(store.clone(), Arc::new(SystemClock), config());

        let id = session.start(0, "WALKING").await.unwrap();
        session.stop(1_000).await.unwrap();

        let measurement = store.load(id).await.unwrap();
        assert!(measurement.synchronizable);
    }
}
