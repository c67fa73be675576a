//! The measurement lifecycle (C5): a state machine over {IDLE, RUNNING, PAUSED, STOPPED}
//! exposing start/pause/resume/stop/changeModality, each producing exactly one message on a
//! single `tokio::sync::broadcast` channel (§4.5).

use std::sync::Mutex;

use tokio::sync::broadcast;
use tracekit_store::{EventKind, Store};
use tracing::{info, instrument};

use crate::error::LifecycleError;

/// One of the four lifecycle states.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Which measurement and track are currently open, valid only while `state` is `Running` or
/// `Paused`.
#[derive(Clone, Copy, Debug)]
struct Active {
    measurement_id: u64,
    track_id: i64,
}

/// A message emitted onto the lifecycle's broadcast channel. The first message of any
/// lifecycle is always [`LifecycleMessage::Started`]; the last is always
/// [`LifecycleMessage::Stopped`] (§4.5, §8).
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleMessage {
    Started { measurement_id: u64, time: i64 },
    Paused { time: i64 },
    Resumed { time: i64 },
    Stopped { time: i64 },
    ModalityChanged { modality: String, time: i64 },
    /// Consecutive-valid-fix count crossed from 0 to 1 (§4.4).
    HasFix,
    /// Consecutive-valid-fix count crossed from 1 to 0.
    FixLost,
}

const CHANNEL_CAPACITY: usize = 256;

/// Owns the capture state machine. Cheap to clone: clones share the same channel and
/// underlying state.
#[derive(Clone)]
pub struct Lifecycle {
    store: Store,
    state: std::sync::Arc<Mutex<(State, Option<Active>)>>,
    sender: broadcast::Sender<LifecycleMessage>,
}

impl Lifecycle {
    pub fn new(store: Store) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Lifecycle {
            store,
            state: std::sync::Arc::new(Mutex::new((State::Idle, None))),
            sender,
        }
    }

    /// Subscribes to the lifecycle's message stream. Each subscriber receives every message
    /// emitted after the call, independent of other subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleMessage> {
        self.sender.subscribe()
    }

    /// The track currently open for sample intake, or `None` if no measurement is running
    /// (IDLE, PAUSED or STOPPED) — consulted by [`crate::pipeline::Pipeline`] to decide
    /// whether to buffer an incoming sample.
    pub(crate) fn current_track_id(&self) -> Option<i64> {
        self.current_ids().map(|(_, track_id)| track_id)
    }

    /// The `(measurement_id, track_id)` pair currently open for sample intake, or `None` if
    /// no measurement is running.
    pub(crate) fn current_ids(&self) -> Option<(u64, i64)> {
        let (state, active) = *self.state.lock().expect("lifecycle mutex poisoned");
        match state {
            State::Running => active.map(|a| (a.measurement_id, a.track_id)),
            _ => None,
        }
    }

    pub(crate) fn emit(&self, msg: LifecycleMessage) {
        // A `send` error only means there are currently no subscribers; the message is still
        // considered emitted (subscribers that connect later simply miss it), so it is not an
        // error condition for the lifecycle itself.
        let _ = self.sender.send(msg);
    }

    /// IDLE → RUNNING. Creates the Measurement and its first Track.
    #[instrument(skip(self, modality))]
    pub async fn start(&self, time: i64, modality: &str) -> Result<u64, LifecycleError> {
        {
            let (state, _) = *self.state.lock().expect("lifecycle mutex poisoned");
            if state != State::Idle {
                return Err(LifecycleError::IsRunning);
            }
        }

        let measurement = self.store.create_measurement(time, modality).await?;
        self.store.append_event(measurement.id, EventKind::LifecycleStart, time, None).await?;
        let track = self.store.append_track(measurement.id).await?;

        {
            let mut guard = self.state.lock().expect("lifecycle mutex poisoned");
            *guard = (State::Running, Some(Active { measurement_id: measurement.id, track_id: track.id }));
        }

        info!(measurement_id = measurement.id, "measurement started");
        self.emit(LifecycleMessage::Started { measurement_id: measurement.id, time });
        Ok(measurement.id)
    }

    /// RUNNING → PAUSED.
    #[instrument(skip(self))]
    pub async fn pause(&self, time: i64) -> Result<(), LifecycleError> {
        let active = {
            let (state, active) = *self.state.lock().expect("lifecycle mutex poisoned");
            if state != State::Running {
                return Err(LifecycleError::NotRunning);
            }
            active.expect("running implies an active measurement")
        };

        self.store.append_event(active.measurement_id, EventKind::LifecyclePause, time, None).await?;

        {
            let mut guard = self.state.lock().expect("lifecycle mutex poisoned");
            guard.0 = State::Paused;
        }
        self.emit(LifecycleMessage::Paused { time });
        Ok(())
    }

    /// PAUSED → RUNNING. Appends a new Track.
    #[instrument(skip(self))]
    pub async fn resume(&self, time: i64) -> Result<(), LifecycleError> {
        let measurement_id = {
            let (state, active) = *self.state.lock().expect("lifecycle mutex poisoned");
            if state != State::Paused {
                return Err(LifecycleError::NotPaused);
            }
            active.expect("paused implies an active measurement").measurement_id
        };

        self.store.append_event(measurement_id, EventKind::LifecycleResume, time, None).await?;
        let track = self.store.append_track(measurement_id).await?;

        {
            let mut guard = self.state.lock().expect("lifecycle mutex poisoned");
            *guard = (State::Running, Some(Active { measurement_id, track_id: track.id }));
        }
        self.emit(LifecycleMessage::Resumed { time });
        Ok(())
    }

    /// RUNNING or PAUSED → STOPPED. Marks the Measurement synchronizable.
    #[instrument(skip(self))]
    pub async fn stop(&self, time: i64) -> Result<(), LifecycleError> {
        let measurement_id = {
            let (state, active) = *self.state.lock().expect("lifecycle mutex poisoned");
            if state != State::Running && state != State::Paused {
                return Err(LifecycleError::NotRunning);
            }
            active.expect("running/paused implies an active measurement").measurement_id
        };

        self.store.append_event(measurement_id, EventKind::LifecycleStop, time, None).await?;
        self.store.mark_synchronizable(measurement_id).await?;

        {
            let mut guard = self.state.lock().expect("lifecycle mutex poisoned");
            *guard = (State::Stopped, None);
        }
        info!(measurement_id, "measurement stopped");
        self.emit(LifecycleMessage::Stopped { time });
        Ok(())
    }

    /// RUNNING → RUNNING, recording a MODALITY_TYPE_CHANGE event.
    #[instrument(skip(self, modality))]
    pub async fn change_modality(&self, modality: &str, time: i64) -> Result<(), LifecycleError> {
        let measurement_id = {
            let (state, active) = *self.state.lock().expect("lifecycle mutex poisoned");
            if state != State::Running {
                return Err(LifecycleError::NotRunning);
            }
            active.expect("running implies an active measurement").measurement_id
        };

        self.store
            .append_event(measurement_id, EventKind::ModalityTypeChange, time, Some(modality.to_string()))
            .await?;
        self.emit(LifecycleMessage::ModalityChanged { modality: modality.to_string(), time });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_lifecycle() -> Lifecycle {
        Lifecycle::new(Store::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn start_twice_fails_with_is_running() {
        let lc = new_lifecycle().await;
        lc.start(0, "WALKING").await.unwrap();
        let err = lc.start(0, "WALKING").await.unwrap_err();
        assert!(matches!(err, LifecycleError::IsRunning));
    }

    #[tokio::test]
    async fn pause_without_running_fails() {
        let lc = new_lifecycle().await;
        let err = lc.pause(0).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotRunning));
    }

    #[tokio::test]
    async fn resume_without_pause_fails() {
        let lc = new_lifecycle().await;
        lc.start(0, "WALKING").await.unwrap();
        let err = lc.resume(0).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotPaused));
    }

    #[tokio::test]
    async fn scenario_three_pause_resume_cycle_produces_two_tracks_and_ordered_events() {
        let lc = new_lifecycle().await;
        let mut rx = lc.subscribe();

        let id = lc.start(0, "BICYCLE").await.unwrap();
        lc.pause(500).await.unwrap();
        lc.resume(1_000).await.unwrap();
        lc.stop(1_500).await.unwrap();

        let measurement = lc.store.load(id).await.unwrap();
        assert_eq!(measurement.tracks.len(), 2);

        let kinds: Vec<_> = measurement.events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ModalityTypeChange,
                EventKind::LifecycleStart,
                EventKind::LifecyclePause,
                EventKind::LifecycleResume,
                EventKind::LifecycleStop,
            ]
        );

        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        assert!(matches!(messages.first(), Some(LifecycleMessage::Started { .. })));
        assert!(matches!(messages.last(), Some(LifecycleMessage::Stopped { .. })));
    }

    #[tokio::test]
    async fn stop_marks_measurement_synchronizable() {
        let lc = new_lifecycle().await;
        let id = lc.start(0, "CAR").await.unwrap();
        lc.stop(100).await.unwrap();
        let measurement = lc.store.load(id).await.unwrap();
        assert!(measurement.synchronizable);
        assert!(!measurement.synchronized);
    }
}
