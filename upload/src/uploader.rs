//! The resumable upload protocol (C7): initiation, chunked transfer, and recovery after a
//! process restart, against a Google-Resumable-Upload-style collector (§4.7, §6).

use std::collections::HashSet;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracekit_proto::{EventRecord, LocationSample, SensorFile, SensorKind, SerialisedMeasurement};
use tracekit_store::{Measurement, Store, UploadTask};
use tracing::{info, instrument, warn};

use crate::auth::Authenticator;
use crate::error::{NetworkError, UploadError};
use crate::metadata::UploadMetadata;

/// Bytes sent per `PUT` chunk.
const CHUNK_SIZE: usize = 256 * 1024;

/// Bounded retry count for a transient (transport or 5xx) failure on one chunk.
const MAX_TRANSIENT_RETRIES: u32 = 4;

/// The four externally observable terminal states of one upload attempt (§7). `started` is
/// implicit: it is the state the caller is already in by virtue of calling
/// [`Uploader::upload`], which only returns once the attempt has reached one of the other
/// three.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    FinishedSuccessfully,
    /// A non-retryable rejection (404/409, or any other 4xx once auth has already been
    /// retried once): the session is left registered for manual inspection rather than
    /// deleted.
    FinishedUnsuccessfully { cause: String },
    /// A transient or unexpected failure; the session is retained and a later call may
    /// succeed.
    FinishedWithError { cause: String },
}

/// Drives resumable uploads for every measurement, enforcing the "at most one upload in
/// flight per measurement" invariant (§5) via `in_flight`.
pub struct Uploader {
    store: Store,
    client: Client,
    collector_base_url: String,
    authenticator: Authenticator,
    in_flight: StdMutex<HashSet<u64>>,
}

impl Uploader {
    pub fn new(store: Store, collector_base_url: impl Into<String>, authenticator: Authenticator) -> Self {
        Uploader {
            store,
            client: Client::new(),
            collector_base_url: collector_base_url.into(),
            authenticator,
            in_flight: StdMutex::new(HashSet::new()),
        }
    }

    fn guard(&self, measurement_id: u64) -> Result<InFlightGuard<'_>, UploadError> {
        let mut set = self.in_flight.lock().expect("poisoned");
        if !set.insert(measurement_id) {
            return Err(UploadError::AlreadyUploading(measurement_id));
        }
        Ok(InFlightGuard { uploader: self, measurement_id })
    }

    /// Uploads `measurement_id` end to end: builds the payload from the store, initiates a
    /// session (or resumes one already registered), transfers the payload, and marks the
    /// measurement synchronized on success.
    #[instrument(skip(self, cancel))]
    pub async fn upload(&self, measurement_id: u64, metadata: UploadMetadata, cancel: &CancellationToken) -> Result<UploadOutcome, UploadError> {
        let _guard = self.guard(measurement_id)?;

        let payload = self.build_payload(measurement_id).await?;

        let attempt = async {
            let session_url = match self.store.load_session(measurement_id).await? {
                Some(session) => session.session_url,
                None => self.initiate(measurement_id, &metadata, cancel).await?,
            };
            self.transfer(measurement_id, &session_url, &payload, cancel).await
        }
        .await;

        match attempt {
            Ok(()) => {
                self.store.mark_synchronized(measurement_id).await?;
                self.store.delete_session(measurement_id).await?;
                info!(measurement_id, "upload complete");
                Ok(UploadOutcome::FinishedSuccessfully)
            }
            Err(UploadError::Cancelled) => Err(UploadError::Cancelled),
            Err(UploadError::Network(NetworkError::ServerRejected { reason })) => {
                warn!(measurement_id, reason = %reason, "upload finished unsuccessfully, session retained for inspection");
                Ok(UploadOutcome::FinishedUnsuccessfully { cause: reason })
            }
            Err(e) => {
                warn!(measurement_id, error = %e, "upload attempt ended with an error, session retained");
                Ok(UploadOutcome::FinishedWithError { cause: e.to_string() })
            }
        }
    }

    async fn build_payload(&self, measurement_id: u64) -> Result<Vec<u8>, UploadError> {
        let measurement: Measurement = self.store.load(measurement_id).await?;
        let dir = self.store.sensor_dir(measurement_id);

        let (accel, rot, dir_bin) = {
            let dir = dir.clone();
            tokio::task::spawn_blocking(move || {
                let read_raw = |kind: SensorKind| -> std::io::Result<Vec<u8>> {
                    match std::fs::read(SensorFile::new(&dir, kind).path()) {
                        Ok(bytes) => Ok(bytes),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
                        Err(e) => Err(e),
                    }
                };
                Ok::<_, std::io::Error>((
                    read_raw(SensorKind::Acceleration)?,
                    read_raw(SensorKind::Rotation)?,
                    read_raw(SensorKind::Direction)?,
                ))
            })
            .await
            .map_err(|_| UploadError::WorkerPanicked)??
        };

        let events = measurement
            .events
            .iter()
            .map(|e| EventRecord { kind: e.kind, time: e.time, value: e.value.clone() })
            .collect();

        let locations = measurement
            .tracks
            .iter()
            .flat_map(|t| t.locations.iter())
            .map(|l| LocationSample { time: l.time, latitude: l.latitude, longitude: l.longitude, accuracy: l.horizontal_accuracy, speed: l.speed })
            .collect();

        let serialised = SerialisedMeasurement {
            format_version: tracekit_proto::CURRENT_FORMAT_VERSION,
            events,
            locations,
            accelerations_binary: accel,
            rotations_binary: rot,
            directions_binary: dir_bin,
        };

        Ok(tracekit_proto::encode(&serialised)?)
    }

    #[instrument(skip(self, metadata, cancel))]
    async fn initiate(&self, measurement_id: u64, metadata: &UploadMetadata, cancel: &CancellationToken) -> Result<String, UploadError> {
        let token = self.authenticator.authenticate().await?;
        let url = format!("{}/measurements", self.collector_base_url.trim_end_matches('/'));

        let response = self
            .send_cancellable(self.client.post(&url).bearer_auth(token).headers(metadata.to_headers()), cancel)
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            self.record_task(measurement_id, status.as_u16(), 0, 0).await;
            return Err(UploadError::Network(NetworkError::HttpStatus { code: status.as_u16() }));
        }

        let session_url = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| UploadError::Network(NetworkError::ServerRejected { reason: "initiation response missing Location header".into() }))?
            .to_string();

        self.store.register_session(measurement_id, &session_url, metadata.start_time).await?;
        self.record_task(measurement_id, status.as_u16(), 0, 0).await;
        Ok(session_url)
    }

    /// Probes the server-side watermark for a resumed session (§4.7 step 3): a zero-length
    /// `PUT` with `Content-Range: bytes */Z`.
    #[instrument(skip(self, cancel))]
    async fn probe_watermark(&self, session_url: &str, total: usize, cancel: &CancellationToken) -> Result<usize, UploadError> {
        let response = self
            .send_cancellable(
                self.client
                    .put(session_url)
                    .header("Content-Range", format!("bytes */{total}"))
                    .header("Content-Length", "0"),
                cancel,
            )
            .await?;

        match response.status().as_u16() {
            308 => {
                let range = response
                    .headers()
                    .get("Range")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_range_upper_bound)
                    .unwrap_or(0);
                Ok(range + 1)
            }
            200 | 201 => Ok(total),
            code => Err(UploadError::Network(NetworkError::HttpStatus { code })),
        }
    }

    #[instrument(skip(self, payload, cancel))]
    async fn transfer(&self, measurement_id: u64, session_url: &str, payload: &[u8], cancel: &CancellationToken) -> Result<(), UploadError> {
        let total = payload.len();
        let mut offset = self.probe_watermark(session_url, total, cancel).await?;

        if offset >= total {
            return Ok(());
        }

        let mut retries = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let end = (offset + CHUNK_SIZE).min(total);
            let chunk = &payload[offset..end];
            let content_range = format!("bytes {}-{}/{}", offset, end.saturating_sub(1), total);

            let result = self
                .send_cancellable(
                    self.client
                        .put(session_url)
                        .header("Content-Range", content_range)
                        .header("Content-Length", chunk.len().to_string())
                        .body(chunk.to_vec()),
                    cancel,
                )
                .await;

            let response = match result {
                Ok(r) => r,
                Err(UploadError::Network(e)) if e.is_transient() && retries < MAX_TRANSIENT_RETRIES => {
                    retries += 1;
                    warn!(measurement_id, retries, "transient transfer failure, backing off");
                    sleep(Duration::from_millis(200 * 2u64.pow(retries))).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let status = response.status();
            self.record_task(measurement_id, status.as_u16(), offset as u64, end as u64).await;

            match status.as_u16() {
                200 | 201 => return Ok(()),
                308 => {
                    offset = response
                        .headers()
                        .get("Range")
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_range_upper_bound)
                        .map(|w| w + 1)
                        .unwrap_or(end);
                    retries = 0;
                }
                401 => {
                    self.authenticator.refresh().await?;
                    retries += 1;
                    if retries > 1 {
                        return Err(UploadError::Network(NetworkError::AuthRequired));
                    }
                }
                404 | 409 => {
                    return Err(UploadError::Network(NetworkError::ServerRejected { reason: format!("status {status}") }));
                }
                code if (500..600).contains(&code) => {
                    if retries >= MAX_TRANSIENT_RETRIES {
                        return Err(UploadError::Network(NetworkError::HttpStatus { code }));
                    }
                    retries += 1;
                    sleep(Duration::from_millis(200 * 2u64.pow(retries))).await;
                }
                // Any other 4xx (401/404/409 are handled above) is a non-retryable rejection.
                code if (400..500).contains(&code) => {
                    return Err(UploadError::Network(NetworkError::ServerRejected { reason: format!("status {code}") }));
                }
                code => return Err(UploadError::Network(NetworkError::HttpStatus { code })),
            }
        }
    }

    async fn record_task(&self, measurement_id: u64, status_code: u16, range_start: u64, range_end: u64) {
        let task = UploadTask { status_code, timestamp: chrono::Utc::now().timestamp_millis(), range_start, range_end };
        if let Err(e) = self.store.append_upload_task(measurement_id, task).await {
            warn!(error = %e, "failed to record upload task");
        }
    }

    async fn send_cancellable(&self, request: reqwest::RequestBuilder, cancel: &CancellationToken) -> Result<reqwest::Response, UploadError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            result = request.send() => Ok(result.map_err(NetworkError::Transport)?),
        }
    }
}

/// Parses the upper bound `W` out of a `Range: bytes=0-W` response header.
fn parse_range_upper_bound(value: &str) -> Option<usize> {
    value.strip_prefix("bytes=")?.split('-').nth(1)?.trim().parse().ok()
}

struct InFlightGuard<'a> {
    uploader: &'a Uploader,
    measurement_id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.uploader.in_flight.lock().expect("poisoned").remove(&self.measurement_id);
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::{POST, PUT};
    use httpmock::MockServer;
    use rstest::rstest;
    use tracekit_common::HaversineStrategy;
    use tracekit_store::NewLocation;

    use super::*;

    #[rstest]
    #[case::single_chunk("bytes=0-99", Some(99))]
    #[case::zero_width("bytes=0-0", Some(0))]
    #[case::large_upper("bytes=0-1048575", Some(1_048_575))]
    #[case::missing_prefix("garbage", None)]
    #[case::missing_range("bytes=", None)]
    fn parses_range_header_upper_bound(#[case] header: &str, #[case] expected: Option<usize>) {
        assert_eq!(parse_range_upper_bound(header), expected);
    }

    #[tokio::test]
    async fn second_concurrent_upload_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let uploader = Uploader::new(store, "http://example.invalid", Authenticator::Mock(crate::auth::MockAuthenticator::new("t")));
        let _first = uploader.guard(42).unwrap();
        let err = uploader.guard(42).unwrap_err();
        assert!(matches!(err, UploadError::AlreadyUploading(42)));
    }

    /// A measurement with enough locations that its encoded payload comfortably exceeds a
    /// handful of bytes, so the transfer loop below has real ranges to split across requests.
    async fn seeded_measurement() -> (Store, u64) {
        let store = Store::open_in_memory().unwrap();
        let measurement = store.create_measurement(0, "WALKING").await.unwrap();
        let track = store.append_track(measurement.id).await.unwrap();
        for i in 0..20i64 {
            store
                .append_location(
                    track.id,
                    NewLocation {
                        time: i * 1_000,
                        latitude: 50.85 + i as f64 * 0.0001,
                        longitude: 4.35 + i as f64 * 0.0001,
                        horizontal_accuracy: 5.0,
                        speed: 1.2,
                        altitude: None,
                        vertical_accuracy: None,
                        is_part_of_cleaned_track: true,
                    },
                )
                .await
                .unwrap();
        }
        store.mark_synchronizable(measurement.id).await.unwrap();
        (store, measurement.id)
    }

    fn metadata_for(measurement: &Measurement) -> UploadMetadata {
        UploadMetadata::from_measurement(measurement, "device-1", tracekit_proto::CURRENT_FORMAT_VERSION, "test-os", "1.0", "WALKING", &HaversineStrategy)
    }

    #[tokio::test]
    async fn upload_succeeds_after_probe_reports_partial_progress() {
        let (store, id) = seeded_measurement().await;
        let server = MockServer::start();
        let uploader = Uploader::new(store.clone(), server.base_url(), Authenticator::Mock(crate::auth::MockAuthenticator::new("t")));

        let total = uploader.build_payload(id).await.unwrap().len();
        let session_path = "/s/1";
        let session_url = format!("{}{session_path}", server.base_url());

        let initiate = server.mock(|when, then| {
            when.method(POST).path("/measurements");
            then.status(200).header("Location", session_url.as_str());
        });
        let probe = server.mock(|when, then| {
            when.method(PUT)
                .path(session_path)
                .header("Content-Range", format!("bytes */{total}"))
                .header("Content-Length", "0");
            then.status(308).header("Range", "bytes=0-0");
        });
        let chunk = server.mock(|when, then| {
            when.method(PUT)
                .path(session_path)
                .header("Content-Range", format!("bytes 1-{}/{total}", total - 1))
                .header("Content-Length", (total - 1).to_string());
            then.status(201);
        });

        let metadata = metadata_for(&store.load(id).await.unwrap());
        let outcome = uploader.upload(id, metadata, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, UploadOutcome::FinishedSuccessfully);
        initiate.assert();
        probe.assert();
        chunk.assert();
        assert!(store.load_session(id).await.unwrap().is_none());
        assert!(store.load(id).await.unwrap().synchronized);
    }

    #[tokio::test]
    async fn transfer_resumes_across_repeated_308_continuations() {
        let (store, id) = seeded_measurement().await;
        let server = MockServer::start();
        let uploader = Uploader::new(store.clone(), server.base_url(), Authenticator::Mock(crate::auth::MockAuthenticator::new("t")));

        let total = uploader.build_payload(id).await.unwrap().len();
        let third = (total / 3).max(1);
        let session_path = "/s/2";
        let session_url = format!("{}{session_path}", server.base_url());

        server.mock(|when, then| {
            when.method(POST).path("/measurements");
            then.status(200).header("Location", session_url.as_str());
        });
        server.mock(|when, then| {
            when.method(PUT)
                .path(session_path)
                .header("Content-Range", format!("bytes */{total}"))
                .header("Content-Length", "0");
            then.status(308).header("Range", format!("bytes=0-{}", third - 1));
        });
        server.mock(|when, then| {
            when.method(PUT)
                .path(session_path)
                .header("Content-Range", format!("bytes {third}-{}/{total}", total - 1))
                .header("Content-Length", (total - third).to_string());
            then.status(308).header("Range", format!("bytes=0-{}", 2 * third - 1));
        });
        let last = server.mock(|when, then| {
            when.method(PUT)
                .path(session_path)
                .header("Content-Range", format!("bytes {}-{}/{total}", 2 * third, total - 1))
                .header("Content-Length", (total - 2 * third).to_string());
            then.status(201);
        });

        let metadata = metadata_for(&store.load(id).await.unwrap());
        let outcome = uploader.upload(id, metadata, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, UploadOutcome::FinishedSuccessfully);
        last.assert();
    }

    #[tokio::test]
    async fn unauthorized_response_is_retried_once_then_gives_up() {
        let (store, id) = seeded_measurement().await;
        let server = MockServer::start();
        let uploader = Uploader::new(store.clone(), server.base_url(), Authenticator::Mock(crate::auth::MockAuthenticator::new("t")));

        let total = uploader.build_payload(id).await.unwrap().len();
        let session_path = "/s/3";
        let session_url = format!("{}{session_path}", server.base_url());

        server.mock(|when, then| {
            when.method(POST).path("/measurements");
            then.status(200).header("Location", session_url.as_str());
        });
        server.mock(|when, then| {
            when.method(PUT)
                .path(session_path)
                .header("Content-Range", format!("bytes */{total}"))
                .header("Content-Length", "0");
            then.status(308).header("Range", "bytes=0-0");
        });
        let chunk = server.mock(|when, then| {
            when.method(PUT).path(session_path).header("Content-Range", format!("bytes 1-{}/{total}", total - 1));
            then.status(401);
        });

        let metadata = metadata_for(&store.load(id).await.unwrap());
        let outcome = uploader.upload(id, metadata, &CancellationToken::new()).await.unwrap();

        match outcome {
            UploadOutcome::FinishedWithError { cause } => assert!(cause.to_lowercase().contains("auth")),
            other => panic!("expected FinishedWithError, got {other:?}"),
        }
        assert!(chunk.hits() >= 2);
        assert!(store.load_session(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejection_status_resolves_to_finished_unsuccessfully_and_keeps_the_session() {
        let (store, id) = seeded_measurement().await;
        let server = MockServer::start();
        let uploader = Uploader::new(store.clone(), server.base_url(), Authenticator::Mock(crate::auth::MockAuthenticator::new("t")));

        let total = uploader.build_payload(id).await.unwrap().len();
        let session_path = "/s/4";
        let session_url = format!("{}{session_path}", server.base_url());

        server.mock(|when, then| {
            when.method(POST).path("/measurements");
            then.status(200).header("Location", session_url.as_str());
        });
        server.mock(|when, then| {
            when.method(PUT)
                .path(session_path)
                .header("Content-Range", format!("bytes */{total}"))
                .header("Content-Length", "0");
            then.status(308).header("Range", "bytes=0-0");
        });
        server.mock(|when, then| {
            when.method(PUT).path(session_path).header("Content-Range", format!("bytes 1-{}/{total}", total - 1));
            then.status(404);
        });

        let metadata = metadata_for(&store.load(id).await.unwrap());
        let outcome = uploader.upload(id, metadata, &CancellationToken::new()).await.unwrap();

        match outcome {
            UploadOutcome::FinishedUnsuccessfully { cause } => assert!(cause.contains("404")),
            other => panic!("expected FinishedUnsuccessfully, got {other:?}"),
        }
        assert!(store.load_session(id).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_server_errors_retry_with_backoff_until_the_budget_is_exhausted() {
        let (store, id) = seeded_measurement().await;
        let server = MockServer::start();
        let uploader = Uploader::new(store.clone(), server.base_url(), Authenticator::Mock(crate::auth::MockAuthenticator::new("t")));

        let total = uploader.build_payload(id).await.unwrap().len();
        let session_path = "/s/5";
        let session_url = format!("{}{session_path}", server.base_url());

        server.mock(|when, then| {
            when.method(POST).path("/measurements");
            then.status(200).header("Location", session_url.as_str());
        });
        server.mock(|when, then| {
            when.method(PUT)
                .path(session_path)
                .header("Content-Range", format!("bytes */{total}"))
                .header("Content-Length", "0");
            then.status(308).header("Range", "bytes=0-0");
        });
        let chunk = server.mock(|when, then| {
            when.method(PUT).path(session_path).header("Content-Range", format!("bytes 1-{}/{total}", total - 1));
            then.status(503);
        });

        let metadata = metadata_for(&store.load(id).await.unwrap());
        let outcome = uploader.upload(id, metadata, &CancellationToken::new()).await.unwrap();

        match outcome {
            UploadOutcome::FinishedWithError { cause } => assert!(cause.contains("503")),
            other => panic!("expected FinishedWithError, got {other:?}"),
        }
        assert!(chunk.hits() as u32 >= MAX_TRANSIENT_RETRIES);
    }
}
