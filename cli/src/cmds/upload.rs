use eyre::{eyre, Result};
use tokio_util::sync::CancellationToken;
use tracekit_common::{CaptureConfig, HaversineStrategy};
use tracekit_store::Store;
use tracekit_upload::{Authenticator, MockAuthenticator, StaticAuthenticator, UploadMetadata, UploadOutcome, Uploader};
use tracing::info;

use crate::cli::UploadOpts;
use crate::error::CliError;

/// Uploads one measurement to the collector configured in `config.collector_base_url`.
///
/// Without `--token`, a [`MockAuthenticator`] is used, which is only useful against a
/// collector that does not actually check the bearer token (e.g. a local test server).
pub async fn run(store: Store, config: &CaptureConfig, opts: &UploadOpts) -> Result<()> {
    let base_url = config
        .collector_base_url
        .clone()
        .ok_or_else(|| eyre!("collector_base_url is not configured"))?;

    let measurement = store.load(opts.measurement_id).await.map_err(|_| CliError::MeasurementNotFound(opts.measurement_id))?;

    let device_id = config
        .installation_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown-device".to_string());

    let modality = measurement
        .events
        .iter()
        .rev()
        .find_map(|e| e.value.clone())
        .unwrap_or_else(|| "UNKNOWN".to_string());

    let metadata = UploadMetadata::from_measurement(
        &measurement,
        device_id,
        tracekit_proto::CURRENT_FORMAT_VERSION,
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION"),
        modality,
        &HaversineStrategy,
    );

    let authenticator = match &opts.token {
        Some(token) => Authenticator::Static(StaticAuthenticator::new(token.clone())),
        None => Authenticator::Mock(MockAuthenticator::new("test-token")),
    };

    let uploader = Uploader::new(store, base_url, authenticator);
    let outcome = uploader.upload(opts.measurement_id, metadata, &CancellationToken::new()).await?;

    match outcome {
        UploadOutcome::FinishedSuccessfully => {
            info!(measurement_id = opts.measurement_id, "upload complete");
            println!("measurement {} uploaded", opts.measurement_id);
        }
        UploadOutcome::FinishedUnsuccessfully { cause } => {
            println!("measurement {} rejected by collector: {cause}", opts.measurement_id);
        }
        UploadOutcome::FinishedWithError { cause } => {
            println!("measurement {} upload did not complete, will retry later: {cause}", opts.measurement_id);
        }
    }
    Ok(())
}
