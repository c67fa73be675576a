use eyre::Result;
use tracekit_store::Store;
use tracing::info;

/// Deletes a measurement and its sensor files.
pub async fn run(store: &Store, measurement_id: u64) -> Result<()> {
    store.delete(measurement_id).await?;
    info!(measurement_id, "deleted");
    Ok(())
}
