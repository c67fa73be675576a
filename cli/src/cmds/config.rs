use eyre::Result;
use tracekit_common::CaptureConfig;

/// Prints the resolved configuration (defaults merged with whatever was found on disk).
pub async fn run(config: &CaptureConfig) -> Result<()> {
    println!("accelerometer_hz:          {}", config.accelerometer_hz_clamped());
    println!("flush_interval_millis:     {}", config.flush_interval_millis);
    println!("collector_base_url:       {}", config.collector_base_url.as_deref().unwrap_or("(none)"));
    println!("sync_on_cellular:          {}", config.sync_on_cellular);
    println!("location_accuracy_metres:  {}", config.location_accuracy_metres);
    println!("location_max_lag_seconds:  {}", config.location_max_lag_seconds);
    println!(
        "installation_id:           {}",
        config.installation_id.map(|id| id.to_string()).unwrap_or_else(|| "(none)".into())
    );
    Ok(())
}
