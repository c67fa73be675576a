use eyre::Result;
use tracekit_store::Store;

use crate::error::CliError;

/// Prints one measurement's full structure: tracks with their locations/altitudes, and
/// its event log.
pub async fn run(store: &Store, measurement_id: u64) -> Result<()> {
    let measurement = store.load(measurement_id).await.map_err(|_| CliError::MeasurementNotFound(measurement_id))?;

    println!("measurement {}", measurement.id);
    println!("  start_time:     {}", measurement.start_time);
    println!("  synchronizable: {}", measurement.synchronizable);
    println!("  synchronized:   {}", measurement.synchronized);
    println!("  schema_version: {}", measurement.schema_version);

    for track in &measurement.tracks {
        println!("  track {} ({} locations, {} altitudes)", track.id, track.locations.len(), track.altitudes.len());
        for loc in &track.locations {
            println!(
                "    [{}] ({:.6}, {:.6}) ±{:.1}m speed={:.1}m/s cleaned={}",
                loc.time, loc.latitude, loc.longitude, loc.horizontal_accuracy, loc.speed, loc.is_part_of_cleaned_track
            );
        }
    }

    println!("  events:");
    for event in &measurement.events {
        println!("    [{}] {:?} {:?}", event.time, event.kind, event.value);
    }

    Ok(())
}
