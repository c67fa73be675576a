use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use tracekit_capture::{PipelineConfig, RawFix, Session, SystemClock};
use tracekit_proto::{SensorKind, SensorValue};
use tracekit_store::Store;
use tracing::info;

use crate::cli::SimulateOpts;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Drives a scripted capture session against synthetic sensor data: a handful of
/// accelerometer batches and one location fix per batch, with an optional pause/resume
/// cycle midway through. Exercises C4/C5 end to end the way a host application's sensor
/// callbacks would.
pub async fn run(store: Store, opts: &SimulateOpts) -> Result<()> {
    let session = Session::new(store, Arc::new(SystemClock), PipelineConfig::default());

    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(msg) = events.recv().await {
            info!(?msg, "lifecycle message");
        }
    });

    let id = session.start(now_millis(), &opts.modality).await?;
    info!(measurement_id = id, "measurement started");

    for batch in 0..opts.batches {
        for i in 0..20u32 {
            let value = SensorValue::new(now_millis(), 0.01 * i as f64, 9.81, 0.02 * i as f64);
            session.pipeline().record_sensor(SensorKind::Acceleration, value).await;
        }

        session
            .pipeline()
            .record_location(RawFix {
                time: now_millis(),
                latitude: 50.85 + batch as f64 * 0.0001,
                longitude: 4.35,
                horizontal_accuracy: 5.0,
                speed: 1.2,
                altitude: Some(45.0),
                vertical_accuracy: Some(2.0),
            })
            .await;

        if opts.with_pause && batch == opts.batches / 2 {
            session.pause(now_millis()).await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.resume(now_millis()).await?;
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    session.stop(now_millis()).await?;
    println!("recorded measurement {id}");
    Ok(())
}
