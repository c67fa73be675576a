use eyre::Result;
use tabled::Tabled;
use tracekit_store::Store;

#[derive(Tabled)]
struct Row {
    id: u64,
    start_time: i64,
    tracks: usize,
    events: usize,
    synchronizable: bool,
    synchronized: bool,
}

/// Lists every measurement in the store as a table.
pub async fn run(store: &Store) -> Result<()> {
    let measurements = store.load_all().await?;
    let rows: Vec<Row> = measurements
        .iter()
        .map(|m| Row {
            id: m.id,
            start_time: m.start_time,
            tracks: m.tracks.len(),
            events: m.events.len(),
            synchronizable: m.synchronizable,
            synchronized: m.synchronized,
        })
        .collect();

    if rows.is_empty() {
        println!("no measurements in store");
        return Ok(());
    }

    println!("{}", tabled::Table::new(rows));
    Ok(())
}
