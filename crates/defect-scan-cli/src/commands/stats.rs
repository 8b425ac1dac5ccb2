use std::path::Path;

use defect_scan::storage::{DefectStats, DefectStore, JsonlStore};

pub fn run_stats(store: &Path) -> anyhow::Result<()> {
    let store = JsonlStore::new(store);
    let records = store.load_all()?;

    let Some(stats) = DefectStats::compute(&records) else {
        println!("No records in {}", store.path().display());
        return Ok(());
    };

    println!("Records: {}", stats.total);
    println!();
    println!("By severity:");
    for (tier, count) in &stats.breakdown {
        println!(
            "  {:<9} {:>6}  {}",
            tier.to_string(),
            count,
            tier.description()
        );
    }
    println!();
    println!("Daily trend:");
    for (day, count) in &stats.daily_trend {
        println!("  {day}  {count}");
    }
    Ok(())
}

pub fn run_recent(store: &Path, limit: usize) -> anyhow::Result<()> {
    let store = JsonlStore::new(store);
    let records = store.recent(limit)?;

    if records.is_empty() {
        println!("No records in {}", store.path().display());
        return Ok(());
    }

    println!(
        "{:<6} {:<20} {:<9} {:>7} {:>9}  {}",
        "id", "product", "tier", "conf", "edges", "timestamp"
    );
    for record in records {
        println!(
            "{:<6} {:<20} {:<9} {:>6.1}% {:>9.4}  {}",
            record.id.map_or("-".to_string(), |id| id.to_string()),
            record.product_id,
            record.tier.to_string(),
            record.confidence * 100.0,
            record.edge_density,
            record.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
