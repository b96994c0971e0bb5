use polars::prelude::*;
use chrono::Utc;
use log::{info, warn};
use anyhow::{ensure, Result};
use std::path::Path;

use polars_stash::{
    table, DatasetStorage, FileDataset, Format, ResilientLoader, SnapshotAccumulator, TableStore,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Scratch folder, removed on drop
    let tmp = tempfile::tempdir()?;
    append_to_missing_dataset(tmp.path())?;
    accumulate_snapshots(tmp.path())?;
    Ok(())
}

/// First run of an append pipeline: there is no previous output to append to.
fn append_to_missing_dataset(dir: &Path) -> Result<()> {
    let storage = DatasetStorage::new("dataset.csv".to_string(), Format::Csv, None);

    let plain = FileDataset::from_storage(&storage, dir);
    if let Err(e) = plain.load() {
        warn!("Plain load of {} failed: {}", plain.path().display(), e);
    }

    let dataset = ResilientLoader::new(plain);
    let df = dataset.load()?;
    info!("Resilient load returned a table of shape {:?}", df.shape());

    let to_append = df!("a" => &[1i64, 2, 3])?;
    dataset.save(&table::append(&df, &to_append)?)?;

    let df = dataset.load()?;
    ensure!(df.frame_equal(&to_append), "reloaded table differs from the appended one");
    println!("{:?}", df);
    Ok(())
}

/// Three scheduled runs, each storing a snapshot, then one combined read.
fn accumulate_snapshots(dir: &Path) -> Result<()> {
    let storage = DatasetStorage::new("dataset".to_string(), Format::Csv, None);
    let accumulator = SnapshotAccumulator::from_storage(&storage, dir);

    for n in 0..3 {
        let timestamp = Series::new("timestamp", &[Utc::now().timestamp_micros()])
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
        accumulator.save_snapshot(&DataFrame::new(vec![timestamp])?)?;

        println!("\nIteration {} - content of the partitioned dataset", n + 1);
        for id in accumulator.list_partitions()?.keys() {
            println!("{}", id);
        }
    }

    let combined = accumulator.combine()?;
    println!("\nResulting combined DataFrame\n{:?}", combined);
    Ok(())
}
