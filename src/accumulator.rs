use std::path::{Path, PathBuf};

use log::info;
use polars::prelude::DataFrame;

use crate::error::{DatasetError, Result};
use crate::partitioned::{self, PartitionSet, PartitionedDataset};
use crate::storage::{Compression, DatasetStorage, Format};
use crate::versioned::{Version, VersionedDataset};

/// Writes an unbounded series of immutable snapshots under one path and
/// reads them back as a single table.
///
/// Snapshots are versioned saves (`<path>/<version>/<name>`), and the same
/// folder is read as a partitioned dataset.
#[derive(Debug)]
pub struct SnapshotAccumulator {
    writer: VersionedDataset,
    reader: PartitionedDataset,
}

impl SnapshotAccumulator {
    pub fn new(path: impl Into<PathBuf>, format: Format) -> Self {
        let path = path.into();
        Self {
            writer: VersionedDataset::new(path.clone(), format),
            reader: PartitionedDataset::new(path, format),
        }
    }

    pub fn from_storage(storage: &DatasetStorage, base: &Path) -> Self {
        Self::new(storage.resolve(base), storage.format).with_compression(storage.compression)
    }

    pub fn with_compression(self, compression: Option<Compression>) -> Self {
        Self {
            writer: self.writer.with_compression(compression),
            reader: self.reader.with_compression(compression),
        }
    }

    /// Saves `df` as a new snapshot and returns its partition id.
    pub fn save_snapshot(&self, df: &DataFrame) -> Result<String> {
        let version = self.writer.save_version(df)?;
        self.reader.release();

        let path = self.writer.version_path(&version)?;
        let id = self.reader.partition_id(&path).ok_or_else(|| DatasetError::InvalidPath {
            path: path.clone(),
            reason: "snapshot is outside of the partitioned dataset",
        })?;
        info!("Stored snapshot {} with {} rows", id, df.height());
        Ok(id)
    }

    /// Current snapshots on storage, rescanned on every call so that
    /// snapshots saved by other writers on the same path are included.
    pub fn list_partitions(&self) -> Result<PartitionSet> {
        self.reader.release();
        self.reader.load()
    }

    pub fn release(&self) {
        self.reader.release()
    }

    pub fn versions(&self) -> Result<Vec<Version>> {
        self.writer.versions()
    }

    pub fn combine(&self) -> Result<DataFrame> {
        partitioned::combine(&self.list_partitions()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table;
    use chrono::Utc;
    use polars::prelude::*;
    use anyhow::Result;

    fn timestamp_frame(micros: i64) -> Result<DataFrame> {
        let ts = Series::new("timestamp", &[micros])
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
        Ok(DataFrame::new(vec![ts])?)
    }

    fn now_frame() -> Result<DataFrame> {
        timestamp_frame(Utc::now().timestamp_micros())
    }

    #[test]
    fn three_runs_combine_into_three_rows() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let tmp = tempfile::tempdir()?;
        let accumulator = SnapshotAccumulator::new(tmp.path().join("dataset"), Format::Csv);

        let mut ids = Vec::new();
        for run in 0..3 {
            ids.push(accumulator.save_snapshot(&now_frame()?)?);
            assert_eq!(accumulator.list_partitions()?.len(), run + 1);
        }

        let listed = accumulator
            .list_partitions()?
            .keys()
            .map(String::from)
            .collect::<Vec<String>>();
        assert_eq!(listed, ids);
        assert!(ids.iter().all(|id| id.ends_with("/dataset")));
        assert_eq!(accumulator.versions()?.len(), 3);

        let df = accumulator.combine()?;
        assert_eq!(df.height(), 3);
        assert_eq!(df.get_column_names(), vec!["timestamp"]);
        assert_eq!(df.column("timestamp")?.null_count(), 0);
        Ok(())
    }

    #[test]
    fn timestamps_survive_the_round_trip() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let accumulator = SnapshotAccumulator::new(tmp.path().join("dataset"), Format::Csv);

        let originals = [1_700_000_000_123_456i64, 1_700_000_001_000_001, 1_700_000_002_999_999]
            .into_iter()
            .map(timestamp_frame)
            .collect::<Result<Vec<DataFrame>>>()?;
        for df in &originals {
            accumulator.save_snapshot(df)?;
        }

        let df = accumulator.combine()?;
        assert_eq!(
            df.column("timestamp")?.dtype(),
            &DataType::Datetime(TimeUnit::Microseconds, None)
        );
        assert!(df.frame_equal(&table::concat_tables(originals)?));
        Ok(())
    }

    #[test]
    fn sees_snapshots_of_other_writers() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("dataset");
        let writer = SnapshotAccumulator::new(&path, Format::Csv);
        let reader = SnapshotAccumulator::new(&path, Format::Csv);

        writer.save_snapshot(&now_frame()?)?;
        assert_eq!(reader.list_partitions()?.len(), 1);

        writer.save_snapshot(&now_frame()?)?;
        assert_eq!(reader.list_partitions()?.len(), 2);
        assert_eq!(reader.combine()?.height(), 2);
        Ok(())
    }

    #[test]
    fn built_from_storage_config() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let storage = DatasetStorage::from_json(
            r#"{"root": "runs", "format": "parquet", "compression": "snappy"}"#,
        )?;
        let accumulator = SnapshotAccumulator::from_storage(&storage, tmp.path());

        let id = accumulator.save_snapshot(&df!("a" => &[1i64])?)?;
        assert!(id.ends_with("/runs"));
        assert!(tmp.path().join("runs").join(&id).is_file());
        Ok(())
    }

    #[test]
    fn nothing_saved_yet() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let accumulator = SnapshotAccumulator::new(tmp.path().join("dataset"), Format::Parquet);

        assert!(accumulator.list_partitions()?.is_empty());
        assert_eq!(accumulator.combine()?.shape(), (0, 0));
        Ok(())
    }

    #[test]
    fn snapshots_keep_their_own_columns() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let accumulator = SnapshotAccumulator::new(tmp.path().join("dataset"), Format::Ipc)
            .with_compression(Some(Compression::Zstd));

        accumulator.save_snapshot(&df!("a" => &[1i64, 2])?)?;
        accumulator.save_snapshot(&df!("a" => &[3i64], "b" => &[true])?)?;

        let df = accumulator.combine()?;
        assert_eq!(df.shape(), (3, 2));
        assert_eq!(df.column("b")?.null_count(), 2);
        Ok(())
    }
}
