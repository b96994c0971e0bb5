use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::debug;
use polars::prelude::DataFrame;

use crate::dataset::{FileDataset, TableStore};
use crate::error::{DatasetError, Result};
use crate::storage::{self, Compression, Format};
use crate::table;

/// Deferred load of one partition. Nothing is read until [`Partition::load`].
#[derive(Debug, Clone)]
pub struct Partition {
    id: String,
    dataset: FileDataset,
}

impl Partition {
    pub fn new(id: impl Into<String>, dataset: FileDataset) -> Self {
        Self { id: id.into(), dataset }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        self.dataset.path()
    }

    pub fn load(&self) -> Result<DataFrame> {
        self.dataset.load()
    }
}

/// The partitions found under a path at listing time, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct PartitionSet {
    partitions: BTreeMap<String, Partition>,
}

impl PartitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, partition: Partition) {
        self.partitions.insert(partition.id.clone(), partition);
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.partitions.keys().map(|k| k.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&Partition> {
        self.partitions.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Partition)> {
        self.partitions.iter().map(|(k, p)| (k.as_str(), p))
    }
}

/// A folder of independently written tables, one per file.
#[derive(Debug)]
pub struct PartitionedDataset {
    path: PathBuf,
    format: Format,
    compression: Option<Compression>,
    filename_suffix: String,
    listing: RwLock<Option<Vec<PathBuf>>>, // Memoized scan, dropped on release
}

impl PartitionedDataset {
    pub fn new(path: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            path: path.into(),
            format,
            compression: None,
            filename_suffix: String::new(),
            listing: RwLock::new(None),
        }
    }

    pub fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    /// Only files ending in `suffix` are partitions, and ids drop the suffix.
    pub fn with_filename_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.filename_suffix = suffix.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id under which `file` is listed: its path below the dataset, without suffix.
    pub fn partition_id(&self, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(&self.path).ok()?;
        let id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let id = id.strip_suffix(self.filename_suffix.as_str()).unwrap_or(&id).to_string();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    fn partition_path(&self, id: &str) -> PathBuf {
        self.path.join(format!("{}{}", id, self.filename_suffix))
    }

    fn file_dataset(&self, path: PathBuf) -> FileDataset {
        FileDataset::new(path, self.format).with_compression(self.compression)
    }

    fn files(&self) -> Result<Vec<PathBuf>> {
        if let Some(files) = self.listing.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            return Ok(files.clone());
        }
        let files = storage::extract_files(&self.path, &self.filename_suffix)?;
        debug!("Listed {} partitions under {}", files.len(), self.path.display());
        *self.listing.write().unwrap_or_else(|e| e.into_inner()) = Some(files.clone());
        Ok(files)
    }

    pub fn load(&self) -> Result<PartitionSet> {
        let mut set = PartitionSet::new();
        for file in self.files()? {
            if let Some(id) = self.partition_id(&file) {
                set.insert(Partition::new(id, self.file_dataset(file)));
            }
        }
        Ok(set)
    }

    /// Forgets the memoized listing so the next load rescans storage.
    pub fn release(&self) {
        *self.listing.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn save(&self, partitions: &BTreeMap<String, DataFrame>) -> Result<()> {
        for (id, df) in partitions {
            self.file_dataset(self.partition_path(id)).save(df)?;
        }
        self.release();
        Ok(())
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(!self.files()?.is_empty())
    }
}

/// Loads every partition in order and stacks them on the union of their columns.
///
/// The first partition that fails to load aborts the merge.
pub fn combine(partitions: &PartitionSet) -> Result<DataFrame> {
    let mut frames = Vec::with_capacity(partitions.len());
    for (id, partition) in partitions.iter() {
        let df = partition.load().map_err(|source| DatasetError::Merge {
            partition: id.to_string(),
            source: Box::new(source),
        })?;
        frames.push(df);
    }
    table::concat_tables(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use std::fs;
    use anyhow::Result;

    fn partitions(entries: Vec<(&str, DataFrame)>) -> BTreeMap<String, DataFrame> {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn empty_folder_has_no_partitions() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dataset = PartitionedDataset::new(tmp.path().join("never-written"), Format::Csv);

        assert!(dataset.path().ends_with("never-written"));
        let set = dataset.load()?;
        assert!(set.is_empty());
        assert!(!dataset.exists()?);
        assert_eq!(combine(&set)?.shape(), (0, 0));
        Ok(())
    }

    #[test]
    fn partition_ids_are_relative_paths_without_suffix() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dataset = PartitionedDataset::new(tmp.path(), Format::Csv).with_filename_suffix(".csv");
        dataset.save(&partitions(vec![
            ("2024/01", df!("a" => &[1i64])?),
            ("2024/02", df!("a" => &[2i64])?),
        ]))?;
        fs::write(tmp.path().join("README.md"), "not a partition")?;

        let set = dataset.load()?;
        assert_eq!(set.keys().collect::<Vec<&str>>(), vec!["2024/01", "2024/02"]);
        let second = set.get("2024/02").map(|p| (p.id().to_string(), p.path().to_path_buf()));
        assert_eq!(second, Some(("2024/02".to_string(), tmp.path().join("2024/02.csv"))));
        assert!(set.get("2024/01").map(|p| p.load()).transpose()?.is_some());
        Ok(())
    }

    #[test]
    fn listing_is_memoized_until_release() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dataset = PartitionedDataset::new(tmp.path(), Format::Csv);
        dataset.save(&partitions(vec![("one.csv", df!("a" => &[1i64])?)]))?;

        let first = dataset.load()?.keys().map(String::from).collect::<Vec<String>>();
        let second = dataset.load()?.keys().map(String::from).collect::<Vec<String>>();
        assert_eq!(first, second);

        // Written behind the dataset's back
        FileDataset::new(tmp.path().join("two.csv"), Format::Csv).save(&df!("a" => &[2i64])?)?;
        assert_eq!(dataset.load()?.len(), 1);

        dataset.release();
        assert_eq!(dataset.load()?.keys().collect::<Vec<&str>>(), vec!["one.csv", "two.csv"]);
        Ok(())
    }

    #[test]
    fn combine_stacks_all_rows() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dataset = PartitionedDataset::new(tmp.path(), Format::Parquet)
            .with_filename_suffix(".parquet");
        dataset.save(&partitions(vec![
            ("p1", df!("a" => &[1i64, 2], "b" => &["x", "y"])?),
            ("p2", df!("a" => &[3i64])?),
            ("p3", df!("c" => &[0.5f64, 1.5, 2.5])?),
        ]))?;

        let df = combine(&dataset.load()?)?;
        assert_eq!(df.height(), 6);
        assert_eq!(df.get_column_names(), vec!["a", "b", "c"]);
        assert_eq!(df.column("a")?.null_count(), 3);
        assert_eq!(df.column("b")?.null_count(), 4);
        assert_eq!(df.column("c")?.null_count(), 3);
        assert_eq!(df.column("a")?.i64()?.into_iter().flatten().sum::<i64>(), 6);
        Ok(())
    }

    #[test]
    fn failing_partition_aborts_combine() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dataset = PartitionedDataset::new(tmp.path(), Format::Parquet);
        dataset.save(&partitions(vec![("good", df!("a" => &[1i64])?)]))?;
        fs::write(tmp.path().join("broken"), b"not parquet")?;

        dataset.release();
        match combine(&dataset.load()?) {
            Err(DatasetError::Merge { partition, source }) => {
                assert_eq!(partition, "broken");
                assert!(matches!(*source, DatasetError::Load { .. }));
            },
            other => panic!("expected a merge failure, got {:?}", other.map(|df| df.shape())),
        }
        Ok(())
    }
}
