use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use polars::prelude::ParquetCompression;
use polars_io::ipc::IpcCompression;
use serde::{Serialize, Deserialize};

use crate::error::{DatasetError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Csv,
    Parquet,
    Ipc,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Snappy,
    Lz4Raw,
    Zstd,
}

impl Compression {
    pub fn parquet(&self) -> ParquetCompression {
        match self {
            Compression::Snappy => ParquetCompression::Snappy,
            Compression::Lz4Raw => ParquetCompression::Lz4Raw,
            Compression::Zstd => ParquetCompression::Zstd(None),
        }
    }

    pub fn ipc(&self) -> Option<IpcCompression> {
        match self {
            Compression::Lz4Raw => Some(IpcCompression::LZ4),
            Compression::Zstd => Some(IpcCompression::ZSTD),
            Compression::Snappy => {
                warn!("Snappy is not supported for ipc files, writing uncompressed");
                None
            }
        }
    }
}

/// Where and how one dataset is stored.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatasetStorage {
    pub root: String, // File or folder, relative roots resolve against the config file
    pub format: Format,
    #[serde(default)]
    pub compression: Option<Compression>,
}

impl DatasetStorage {
    pub fn new(root: String, format: Format, compression: Option<Compression>) -> Self {
        Self { root, format, compression }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str::<Self>(contents)?)
    }

    /// Reads a json storage config; its `root` is resolved against the file's folder.
    pub fn from_file(path: &Path) -> Result<(Self, PathBuf)> {
        let contents = fs::read_to_string(path).map_err(|e| DatasetError::io(path, e))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let storage = Self::from_json(&contents)?;
        let root = storage.resolve(&base);
        Ok((storage, root))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn resolve(&self, base: &Path) -> PathBuf {
        let root = Path::new(&self.root);
        if root.is_absolute() {
            root.to_path_buf()
        } else {
            base.join(root)
        }
    }
}

/// Whether a table file is present at `path`. Absence is not an error.
pub fn exists(path: &Path) -> Result<bool> {
    if path.as_os_str().is_empty() {
        return Err(DatasetError::InvalidPath { path: path.to_path_buf(), reason: "empty path" });
    }
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DatasetError::io(path, e)),
    }
}

/// Recursively lists the files under `dir` whose name ends with `suffix`, sorted.
pub fn extract_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if dir.is_dir() {
        collect_files(dir, suffix, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn collect_files(dir: &Path, suffix: &str, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(|e| DatasetError::io(dir, e))? {
        let path = entry.map_err(|e| DatasetError::io(dir, e))?.path();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, suffix, files)?;
        } else if name.ends_with(suffix) {
            files.push(path);
        }
    }
    Ok(())
}
