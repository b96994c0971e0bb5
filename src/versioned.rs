use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{Duration, NaiveDateTime, SubsecRound, Utc};
use log::info;
use polars::prelude::DataFrame;

use crate::dataset::{FileDataset, TableStore};
use crate::error::{DatasetError, Result};
use crate::storage::{self, Compression, Format};

/// Folder name layout of a version, millisecond resolution in UTC.
pub const VERSION_FORMAT: &str = "%Y-%m-%dT%H.%M.%S%.3fZ";

/// Save timestamp of one version of a dataset. Renders as e.g. `2026-10-16T09.15.02.123Z`,
/// so string order and chronological order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(NaiveDateTime);

impl Version {
    pub fn parse(s: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(s, VERSION_FORMAT)
            .map(Self)
            .map_err(|_| DatasetError::InvalidVersion(s.to_string()))
    }

    pub fn now() -> Self {
        Self(Utc::now().naive_utc().trunc_subsecs(3))
    }

    fn next(&self) -> Self {
        Self(self.0 + Duration::milliseconds(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(VERSION_FORMAT))
    }
}

/// A dataset whose every save lands in a fresh `<root>/<version>/<name>` file.
#[derive(Debug)]
pub struct VersionedDataset {
    root: PathBuf,
    format: Format,
    compression: Option<Compression>,
    load_version: Option<Version>,
    last_issued: Mutex<Option<Version>>,
}

impl VersionedDataset {
    pub fn new(root: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            root: root.into(),
            format,
            compression: None,
            load_version: None,
            last_issued: Mutex::new(None),
        }
    }

    pub fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    /// Pins loads to one version instead of the latest.
    pub fn with_load_version(mut self, version: Option<Version>) -> Self {
        self.load_version = version;
        self
    }

    pub fn version_path(&self, version: &Version) -> Result<PathBuf> {
        let name = self.root.file_name().ok_or_else(|| DatasetError::InvalidPath {
            path: self.root.clone(),
            reason: "versioned dataset root has no file name",
        })?;
        Ok(self.root.join(version.to_string()).join(name))
    }

    fn dataset(&self, version: &Version) -> Result<FileDataset> {
        let path = self.version_path(version)?;
        Ok(FileDataset::new(path, self.format).with_compression(self.compression))
    }

    /// Versions holding a data file, oldest first.
    pub fn versions(&self) -> Result<Vec<Version>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DatasetError::io(&self.root, e)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DatasetError::io(&self.root, e))?;
            let version = match Version::parse(&entry.file_name().to_string_lossy()) {
                Ok(version) => version,
                Err(_) => continue,
            };
            if storage::exists(&self.version_path(&version)?)? {
                versions.push(version);
            }
        }
        versions.sort();
        Ok(versions)
    }

    pub fn latest_version(&self) -> Result<Option<Version>> {
        Ok(self.versions()?.pop())
    }

    fn next_version(&self) -> Version {
        let mut last = self.last_issued.lock().unwrap_or_else(|e| e.into_inner());
        let version = match *last {
            Some(prev) if Version::now() <= prev => prev.next(),
            _ => Version::now(),
        };
        *last = Some(version);
        version
    }

    /// Writes `df` as a new version and returns it. Earlier versions are never touched.
    pub fn save_version(&self, df: &DataFrame) -> Result<Version> {
        fs::create_dir_all(&self.root).map_err(|e| DatasetError::io(&self.root, e))?;

        // The version folder is claimed exclusively, a concurrent writer forces the next one
        let version = loop {
            let version = self.next_version();
            let folder = self.root.join(version.to_string());
            match fs::create_dir(&folder) {
                Ok(()) => break version,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(DatasetError::io(folder, e)),
            }
        };

        self.dataset(&version)?.save(df)?;
        info!("Saved version {} of {}", version, self.root.display());
        Ok(version)
    }
}

impl TableStore for VersionedDataset {
    fn exists(&self) -> Result<bool> {
        match &self.load_version {
            Some(version) => storage::exists(&self.version_path(version)?),
            None => Ok(self.latest_version()?.is_some()),
        }
    }

    fn load(&self) -> Result<DataFrame> {
        let version = match self.load_version {
            Some(version) => version,
            None => self
                .latest_version()?
                .ok_or_else(|| DatasetError::Missing { path: self.root.clone() })?,
        };
        self.dataset(&version)?.load()
    }

    fn save(&self, df: &DataFrame) -> Result<()> {
        self.save_version(df).map(|_| ())
    }

    fn describe(&self) -> String {
        format!("versioned {:?} dataset at {}", self.format, self.root.display())
    }
}
