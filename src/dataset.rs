use polars::prelude::*;
use polars_io::ipc::{IpcReader, IpcWriter};
use polars_io::{SerReader, SerWriter};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use log::{debug, info};

use crate::error::{DatasetError, Result};
use crate::storage::{self, Compression, DatasetStorage, Format};

/// Capability interface of anything that persists one table.
pub trait TableStore {
    fn exists(&self) -> Result<bool>;

    fn load(&self) -> Result<DataFrame>;

    /// Creates the backing resource if absent, overwrites it otherwise.
    fn save(&self, df: &DataFrame) -> Result<()>;

    fn describe(&self) -> String;
}

impl<T: TableStore + ?Sized> TableStore for Box<T> {
    fn exists(&self) -> Result<bool> {
        (**self).exists()
    }

    fn load(&self) -> Result<DataFrame> {
        (**self).load()
    }

    fn save(&self, df: &DataFrame) -> Result<()> {
        (**self).save(df)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A single table stored in a single file.
#[derive(Debug, Clone)]
pub struct FileDataset {
    path: PathBuf,
    format: Format,
    compression: Option<Compression>,
}

impl FileDataset {
    pub fn new(path: impl Into<PathBuf>, format: Format) -> Self {
        Self { path: path.into(), format, compression: None }
    }

    pub fn from_storage(storage: &DatasetStorage, base: &Path) -> Self {
        Self::new(storage.resolve(base), storage.format).with_compression(storage.compression)
    }

    pub fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self, file: File) -> PolarsResult<DataFrame> {
        match self.format {
            Format::Csv => CsvReader::new(file)
                .has_header(true)
                .with_try_parse_dates(true)
                .finish(),
            Format::Parquet => ParquetReader::new(file).finish(),
            Format::Ipc => IpcReader::new(file).finish(),
        }
    }

    fn write<W: Write>(&self, file: &mut W, df: &mut DataFrame) -> PolarsResult<()> {
        match self.format {
            Format::Csv => CsvWriter::new(file).finish(df),
            Format::Parquet => {
                let mut writer = ParquetWriter::new(file);
                if let Some(c) = self.compression {
                    writer = writer.with_compression(c.parquet());
                }
                writer.finish(df).map(|_| ())
            },
            Format::Ipc => IpcWriter::new(file)
                .with_compression(self.compression.and_then(|c| c.ipc()))
                .finish(df),
        }
    }
}

impl TableStore for FileDataset {
    fn exists(&self) -> Result<bool> {
        storage::exists(&self.path)
    }

    fn load(&self) -> Result<DataFrame> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DatasetError::Missing { path: self.path.clone() })
            },
            Err(e) => return Err(DatasetError::io(&self.path, e)),
        };

        // A table without columns is written as an empty csv file
        let len = file.metadata().map_err(|e| DatasetError::io(&self.path, e))?.len();
        if self.format == Format::Csv && len == 0 {
            return Ok(DataFrame::default());
        }

        let df = self
            .read(file)
            .map_err(|source| DatasetError::Load { path: self.path.clone(), source })?;
        debug!("Loaded {} with shape {:?}", self.describe(), df.shape());
        Ok(df)
    }

    fn save(&self, df: &DataFrame) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
        }

        let file = File::create(&self.path).map_err(|e| DatasetError::io(&self.path, e))?;
        let mut file = BufWriter::new(file);
        let mut df = df.clone();
        if !(self.format == Format::Csv && df.width() == 0) {
            self.write(&mut file, &mut df)
                .map_err(|source| DatasetError::Save { path: self.path.clone(), source })?;
        }
        file.flush().map_err(|e| DatasetError::io(&self.path, e))?;

        info!("Saved {} with shape {:?}", self.describe(), df.shape());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{:?} dataset at {}", self.format, self.path.display())
    }
}
