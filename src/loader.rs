use polars::prelude::DataFrame;
use log::debug;

use crate::dataset::TableStore;
use crate::error::Result;
use crate::table;

/// Wraps a [`TableStore`] so that loading a table which was never written
/// yields the empty table instead of an error.
///
/// This lets accumulate-then-append pipelines run their first iteration
/// against a dataset that does not exist yet. Every failure other than
/// absence (permissions, corrupt content, ...) still reaches the caller.
#[derive(Debug, Clone)]
pub struct ResilientLoader<S> {
    inner: S,
}

impl<S: TableStore> ResilientLoader<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: TableStore> TableStore for ResilientLoader<S> {
    fn exists(&self) -> Result<bool> {
        self.inner.exists()
    }

    fn load(&self) -> Result<DataFrame> {
        if !self.inner.exists()? {
            debug!("{} does not exist, loading an empty table", self.inner.describe());
            return Ok(table::empty());
        }

        match self.inner.load() {
            // Removed between the existence check and the read
            Err(e) if e.is_missing() => Ok(table::empty()),
            other => other,
        }
    }

    fn save(&self, df: &DataFrame) -> Result<()> {
        self.inner.save(df)
    }

    fn describe(&self) -> String {
        format!("resilient {}", self.inner.describe())
    }
}
