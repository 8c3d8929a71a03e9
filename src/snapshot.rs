//! Last-fetched table state, held for diffing edits.
//!
//! A [`Snapshot`] is immutable once built. [`SnapshotStore::load`] constructs
//! the replacement in full before swapping it in, so a rejected load leaves
//! the previous snapshot visible.

use std::{collections::HashSet, sync::Arc};

use log::debug;
use serde::Serialize;

use crate::{
    error::{EditorError, Result},
    value::{RawValue, normalize},
};

/// One fetched row: typed values in header order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(skip)]
    headers: Arc<[String]>,
    values: Vec<RawValue>,
}

impl Record {
    pub fn new(headers: Arc<[String]>, values: Vec<RawValue>) -> Result<Self> {
        if headers.len() != values.len() {
            return Err(EditorError::validation(format!(
                "Row has {} value(s) but the table has {} column(s)",
                values.len(),
                headers.len()
            )));
        }
        Ok(Self { headers, values })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn values(&self) -> &[RawValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.headers
            .iter()
            .position(|h| h == column)
            .map(|idx| &self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Canonical strings in header order.
    pub fn canonical(&self) -> Vec<String> {
        self.values.iter().map(normalize).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    headers: Arc<[String]>,
    rows: Vec<Record>,
}

impl Snapshot {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<RawValue>>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(headers.len());
        if let Some(duplicate) = headers.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(EditorError::validation(format!(
                "Column '{duplicate}' appears more than once in the result set"
            )));
        }
        let headers: Arc<[String]> = headers.into();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, values)| {
                Record::new(Arc::clone(&headers), values).map_err(|err| {
                    EditorError::validation(format!("Fetched row {}: {err}", idx + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Canonical string grid, as shown to the operator.
    pub fn canonical_rows(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(Record::canonical).collect()
    }
}

#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: Option<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the held snapshot. On error the previous one is kept.
    pub fn load(&mut self, headers: Vec<String>, rows: Vec<Vec<RawValue>>) -> Result<&Snapshot> {
        let snapshot = Snapshot::new(headers, rows)?;
        debug!(
            "Snapshot replaced: {} row(s) x {} column(s)",
            snapshot.len(),
            snapshot.headers().len()
        );
        Ok(self.current.insert(snapshot))
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn row_at(&self, index: usize) -> Option<&Record> {
        self.current.as_ref().and_then(|s| s.rows.get(index))
    }

    pub fn headers(&self) -> &[String] {
        self.current.as_ref().map(Snapshot::headers).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.current.as_ref().map(Snapshot::len).unwrap_or(0)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    /// Drops the snapshot once it no longer reflects the server.
    pub fn invalidate(&mut self) {
        if self.current.take().is_some() {
            debug!("Snapshot invalidated");
        }
    }
}
