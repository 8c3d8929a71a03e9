//! Editing session: load, search, save, and add flows over one table.

use log::{info, warn};

use crate::{
    error::{EditorError, Result},
    field::{self, EditValue},
    query::{QueryBuilder, SearchFilters},
    reconcile::{BatchReport, EditedRow, Reconciler},
    repository::Repository,
    schema::TableConfig,
    snapshot::{Snapshot, SnapshotStore},
    value::RawValue,
};

pub struct Editor<R> {
    config: TableConfig,
    repository: R,
    store: SnapshotStore,
    filters: SearchFilters,
}

impl<R: Repository> Editor<R> {
    pub fn new(config: TableConfig, repository: R) -> Self {
        Self {
            config,
            repository,
            store: SnapshotStore::new(),
            filters: SearchFilters::new(),
        }
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    /// Re-runs the current search and replaces the snapshot.
    pub fn load(&mut self) -> Result<&Snapshot> {
        let query = QueryBuilder::new(&self.config).build_select(&self.filters)?;
        let fetched = self.repository.fetch(&query)?;

        let unknown = self.config.columns.unknown_columns(&fetched.headers);
        if !unknown.is_empty() {
            if self.config.strict_columns {
                return Err(EditorError::validation(format!(
                    "Table {} returned undeclared column(s): {}",
                    self.config.table,
                    unknown.join(", ")
                )));
            }
            warn!(
                "Column(s) {} are not declared; editing them as text",
                unknown.join(", ")
            );
        }

        self.store.load(fetched.headers, fetched.rows)?;
        info!(
            "Loaded {} row(s) from {}",
            self.store.len(),
            self.config.table
        );
        self.store
            .snapshot()
            .ok_or_else(|| EditorError::validation("Snapshot missing after load"))
    }

    /// Searches with `filters`. On failure both the snapshot and the
    /// previous filters are kept.
    pub fn search(&mut self, filters: SearchFilters) -> Result<&Snapshot> {
        if let Some(column) = filters.columns().find(|c| !self.config.is_searchable(c)) {
            return Err(EditorError::validation(format!(
                "Column '{column}' is not searchable"
            )));
        }
        let previous = std::mem::replace(&mut self.filters, filters);
        let loaded = self.load().map(|_| ());
        if let Err(err) = loaded {
            self.filters = previous;
            return Err(err);
        }
        self.store
            .snapshot()
            .ok_or_else(|| EditorError::validation("Snapshot missing after load"))
    }

    pub fn clear_search(&mut self) -> Result<&Snapshot> {
        self.search(SearchFilters::new())
    }

    pub fn is_possibly_truncated(&self) -> bool {
        self.store.is_loaded() && self.store.len() == self.config.row_limit
    }

    /// Saves edited rows against the held snapshot. When anything was
    /// written the snapshot is discarded and reloaded.
    ///
    /// A reload failure is recorded on the report rather than returned, and
    /// the store is left empty.
    pub fn save(&mut self, edited: &[EditedRow]) -> Result<BatchReport> {
        let snapshot = self.store.snapshot().ok_or_else(|| {
            EditorError::validation("No records are loaded; load or search before saving")
        })?;
        let mut report =
            Reconciler::new(&self.config).reconcile_batch(snapshot.rows(), edited, &self.repository);
        if report.updated_count > 0 {
            self.store.invalidate();
            let reloaded = self.load().map(|_| ());
            if let Err(err) = reloaded {
                warn!(
                    "Saved {} record(s) but reloading {} failed: {err}",
                    report.updated_count, self.config.table
                );
                report.reload_error = Some(err.to_string());
            }
        }
        Ok(report)
    }

    /// Editable values for a new record: one per create field, each
    /// defaulted by its field kind and overridden by `values`.
    pub fn new_record_form(&self, values: &EditedRow) -> Vec<(String, EditValue)> {
        self.config
            .create_fields
            .iter()
            .map(|column| {
                let provided = values.get(column).map(|v| RawValue::text(v.as_str()));
                let kind = self.config.kind_of(column);
                (column.clone(), field::present(kind, provided.as_ref()))
            })
            .collect()
    }

    /// Inserts a new record built over the configured create fields.
    pub fn add_record(&mut self, values: &EditedRow) -> Result<usize> {
        if let Some(unknown) = values
            .keys()
            .find(|k| !self.config.create_fields.contains(*k))
        {
            return Err(EditorError::validation(format!(
                "'{unknown}' is not a field that can be set on a new record"
            )));
        }
        for required in &self.config.required_fields {
            let blank = values.get(required).is_none_or(|v| v.trim().is_empty());
            if blank {
                return Err(EditorError::validation(format!("{required} is missing")));
            }
        }

        let reconciler = Reconciler::new(&self.config);
        reconciler.validate_values(values.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

        let (columns, values): (Vec<String>, Vec<String>) = self
            .new_record_form(values)
            .iter()
            .map(|(column, value)| (column.clone(), field::extract(value)))
            .unzip();
        let params = columns
            .iter()
            .zip(&values)
            .map(|(column, value)| reconciler.typed_value(column, value))
            .collect();
        let query = QueryBuilder::new(&self.config).build_insert(&columns, params)?;
        let inserted = self.repository.execute(&query)?;
        info!("Added {inserted} record(s) to {}", self.config.table);
        if self.store.is_loaded() {
            self.store.invalidate();
            self.load()?;
        }
        Ok(inserted)
    }
}
