//! Snapshot-versus-edit reconciliation.
//!
//! [`Reconciler::diff`] compares one edited row against its snapshot record
//! in canonical string form and keeps only the columns that may be written.
//! [`Reconciler::reconcile_batch`] turns every non-empty change set into a
//! single UPDATE, collecting failures per row without stopping the batch.

use std::{collections::BTreeMap, fmt};

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    error::{EditorError, Result},
    query::QueryBuilder,
    repository::Repository,
    schema::{FieldKind, TableConfig},
    snapshot::Record,
    value::{DATE_FORMAT, RawValue, normalize, parse_strict_date},
};

/// Edited values for one row, keyed by column name.
pub type EditedRow = BTreeMap<String, String>;

/// Column edits for one row, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    changes: Vec<(String, String)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.changes
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.changes.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    pub fn columns(&self) -> Vec<&str> {
        self.changes.iter().map(|(c, _)| c.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based position of the row in the edited set.
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    NoChanges,
    Saved,
    PartiallySaved,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub updated_count: usize,
    pub unchanged_count: usize,
    pub per_row_errors: Vec<RowError>,
    /// Set when the post-save reload failed after rows were written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_error: Option<String>,
}

impl BatchReport {
    pub fn has_errors(&self) -> bool {
        !self.per_row_errors.is_empty()
    }

    pub fn outcome(&self) -> SaveOutcome {
        match (self.updated_count, self.has_errors()) {
            (0, false) => SaveOutcome::NoChanges,
            (0, true) => SaveOutcome::Failed,
            (_, false) => SaveOutcome::Saved,
            (_, true) => SaveOutcome::PartiallySaved,
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome() {
            SaveOutcome::NoChanges => write!(f, "No modifications were detected.")?,
            SaveOutcome::Failed => write!(f, "No records were saved.")?,
            SaveOutcome::Saved | SaveOutcome::PartiallySaved => {
                write!(f, "Successfully updated {} record(s).", self.updated_count)?
            }
        }
        for error in &self.per_row_errors {
            write!(f, "\nRow {}: {}", error.row, error.message)?;
        }
        if let Some(error) = &self.reload_error {
            write!(f, "\nReloading after save failed: {error}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    config: &'a TableConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a TableConfig) -> Self {
        Self { config }
    }

    /// Columns whose edited value differs from the snapshot, excluding the
    /// primary key and ignored columns. Both sides are compared in canonical
    /// form and the change set holds the canonical edited value. Columns
    /// missing from `edited` are treated as unchanged.
    pub fn diff(&self, original: &Record, edited: &EditedRow) -> ChangeSet {
        let changes = original
            .iter()
            .filter(|(column, _)| self.is_writable(column))
            .filter_map(|(column, value)| {
                let new_value = self.canonical_edit(column, edited.get(column)?);
                (normalize(value) != new_value).then(|| (column.to_string(), new_value))
            })
            .collect();
        ChangeSet { changes }
    }

    /// Trimmed edited value; parseable dates are rewritten as `YYYY-MM-DD`.
    pub fn canonical_edit(&self, column: &str, value: &str) -> String {
        let trimmed = value.trim();
        match self.config.kind_of(column) {
            FieldKind::Date => parse_strict_date(trimmed)
                .map(|date| date.format(DATE_FORMAT).to_string())
                .unwrap_or_else(|| trimmed.to_string()),
            _ => trimmed.to_string(),
        }
    }

    fn is_writable(&self, column: &str) -> bool {
        column != self.config.primary_key && !self.config.is_ignored(column)
    }

    /// Updates every changed row; one failure never stops the others.
    pub fn reconcile_batch<R>(
        &self,
        originals: &[Record],
        edited: &[EditedRow],
        repository: &R,
    ) -> BatchReport
    where
        R: Repository + ?Sized,
    {
        if originals.len() != edited.len() {
            warn!(
                "Edited row count ({}) differs from snapshot row count ({}); extra rows are skipped",
                edited.len(),
                originals.len()
            );
        }

        let mut report = BatchReport::default();
        for (idx, (original, row)) in originals.iter().zip(edited).enumerate() {
            let row_number = idx + 1;
            let changes = self.diff(original, row);
            if changes.is_empty() {
                report.unchanged_count += 1;
                continue;
            }
            debug!("Row {row_number} changed: {:?}", changes.columns());
            match self.apply(original, row, &changes, repository) {
                Ok(()) => report.updated_count += 1,
                Err(err) => {
                    warn!("Row {row_number} failed to save: {err}");
                    report.per_row_errors.push(RowError {
                        row: row_number,
                        message: err.to_string(),
                    });
                }
            }
        }
        info!(
            "Batch complete: {} updated, {} unchanged, {} failed",
            report.updated_count,
            report.unchanged_count,
            report.per_row_errors.len()
        );
        report
    }

    fn apply<R>(
        &self,
        original: &Record,
        edited: &EditedRow,
        changes: &ChangeSet,
        repository: &R,
    ) -> Result<()>
    where
        R: Repository + ?Sized,
    {
        let key_column = &self.config.primary_key;
        let key = original.get(key_column).cloned().unwrap_or(RawValue::Null);
        if key.is_blank() {
            return Err(EditorError::MissingPrimaryKey {
                column: key_column.clone(),
            });
        }
        if let Some(edited_key) = edited.get(key_column).map(|k| k.trim())
            && !edited_key.is_empty()
            && edited_key != normalize(&key)
        {
            return Err(EditorError::validation(format!(
                "{key_column} '{edited_key}' does not match the loaded record ({})",
                normalize(&key)
            )));
        }
        self.validate(changes)?;

        let assignments = self.assignments(changes);
        let query = QueryBuilder::new(self.config).build_update(&key, &assignments)?;
        let affected = repository.execute(&query)?;
        if affected == 0 {
            return Err(EditorError::Storage(format!(
                "No record with {key_column}={} exists",
                normalize(&key)
            )));
        }
        Ok(())
    }

    /// Rejects values the field kind cannot hold.
    pub fn validate(&self, changes: &ChangeSet) -> Result<()> {
        self.validate_values(changes.iter())
    }

    pub fn validate_values<'v, I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'v str, &'v str)>,
    {
        for (column, value) in values {
            match self.config.kind_of(column) {
                FieldKind::ReadOnly => {
                    return Err(EditorError::validation(format!(
                        "Column '{column}' is read-only"
                    )));
                }
                FieldKind::Choice(options) if !options.iter().any(|o| o == value.trim()) => {
                    return Err(EditorError::validation(format!(
                        "'{value}' is not a valid {column} (expected one of {options:?})"
                    )));
                }
                FieldKind::Date if !value.trim().is_empty() && parse_strict_date(value).is_none() => {
                    return Err(EditorError::validation(format!(
                        "'{value}' is not a valid {column} date (expected YYYY-MM-DD)"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Parameter value for an edited string. Dates are bound as dates and
    /// blank dates as NULL; everything else is bound as trimmed text.
    pub fn typed_value(&self, column: &str, value: &str) -> RawValue {
        let trimmed = value.trim();
        match self.config.kind_of(column) {
            FieldKind::Date if trimmed.is_empty() => RawValue::Null,
            FieldKind::Date => parse_strict_date(trimmed)
                .map(RawValue::Date)
                .unwrap_or_else(|| RawValue::text(trimmed)),
            _ => RawValue::text(trimmed),
        }
    }

    pub fn assignments(&self, changes: &ChangeSet) -> Vec<(String, RawValue)> {
        changes
            .iter()
            .map(|(column, value)| (column.to_string(), self.typed_value(column, value)))
            .collect()
    }
}
