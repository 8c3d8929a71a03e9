//! Parameterized SQL construction.
//!
//! Values only ever travel as positional `?` parameters. Identifiers cannot
//! be bound, so every table and column name is checked against a plain
//! identifier pattern before it is written into SQL text.

use std::sync::OnceLock;

use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::{EditorError, Result},
    schema::TableConfig,
    value::RawValue,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Sqlite,
    SqlServer,
}

impl Dialect {
    /// Expression evaluating to the server's current time.
    pub fn now_expression(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "CURRENT_TIMESTAMP",
            Dialect::SqlServer => "GETDATE()",
        }
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<RawValue>,
}

impl Query {
    pub fn new(sql: impl Into<String>, params: Vec<RawValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

pub fn validate_identifier(name: &str) -> Result<()> {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    let pattern = IDENTIFIER.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles")
    });
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(EditorError::InvalidIdentifier(name.to_string()))
    }
}

/// Ordered column to search-term pairs; blank terms are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    terms: Vec<(String, String)>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `Column=term` directives.
    pub fn parse(directives: &[String]) -> Result<Self> {
        let mut filters = SearchFilters::new();
        for directive in directives {
            let (column, term) = directive.split_once('=').ok_or_else(|| {
                EditorError::validation(format!(
                    "Filter '{directive}' must be of the form Column=term"
                ))
            })?;
            let column = column.trim();
            if column.is_empty() {
                return Err(EditorError::validation(format!(
                    "Filter '{directive}' is missing a column name"
                )));
            }
            filters.set(column, term);
        }
        Ok(filters)
    }

    pub fn with(mut self, column: impl Into<String>, term: impl Into<String>) -> Self {
        self.set(column, term);
        self
    }

    /// Sets the term for `column`, replacing any earlier one.
    pub fn set(&mut self, column: impl Into<String>, term: impl Into<String>) {
        let column = column.into();
        let term = term.into();
        match self.terms.iter_mut().find(|(c, _)| *c == column) {
            Some(existing) => existing.1 = term,
            None => self.terms.push((column, term)),
        }
    }

    pub fn clear(&mut self) {
        self.terms.clear();
    }

    /// Filters that will contribute a condition.
    pub fn active(&self) -> impl Iterator<Item = (&str, &str)> {
        self.terms
            .iter()
            .map(|(c, t)| (c.as_str(), t.trim()))
            .filter(|(_, t)| !t.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|(c, _)| c.as_str())
    }
}

/// Builds the three statement shapes for one configured table.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    config: &'a TableConfig,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(config: &'a TableConfig) -> Self {
        Self { config }
    }

    pub fn build_select(&self, filters: &SearchFilters) -> Result<Query> {
        build_select(
            self.config.dialect,
            &self.config.table,
            &self.config.effective_sort(),
            self.config.row_limit,
            filters,
        )
    }

    pub fn build_insert(&self, columns: &[String], values: Vec<RawValue>) -> Result<Query> {
        build_insert(&self.config.table, columns, values)
    }

    /// UPDATE for one row. Primary-key, ignored, and audit columns are
    /// dropped from `assignments`; the audit column is stamped instead.
    pub fn build_update(
        &self,
        primary_key_value: &RawValue,
        assignments: &[(String, RawValue)],
    ) -> Result<Query> {
        let config = self.config;
        validate_identifier(&config.table)?;
        validate_identifier(&config.primary_key)?;
        validate_identifier(&config.touch_column)?;
        if primary_key_value.is_blank() {
            return Err(EditorError::MissingPrimaryKey {
                column: config.primary_key.clone(),
            });
        }

        let retained = assignments
            .iter()
            .filter(|(column, _)| {
                column != &config.primary_key
                    && column != &config.touch_column
                    && !config.is_ignored(column)
            })
            .collect::<Vec<_>>();
        if retained.is_empty() {
            return Err(EditorError::EmptyChangeSet);
        }

        let mut set_parts = Vec::with_capacity(retained.len() + 1);
        let mut params = Vec::with_capacity(retained.len() + 1);
        for (column, value) in retained {
            validate_identifier(column)?;
            set_parts.push(format!("{column}=?"));
            params.push(value.clone());
        }
        set_parts.push(format!(
            "{}={}",
            config.touch_column,
            config.dialect.now_expression()
        ));
        params.push(primary_key_value.clone());

        let sql = format!(
            "UPDATE {} SET {} WHERE {}=?",
            config.table,
            set_parts.join(", "),
            config.primary_key
        );
        Ok(Query::new(sql, params))
    }
}

pub fn build_select(
    dialect: Dialect,
    table: &str,
    order_by: &[String],
    limit: usize,
    filters: &SearchFilters,
) -> Result<Query> {
    validate_identifier(table)?;
    for column in order_by {
        validate_identifier(column)?;
    }

    let mut conditions = Vec::new();
    let mut params = Vec::new();
    for (column, term) in filters.active() {
        validate_identifier(column)?;
        conditions.push(format!("{column} LIKE ?"));
        params.push(RawValue::Text(format!("%{term}%")));
    }

    let mut sql = match dialect {
        Dialect::Sqlite => format!("SELECT * FROM {table} WHERE 1=1"),
        Dialect::SqlServer => format!("SELECT TOP {limit} * FROM {table} WHERE 1=1"),
    };
    for condition in &conditions {
        sql.push_str(" AND ");
        sql.push_str(condition);
    }
    if !order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_by.iter().join(", "));
    }
    if dialect == Dialect::Sqlite {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(Query::new(sql, params))
}

pub fn build_insert(table: &str, columns: &[String], values: Vec<RawValue>) -> Result<Query> {
    if columns.is_empty() {
        return Err(EditorError::EmptyColumnSet);
    }
    if columns.len() != values.len() {
        return Err(EditorError::validation(format!(
            "Insert has {} column(s) but {} value(s)",
            columns.len(),
            values.len()
        )));
    }
    validate_identifier(table)?;
    for column in columns {
        validate_identifier(column)?;
    }
    let placeholders = std::iter::repeat_n("?", columns.len()).join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.iter().join(", ")
    );
    Ok(Query::new(sql, values))
}
