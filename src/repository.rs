//! Query execution against the backing database.
//!
//! [`SqliteRepository`] opens a fresh connection for every call; nothing is
//! pooled or held between operations.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use rusqlite::{
    Connection, OpenFlags, params_from_iter,
    types::{Value as SqlValue, ValueRef},
};

use crate::{
    error::{EditorError, Result},
    query::Query,
    value::{RawValue, parse_naive_datetime, parse_strict_date},
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Column names and typed rows returned by a fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRows {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

pub trait Repository {
    fn fetch(&self, query: &Query) -> Result<FetchedRows>;

    /// Executes a write and returns the number of rows affected.
    fn execute(&self, query: &Query) -> Result<usize>;
}

impl<R: Repository + ?Sized> Repository for &R {
    fn fetch(&self, query: &Query) -> Result<FetchedRows> {
        (**self).fetch(query)
    }

    fn execute(&self, query: &Query) -> Result<usize> {
        (**self).execute(query)
    }
}

#[derive(Debug, Clone)]
pub struct SqliteRepository {
    path: PathBuf,
}

impl SqliteRepository {
    /// `connection` is a database path, optionally prefixed with `sqlite://`.
    pub fn new(connection: &str) -> Result<Self> {
        let trimmed = connection.trim();
        let path = trimmed.strip_prefix("sqlite://").unwrap_or(trimmed);
        if path.is_empty() {
            return Err(EditorError::Config(
                "Database connection string is empty".to_string(),
            ));
        }
        Ok(Self {
            path: PathBuf::from(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

impl Repository for SqliteRepository {
    fn fetch(&self, query: &Query) -> Result<FetchedRows> {
        debug!("fetch: {} ({} param(s))", query.sql, query.params.len());
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&query.sql)?;
        let columns = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), declared_kind(c.decl_type())))
            .collect::<Vec<_>>();

        let mut rows = stmt.query(params_from_iter(query.params.iter().map(to_sql_value)))?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, (_, declared)) in columns.iter().enumerate() {
                values.push(decode_value(row.get_ref(idx)?, *declared));
            }
            fetched.push(values);
        }
        Ok(FetchedRows {
            headers: columns.into_iter().map(|(name, _)| name).collect(),
            rows: fetched,
        })
    }

    fn execute(&self, query: &Query) -> Result<usize> {
        debug!("execute: {} ({} param(s))", query.sql, query.params.len());
        let conn = self.connect()?;
        let affected = conn.execute(
            &query.sql,
            params_from_iter(query.params.iter().map(to_sql_value)),
        )?;
        Ok(affected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclaredKind {
    Date,
    Timestamp,
    Other,
}

fn declared_kind(decl_type: Option<&str>) -> DeclaredKind {
    let Some(decl) = decl_type else {
        return DeclaredKind::Other;
    };
    let upper = decl.trim().to_ascii_uppercase();
    if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
        DeclaredKind::Timestamp
    } else if upper.starts_with("DATE") {
        DeclaredKind::Date
    } else {
        DeclaredKind::Other
    }
}

fn decode_value(value: ValueRef<'_>, declared: DeclaredKind) -> RawValue {
    match value {
        ValueRef::Null => RawValue::Null,
        ValueRef::Integer(i) => RawValue::Integer(i),
        ValueRef::Real(f) => RawValue::Real(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match declared {
                DeclaredKind::Date => parse_strict_date(&text)
                    .map(RawValue::Date)
                    .or_else(|| parse_naive_datetime(&text).map(|ts| RawValue::Date(ts.date())))
                    .unwrap_or(RawValue::Text(text)),
                DeclaredKind::Timestamp => parse_naive_datetime(&text)
                    .map(RawValue::Timestamp)
                    .unwrap_or(RawValue::Text(text)),
                DeclaredKind::Other => RawValue::Text(text),
            }
        }
        ValueRef::Blob(_) => RawValue::Unsupported("blob".to_string()),
    }
}

fn to_sql_value(value: &RawValue) -> SqlValue {
    match value {
        RawValue::Null | RawValue::Unsupported(_) => SqlValue::Null,
        RawValue::Text(text) => SqlValue::Text(text.clone()),
        RawValue::Integer(i) => SqlValue::Integer(*i),
        RawValue::Real(f) => SqlValue::Real(*f),
        RawValue::Date(date) => SqlValue::Text(date.format("%Y-%m-%d").to_string()),
        RawValue::Timestamp(ts) => SqlValue::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
    }
}
