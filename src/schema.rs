//! Column schema and table configuration.
//!
//! [`TableConfig`] is the single source of truth for the edited table: which
//! columns exist and how each is edited ([`FieldKind`]), which columns are
//! searchable or used on record creation, and the static SQL settings
//! (table name, primary key, sort order, ignored columns, audit column).
//! It is built once at startup, either from the built-in cohort-member
//! defaults or from a YAML file, and passed by reference to every component
//! that needs it.

use std::{collections::HashSet, fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};

use crate::{
    error::{EditorError, Result},
    query::{Dialect, validate_identifier},
};

/// Hard cap on rows fetched in a single load.
pub const MAX_ROW_LIMIT: usize = 1000;

static DEFAULT_KIND: FieldKind = FieldKind::Text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    ReadOnly,
    Text,
    Choice(Vec<String>),
    Date,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::ReadOnly => "read_only",
            FieldKind::Text => "text",
            FieldKind::Choice(_) => "choice",
            FieldKind::Date => "date",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, FieldKind::ReadOnly)
    }

    pub fn options(&self) -> &[String] {
        match self {
            FieldKind::Choice(options) => options,
            _ => &[],
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Choice(options) => {
                let rendered = options
                    .iter()
                    .map(|o| format!("'{o}'"))
                    .collect::<Vec<_>>()
                    .join("|");
                write!(f, "choice({rendered})")
            }
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KindTag {
    ReadOnly,
    Text,
    Choice,
    Date,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnSpecRepr {
    name: String,
    kind: KindTag,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ColumnSpecRepr", into = "ColumnSpecRepr")]
pub struct ColumnSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl TryFrom<ColumnSpecRepr> for ColumnSpec {
    type Error = String;

    fn try_from(repr: ColumnSpecRepr) -> std::result::Result<Self, Self::Error> {
        let has_options = !repr.options.is_empty();
        let kind = match repr.kind {
            KindTag::ReadOnly => FieldKind::ReadOnly,
            KindTag::Text => FieldKind::Text,
            KindTag::Date => FieldKind::Date,
            KindTag::Choice => {
                if !has_options {
                    return Err(format!("Choice column '{}' must list options", repr.name));
                }
                FieldKind::Choice(repr.options)
            }
        };
        if has_options && !matches!(kind, FieldKind::Choice(_)) {
            return Err(format!(
                "Column '{}' lists options but is not a choice column",
                repr.name
            ));
        }
        Ok(ColumnSpec {
            name: repr.name,
            kind,
        })
    }
}

impl From<ColumnSpec> for ColumnSpecRepr {
    fn from(spec: ColumnSpec) -> Self {
        let (kind, options) = match spec.kind {
            FieldKind::ReadOnly => (KindTag::ReadOnly, Vec::new()),
            FieldKind::Text => (KindTag::Text, Vec::new()),
            FieldKind::Date => (KindTag::Date, Vec::new()),
            FieldKind::Choice(options) => (KindTag::Choice, options),
        };
        ColumnSpecRepr {
            name: spec.name,
            kind,
            options,
        }
    }
}

/// Ordered column name to [`FieldKind`] mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSchema {
    columns: Vec<ColumnSpec>,
}

impl ColumnSchema {
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self> {
        let schema = Self { columns };
        schema.ensure_unique()?;
        Ok(schema)
    }

    fn ensure_unique(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(EditorError::Config(format!(
                    "Column '{}' is declared more than once",
                    column.name
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Kind for `name`; undeclared columns edit as free text.
    pub fn kind_of(&self, name: &str) -> &FieldKind {
        self.get(name).map(|c| &c.kind).unwrap_or(&DEFAULT_KIND)
    }

    pub fn unknown_columns<'a>(&self, headers: &'a [String]) -> Vec<&'a str> {
        headers
            .iter()
            .filter(|h| !self.is_known(h))
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub table: String,
    pub primary_key: String,
    #[serde(default)]
    pub sort_columns: Vec<String>,
    /// Server-managed columns never written by an update.
    #[serde(default)]
    pub ignored_columns: Vec<String>,
    /// Audit column stamped with the database's current time on every update.
    pub touch_column: String,
    #[serde(default = "TableConfig::default_row_limit")]
    pub row_limit: usize,
    #[serde(default)]
    pub dialect: Dialect,
    /// Reject fetched columns missing from `columns` instead of warning.
    #[serde(default)]
    pub strict_columns: bool,
    pub columns: ColumnSchema,
    #[serde(default)]
    pub search_columns: Vec<String>,
    #[serde(default)]
    pub create_fields: Vec<String>,
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl TableConfig {
    pub const fn default_row_limit() -> usize {
        MAX_ROW_LIMIT
    }

    /// Built-in configuration for `tblCohortMember`.
    pub fn cohort_member() -> Self {
        let columns = vec![
            ColumnSpec::new("RecID", FieldKind::ReadOnly),
            ColumnSpec::new("FamilySerial", FieldKind::Text),
            ColumnSpec::new("CohortMemberID", FieldKind::Text),
            ColumnSpec::new("FirstName", FieldKind::Text),
            ColumnSpec::new("Surname", FieldKind::Text),
            ColumnSpec::new("Title", FieldKind::Text),
            ColumnSpec::new(
                "Sex",
                FieldKind::Choice(vec![String::new(), "M".to_string(), "F".to_string()]),
            ),
            ColumnSpec::new("DateOfBirth", FieldKind::Date),
            ColumnSpec::new("Status", FieldKind::ReadOnly),
            ColumnSpec::new("StatusDate", FieldKind::ReadOnly),
        ];
        TableConfig {
            table: "tblCohortMember".to_string(),
            primary_key: "RecID".to_string(),
            sort_columns: strings(&["RecID", "FamilySerial", "CohortMemberID"]),
            ignored_columns: strings(&["Status", "StatusDate"]),
            touch_column: "StatusDate".to_string(),
            row_limit: MAX_ROW_LIMIT,
            dialect: Dialect::Sqlite,
            strict_columns: false,
            columns: ColumnSchema { columns },
            search_columns: strings(&["FamilySerial", "CohortMemberID", "Surname", "FirstName"]),
            create_fields: strings(&[
                "FamilySerial",
                "CohortMemberID",
                "Surname",
                "FirstName",
                "Title",
                "Sex",
                "DateOfBirth",
            ]),
            required_fields: strings(&["CohortMemberID", "Surname"]),
        }
    }

    pub fn load(path: &Path) -> AnyResult<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: TableConfig =
            serde_yaml::from_reader(reader).context("Parsing table config YAML")?;
        config
            .validate()
            .with_context(|| format!("Validating table config {path:?}"))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> AnyResult<()> {
        let file = File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing table config YAML")
    }

    pub fn to_yaml_string(&self) -> AnyResult<String> {
        serde_yaml::to_string(self).context("Serializing table config to YAML string")
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.primary_key)?;
        validate_identifier(&self.touch_column)?;
        self.columns.ensure_unique()?;
        for column in self.columns.iter() {
            validate_identifier(&column.name)?;
        }
        for name in self
            .sort_columns
            .iter()
            .chain(&self.ignored_columns)
            .chain(&self.search_columns)
        {
            validate_identifier(name)?;
        }
        if self.row_limit == 0 || self.row_limit > MAX_ROW_LIMIT {
            return Err(EditorError::Config(format!(
                "row_limit must be between 1 and {MAX_ROW_LIMIT} (found {})",
                self.row_limit
            )));
        }
        for name in &self.create_fields {
            validate_identifier(name)?;
            if name == &self.primary_key || self.columns.kind_of(name).is_read_only() {
                return Err(EditorError::Config(format!(
                    "Create field '{name}' is read-only"
                )));
            }
        }
        for name in &self.required_fields {
            if !self.create_fields.contains(name) {
                return Err(EditorError::Config(format!(
                    "Required field '{name}' is not a create field"
                )));
            }
        }
        if self.create_fields.len() != self.create_fields.iter().collect::<HashSet<_>>().len() {
            return Err(EditorError::Config(
                "create_fields contains duplicates".to_string(),
            ));
        }
        Ok(())
    }

    pub fn kind_of(&self, column: &str) -> &FieldKind {
        self.columns.kind_of(column)
    }

    pub fn is_ignored(&self, column: &str) -> bool {
        self.ignored_columns.iter().any(|c| c == column)
    }

    pub fn is_searchable(&self, column: &str) -> bool {
        self.search_columns.iter().any(|c| c == column)
    }

    /// Sort columns, falling back to the primary key when none are configured.
    pub fn effective_sort(&self) -> Vec<String> {
        if self.sort_columns.is_empty() {
            vec![self.primary_key.clone()]
        } else {
            self.sort_columns.clone()
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig::cohort_member()
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
