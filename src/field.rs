//! Presentation and extraction of editable values, one rule per [`FieldKind`].

use chrono::NaiveDate;
use log::warn;

use crate::{
    schema::FieldKind,
    value::{DATE_FORMAT, RawValue, normalize, parse_strict_date, today},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditValue {
    ReadOnly(String),
    Text(String),
    Choice {
        options: Vec<String>,
        selected: String,
    },
    Date(NaiveDate),
}

/// Builds the editable form of `value`, using `today` for missing dates.
pub fn present_on(kind: &FieldKind, value: Option<&RawValue>, today: NaiveDate) -> EditValue {
    let canonical = value.map(normalize).unwrap_or_default();
    match kind {
        FieldKind::ReadOnly => EditValue::ReadOnly(canonical),
        FieldKind::Text => EditValue::Text(canonical),
        FieldKind::Choice(options) => {
            let selected = if options.iter().any(|o| *o == canonical) {
                canonical
            } else {
                if !canonical.is_empty() {
                    warn!("Value '{canonical}' is not one of {options:?}; selecting the default");
                }
                options.first().cloned().unwrap_or_default()
            };
            EditValue::Choice {
                options: options.clone(),
                selected,
            }
        }
        FieldKind::Date => {
            let date = value
                .and_then(RawValue::as_date)
                .or_else(|| parse_strict_date(&canonical))
                .unwrap_or(today);
            EditValue::Date(date)
        }
    }
}

pub fn present(kind: &FieldKind, value: Option<&RawValue>) -> EditValue {
    present_on(kind, value, today())
}

/// The string an edited value is saved as.
pub fn extract(value: &EditValue) -> String {
    match value {
        EditValue::ReadOnly(text) => text.clone(),
        EditValue::Text(text) => text.trim().to_string(),
        EditValue::Choice { selected, .. } => selected.clone(),
        EditValue::Date(date) => date.format(DATE_FORMAT).to_string(),
    }
}
