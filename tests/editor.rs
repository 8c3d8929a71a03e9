mod common;

use std::cell::Cell;

use chrono::Local;
use cohort_editor::{
    EditorError,
    editor::Editor,
    query::{Query, SearchFilters},
    reconcile::{EditedRow, SaveOutcome},
    repository::{FetchedRows, Repository, SqliteRepository},
    schema::{MAX_ROW_LIMIT, TableConfig},
    snapshot::Snapshot,
    value::RawValue,
};
use common::TestWorkspace;
use rusqlite::params;

fn open(workspace: &TestWorkspace) -> Editor<SqliteRepository> {
    let repository = SqliteRepository::new(&workspace.db_arg()).expect("repository");
    Editor::new(TableConfig::cohort_member(), repository)
}

fn edited_rows(snapshot: &Snapshot) -> Vec<EditedRow> {
    snapshot
        .rows()
        .iter()
        .map(|record| {
            record
                .headers()
                .iter()
                .cloned()
                .zip(record.canonical())
                .collect()
        })
        .collect()
}

fn row(values: &[(&str, &str)]) -> EditedRow {
    values
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn load_orders_rows_and_types_dates() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    let snapshot = editor.load().expect("load");

    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.headers()[0], "RecID");
    let grid = snapshot.canonical_rows();
    let ids = grid.iter().map(|r| r[2].as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["M001", "M002", "M003"]);
    assert_eq!(grid[0][7], "2000-01-01");
    assert_eq!(grid[0][9], "2024-01-01 09:00:00");
    assert_eq!(grid[2][7], "");
    assert!(!editor.is_possibly_truncated());
}

#[test]
fn search_matches_substrings_and_clear_restores_everything() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);

    let snapshot = editor
        .search(SearchFilters::new().with("Surname", "mit").with("FirstName", " "))
        .expect("search");
    assert_eq!(snapshot.len(), 2);

    let snapshot = editor
        .search(SearchFilters::new().with("Surname", "Sm").with("FirstName", "Ja"))
        .expect("narrower search");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.canonical_rows()[0][2], "M002");

    assert_eq!(editor.clear_search().expect("clear").len(), 3);
}

#[test]
fn search_on_unsearchable_column_is_rejected() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    editor.load().expect("load");
    let err = editor
        .search(SearchFilters::new().with("Title", "Dr"))
        .unwrap_err();
    assert!(matches!(err, EditorError::Validation(_)));
    assert_eq!(editor.store().len(), 3);
}

#[test]
fn failed_fetch_keeps_previous_snapshot_and_filters() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    editor
        .search(SearchFilters::new().with("FamilySerial", "F001"))
        .expect("search");
    assert_eq!(editor.store().len(), 2);

    workspace
        .connection()
        .execute_batch("DROP TABLE tblCohortMember;")
        .expect("drop table");

    let err = editor
        .search(SearchFilters::new().with("Surname", "Jones"))
        .unwrap_err();
    assert!(err.is_storage());
    assert_eq!(editor.store().len(), 2);
    assert_eq!(
        editor.filters().active().collect::<Vec<_>>(),
        vec![("FamilySerial", "F001")]
    );
}

#[test]
fn save_writes_only_changed_rows_and_stamps_status_date() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    let mut rows = edited_rows(editor.load().expect("load"));
    rows[0].insert("Surname".to_string(), "Smyth".to_string());

    let report = editor.save(&rows).expect("save");
    assert_eq!(report.outcome(), SaveOutcome::Saved);
    assert_eq!(report.updated_count, 1);
    assert_eq!(report.unchanged_count, 2);
    assert_eq!(report.to_string(), "Successfully updated 1 record(s).");

    assert_eq!(workspace.column_for("M001", "Surname").as_deref(), Some("Smyth"));
    assert_ne!(
        workspace.column_for("M001", "StatusDate").as_deref(),
        Some("2024-01-01 09:00:00")
    );
    assert_eq!(
        workspace.column_for("M002", "StatusDate").as_deref(),
        Some("2024-01-01 09:00:00")
    );
    assert_eq!(workspace.column_for("M001", "Status").as_deref(), Some("Active"));

    // The snapshot was reloaded, so saving the same rows again is a no-op.
    let again = editor.save(&rows).expect("second save");
    assert_eq!(again.outcome(), SaveOutcome::NoChanges);
}

#[test]
fn constraint_violation_is_reported_for_its_row_only() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    let mut rows = edited_rows(editor.load().expect("load"));
    rows[0].insert("FirstName".to_string(), "Jon".to_string());
    rows[1].insert("CohortMemberID".to_string(), "M001".to_string());
    rows[2].insert("Sex".to_string(), "F".to_string());

    let report = editor.save(&rows).expect("save");
    assert_eq!(report.outcome(), SaveOutcome::PartiallySaved);
    assert_eq!(report.updated_count, 2);
    assert_eq!(report.per_row_errors.len(), 1);
    assert_eq!(report.per_row_errors[0].row, 2);
    assert!(report.per_row_errors[0].message.contains("UNIQUE"));

    assert_eq!(workspace.column_for("M001", "FirstName").as_deref(), Some("Jon"));
    assert_eq!(workspace.column_for("M003", "Sex").as_deref(), Some("F"));
    assert_eq!(workspace.column_for("M002", "FirstName").as_deref(), Some("Jane"));
}

#[test]
fn invalid_values_never_reach_the_database() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    let mut rows = edited_rows(editor.load().expect("load"));
    rows[0].insert("Sex".to_string(), "Q".to_string());
    rows[1].insert("DateOfBirth".to_string(), "17/05/2002".to_string());

    let report = editor.save(&rows).expect("save");
    assert_eq!(report.outcome(), SaveOutcome::Failed);
    assert_eq!(
        report
            .per_row_errors
            .iter()
            .map(|e| e.row)
            .collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(workspace.column_for("M001", "Sex").as_deref(), Some("M"));
    assert_eq!(
        workspace.column_for("M002", "DateOfBirth").as_deref(),
        Some("2002-05-17")
    );
}

#[test]
fn cleared_date_is_stored_as_null() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    let mut rows = edited_rows(editor.load().expect("load"));
    rows[0].insert("DateOfBirth".to_string(), String::new());

    let report = editor.save(&rows).expect("save");
    assert_eq!(report.updated_count, 1);
    assert_eq!(workspace.column_for("M001", "DateOfBirth"), None);
}

#[test]
fn save_without_a_snapshot_is_rejected() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    let err = editor.save(&[row(&[("Surname", "Smyth")])]).unwrap_err();
    assert!(matches!(err, EditorError::Validation(_)));
}

#[test]
fn full_page_is_flagged_as_possibly_truncated() {
    let workspace = TestWorkspace::with_members(&[]);
    let mut conn = workspace.connection();
    let tx = conn.transaction().expect("transaction");
    for idx in 0..(MAX_ROW_LIMIT + 5) {
        tx.execute(
            "INSERT INTO tblCohortMember (FamilySerial, CohortMemberID, Surname) VALUES (?1, ?2, ?3)",
            params![format!("F{idx:05}"), format!("M{idx:05}"), "Bulk"],
        )
        .expect("insert member");
    }
    tx.commit().expect("commit");

    let mut editor = open(&workspace);
    assert!(!editor.is_possibly_truncated());
    let snapshot = editor.load().expect("load");
    assert_eq!(snapshot.len(), MAX_ROW_LIMIT);
    assert!(editor.is_possibly_truncated());
}

#[test]
fn add_record_fills_defaults_for_omitted_fields() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    editor.load().expect("load");

    let inserted = editor
        .add_record(&row(&[
            ("FamilySerial", "F003"),
            ("CohortMemberID", "M004"),
            ("Surname", " Brown "),
        ]))
        .expect("add");
    assert_eq!(inserted, 1);
    assert_eq!(editor.store().len(), 4);

    let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
    assert_eq!(workspace.column_for("M004", "Surname").as_deref(), Some("Brown"));
    assert_eq!(workspace.column_for("M004", "Sex").as_deref(), Some(""));
    assert_eq!(
        workspace.column_for("M004", "DateOfBirth").as_deref(),
        Some(today.as_str())
    );
}

#[test]
fn add_record_requires_identifier_and_name() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);

    let err = editor
        .add_record(&row(&[("CohortMemberID", "M004"), ("Surname", "  ")]))
        .unwrap_err();
    assert_eq!(err, EditorError::Validation("Surname is missing".to_string()));

    let err = editor
        .add_record(&row(&[("Surname", "Brown")]))
        .unwrap_err();
    assert!(err.to_string().contains("CohortMemberID"));

    let err = editor
        .add_record(&row(&[
            ("CohortMemberID", "M004"),
            ("Surname", "Brown"),
            ("Status", "Active"),
        ]))
        .unwrap_err();
    assert!(matches!(err, EditorError::Validation(_)));

    let err = editor
        .add_record(&row(&[
            ("CohortMemberID", "M004"),
            ("Surname", "Brown"),
            ("Sex", "X"),
        ]))
        .unwrap_err();
    assert!(matches!(err, EditorError::Validation(_)));
    assert_eq!(workspace.member_count(), 3);
}

#[test]
fn duplicate_member_id_on_add_is_a_storage_error() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    let err = editor
        .add_record(&row(&[("CohortMemberID", "M001"), ("Surname", "Again")]))
        .unwrap_err();
    assert!(err.is_storage());
}

#[test]
fn padded_and_unpadded_edits_converge_after_one_save() {
    let workspace = TestWorkspace::new();
    let mut editor = open(&workspace);
    let mut rows = edited_rows(editor.load().expect("load"));
    rows[0].insert("Surname".to_string(), "Smyth  ".to_string());
    rows[1].insert("DateOfBirth".to_string(), "2002-5-7".to_string());
    rows[2].insert("FirstName".to_string(), " Ann ".to_string());

    let first = editor.save(&rows).expect("first save");
    assert_eq!(first.updated_count, 2);
    assert_eq!(first.unchanged_count, 1);
    assert_eq!(workspace.column_for("M001", "Surname").as_deref(), Some("Smyth"));
    assert_eq!(
        workspace.column_for("M002", "DateOfBirth").as_deref(),
        Some("2002-05-07")
    );

    for _ in 0..2 {
        let again = editor.save(&rows).expect("repeat save");
        assert_eq!(again.outcome(), SaveOutcome::NoChanges);
    }
}

/// Serves one page of rows, then fails every later fetch.
struct FlakyReloadRepository {
    fetches: Cell<usize>,
}

impl Repository for FlakyReloadRepository {
    fn fetch(&self, _query: &Query) -> Result<FetchedRows, EditorError> {
        let attempt = self.fetches.get();
        self.fetches.set(attempt + 1);
        if attempt > 0 {
            return Err(EditorError::Storage("no such table: tblCohortMember".into()));
        }
        Ok(FetchedRows {
            headers: vec!["RecID".to_string(), "Surname".to_string()],
            rows: vec![
                vec![RawValue::Integer(1), RawValue::text("Smith")],
                vec![RawValue::Integer(2), RawValue::text("Jones")],
            ],
        })
    }

    fn execute(&self, _query: &Query) -> Result<usize, EditorError> {
        Ok(1)
    }
}

#[test]
fn failed_reload_still_returns_the_batch_report() {
    let repository = FlakyReloadRepository {
        fetches: Cell::new(0),
    };
    let mut editor = Editor::new(TableConfig::cohort_member(), repository);
    editor.load().expect("first load");

    let report = editor
        .save(&[
            row(&[("RecID", "1"), ("Surname", "Smyth")]),
            row(&[("RecID", "2"), ("Surname", "Jones")]),
        ])
        .expect("report survives the reload failure");

    assert_eq!(report.updated_count, 1);
    assert_eq!(report.unchanged_count, 1);
    assert_eq!(
        report.reload_error.as_deref(),
        Some("no such table: tblCohortMember")
    );
    assert!(report.to_string().starts_with("Successfully updated 1 record(s)."));
    assert!(report.to_string().contains("Reloading after save failed"));
    assert!(!editor.store().is_loaded());
}
