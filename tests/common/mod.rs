#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use tempfile::{TempDir, tempdir};

pub const COHORT_DDL: &str = "
CREATE TABLE tblCohortMember (
    RecID INTEGER PRIMARY KEY AUTOINCREMENT,
    FamilySerial TEXT,
    CohortMemberID TEXT NOT NULL UNIQUE,
    FirstName TEXT,
    Surname TEXT,
    Title TEXT,
    Sex TEXT,
    DateOfBirth DATE,
    Status TEXT,
    StatusDate DATETIME
);";

/// One seeded member: (family, member id, first name, surname, sex, date of birth).
pub type Member<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str, Option<&'a str>);

pub const MEMBERS: &[Member<'static>] = &[
    ("F001", "M001", "John", "Smith", "M", Some("2000-01-01")),
    ("F001", "M002", "Jane", "Smith", "F", Some("2002-05-17")),
    ("F002", "M003", "Ann", "Jones", "", None),
];

/// Scratch directory holding a seeded cohort database.
pub struct TestWorkspace {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::with_members(MEMBERS)
    }

    pub fn with_members(members: &[Member<'_>]) -> Self {
        let temp_dir = tempdir().expect("temp dir");
        let db_path = temp_dir.path().join("cohort.db");
        let conn = Connection::open(&db_path).expect("create database");
        conn.execute_batch(COHORT_DDL).expect("create table");
        for (family, member, first, surname, sex, dob) in members {
            conn.execute(
                "INSERT INTO tblCohortMember
                    (FamilySerial, CohortMemberID, FirstName, Surname, Sex, DateOfBirth, Status, StatusDate)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'Active', '2024-01-01 09:00:00')",
                params![family, member, first, surname, sex, dob],
            )
            .expect("seed member");
        }
        Self { temp_dir, db_path }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn db_arg(&self) -> String {
        self.db_path.to_string_lossy().into_owned()
    }

    pub fn connection(&self) -> Connection {
        Connection::open(&self.db_path).expect("open database")
    }

    /// Reads a single text column for the member with `member_id`.
    pub fn column_for(&self, member_id: &str, column: &str) -> Option<String> {
        self.connection()
            .query_row(
                &format!("SELECT {column} FROM tblCohortMember WHERE CohortMemberID = ?1"),
                params![member_id],
                |row| row.get(0),
            )
            .expect("query member")
    }

    pub fn member_count(&self) -> usize {
        self.connection()
            .query_row("SELECT COUNT(*) FROM tblCohortMember", [], |row| row.get(0))
            .expect("count members")
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents).expect("write temp file");
        path
    }
}
