use crate::chart::ExtractedMarks;
use crate::snapshot::SnapshotRecord;
use crate::value::MarkValue;
use anyhow::Context;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Full roster row. Carries the birth date the portal login is derived from,
/// so it never goes over IPC; see [`StudentSummary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub prn: String,
    pub name: String,
    pub dob_day: u32,
    pub dob_month: u32,
    pub dob_year: i32,
    pub email: Option<String>,
    pub updated_at: Option<String>,
}

/// What `students.list` shows: identity and scrape recency only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub prn: String,
    pub name: String,
    pub updated_at: Option<String>,
}

/// One roster row as provisioned from outside.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub prn: String,
    pub name: String,
    #[serde(alias = "dob_day")]
    pub dob_day: u32,
    #[serde(alias = "dob_month")]
    pub dob_month: u32,
    #[serde(alias = "dob_year")]
    pub dob_year: i32,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplySummary {
    pub written: usize,
    pub skipped_null: usize,
}

fn to_sql(v: &MarkValue) -> Value {
    if let Some(n) = v.as_whole() {
        return Value::Integer(n);
    }
    match v {
        MarkValue::Number(n) => Value::Real(*n),
        MarkValue::Text(s) => Value::Text(s.clone()),
    }
}

fn from_sql(v: Value) -> Option<MarkValue> {
    match v {
        Value::Integer(i) => Some(MarkValue::Number(i as f64)),
        Value::Real(f) => Some(MarkValue::Number(f)),
        Value::Text(s) => Some(MarkValue::Text(s)),
        Value::Null | Value::Blob(_) => None,
    }
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Inserts or refreshes roster rows. Scrape recency (`updated_at`) is left alone.
pub fn import_students(conn: &Connection, entries: &[RosterEntry]) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    for e in entries {
        let email = e
            .email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        tx.execute(
            "INSERT INTO students(prn, name, dob_day, dob_month, dob_year, email)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(prn) DO UPDATE SET
               name = excluded.name,
               dob_day = excluded.dob_day,
               dob_month = excluded.dob_month,
               dob_year = excluded.dob_year,
               email = excluded.email",
            (&e.prn, &e.name, e.dob_day, e.dob_month, e.dob_year, email),
        )
        .with_context(|| format!("failed to import student {}", e.prn))?;
    }
    tx.commit()?;
    Ok(entries.len())
}

pub fn student_count(conn: &Connection) -> anyhow::Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    Ok(n as usize)
}

fn row_to_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        prn: r.get(0)?,
        name: r.get(1)?,
        dob_day: r.get(2)?,
        dob_month: r.get(3)?,
        dob_year: r.get(4)?,
        email: r.get(5)?,
        updated_at: r.get(6)?,
    })
}

/// The student at ordinal `offset` of the roster ordered by prn.
pub fn student_at_offset(conn: &Connection, offset: usize) -> anyhow::Result<Option<Student>> {
    let student = conn
        .query_row(
            "SELECT prn, name, dob_day, dob_month, dob_year, email, updated_at
             FROM students
             ORDER BY prn
             LIMIT 1 OFFSET ?",
            [offset as i64],
            row_to_student,
        )
        .optional()?;
    Ok(student)
}

pub fn list_students(conn: &Connection) -> anyhow::Result<Vec<StudentSummary>> {
    let mut stmt = conn.prepare(
        "SELECT prn, name, updated_at
         FROM students
         ORDER BY name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(StudentSummary {
                prn: r.get(0)?,
                name: r.get(1)?,
                updated_at: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Idempotent single-mark write.
pub fn upsert_mark(
    conn: &Connection,
    prn: &str,
    subject: &str,
    exam_type: &str,
    value: &MarkValue,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO marks(prn, subject, exam_type, marks)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(prn, subject, exam_type) DO UPDATE SET
           marks = excluded.marks",
        (prn, subject, exam_type, to_sql(value)),
    )?;
    Ok(())
}

/// Writes one student's extracted marks and refreshes their `updated_at`, all
/// in one transaction. Null values are not stored.
pub fn apply_extraction(
    conn: &Connection,
    prn: &str,
    marks: &ExtractedMarks,
    updated_at: &str,
) -> anyhow::Result<ApplySummary> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to begin student transaction")?;
    let touched = tx
        .execute(
            "UPDATE students SET updated_at = ? WHERE prn = ?",
            (updated_at, prn),
        )
        .context("failed to refresh updated_at")?;
    if touched == 0 {
        anyhow::bail!("student {} is not on the roster", prn);
    }

    let mut summary = ApplySummary::default();
    for (subject, exam_type, value) in marks.iter_marks() {
        let Some(value) = value else {
            summary.skipped_null += 1;
            continue;
        };
        upsert_mark(&tx, prn, subject, exam_type, value).with_context(|| {
            format!("failed to write mark {} / {} for {}", subject, exam_type, prn)
        })?;
        summary.written += 1;
    }
    tx.commit().context("failed to commit student marks")?;
    Ok(summary)
}

/// Every stored mark joined with its student, the layout of a snapshot export.
pub fn export_rows(conn: &Connection) -> anyhow::Result<Vec<SnapshotRecord>> {
    let mut stmt = conn.prepare(
        "SELECT s.prn, s.name, m.subject, m.exam_type, m.marks, s.updated_at
         FROM marks m
         JOIN students s ON m.prn = s.prn
         ORDER BY s.name, m.subject, m.exam_type",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(SnapshotRecord {
                prn: r.get(0)?,
                name: Some(r.get(1)?),
                subject: r.get(2)?,
                exam_type: r.get(3)?,
                marks: from_sql(r.get(4)?),
                updated_at: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
