//! Sequential roster scrape: one student's login, extraction and write finish
//! before the next student starts. A failing student is recorded and skipped.

use crate::chart;
use crate::portal::{self, Credentials, LoginError, PortalClient};
use crate::store::{self, Student};
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

/// Anything that can turn credentials into dashboard HTML.
pub trait DashboardSource {
    fn fetch_dashboard(&self, creds: &Credentials) -> Result<String, LoginError>;
}

impl DashboardSource for PortalClient {
    fn fetch_dashboard(&self, creds: &Credentials) -> Result<String, LoginError> {
        PortalClient::fetch_dashboard(self, creds)
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error("no marks chart on the dashboard page")]
    ChartNotFound,
    #[error("storage error: {0}")]
    Storage(String),
}

impl ScrapeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Login(e) => e.kind(),
            ScrapeError::ChartNotFound => "ChartNotFound",
            ScrapeError::Storage(_) => "StorageError",
        }
    }
}

/// Result of one single-offset scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prn: Option<String>,
    /// Always present; `null` when the roster has no address.
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marks_written: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScrapeOutcome {
    fn empty_roster() -> Self {
        ScrapeOutcome {
            success: false,
            student: None,
            prn: None,
            email: None,
            error: None,
            error_kind: None,
            marks_written: None,
            message: Some("No students to scrape".to_string()),
        }
    }

    fn for_student(student: &Student, result: Result<usize, ScrapeError>) -> Self {
        let (success, error, error_kind, marks_written) = match result {
            Ok(n) => (true, None, None, Some(n)),
            Err(e) => (false, Some(e.to_string()), Some(e.kind().to_string()), None),
        };
        ScrapeOutcome {
            success,
            student: Some(student.name.clone()),
            prn: Some(student.prn.clone()),
            email: student.email.clone(),
            error,
            error_kind,
            marks_written,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ScrapeOutcome>,
}

pub fn credentials_for(student: &Student) -> Credentials {
    Credentials::new(
        student.prn.clone(),
        student.dob_day,
        student.dob_month,
        student.dob_year,
    )
}

/// Login, extraction and write for one student. Returns the number of marks written.
pub fn scrape_student(
    conn: &Connection,
    source: &dyn DashboardSource,
    student: &Student,
) -> Result<usize, ScrapeError> {
    let creds = credentials_for(student);
    let html = source.fetch_dashboard(&creds)?;

    let Some(marks) = chart::extract_marks(&html) else {
        // A page that still carries the login form means the portal turned
        // the credentials down without an error status.
        if portal::page_has_login_form(&html) {
            return Err(LoginError::Rejected("login form shown again".to_string()).into());
        }
        return Err(ScrapeError::ChartNotFound);
    };

    let summary = store::apply_extraction(conn, &student.prn, &marks, &store::now_timestamp())
        .map_err(|e| ScrapeError::Storage(format!("{:#}", e)))?;
    log::debug!(
        "event=marks_applied prn={} written={} skipped_null={}",
        student.prn,
        summary.written,
        summary.skipped_null
    );
    Ok(summary.written)
}

/// Scrapes exactly the student at `offset` (roster ordered by prn).
pub fn scrape_one(
    conn: &Connection,
    source: &dyn DashboardSource,
    offset: usize,
) -> anyhow::Result<ScrapeOutcome> {
    let Some(student) = store::student_at_offset(conn, offset)? else {
        return Ok(ScrapeOutcome::empty_roster());
    };
    log::info!(
        "event=scrape_student offset={} prn={} name={}",
        offset,
        student.prn,
        student.name
    );
    let result = scrape_student(conn, source, &student);
    match &result {
        Ok(n) => log::info!("event=scrape_ok prn={} marks_written={}", student.prn, n),
        Err(e) => log::warn!(
            "event=scrape_failed prn={} kind={} error={}",
            student.prn,
            e.kind(),
            e
        ),
    }
    Ok(ScrapeOutcome::for_student(&student, result))
}

/// Runs every offset in turn. Individual failures are recorded, never fatal.
pub fn scrape_all(conn: &Connection, source: &dyn DashboardSource) -> anyhow::Result<RosterSummary> {
    let total = store::student_count(conn)?;
    log::info!("event=scrape_all_start total={}", total);
    let mut summary = RosterSummary {
        total,
        ..RosterSummary::default()
    };
    for offset in 0..total {
        let outcome = match scrape_one(conn, source, offset) {
            Ok(o) => o,
            Err(e) => {
                log::error!("event=scrape_offset_failed offset={} error={:#}", offset, e);
                ScrapeOutcome {
                    error: Some(format!("{:#}", e)),
                    error_kind: Some("StorageError".to_string()),
                    message: None,
                    ..ScrapeOutcome::empty_roster()
                }
            }
        };
        log::info!(
            "event=scrape_offset offset={} success={} prn={}",
            offset,
            outcome.success,
            outcome.prn.as_deref().unwrap_or("-")
        );
        if outcome.success {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
        summary.results.push(outcome);
    }
    log::info!(
        "event=scrape_all_done total={} succeeded={} failed={}",
        summary.total,
        summary.succeeded,
        summary.failed
    );
    Ok(summary)
}
