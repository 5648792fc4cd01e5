//! The offline compare-and-notify job over two snapshot exports.

use crate::crypto::EncryptionKey;
use crate::diff::{diff_snapshots, Change, ChangeKind};
use crate::notify::{ContactMap, DispatchSummary, Dispatcher, MailTransport};
use crate::snapshot::{self, SnapshotError};
use crate::value::display_optional;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareReport {
    pub old_records: usize,
    pub new_records: usize,
    pub contacts: usize,
    pub dispatch: DispatchSummary,
    pub changes: Vec<Change>,
}

/// Loads both exports, diffs them and dispatches one notification per change.
///
/// Either export failing to load or decrypt aborts the whole run before
/// anything is sent.
pub fn run_compare(
    old_path: &Path,
    new_path: &Path,
    contacts: &ContactMap,
    key: Option<&EncryptionKey>,
    dispatcher: &Dispatcher<'_>,
) -> Result<CompareReport, SnapshotError> {
    let old_flat = snapshot::load_export(old_path, key)?;
    let new_flat = snapshot::load_export(new_path, key)?;
    log::info!(
        "event=compare_start old_records={} new_records={} contacts={}",
        old_flat.len(),
        new_flat.len(),
        contacts.len()
    );

    let changes = diff_snapshots(&snapshot::group(&old_flat), &snapshot::group(&new_flat));
    for c in &changes {
        log::info!(
            "event=mark_change prn={} subject={} exam_type={} old={} new={} status={}",
            c.prn,
            c.subject,
            c.exam_type,
            display_optional(c.old_value.as_ref()),
            display_optional(c.new_value.as_ref()),
            match c.kind {
                ChangeKind::New => "NEW",
                ChangeKind::Updated => "UPDATED",
            }
        );
    }

    let dispatch = dispatcher.dispatch_all(&changes, contacts);
    log::info!(
        "event=compare_done changes={} sent={} failed={} skipped_no_contact={} skipped_dry_run={}",
        dispatch.changes,
        dispatch.sent,
        dispatch.failed,
        dispatch.skipped_no_contact,
        dispatch.skipped_dry_run
    );

    Ok(CompareReport {
        old_records: old_flat.len(),
        new_records: new_flat.len(),
        contacts: contacts.len(),
        dispatch,
        changes,
    })
}

/// Convenience for callers holding a transport rather than a dispatcher.
pub fn run_compare_with(
    old_path: &Path,
    new_path: &Path,
    contacts: &ContactMap,
    key: Option<&EncryptionKey>,
    transport: Option<&dyn MailTransport>,
    dashboard_url: &str,
) -> Result<CompareReport, SnapshotError> {
    let dispatcher = Dispatcher::new(transport, dashboard_url);
    run_compare(old_path, new_path, contacts, key, &dispatcher)
}
