use crate::snapshot::Snapshot;
use crate::value::{same_optional, MarkValue};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    New,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub prn: String,
    pub subject: String,
    pub exam_type: String,
    pub old_value: Option<MarkValue>,
    pub new_value: Option<MarkValue>,
    pub kind: ChangeKind,
}

/// Changes from `old` to `new`, ordered by prn, subject, exam type.
///
/// Only students present in `new` are visited; nothing is reported for a
/// student or mark that disappeared.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> Vec<Change> {
    let empty = BTreeMap::new();
    let mut out = Vec::new();
    for (prn, new_subjects) in new {
        let old_subjects = old.get(prn).unwrap_or(&empty);
        for (subject, new_exams) in new_subjects {
            let old_exams = old_subjects.get(subject);
            for (exam_type, new_value) in new_exams {
                let kind = match old_exams.and_then(|e| e.get(exam_type)) {
                    None => ChangeKind::New,
                    Some(old_value) if !same_optional(old_value.as_ref(), new_value.as_ref()) => {
                        ChangeKind::Updated
                    }
                    Some(_) => continue,
                };
                let old_value = old_exams
                    .and_then(|e| e.get(exam_type))
                    .cloned()
                    .flatten();
                out.push(Change {
                    prn: prn.clone(),
                    subject: subject.clone(),
                    exam_type: exam_type.clone(),
                    old_value,
                    new_value: new_value.clone(),
                    kind,
                });
            }
        }
    }
    out
}
