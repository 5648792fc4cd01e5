//! Snapshot export files: a JSON array of mark records, optionally sealed in
//! an `{ "encrypted": true, "payload": "..." }` envelope.

use crate::crypto::{self, CryptoError, EncryptionKey};
use crate::value::MarkValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// prn → subject → exam type → value. A missing key was never observed; an
/// explicit `None` was observed as null.
pub type Snapshot = BTreeMap<String, BTreeMap<String, BTreeMap<String, Option<MarkValue>>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub prn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub subject: String,
    pub exam_type: String,
    #[serde(default)]
    pub marks: Option<MarkValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    encrypted: bool,
    payload: String,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("snapshot is not a record array or encrypted envelope: {0}")]
    Format(String),
    #[error("snapshot decryption failed: {0}")]
    Decryption(#[from] CryptoError),
}

/// Later records for the same key overwrite earlier ones.
pub fn group(records: &[SnapshotRecord]) -> Snapshot {
    let mut out = Snapshot::new();
    for r in records {
        out.entry(r.prn.clone())
            .or_default()
            .entry(r.subject.clone())
            .or_default()
            .insert(r.exam_type.clone(), r.marks.clone());
    }
    out
}

pub fn parse_export(
    text: &str,
    key: Option<&EncryptionKey>,
) -> Result<Vec<SnapshotRecord>, SnapshotError> {
    let raw: serde_json::Value =
        serde_json::from_str(text).map_err(|e| SnapshotError::Format(e.to_string()))?;

    let is_envelope = raw.get("encrypted").and_then(|v| v.as_bool()) == Some(true)
        && raw.get("payload").map(|v| v.is_string()).unwrap_or(false);
    if is_envelope {
        let envelope: Envelope =
            serde_json::from_value(raw).map_err(|e| SnapshotError::Format(e.to_string()))?;
        let key = key.ok_or(CryptoError::MissingKey)?;
        return Ok(crypto::decrypt_json(&envelope.payload, key)?);
    }

    serde_json::from_value(raw).map_err(|e| SnapshotError::Format(e.to_string()))
}

pub fn load_export(
    path: &Path,
    key: Option<&EncryptionKey>,
) -> Result<Vec<SnapshotRecord>, SnapshotError> {
    let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    })?;
    parse_export(&text, key)
}

/// Plain record array, or a sealed envelope when a key is given.
pub fn render_export(
    records: &[SnapshotRecord],
    key: Option<&EncryptionKey>,
) -> anyhow::Result<String> {
    let text = match key {
        Some(key) => serde_json::to_string(&Envelope {
            encrypted: true,
            payload: crypto::encrypt_json(records, key)?,
        })?,
        None => serde_json::to_string_pretty(records)?,
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(prn: &str, subject: &str, exam: &str, marks: Option<MarkValue>) -> SnapshotRecord {
        SnapshotRecord {
            prn: prn.to_string(),
            name: None,
            subject: subject.to_string(),
            exam_type: exam.to_string(),
            marks,
            updated_at: None,
        }
    }

    fn key() -> EncryptionKey {
        EncryptionKey::from_bytes(&[5u8; 32]).expect("key")
    }

    #[test]
    fn group_nests_by_student_subject_exam() {
        let snap = group(&[
            rec("P1", "Math", "UT1", Some(MarkValue::Number(10.0))),
            rec("P1", "Math", "UT2", None),
            rec("P2", "Art", "ESE", Some(MarkValue::Text("AB".into()))),
        ]);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap["P1"]["Math"]["UT1"], Some(MarkValue::Number(10.0)));
        assert_eq!(snap["P1"]["Math"]["UT2"], None);
        assert_eq!(snap["P2"]["Art"]["ESE"], Some(MarkValue::Text("AB".into())));
    }

    #[test]
    fn parses_plain_array_with_extra_fields() {
        let text = r#"[
            {"prn":"P1","name":"Asha","subject":"Math","exam_type":"UT1","marks":12,"updated_at":"2026-01-01T00:00:00Z"},
            {"prn":"P1","subject":"Math","exam_type":"UT2","marks":null}
        ]"#;
        let records = parse_export(text, None).expect("parse");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name.as_deref(), Some("Asha"));
        assert_eq!(records[1].marks, None);
    }

    #[test]
    fn sealed_export_roundtrips_with_key() {
        let records = vec![rec("P1", "Math", "UT1", Some(MarkValue::Number(10.0)))];
        let text = render_export(&records, Some(&key())).expect("render");
        assert!(text.contains("\"encrypted\":true"));
        let back = parse_export(&text, Some(&key())).expect("parse");
        assert_eq!(back, records);
    }

    #[test]
    fn sealed_export_without_key_is_a_decryption_error() {
        let records = vec![rec("P1", "Math", "UT1", Some(MarkValue::Number(10.0)))];
        let text = render_export(&records, Some(&key())).expect("render");
        let e = parse_export(&text, None).expect_err("no key");
        assert!(matches!(e, SnapshotError::Decryption(CryptoError::MissingKey)));
    }

    #[test]
    fn sealed_export_with_wrong_key_fails() {
        let records = vec![rec("P1", "Math", "UT1", Some(MarkValue::Number(10.0)))];
        let text = render_export(&records, Some(&key())).expect("render");
        let other = EncryptionKey::from_bytes(&[6u8; 32]).expect("key");
        let e = parse_export(&text, Some(&other)).expect_err("wrong key");
        assert!(matches!(
            e,
            SnapshotError::Decryption(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn rejects_unrecognized_shapes() {
        assert!(matches!(
            parse_export(r#"{"encrypted": false, "rows": []}"#, None),
            Err(SnapshotError::Format(_))
        ));
        assert!(matches!(parse_export("not json", None), Err(SnapshotError::Format(_))));
    }
}
