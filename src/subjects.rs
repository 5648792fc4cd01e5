use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Portal-internal course codes and the subject names stored for them.
const SUBJECT_CODES: &[(&str, &str)] = &[
    ("25PCC13CE11", "Computer Network"),
    ("25PCC13CE12", "TCSCC"),
    ("25PCC13CE13", "Operating Systems"),
    ("25PCC13CE14", "Data Warehousing and Mining"),
    ("25PEC13CE12", "DLRL"),
    ("25PECL13CE12", "NLP"),
    ("25PECL13CE15", "OSINT"),
    ("25OE13CE46", "3D Printing"),
    ("25OE13CE42", "IoT"),
    ("25PEC13CE16", "HMI"),
    ("25PECL13CE14", "IPDL"),
    ("25MDM42", "ESI"),
    ("25MDM41", "HWP"),
    ("25OE13CE43", "SCM"),
    ("25OE13CE45", "E-Vehicle"),
    ("HXXXC501", "Honors/Minor Degree Course"),
];

static SUBJECT_MAP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| SUBJECT_CODES.iter().copied().collect());

/// Canonical subject name for a portal code. Unknown codes pass through.
pub fn canonicalize(code: &str) -> &str {
    SUBJECT_MAP.get(code).copied().unwrap_or(code)
}

pub fn is_known_code(code: &str) -> bool {
    SUBJECT_MAP.contains_key(code)
}
