//! Locates the stacked bar chart configuration embedded in the dashboard page
//! and reads the marks out of it.
//!
//! The configuration is script text, not JSON. Only a small grammar is
//! understood: bracketed lists of comma-separated tokens, where a token is a
//! quoted string or a bare word. The cursor never looks more than one
//! character ahead and never evaluates anything.

use crate::subjects;
use crate::value::MarkValue;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;

pub const CHART_MARKER: &str = "stackedBarChart_1";

static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").expect("static selector"));

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamMark {
    pub exam_type: String,
    pub value: Option<MarkValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMarks {
    pub subject: String,
    pub exams: Vec<ExamMark>,
}

/// Marks read from one dashboard, in the order the chart lists them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedMarks {
    pub subjects: Vec<SubjectMarks>,
}

impl ExtractedMarks {
    fn set(&mut self, subject: &str, exam_type: &str, value: Option<MarkValue>) {
        let idx = match self.subjects.iter().position(|s| s.subject == subject) {
            Some(i) => i,
            None => {
                self.subjects.push(SubjectMarks {
                    subject: subject.to_string(),
                    exams: Vec::new(),
                });
                self.subjects.len() - 1
            }
        };
        let exams = &mut self.subjects[idx].exams;
        match exams.iter_mut().find(|e| e.exam_type == exam_type) {
            Some(existing) => existing.value = value,
            None => exams.push(ExamMark {
                exam_type: exam_type.to_string(),
                value,
            }),
        }
    }

    /// `None` if the pair was never seen, `Some(None)` if it was seen as null.
    #[cfg(test)]
    pub fn get(&self, subject: &str, exam_type: &str) -> Option<Option<&MarkValue>> {
        self.subjects
            .iter()
            .find(|s| s.subject == subject)?
            .exams
            .iter()
            .find(|e| e.exam_type == exam_type)
            .map(|e| e.value.as_ref())
    }

    pub fn iter_marks(&self) -> impl Iterator<Item = (&str, &str, Option<&MarkValue>)> {
        self.subjects.iter().flat_map(|s| {
            s.exams
                .iter()
                .map(move |e| (s.subject.as_str(), e.exam_type.as_str(), e.value.as_ref()))
        })
    }
}

/// Marks from a dashboard page, or `None` when no chart block is present.
pub fn extract_marks(html: &str) -> Option<ExtractedMarks> {
    let script = locate_chart_script(html)?;
    parse_chart_script(&script)
}

/// Text of the first script block holding the marks bar chart.
pub fn locate_chart_script(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&SCRIPT)
        .map(|el| el.text().collect::<String>())
        .find(|text| text.contains(CHART_MARKER) && find_bar_type(text, 0).is_some())
}

pub fn parse_chart_script(script: &str) -> Option<ExtractedMarks> {
    let cats_at = find_list_key(script, "categories", script.len())?;
    let codes = Cursor::new(script, cats_at, script.len()).string_list();

    let cols_at = find_list_key(script, "columns", script.len())?;
    let bar_at = find_bar_type(script, cols_at)?;
    let series = Cursor::new(script, cols_at, bar_at).series_list();

    if codes.is_empty() || series.is_empty() {
        return None;
    }

    let mut out = ExtractedMarks::default();
    for s in &series {
        for (i, code) in codes.iter().enumerate() {
            if !subjects::is_known_code(code) {
                log::debug!("event=unmapped_subject_code code={}", code);
            }
            let value = s.values.get(i).cloned().flatten();
            out.set(subjects::canonicalize(code), &s.exam_type, value);
        }
    }
    Some(out)
}

#[derive(Debug, Clone, PartialEq)]
struct Series {
    exam_type: String,
    values: Vec<Option<MarkValue>>,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn skip_ws_bytes(bytes: &[u8], mut i: usize, end: usize) -> usize {
    while i < end && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Byte offset of the `[` opening the list assigned to `key`, searching
/// occurrences of `key` that start before `end`.
fn find_list_key(text: &str, key: &str, end: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(rel) = text[from..end].find(key) {
        let start = from + rel;
        from = start + key.len();
        if start > 0 && is_word_byte(bytes[start - 1]) {
            continue;
        }
        let mut i = start + key.len();
        if i < end && (bytes[i] == b'"' || bytes[i] == b'\'') {
            i += 1;
        }
        i = skip_ws_bytes(bytes, i, end);
        if i >= end || bytes[i] != b':' {
            continue;
        }
        i = skip_ws_bytes(bytes, i + 1, end);
        if i < end && bytes[i] == b'[' {
            return Some(i);
        }
    }
    None
}

/// Byte offset of the first `type: "bar"` marker at or after `from`.
fn find_bar_type(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let end = bytes.len();
    let mut search = from;
    while let Some(rel) = text[search..].find("type") {
        let start = search + rel;
        search = start + 4;
        if start > 0 && is_word_byte(bytes[start - 1]) {
            continue;
        }
        let mut i = start + 4;
        if i < end && (bytes[i] == b'"' || bytes[i] == b'\'') {
            i += 1;
        }
        i = skip_ws_bytes(bytes, i, end);
        if i >= end || bytes[i] != b':' {
            continue;
        }
        i = skip_ws_bytes(bytes, i + 1, end);
        if i >= end || (bytes[i] != b'"' && bytes[i] != b'\'') {
            continue;
        }
        let quote = bytes[i];
        if text[i + 1..].starts_with("bar") && bytes.get(i + 4) == Some(&quote) {
            return Some(start);
        }
    }
    None
}

enum Token {
    Quoted(String),
    Bare(String),
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, pos: usize, end: usize) -> Self {
        Cursor { src, pos, end }
    }

    fn peek(&self) -> Option<char> {
        if self.pos >= self.end {
            return None;
        }
        self.src[self.pos..self.end].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn eat(&mut self, want: char) -> bool {
        if self.peek() == Some(want) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Reads a quoted string; the cursor sits on the opening quote.
    /// An unterminated string runs to the end of the scope.
    fn quoted(&mut self) -> String {
        let Some(quote) = self.bump() else {
            return String::new();
        };
        let mut out = String::new();
        while let Some(c) = self.bump() {
            if c == quote {
                break;
            }
            if c == '\\' {
                if let Some(escaped) = self.bump() {
                    out.push(escaped);
                }
                continue;
            }
            out.push(c);
        }
        out
    }

    /// Reads up to the next `,` or `]` without consuming it.
    fn bare(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ',' || c == ']' {
                break;
            }
            self.bump();
        }
        self.src[start..self.pos].trim().to_string()
    }

    fn token(&mut self) -> Option<Token> {
        self.skip_ws();
        match self.peek()? {
            ',' | ']' => None,
            '"' | '\'' => Some(Token::Quoted(self.quoted())),
            _ => Some(Token::Bare(self.bare())),
        }
    }

    /// Moves past the `]` closing the current list, ignoring nested content.
    fn skip_to_close(&mut self) {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '"' | '\'' => {
                    self.quoted();
                    continue;
                }
                '[' => depth += 1,
                ']' if depth == 0 => {
                    self.bump();
                    return;
                }
                ']' => depth -= 1,
                _ => {}
            }
            self.bump();
        }
    }

    /// `[ "a", 'b', ... ]` keeping only the quoted entries.
    fn string_list(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.eat('[') {
            return out;
        }
        loop {
            let before = self.pos;
            if let Some(Token::Quoted(s)) = self.token() {
                out.push(s);
            }
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(']') => {
                    self.bump();
                    break;
                }
                Some(',') => {
                    self.bump();
                }
                Some(_) if self.pos == before => {
                    self.bump();
                }
                Some(_) => {}
            }
        }
        out
    }

    /// `[ [label, v, ...], [label, v, ...] ]`
    fn series_list(&mut self) -> Vec<Series> {
        let mut out = Vec::new();
        if !self.eat('[') {
            return out;
        }
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(']') => {
                    self.bump();
                    break;
                }
                Some('[') => {
                    if let Some(s) = self.series() {
                        out.push(s);
                    }
                }
                Some('"') | Some('\'') => {
                    self.quoted();
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        out
    }

    fn series(&mut self) -> Option<Series> {
        self.eat('[');
        self.skip_ws();
        if !matches!(self.peek(), Some('"') | Some('\'')) {
            self.skip_to_close();
            return None;
        }
        let exam_type = self.quoted();
        let mut values = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(']') => {
                    self.bump();
                    break;
                }
                Some(',') => {
                    self.bump();
                    continue;
                }
                _ => {}
            }
            let before = self.pos;
            match self.token() {
                Some(Token::Quoted(inner)) => values.push(quoted_value(&inner)),
                Some(Token::Bare(raw)) if raw.is_empty() => {}
                Some(Token::Bare(raw)) => values.push(bare_value(&raw)),
                None => {}
            }
            if self.pos == before {
                self.bump();
            }
        }
        if exam_type.is_empty() {
            return None;
        }
        Some(Series { exam_type, values })
    }
}

fn quoted_value(inner: &str) -> Option<MarkValue> {
    if inner.is_empty() || inner.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(MarkValue::from_text(inner))
}

fn bare_value(raw: &str) -> Option<MarkValue> {
    if raw.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(MarkValue::from_text(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(script: &str) -> String {
        format!(
            "<html><head><script>var x = 1;</script></head><body>\
             <div id=\"stackedBarChart_1\"></div><script>{}</script></body></html>",
            script
        )
    }

    const CHART: &str = r#"
        var chart = c3.generate({
            bindto: '#stackedBarChart_1',
            data: {
                columns: [
                    ["ISE-1", 12, "14.5", null],
                    ['MSE', "AB", 20, 18],
                    ["ISE-2", 9]
                ],
                type: "bar"
            },
            axis: { x: { type: 'category', categories: ["25PCC13CE11", "25PCC13CE13", "26NEW01"] } }
        });
    "#;

    #[test]
    fn extracts_positionally_aligned_marks() {
        let marks = extract_marks(&page(CHART)).expect("chart found");
        let names: Vec<&str> = marks.subjects.iter().map(|s| s.subject.as_str()).collect();
        assert_eq!(names, vec!["Computer Network", "Operating Systems", "26NEW01"]);
        for s in &marks.subjects {
            let exams: Vec<&str> = s.exams.iter().map(|e| e.exam_type.as_str()).collect();
            assert_eq!(exams, vec!["ISE-1", "MSE", "ISE-2"]);
        }
        assert_eq!(
            marks.get("Computer Network", "ISE-1"),
            Some(Some(&MarkValue::Number(12.0)))
        );
        assert_eq!(
            marks.get("Operating Systems", "ISE-1"),
            Some(Some(&MarkValue::Number(14.5)))
        );
        assert_eq!(marks.get("26NEW01", "ISE-1"), Some(None));
        assert_eq!(
            marks.get("Computer Network", "MSE"),
            Some(Some(&MarkValue::Text("AB".to_string())))
        );
        assert_eq!(marks.get("Operating Systems", "ISE-2"), Some(None));
        assert_eq!(marks.get("Computer Network", "ESE"), None);
    }

    #[test]
    fn returns_none_without_chart_block() {
        let html = "<html><body><script>var other = { type: \"bar\" };</script></body></html>";
        assert_eq!(extract_marks(html), None);
        assert_eq!(extract_marks("<html><body>Login</body></html>"), None);
    }

    #[test]
    fn requires_bar_type_marker() {
        let script = CHART.replace("type: \"bar\"", "type: \"line\"");
        assert_eq!(extract_marks(&page(&script)), None);
    }

    #[test]
    fn extraction_is_idempotent() {
        let html = page(CHART);
        assert_eq!(extract_marks(&html), extract_marks(&html));
    }

    #[test]
    fn quoted_null_and_case_insensitive_null_are_null() {
        let script = r#"stackedBarChart_1 columns: [["T1", "null", NULL, "", Null]], type: 'bar'
            categories: ['A', 'B', 'C', 'D']"#;
        let marks = parse_chart_script(script).expect("parsed");
        for code in ["A", "B", "C", "D"] {
            assert_eq!(marks.get(code, "T1"), Some(None), "{code}");
        }
    }

    #[test]
    fn bare_non_numeric_tokens_are_kept_raw() {
        let script = r#"columns: [["T1", AB, 7]], type: "bar", categories: ["X", "Y"]"#;
        let marks = parse_chart_script(script).expect("parsed");
        assert_eq!(
            marks.get("X", "T1"),
            Some(Some(&MarkValue::Text("AB".to_string())))
        );
        assert_eq!(marks.get("Y", "T1"), Some(Some(&MarkValue::Number(7.0))));
    }

    #[test]
    fn tolerates_unterminated_lists() {
        let script = r#"columns: [["T1", 4, 5"#;
        assert_eq!(parse_chart_script(script), None);
        let script = r#"categories: ["A", "B" columns: [["T1", 1, 2]], type: "bar""#;
        let marks = parse_chart_script(script).expect("parsed");
        assert_eq!(marks.get("A", "T1"), Some(Some(&MarkValue::Number(1.0))));
    }

    #[test]
    fn iter_marks_walks_in_source_order() {
        let marks = extract_marks(&page(CHART)).expect("chart found");
        let first: Vec<(&str, &str)> = marks.iter_marks().take(3).map(|(s, e, _)| (s, e)).collect();
        assert_eq!(
            first,
            vec![
                ("Computer Network", "ISE-1"),
                ("Computer Network", "MSE"),
                ("Computer Network", "ISE-2")
            ]
        );
    }
}
