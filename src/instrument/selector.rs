//! Source text extraction for sequence points.
//!
//! Sequence points are filtered by the text they cover: a span that is exactly `{` or `}` marks
//! a block boundary the compiler emits a point for, not a statement, and is never instrumented.
//! Every other span is, including single characters such as `;` and empty spans.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{metadata::sequencepoints::SequencePoint, Result};

/// Source texts that never receive a probe.
const BOUNDARY_MARKERS: [&str; 2] = ["{", "}"];

/// Not counted by compiler columns.
const BYTE_ORDER_MARK: char = '\u{FEFF}';

fn char_slice(line: &str, start: usize, end: Option<usize>) -> String {
    let chars = line.chars().skip(start);
    match end {
        Some(end) => chars.take(end.saturating_sub(start)).collect(),
        None => chars.collect(),
    }
}

/// Text covered by `point` in `lines`, or `None` if the point starts past the last line.
///
/// Columns are 1-based and the end column is exclusive. Columns past the end of a line are
/// clamped to it; an end before the start yields an empty string. Multi-line spans are joined
/// with `\n`.
#[must_use]
pub fn extract_span(lines: &[String], point: &SequencePoint) -> Option<String> {
    let start_index = usize::try_from(point.start_line.checked_sub(1)?).ok()?;
    let first = lines.get(start_index)?;

    let start_col = usize::from(point.start_col.saturating_sub(1));
    let end_col = usize::from(point.end_col.saturating_sub(1));

    if point.end_line <= point.start_line {
        return Some(char_slice(first, start_col, Some(end_col)));
    }

    let end_index = usize::try_from(point.end_line - 1).ok()?;
    let mut parts = vec![char_slice(first, start_col, None)];
    for (index, line) in lines.iter().enumerate().take(end_index + 1).skip(start_index + 1) {
        if index == end_index {
            parts.push(char_slice(line, 0, Some(end_col)));
        } else {
            parts.push(line.clone());
        }
    }
    Some(parts.join("\n"))
}

/// Returns `true` if `text` is a statement rather than a block boundary.
#[must_use]
pub fn is_instrumentable(text: &str) -> bool {
    !BOUNDARY_MARKERS.contains(&text)
}

/// Source files read during a run, each read at most once.
#[derive(Debug, Default)]
pub struct SourceCache {
    files: HashMap<PathBuf, Vec<String>>,
}

impl SourceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines of the file at `path`, without line terminators.
    ///
    /// A leading byte order mark is dropped and invalid UTF-8 is decoded lossily.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read.
    pub fn lines(&mut self, path: &Path) -> Result<&[String]> {
        if !self.files.contains_key(path) {
            let bytes = std::fs::read(path)?;
            let decoded = String::from_utf8_lossy(&bytes);
            let text = decoded.strip_prefix(BYTE_ORDER_MARK).unwrap_or(&decoded);
            let lines: Vec<String> = text.lines().map(str::to_string).collect();
            debug!("Read {} lines of {}", lines.len(), path.display());
            self.files.insert(path.to_path_buf(), lines);
        }

        Ok(self
            .files
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Text covered by `point` in the file at `path`, if the point is instrumentable.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read.
    pub fn select(&mut self, path: &Path, point: &SequencePoint) -> Result<Option<String>> {
        let lines = self.lines(path)?;
        Ok(extract_span(lines, point).filter(|text| is_instrumentable(text)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::{assembly::InstrId, metadata::sequencepoints::HIDDEN_LINE};

    fn point(start_line: u32, start_col: u16, end_line: u32, end_col: u16) -> SequencePoint {
        SequencePoint {
            instruction: InstrId(0),
            document: 0,
            start_line,
            start_col,
            end_line,
            end_col,
            is_hidden: false,
        }
    }

    fn lines() -> Vec<String> {
        [
            "static void Main()",
            "{",
            "    var x = Compute(1,",
            "        2);",
            "    Console.WriteLine(\"é\");",
            "}",
        ]
        .iter()
        .map(|line| (*line).to_string())
        .collect()
    }

    #[test]
    fn single_line_span() {
        let lines = lines();
        assert_eq!(extract_span(&lines, &point(1, 8, 1, 12)).unwrap(), "void");
        assert_eq!(
            extract_span(&lines, &point(5, 5, 5, 29)).unwrap(),
            "Console.WriteLine(\"é\");"
        );
    }

    #[test]
    fn multi_line_span() {
        let lines = lines();
        assert_eq!(
            extract_span(&lines, &point(3, 5, 4, 12)).unwrap(),
            "var x = Compute(1,\n        2);"
        );
        assert_eq!(
            extract_span(&lines, &point(2, 1, 4, 3)).unwrap(),
            "{\n    var x = Compute(1,\n  "
        );
    }

    #[test]
    fn boundary_markers_rejected() {
        let lines = lines();
        let open = extract_span(&lines, &point(2, 1, 2, 2)).unwrap();
        let close = extract_span(&lines, &point(6, 1, 6, 2)).unwrap();
        assert!(!is_instrumentable(&open));
        assert!(!is_instrumentable(&close));
        assert!(is_instrumentable(";"));
        assert!(is_instrumentable("{ }"));
    }

    #[test]
    fn out_of_range_lines() {
        let lines = lines();
        assert!(extract_span(&lines, &point(7, 1, 7, 2)).is_none());
        assert!(extract_span(&lines, &point(HIDDEN_LINE, 0, HIDDEN_LINE, 0)).is_none());
        assert!(extract_span(&lines, &point(0, 1, 0, 2)).is_none());
    }

    #[test]
    fn columns_are_clamped() {
        let lines = lines();
        assert_eq!(extract_span(&lines, &point(2, 1, 2, 40)).unwrap(), "{");
        assert_eq!(extract_span(&lines, &point(2, 5, 2, 9)).unwrap(), "");
        assert_eq!(extract_span(&lines, &point(1, 8, 1, 3)).unwrap(), "");
        assert!(is_instrumentable(""));
    }

    #[test]
    fn end_line_past_file_end() {
        let lines = lines();
        assert_eq!(
            extract_span(&lines, &point(5, 5, 9, 2)).unwrap(),
            "Console.WriteLine(\"é\");\n}"
        );
    }

    #[test]
    fn cache_skips_byte_order_mark() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all("\u{FEFF}{\n    return;\n}\n".as_bytes()).unwrap();

        let mut cache = SourceCache::new();
        assert_eq!(cache.select(file.path(), &point(1, 1, 1, 2)).unwrap(), None);
        assert_eq!(
            cache.select(file.path(), &point(2, 5, 2, 12)).unwrap(),
            Some("return;".to_string())
        );
    }

    #[test]
    fn cache_decodes_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\n    Greet(\"caf\xE9\");\n}\n").unwrap();

        let mut cache = SourceCache::new();
        assert_eq!(
            cache.select(file.path(), &point(2, 5, 2, 19)).unwrap(),
            Some("Greet(\"caf\u{FFFD}\");".to_string())
        );
        assert_eq!(cache.select(file.path(), &point(3, 1, 3, 2)).unwrap(), None);
    }

    #[test]
    fn cache_selects_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\r\n    return;\r\n}}\r\n").unwrap();

        let mut cache = SourceCache::new();
        assert_eq!(cache.lines(file.path()).unwrap().len(), 3);
        assert_eq!(
            cache.select(file.path(), &point(2, 5, 2, 12)).unwrap(),
            Some("return;".to_string())
        );
        assert_eq!(cache.select(file.path(), &point(1, 1, 1, 2)).unwrap(), None);
        assert!(cache.lines(Path::new("/nonexistent/File.cs")).is_err());
    }
}
