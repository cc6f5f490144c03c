use super::line::{ConflictSpanState, Line, LineKind, classify, classify_plain, in_post_image};
use super::split_lines;
use crate::parse::{ParseError, ParseWarning, parse_hunk_header};
use std::fmt;

/// `<start>,<count>` side of a hunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: u32,
    pub count: u32,
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.start, self.count)
    }
}

/// Parsed `@@ -a,b +c,d @@ context` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkHeader {
    /// One range per pre-image; two for a combined diff of a merge
    pub old: Vec<LineRange>,
    pub new: LineRange,
    /// Function context git prints after the closing marker
    pub context: String,
}

impl HunkHeader {
    /// Number of diff marker columns the chunk's lines carry.
    pub fn columns(&self) -> usize {
        self.old.len().max(1)
    }

    /// Whether two headers describe the same region, ignoring function context.
    pub fn same_ranges(&self, other: &HunkHeader) -> bool {
        self.old == other.old && self.new == other.new
    }
}

impl fmt::Display for HunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = "@".repeat(self.columns() + 1);
        write!(f, "{marker}")?;
        for old in &self.old {
            write!(f, " -{old}")?;
        }
        write!(f, " +{} {marker}", self.new)?;
        if !self.context.is_empty() {
            write!(f, " {}", self.context)?;
        }
        Ok(())
    }
}

/// One `@@`-delimited region of a file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Derived from the header text and the chunk's position in its file, so
    /// re-parsing the same diff yields the same id.
    pub id: String,
    pub header: HunkHeader,
    /// The first line is always the [`LineKind::Header`] line
    pub lines: Vec<Line>,
    pub has_conflict: bool,
}

impl Chunk {
    /// Parse a single chunk (header line plus body).
    ///
    /// Recoverable problems inside the body are logged; use
    /// [`Chunk::from_lines`] to collect them instead.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MalformedHunkHeader`] when the first line is not a
    /// hunk header.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let (chunk, warnings) = Self::from_lines(&split_lines(text), 0)?;
        for warning in &warnings {
            log::warn!("[Chunk] {warning}");
        }
        Ok(chunk)
    }

    /// Build the chunk at `ordinal` within its file from its raw lines.
    pub fn from_lines(
        lines: &[&str],
        ordinal: usize,
    ) -> Result<(Self, Vec<ParseWarning>), ParseError> {
        let Some((&header_line, body)) = lines.split_first() else {
            return Err(ParseError::MalformedHunkHeader {
                header: String::new(),
            });
        };

        let header = parse_hunk_header(header_line)?;
        let columns = header.columns();
        let mut warnings = Vec::new();

        let mut state = ConflictSpanState::with_columns(columns);
        let mut kinds = Vec::with_capacity(lines.len());
        let mut span_start = 0;
        kinds.push(LineKind::Header);

        for raw in body {
            let kind = classify(raw, &mut state);
            if let Some(anomaly) = state.take_anomaly() {
                warnings.push(ParseWarning::chunk(
                    ordinal,
                    format!("line {}: {anomaly}", kinds.len() + 1),
                ));
            }
            if kind == LineKind::ConflictStart {
                span_start = kinds.len();
            }
            kinds.push(kind);
        }

        // An unterminated span is not a conflict; fall back to the diff markers
        if state.in_span() {
            warnings.push(ParseWarning::chunk(
                ordinal,
                format!("line {}: unterminated conflict span", span_start + 1),
            ));
            for (kind, raw) in kinds[span_start..].iter_mut().zip(&lines[span_start..]) {
                *kind = classify_plain(raw, columns);
            }
        }

        let mut next_line = header.new.start;
        let lines: Vec<Line> = lines
            .iter()
            .zip(kinds)
            .map(|(raw, kind)| {
                let number = if in_post_image(raw, kind, columns) {
                    let number = next_line;
                    next_line = next_line.saturating_add(1);
                    (!kind.is_conflict_marker()).then_some(number)
                } else {
                    None
                };

                Line {
                    raw: raw.to_string(),
                    kind,
                    to_file_line_number: number,
                    columns,
                }
            })
            .collect();

        let chunk = Chunk {
            id: format!("{ordinal}:{header_line}"),
            has_conflict: lines.iter().any(|line| line.kind.is_conflict()),
            header,
            lines,
        };

        Ok((chunk, warnings))
    }

    /// Answer for this chunk's prompt when staging it.
    pub fn stage_string(&self) -> &'static str {
        "y"
    }

    /// Answer for this chunk's prompt when unstaging it.
    pub fn unstage_string(&self) -> &'static str {
        "y"
    }

    pub fn added_count(&self) -> usize {
        self.count_kind(LineKind::Added)
    }

    pub fn removed_count(&self) -> usize {
        self.count_kind(LineKind::Removed)
    }

    fn count_kind(&self, kind: LineKind) -> usize {
        self.lines.iter().filter(|line| line.kind == kind).count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use similar_asserts::assert_eq;

    #[test]
    fn parse_replacement() {
        let chunk = Chunk::parse(
            "@@ -1,4 +1,4 @@ fn main() {\n-    print(\"Old implementation\")\n-    print(\"Old implementation\")\n+    print(\"Better implementation\")\n+    print(\"Better implementation\")\n }\n }\n",
        )
        .unwrap();

        assert_eq!(chunk.id, "0:@@ -1,4 +1,4 @@ fn main() {");
        assert_eq!(chunk.header.context, "fn main() {");
        assert_eq!(chunk.added_count(), 2);
        assert_eq!(chunk.removed_count(), 2);
        assert!(!chunk.has_conflict);
        assert_eq!(chunk.lines[0].kind, LineKind::Header);
    }

    #[test]
    fn line_numbers_follow_post_image() {
        let chunk = Chunk::parse("@@ -10,3 +10,3 @@\n keep\n-gone\n+here\n keep too").unwrap();
        let numbers: Vec<_> = chunk
            .lines
            .iter()
            .map(|line| line.to_file_line_number)
            .collect();
        assert_eq!(numbers, vec![None, Some(10), None, Some(11), Some(12)]);
    }

    #[test]
    fn empty_trailing_line_is_unchanged() {
        let chunk = Chunk::parse("@@ -1,2 +1,2 @@\n-a\n+b\n").unwrap();
        assert_eq!(chunk.lines.len(), 3);

        let chunk = Chunk::from_lines(&["@@ -1,2 +1,2 @@", "+b", ""], 0)
            .unwrap()
            .0;
        assert_eq!(chunk.lines[2].kind, LineKind::Unchanged);
        assert_eq!(chunk.lines[2].to_file_line_number, Some(2));
    }

    #[test]
    fn malformed_header_is_error() {
        let result = Chunk::parse("@@ garbage @@\n+x");
        assert!(matches!(
            result,
            Err(ParseError::MalformedHunkHeader { .. })
        ));
    }

    #[test]
    fn empty_text_is_error() {
        assert!(Chunk::from_lines(&[], 0).is_err());
    }

    #[test]
    fn conflict_chunk_has_one_span() {
        let (chunk, warnings) = Chunk::from_lines(
            &[
                "@@ -1,1 +1,5 @@",
                "+<<<<<<< HEAD",
                "+value = ours",
                "+=======",
                "+value = theirs",
                "+>>>>>>> feature",
            ],
            0,
        )
        .unwrap();

        assert!(warnings.is_empty());
        assert!(chunk.has_conflict);
        let kinds: Vec<_> = chunk.lines.iter().map(|line| line.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LineKind::Header,
                LineKind::ConflictStart,
                LineKind::ConflictOurs,
                LineKind::ConflictMiddle,
                LineKind::ConflictTheirs,
                LineKind::ConflictEnd,
            ]
        );
        // Markers occupy post-image lines but carry no number
        assert_eq!(chunk.lines[1].to_file_line_number, None);
        assert_eq!(chunk.lines[2].to_file_line_number, Some(2));
        assert_eq!(chunk.lines[4].to_file_line_number, Some(4));
    }

    #[test]
    fn no_newline_note_inside_span_is_unnumbered() {
        let (chunk, _) = Chunk::from_lines(
            &[
                "@@ -1,1 +1,5 @@",
                "+<<<<<<< HEAD",
                "+value = ours",
                "\\ No newline at end of file",
                "+=======",
                "+value = theirs",
                "+>>>>>>> feature",
            ],
            0,
        )
        .unwrap();

        assert_eq!(chunk.lines[3].kind, LineKind::NoNewline);
        assert_eq!(chunk.lines[3].to_file_line_number, None);
        assert_eq!(chunk.lines[5].kind, LineKind::ConflictTheirs);
        assert_eq!(chunk.lines[5].to_file_line_number, Some(4));
        assert!(chunk.has_conflict);
    }

    #[test]
    fn unterminated_span_falls_back_with_warning() {
        let (chunk, warnings) = Chunk::from_lines(
            &["@@ -1,0 +1,3 @@", "+<<<<<<< HEAD", "+ours", "+======="],
            2,
        )
        .unwrap();

        assert!(!chunk.has_conflict);
        assert!(
            chunk.lines[1..]
                .iter()
                .all(|line| line.kind == LineKind::Added)
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].ordinal, Some(2));
        assert_eq!(chunk.lines[1].to_file_line_number, Some(1));
    }

    #[test]
    fn stray_marker_is_recorded() {
        let (chunk, warnings) =
            Chunk::from_lines(&["@@ -1 +1 @@", "->>>>>>> old", "+new"], 0).unwrap();
        assert_eq!(chunk.lines[1].kind, LineKind::Removed);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("unmatched conflict end"));
    }

    #[test]
    fn combined_chunk_uses_two_columns() {
        let chunk = Chunk::parse(
            "@@@ -1,1 -1,1 +1,5 @@@\n++<<<<<<< HEAD\n +value = ours\n++=======\n+ value = theirs\n++>>>>>>> feature\n",
        )
        .unwrap();
        assert_eq!(chunk.header.columns(), 2);
        assert!(chunk.has_conflict);
        assert_eq!(chunk.lines[2].content(), "value = ours");
        assert_eq!(chunk.lines[4].content(), "value = theirs");
    }

    #[test]
    fn answers_are_yes() {
        let chunk = Chunk::parse("@@ -1 +1 @@\n-a\n+b").unwrap();
        assert_eq!(chunk.stage_string(), "y");
        assert_eq!(chunk.unstage_string(), "y");
    }

    #[test]
    fn header_display() {
        let header = parse_hunk_header("@@ -15 +14,0 @@ line 14").unwrap();
        insta::assert_snapshot!(header.to_string(), @"@@ -15,1 +14,0 @@ line 14");
    }

    #[test]
    fn same_ranges_ignores_context() {
        let a = parse_hunk_header("@@ -3,7 +3,7 @@ fn a()").unwrap();
        let b = parse_hunk_header("@@ -3,7 +3,7 @@").unwrap();
        let c = parse_hunk_header("@@ -3,7 +3,8 @@").unwrap();
        assert!(a.same_ranges(&b));
        assert!(!a.same_ranges(&c));
    }

    fn body_line() -> impl Strategy<Value = String> {
        "[ +-][a-z ]{0,16}"
    }

    proptest! {
        #[test]
        fn numbered_lines_match_declared_new_count(
            body in proptest::collection::vec(body_line(), 1..30),
            start in 1u32..500,
        ) {
            let old_count = body.iter().filter(|l| !l.starts_with('+')).count();
            let new_count = body.iter().filter(|l| !l.starts_with('-')).count();
            let header = format!("@@ -{start},{old_count} +{start},{new_count} @@");

            let mut lines = vec![header.as_str()];
            lines.extend(body.iter().map(String::as_str));
            let (chunk, _) = Chunk::from_lines(&lines, 0).unwrap();

            let numbered = chunk
                .lines
                .iter()
                .filter(|line| line.to_file_line_number.is_some())
                .count();
            prop_assert_eq!(numbered, chunk.header.new.count as usize);
        }
    }
}
