use std::fmt;

/// Semantic kind of one raw diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    Added,
    Removed,
    Unchanged,
    /// The `@@ ... @@` line opening a chunk
    Header,
    /// `\ No newline at end of file`
    NoNewline,
    /// `<<<<<<<`
    ConflictStart,
    ConflictOurs,
    /// Common ancestor lines of a diff3-style conflict
    ConflictBase,
    /// `=======`, or the `|||||||` marker opening the ancestor section
    ConflictMiddle,
    ConflictTheirs,
    /// `>>>>>>>`
    ConflictEnd,
}

impl LineKind {
    /// True for every kind that belongs to a conflict span, markers included.
    pub fn is_conflict(self) -> bool {
        matches!(
            self,
            LineKind::ConflictStart
                | LineKind::ConflictOurs
                | LineKind::ConflictBase
                | LineKind::ConflictMiddle
                | LineKind::ConflictTheirs
                | LineKind::ConflictEnd
        )
    }

    pub fn is_conflict_marker(self) -> bool {
        matches!(
            self,
            LineKind::ConflictStart | LineKind::ConflictMiddle | LineKind::ConflictEnd
        )
    }
}

/// One row of diff output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Untouched source text, including the leading diff marker column(s)
    pub raw: String,
    pub kind: LineKind,
    /// Line number in the post-image file
    pub to_file_line_number: Option<u32>,
    /// Number of diff marker columns: 1 for regular diffs, one per parent for combined diffs
    pub columns: usize,
}

impl Line {
    /// The line text without its diff marker column(s).
    pub fn content(&self) -> &str {
        match self.kind {
            LineKind::Header | LineKind::NoNewline => &self.raw,
            _ => split_prefix(&self.raw, self.columns).1,
        }
    }
}

/// Which part of a conflict span the classifier is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Outside,
    Ours,
    Base,
    Theirs,
}

/// A conflict marker that appeared where the span grammar does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerAnomaly {
    /// `<<<<<<<` while a span is already open
    NestedStart,
    /// `|||||||` outside the ours section
    UnexpectedBase,
    /// `=======` outside a span or after the middle marker
    UnexpectedMiddle,
    /// `>>>>>>>` before the middle marker or outside a span
    UnexpectedEnd,
}

impl fmt::Display for MarkerAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MarkerAnomaly::NestedStart => "conflict start marker inside an open conflict",
            MarkerAnomaly::UnexpectedBase => "unmatched ancestor marker",
            MarkerAnomaly::UnexpectedMiddle => "unmatched separator marker",
            MarkerAnomaly::UnexpectedEnd => "unmatched conflict end marker",
        })
    }
}

/// Conflict-span tracking carried across the lines of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSpanState {
    columns: usize,
    side: Side,
    anomaly: Option<MarkerAnomaly>,
}

impl Default for ConflictSpanState {
    fn default() -> Self {
        Self::with_columns(1)
    }
}

impl ConflictSpanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a combined diff with `columns` marker columns per line.
    pub fn with_columns(columns: usize) -> Self {
        Self {
            columns: columns.max(1),
            side: Side::Outside,
            anomaly: None,
        }
    }

    /// True between a start marker and its end marker.
    pub fn in_span(&self) -> bool {
        self.side != Side::Outside
    }

    /// The marker anomaly recorded by the most recent [`classify`] call, if any.
    pub fn take_anomaly(&mut self) -> Option<MarkerAnomaly> {
        self.anomaly.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Start,
    Base,
    Middle,
    End,
}

/// Classify one raw diff line.
///
/// Conflict markers are recognised on the line body, after the diff marker
/// columns, so `+<<<<<<< HEAD` in a working-tree diff and `<<<<<<< HEAD` in raw
/// file content both open a span. Inside a span, membership wins over the
/// diff markers. A marker that arrives out of sequence is classified as a
/// plain line and recorded as an anomaly on `state`. A `\\ No newline` note
/// is never part of a span.
pub fn classify(raw: &str, state: &mut ConflictSpanState) -> LineKind {
    if raw.starts_with('\\') {
        return LineKind::NoNewline;
    }

    let (_, body) = split_prefix(raw, state.columns);

    if let Some(marker) = conflict_marker(body) {
        match (marker, state.side) {
            (Marker::Start, Side::Outside) => {
                state.side = Side::Ours;
                return LineKind::ConflictStart;
            }
            (Marker::Base, Side::Ours) => {
                state.side = Side::Base;
                return LineKind::ConflictMiddle;
            }
            (Marker::Middle, Side::Ours | Side::Base) => {
                state.side = Side::Theirs;
                return LineKind::ConflictMiddle;
            }
            (Marker::End, Side::Theirs) => {
                state.side = Side::Outside;
                return LineKind::ConflictEnd;
            }
            (Marker::Start, _) => state.anomaly = Some(MarkerAnomaly::NestedStart),
            (Marker::Base, _) => state.anomaly = Some(MarkerAnomaly::UnexpectedBase),
            (Marker::Middle, _) => state.anomaly = Some(MarkerAnomaly::UnexpectedMiddle),
            (Marker::End, _) => state.anomaly = Some(MarkerAnomaly::UnexpectedEnd),
        }
    }

    match state.side {
        Side::Ours => LineKind::ConflictOurs,
        Side::Base => LineKind::ConflictBase,
        Side::Theirs => LineKind::ConflictTheirs,
        Side::Outside => classify_plain(raw, state.columns),
    }
}

/// Classification by diff marker alone, ignoring conflict spans.
pub(crate) fn classify_plain(raw: &str, columns: usize) -> LineKind {
    if raw.starts_with("@@") {
        return LineKind::Header;
    }
    if raw.starts_with('\\') {
        return LineKind::NoNewline;
    }

    let (prefix, _) = split_prefix(raw, columns);
    if prefix.contains('-') {
        LineKind::Removed
    } else if prefix.contains('+') {
        LineKind::Added
    } else {
        LineKind::Unchanged
    }
}

/// Whether a classified line exists in the post-image file.
pub(crate) fn in_post_image(raw: &str, kind: LineKind, columns: usize) -> bool {
    match kind {
        LineKind::Header | LineKind::NoNewline | LineKind::Removed => false,
        _ => !split_prefix(raw, columns).0.contains('-'),
    }
}

/// Split a raw line into its diff marker columns and body.
///
/// Lines that do not start with `columns` marker characters (raw file
/// content, empty lines) have an empty prefix.
fn split_prefix(raw: &str, columns: usize) -> (&str, &str) {
    let is_prefix = raw
        .as_bytes()
        .get(..columns)
        .is_some_and(|head| head.iter().all(|b| matches!(b, b'+' | b'-' | b' ')));

    if is_prefix {
        raw.split_at(columns)
    } else {
        ("", raw)
    }
}

fn conflict_marker(body: &str) -> Option<Marker> {
    let body = body.trim_end_matches('\r');
    if body == "=======" {
        return Some(Marker::Middle);
    }

    [
        ("<<<<<<<", Marker::Start),
        ("|||||||", Marker::Base),
        (">>>>>>>", Marker::End),
    ]
    .into_iter()
    .find_map(|(prefix, marker)| {
        body.strip_prefix(prefix)
            .filter(|rest| rest.is_empty() || rest.starts_with(' '))
            .map(|_| marker)
    })
}
