use super::chunk::Chunk;
use super::split_lines;
use crate::parse::{ParseError, ParseWarning};
use crate::status::StatusEntry;
use std::fmt;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Added,
    Modified,
    /// Deleted in the index (or by the diff being viewed)
    Removed,
    Renamed,
    Copied,
    Untracked,
    Ignored,
    /// Deleted in the working tree only
    Deleted,
    /// Unmerged path
    Conflict,
    Unknown,
}

/// Added and removed line totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineStats {
    pub added: usize,
    pub removed: usize,
}

/// A complete diff for a single file.
///
/// A `FileDiff` is never updated in place. After any git operation that can
/// change the file or the index, fetch the diff again and parse a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// The `diff --git` (or `diff --cc`) line
    pub header: String,
    /// `index`, mode, rename and copy lines between the header and `---`
    pub extended_header_lines: Vec<String>,
    /// The `---` / `+++` pair, when present
    pub from_file_to_file_lines: Vec<String>,
    pub chunks: Vec<Chunk>,
    /// Pre-image path; empty for added files
    pub from_file_path: String,
    /// Post-image path; empty for removed files
    pub to_file_path: String,
    pub status: FileStatus,
    pub line_stats: LineStats,
    pub is_binary: bool,
    /// Chunks skipped or demoted while parsing
    pub warnings: Vec<ParseWarning>,
}

impl FileDiff {
    /// Parse a single-file diff from git diff output.
    ///
    /// Expects input starting with `diff --git` (or `diff --cc` for unmerged
    /// paths). Chunks with a malformed header are skipped and recorded in
    /// [`FileDiff::warnings`]; the remaining chunks are kept.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MissingHeader`] if the first line is not a diff header.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let lines = split_lines(raw);
        let (header, rest) = match lines.split_first() {
            Some((&header, rest)) if is_diff_header(header) => (header, rest),
            first => {
                return Err(ParseError::MissingHeader {
                    line: first.map(|(line, _)| line.to_string()).unwrap_or_default(),
                });
            }
        };

        let extended_len = rest
            .iter()
            .position(|line| line.starts_with("@@") || line.starts_with("--- "))
            .unwrap_or(rest.len());
        let (extended, rest) = rest.split_at(extended_len);

        let from_to_len = match rest {
            [from, to, ..] if from.starts_with("--- ") && to.starts_with("+++ ") => 2,
            [from, ..] if from.starts_with("--- ") => 1,
            _ => 0,
        };
        let (from_to, body) = rest.split_at(from_to_len);

        let mut warnings = Vec::new();
        let starts: Vec<usize> = body
            .iter()
            .enumerate()
            .filter(|(_, line)| line.starts_with("@@"))
            .map(|(i, _)| i)
            .collect();

        let stray = starts.first().copied().unwrap_or(body.len());
        if stray > 0 {
            warnings.push(ParseWarning::file(format!(
                "{stray} line(s) outside any chunk ignored"
            )));
        }

        let mut chunks = Vec::with_capacity(starts.len());
        for (ordinal, &start) in starts.iter().enumerate() {
            let end = starts.get(ordinal + 1).copied().unwrap_or(body.len());
            match Chunk::from_lines(&body[start..end], ordinal) {
                Ok((chunk, chunk_warnings)) => {
                    chunks.push(chunk);
                    warnings.extend(chunk_warnings);
                }
                Err(e) => warnings.push(ParseWarning::chunk(ordinal, e.to_string())),
            }
        }

        let combined = !header.starts_with("diff --git ");
        let status = status_from_headers(extended, combined);
        let (mut from_file_path, mut to_file_path) = paths_from_headers(header, extended, from_to);
        match status {
            FileStatus::Added => from_file_path.clear(),
            FileStatus::Removed => to_file_path.clear(),
            _ => {}
        }

        let file_diff = FileDiff {
            header: header.to_string(),
            extended_header_lines: extended.iter().map(|line| line.to_string()).collect(),
            from_file_to_file_lines: from_to.iter().map(|line| line.to_string()).collect(),
            line_stats: line_stats(&chunks),
            chunks,
            from_file_path,
            to_file_path,
            status,
            is_binary: extended
                .iter()
                .any(|line| line.starts_with("Binary files ") || *line == "GIT binary patch"),
            warnings,
        };

        for warning in &file_diff.warnings {
            log::warn!("[FileDiff] {}: {warning}", file_diff.file_path_display());
        }

        Ok(file_diff)
    }

    /// Placeholder for an untracked file; git emits no diff body for it.
    pub fn untracked_file(path: impl Into<String>) -> Self {
        Self::synthesized(String::new(), path.into(), FileStatus::Untracked, Vec::new())
    }

    /// Placeholder for a newly added file.
    pub fn added(path: impl Into<String>) -> Self {
        Self::synthesized(String::new(), path.into(), FileStatus::Added, Vec::new())
    }

    /// Placeholder for a removed file.
    pub fn removed(path: impl Into<String>) -> Self {
        Self::synthesized(path.into(), String::new(), FileStatus::Removed, Vec::new())
    }

    /// Placeholder for a modified binary file.
    pub fn binary(path: impl Into<String>) -> Self {
        let path = path.into();
        let extended = vec![format!("Binary files a/{path} and b/{path} differ")];
        let mut file_diff = Self::synthesized(path.clone(), path, FileStatus::Modified, extended);
        file_diff.is_binary = true;
        file_diff
    }

    /// Placeholder for a rename without content changes.
    pub fn renamed(from: impl Into<String>, to: impl Into<String>) -> Self {
        let (from, to) = (from.into(), to.into());
        let extended = vec![format!("rename from {from}"), format!("rename to {to}")];
        Self::synthesized(from, to, FileStatus::Renamed, extended)
    }

    /// Placeholder for a `git status` entry, for files `git diff` has no body for.
    pub fn from_status(entry: &StatusEntry) -> Self {
        let path = entry.path.clone();
        let orig = entry.orig_path.clone();
        match (entry.status(), orig) {
            (FileStatus::Untracked, _) => Self::untracked_file(path),
            (FileStatus::Added, _) => Self::added(path),
            (status @ (FileStatus::Removed | FileStatus::Deleted), _) => {
                Self::synthesized(path, String::new(), status, Vec::new())
            }
            (FileStatus::Renamed, Some(from)) => Self::renamed(from, path),
            (FileStatus::Copied, Some(from)) => {
                let extended = vec![format!("copy from {from}"), format!("copy to {path}")];
                Self::synthesized(from, path, FileStatus::Copied, extended)
            }
            (status, _) => Self::synthesized(path.clone(), path, status, Vec::new()),
        }
    }

    fn synthesized(from: String, to: String, status: FileStatus, extended: Vec<String>) -> Self {
        let a = if from.is_empty() { &to } else { &from };
        let b = if to.is_empty() { &from } else { &to };

        FileDiff {
            header: format!("diff --git a/{a} b/{b}"),
            extended_header_lines: extended,
            from_file_to_file_lines: Vec::new(),
            chunks: Vec::new(),
            from_file_path: from,
            to_file_path: to,
            status,
            line_stats: LineStats::default(),
            is_binary: false,
            warnings: Vec::new(),
        }
    }

    /// File name of the post-image path (pre-image for removed files).
    pub fn display_file_name(&self) -> &str {
        let path = self.path();
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Repository-relative path, or `from → to` for renames and copies.
    pub fn file_path_display(&self) -> String {
        if !self.from_file_path.is_empty()
            && !self.to_file_path.is_empty()
            && self.from_file_path != self.to_file_path
        {
            format!("{} → {}", self.from_file_path, self.to_file_path)
        } else {
            self.path().to_string()
        }
    }

    /// The post-image path, falling back to the pre-image path.
    pub fn path(&self) -> &str {
        if self.to_file_path.is_empty() {
            &self.from_file_path
        } else {
            &self.to_file_path
        }
    }

    /// Find a chunk by its id.
    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|chunk| chunk.id == id)
    }
}

impl fmt::Display for FileDiff {
    /// Re-serializes the raw lines, reproducing the parsed text.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        for line in self
            .extended_header_lines
            .iter()
            .chain(&self.from_file_to_file_lines)
        {
            writeln!(f, "{line}")?;
        }
        for chunk in &self.chunks {
            for line in &chunk.lines {
                writeln!(f, "{}", line.raw)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn is_diff_header(line: &str) -> bool {
    line.starts_with("diff --git ")
        || line.starts_with("diff --cc ")
        || line.starts_with("diff --combined ")
}

fn status_from_headers(extended: &[&str], combined: bool) -> FileStatus {
    let has = |prefix: &str| extended.iter().any(|line| line.starts_with(prefix));

    if combined {
        FileStatus::Conflict
    } else if has("rename from ") {
        FileStatus::Renamed
    } else if has("copy from ") {
        FileStatus::Copied
    } else if has("new file mode ") {
        FileStatus::Added
    } else if has("deleted file mode ") {
        FileStatus::Removed
    } else {
        FileStatus::Modified
    }
}

/// Resolve both paths, preferring rename/copy lines, then `---`/`+++`, then the header.
fn paths_from_headers(header: &str, extended: &[&str], from_to: &[&str]) -> (String, String) {
    let extended_path = |prefixes: [&str; 2]| {
        extended.iter().find_map(|line| {
            prefixes
                .iter()
                .find_map(|prefix| line.strip_prefix(prefix))
                .map(unquote)
        })
    };
    let marker_path = |marker: &str, side: &str| {
        from_to
            .iter()
            .find_map(|line| line.strip_prefix(marker))
            .map(|path| strip_side(&unquote(path.trim_end_matches('\t')), side))
    };

    let (header_from, header_to) = paths_from_diff_header(header);

    let from = extended_path(["rename from ", "copy from "])
        .or_else(|| marker_path("--- ", "a/"))
        .unwrap_or(header_from);
    let to = extended_path(["rename to ", "copy to "])
        .or_else(|| marker_path("+++ ", "b/"))
        .unwrap_or(header_to);

    (from, to)
}

fn paths_from_diff_header(header: &str) -> (String, String) {
    if let Some(path) = header
        .strip_prefix("diff --cc ")
        .or_else(|| header.strip_prefix("diff --combined "))
    {
        let path = unquote(path);
        return (path.clone(), path);
    }

    let Some(paths) = header.strip_prefix("diff --git ") else {
        return (String::new(), String::new());
    };

    if paths.starts_with('"') {
        let mut quoted = paths.split("\" ");
        let a = quoted.next().unwrap_or_default();
        let b = quoted.next().unwrap_or_default();
        return (
            strip_side(&unquote(&format!("{a}\"")), "a/"),
            strip_side(&unquote(b), "b/"),
        );
    }

    // `a/x b/y` is ambiguous when paths contain " b/"; prefer the symmetric split
    let splits: Vec<usize> = paths.match_indices(" b/").map(|(i, _)| i).collect();
    let split = splits
        .iter()
        .copied()
        .find(|&i| paths[..i].strip_prefix("a/") == Some(&paths[i + 3..]))
        .or_else(|| splits.first().copied());

    match split {
        Some(i) => (
            strip_side(&paths[..i], "a/"),
            strip_side(&paths[i + 1..], "b/"),
        ),
        None => (paths.to_string(), paths.to_string()),
    }
}

fn strip_side(path: &str, side: &str) -> String {
    if path == "/dev/null" {
        String::new()
    } else {
        path.strip_prefix(side).unwrap_or(path).to_string()
    }
}

/// Undo git's C-style quoting of unusual path names.
fn unquote(path: &str) -> String {
    let Some(inner) = path
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return path.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn line_stats(chunks: &[Chunk]) -> LineStats {
    chunks.iter().fold(LineStats::default(), |stats, chunk| LineStats {
        added: stats.added + chunk.added_count(),
        removed: stats.removed + chunk.removed_count(),
    })
}
