//! `git status --porcelain -z` entries.

use crate::diff::FileStatus;
use crate::parse::ParseError;

/// One path reported by `git status --porcelain=v1 -z`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// `X` column: state of the index relative to HEAD
    pub index: char,
    /// `Y` column: state of the working tree relative to the index
    pub worktree: char,
    pub path: String,
    /// Source path of a rename or copy
    pub orig_path: Option<String>,
}

impl StatusEntry {
    /// Parse NUL-separated porcelain v1 output.
    ///
    /// Renames and copies carry their source path in the following field.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MalformedStatusEntry`] for a record shorter than
    /// `XY ` or a rename without its source field, and [`ParseError::EmptyPath`]
    /// for a record without a path.
    pub fn parse_porcelain(raw: &str) -> Result<Vec<StatusEntry>, ParseError> {
        let mut fields = raw.split('\0').filter(|field| !field.is_empty());
        let mut entries = Vec::new();

        while let Some(field) = fields.next() {
            let mut chars = field.chars();
            let (Some(index), Some(worktree), Some(' ')) = (chars.next(), chars.next(), chars.next())
            else {
                return Err(ParseError::MalformedStatusEntry {
                    entry: field.to_string(),
                });
            };

            let path = chars.as_str();
            if path.is_empty() {
                return Err(ParseError::EmptyPath {
                    input: field.to_string(),
                });
            }

            let orig_path = if matches!(index, 'R' | 'C') || matches!(worktree, 'R' | 'C') {
                let orig = fields.next().ok_or_else(|| ParseError::MalformedStatusEntry {
                    entry: field.to_string(),
                })?;
                Some(orig.to_string())
            } else {
                None
            };

            entries.push(StatusEntry {
                index,
                worktree,
                path: path.to_string(),
                orig_path,
            });
        }

        Ok(entries)
    }

    pub fn status(&self) -> FileStatus {
        FileStatus::from_porcelain(self.index, self.worktree)
    }

    /// Whether the entry has changes that are not yet in the index.
    pub fn has_worktree_changes(&self) -> bool {
        !matches!(self.worktree, ' ' | '!')
    }

    /// Whether the entry has changes in the index relative to HEAD.
    pub fn has_index_changes(&self) -> bool {
        !matches!(self.index, ' ' | '?' | '!')
    }
}

impl FileStatus {
    /// Map porcelain `XY` codes to a status.
    pub fn from_porcelain(index: char, worktree: char) -> Self {
        match (index, worktree) {
            ('?', '?') => FileStatus::Untracked,
            ('!', '!') => FileStatus::Ignored,
            ('D', 'D') | ('A', 'A') | ('U', _) | (_, 'U') => FileStatus::Conflict,
            ('R', _) | (_, 'R') => FileStatus::Renamed,
            ('C', _) | (_, 'C') => FileStatus::Copied,
            ('A', _) => FileStatus::Added,
            ('D', _) => FileStatus::Removed,
            (_, 'D') => FileStatus::Deleted,
            ('M' | 'T', _) | (_, 'M' | 'T') => FileStatus::Modified,
            _ => FileStatus::Unknown,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::diff::FileDiff;
    use similar_asserts::assert_eq;

    #[test]
    fn parse_mixed_entries() {
        let raw = " M src/lib.rs\0A  new.rs\0?? notes.txt\0R  after.rs\0before.rs\0UU merged.rs\0";
        let entries = StatusEntry::parse_porcelain(raw).unwrap();

        let statuses: Vec<_> = entries.iter().map(StatusEntry::status).collect();
        assert_eq!(
            statuses,
            vec![
                FileStatus::Modified,
                FileStatus::Added,
                FileStatus::Untracked,
                FileStatus::Renamed,
                FileStatus::Conflict,
            ]
        );
        assert_eq!(entries[3].path, "after.rs");
        assert_eq!(entries[3].orig_path.as_deref(), Some("before.rs"));
        assert!(entries[0].has_worktree_changes());
        assert!(!entries[0].has_index_changes());
        assert!(entries[1].has_index_changes());
    }

    #[test]
    fn paths_keep_spaces() {
        let entries = StatusEntry::parse_porcelain(" M dir with space/file name.txt\0").unwrap();
        assert_eq!(entries[0].path, "dir with space/file name.txt");
    }

    #[test]
    fn empty_output_has_no_entries() {
        assert!(StatusEntry::parse_porcelain("").unwrap().is_empty());
    }

    #[test]
    fn truncated_record_is_malformed() {
        let result = StatusEntry::parse_porcelain("M\0");
        assert!(matches!(
            result,
            Err(ParseError::MalformedStatusEntry { .. })
        ));
    }

    #[test]
    fn record_without_path_is_rejected() {
        let result = StatusEntry::parse_porcelain(" M \0");
        assert!(matches!(result, Err(ParseError::EmptyPath { .. })));
    }

    #[test]
    fn rename_without_source_is_malformed() {
        let result = StatusEntry::parse_porcelain("R  after.rs\0");
        assert!(matches!(
            result,
            Err(ParseError::MalformedStatusEntry { .. })
        ));
    }

    #[test]
    fn porcelain_codes() {
        assert_eq!(FileStatus::from_porcelain(' ', 'D'), FileStatus::Deleted);
        assert_eq!(FileStatus::from_porcelain('D', ' '), FileStatus::Removed);
        assert_eq!(FileStatus::from_porcelain('A', 'U'), FileStatus::Conflict);
        assert_eq!(FileStatus::from_porcelain('D', 'D'), FileStatus::Conflict);
        assert_eq!(FileStatus::from_porcelain('M', 'M'), FileStatus::Modified);
        assert_eq!(FileStatus::from_porcelain('T', ' '), FileStatus::Modified);
        assert_eq!(FileStatus::from_porcelain('!', '!'), FileStatus::Ignored);
        assert_eq!(FileStatus::from_porcelain(' ', ' '), FileStatus::Unknown);
    }

    #[test]
    fn placeholders_from_status() {
        let entries = StatusEntry::parse_porcelain("?? new.txt\0 D gone.txt\0R  b.rs\0a.rs\0").unwrap();
        let diffs: Vec<_> = entries.iter().map(FileDiff::from_status).collect();

        assert_eq!(diffs[0].status, FileStatus::Untracked);
        assert_eq!(diffs[0].to_file_path, "new.txt");

        assert_eq!(diffs[1].status, FileStatus::Deleted);
        assert_eq!(diffs[1].from_file_path, "gone.txt");
        assert_eq!(diffs[1].to_file_path, "");

        assert_eq!(diffs[2].file_path_display(), "a.rs → b.rs");
    }
}
