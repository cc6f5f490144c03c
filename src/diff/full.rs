use super::file::{FileDiff, is_diff_header};
use super::split_lines;
use crate::parse::ParseWarning;

/// A complete git diff containing changes for multiple files
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diff {
    pub files: Vec<FileDiff>,
    /// Files that could not be parsed at all
    pub warnings: Vec<ParseWarning>,
}

impl Diff {
    /// Parse a complete git diff output into file diffs.
    ///
    /// Anything before the first diff header (the commit header of `git show`,
    /// the mail headers of a patch) is ignored.
    pub fn parse(text: &str) -> Self {
        let lines = split_lines(text);
        let starts: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| is_diff_header(line))
            .map(|(i, _)| i)
            .collect();

        if let Some(&first) = starts.first()
            && first > 0
        {
            log::debug!("[Diff] skipping {first} preamble line(s)");
        }

        let mut diff = Diff::default();
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(lines.len());
            let mut section = lines[start..end].join("\n");
            section.push('\n');

            match FileDiff::parse(&section) {
                Ok(file_diff) => diff.files.push(file_diff),
                Err(e) => {
                    log::warn!("[Diff] skipping file: {e}");
                    diff.warnings.push(ParseWarning::file(e.to_string()));
                }
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Find a file by its pre- or post-image path.
    pub fn file(&self, path: &str) -> Option<&FileDiff> {
        self.files
            .iter()
            .find(|file| file.to_file_path == path || file.from_file_path == path)
    }
}

impl std::fmt::Display for Diff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for file_diff in &self.files {
            write!(f, "{}", file_diff)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::diff::file::FileStatus;
    use similar_asserts::assert_eq;

    const TWO_FILES: &str = r#"diff --git a/flake.nix b/flake.nix
index abc1234..def5678 100644
--- a/flake.nix
+++ b/flake.nix
@@ -136,0 +137 @@
+      debug = true;
diff --git a/gtk.nix b/gtk.nix
index 111..222 100644
--- a/gtk.nix
+++ b/gtk.nix
@@ -11,0 +12 @@
+    gtk.cursorTheme.size = 24;
"#;

    #[test]
    fn parse_empty_diff() {
        let diff = Diff::parse("");
        assert!(diff.is_empty());
        assert!(diff.warnings.is_empty());
    }

    #[test]
    fn parse_single_file() {
        let text = r#"diff --git a/flake.nix b/flake.nix
index abc1234..def5678 100644
--- a/flake.nix
+++ b/flake.nix
@@ -136,0 +137 @@
+      debug = true;
"#;
        let diff = Diff::parse(text);
        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.files[0].path(), "flake.nix");
        assert_eq!(diff.files[0].chunks.len(), 1);
    }

    #[test]
    fn parse_multiple_files() {
        let diff = Diff::parse(TWO_FILES);
        assert_eq!(diff.files.len(), 2);
        assert_eq!(diff.files[0].path(), "flake.nix");
        assert_eq!(diff.files[1].path(), "gtk.nix");
        assert!(diff.file("gtk.nix").is_some());
        assert!(diff.file("missing.nix").is_none());
    }

    #[test]
    fn roundtrip_multiple_files() {
        assert_eq!(Diff::parse(TWO_FILES).to_string(), TWO_FILES);
    }

    #[test]
    fn show_preamble_is_ignored() {
        let text = format!(
            "commit 0123456789abcdef\nAuthor: Test User <test@example.com>\n\n    message\n\n{TWO_FILES}"
        );
        let diff = Diff::parse(&text);
        assert_eq!(diff.files.len(), 2);
        assert!(diff.warnings.is_empty());
    }

    #[test]
    fn mixed_statuses() {
        let text = r#"diff --git a/added.rs b/added.rs
new file mode 100644
index 0000000..1111111
--- /dev/null
+++ b/added.rs
@@ -0,0 +1 @@
+fn added() {}
diff --git a/gone.rs b/gone.rs
deleted file mode 100644
index 2222222..0000000
--- a/gone.rs
+++ /dev/null
@@ -1 +0,0 @@
-fn gone() {}
"#;
        let diff = Diff::parse(text);
        let statuses: Vec<_> = diff.files.iter().map(|f| f.status).collect();
        assert_eq!(statuses, vec![FileStatus::Added, FileStatus::Removed]);
    }
}
