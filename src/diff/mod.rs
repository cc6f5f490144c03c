pub mod chunk;
pub mod file;
pub mod full;
pub mod line;

pub use chunk::{Chunk, HunkHeader, LineRange};
pub use file::{FileDiff, FileStatus, LineStats};
pub use full::Diff;
pub use line::{ConflictSpanState, Line, LineKind, MarkerAnomaly, classify};

/// Split text into lines, dropping the empty remainder after a final newline.
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// Format a parsed diff for the terminal, numbering chunks for `FILE:N` references.
///
/// Example output:
/// ```text
/// flake.nix:
///   [1] @@ -136,0 +137,1 @@ (+1 -0)
///   +137:	      debug = true;
/// ```
pub fn format_diff(diff: &Diff) -> String {
    let mut result = String::new();

    for file_diff in &diff.files {
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&file_diff.file_path_display());
        result.push_str(":\n");

        if file_diff.is_binary {
            result.push_str("  (binary)\n");
            continue;
        }
        if file_diff.chunks.is_empty() {
            result.push_str(&format!("  ({:?}, no textual changes)\n", file_diff.status));
            continue;
        }

        for (i, chunk) in file_diff.chunks.iter().enumerate() {
            result.push_str(&format!(
                "  [{}] {} (+{} -{})\n",
                i + 1,
                chunk.header,
                chunk.added_count(),
                chunk.removed_count()
            ));

            for line in chunk.lines.iter().skip(1) {
                let symbol = match line.kind {
                    LineKind::Added => '+',
                    LineKind::Removed => '-',
                    LineKind::NoNewline => {
                        result.push_str(&format!("  {}\n", line.raw));
                        continue;
                    }
                    kind if kind.is_conflict() => '!',
                    _ => ' ',
                };
                let number = line
                    .to_file_line_number
                    .map(|n| n.to_string())
                    .unwrap_or_default();
                result.push_str(&format!("  {symbol}{number}:\t{}\n", line.content()));
            }
        }
    }

    result
}
