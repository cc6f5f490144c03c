//! Merge conflict spans and whole-file resolution.

use crate::ResolveError;
use crate::diff::{Chunk, Line, LineKind};
use crate::lock::WorkdirLock;
use crate::process::{GitExecutor, Invocation, ProcessOutput};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Line indices of one `<<<<<<<` .. `>>>>>>>` region within [`Chunk::lines`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictSpan {
    pub start: usize,
    /// `|||||||` line of a diff3-style conflict
    pub base: Option<usize>,
    pub middle: usize,
    pub end: usize,
}

impl ConflictSpan {
    /// Lines between the start marker and the base (or middle) marker.
    pub fn ours<'c>(&self, chunk: &'c Chunk) -> &'c [Line] {
        &chunk.lines[self.start + 1..self.base.unwrap_or(self.middle)]
    }

    /// Common ancestor lines of a diff3-style conflict.
    pub fn base_lines<'c>(&self, chunk: &'c Chunk) -> &'c [Line] {
        match self.base {
            Some(base) => &chunk.lines[base + 1..self.middle],
            None => &[],
        }
    }

    pub fn theirs<'c>(&self, chunk: &'c Chunk) -> &'c [Line] {
        &chunk.lines[self.middle + 1..self.end]
    }

    /// Label after `<<<<<<<`, usually `HEAD`.
    pub fn ours_label<'c>(&self, chunk: &'c Chunk) -> &'c str {
        marker_label(&chunk.lines[self.start])
    }

    /// Label after `>>>>>>>`, usually the merged branch.
    pub fn theirs_label<'c>(&self, chunk: &'c Chunk) -> &'c str {
        marker_label(&chunk.lines[self.end])
    }
}

fn marker_label(line: &Line) -> &str {
    line.content().get(7..).unwrap_or_default().trim()
}

/// Locate the complete conflict spans of a chunk, in order.
pub fn conflict_spans(chunk: &Chunk) -> Vec<ConflictSpan> {
    let mut spans = Vec::new();
    let mut open: Option<(usize, Option<usize>, Option<usize>)> = None;

    for (i, line) in chunk.lines.iter().enumerate() {
        match line.kind {
            LineKind::ConflictStart => open = Some((i, None, None)),
            LineKind::ConflictMiddle => {
                if let Some((_, base, middle)) = open.as_mut() {
                    if line.content().starts_with("|||||||") {
                        *base = Some(i);
                    } else {
                        *middle = Some(i);
                    }
                }
            }
            LineKind::ConflictEnd => {
                if let Some((start, base, Some(middle))) = open.take() {
                    spans.push(ConflictSpan {
                        start,
                        base,
                        middle,
                        end: i,
                    });
                }
            }
            _ => {}
        }
    }

    spans
}

/// Which side of a conflict to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    Ours,
    Theirs,
}

impl ConflictChoice {
    fn flag(self) -> &'static str {
        match self {
            ConflictChoice::Ours => "--ours",
            ConflictChoice::Theirs => "--theirs",
        }
    }
}

/// Resolution progress of a conflicted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictState {
    /// Still unmerged, working tree matches neither side
    Unresolved,
    /// Still unmerged, working tree holds our version
    OursApplied,
    /// Still unmerged, working tree holds their version
    TheirsApplied,
    /// No longer unmerged in the index
    MarkedResolved,
}

impl fmt::Display for ConflictState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictState::Unresolved => "unresolved",
            ConflictState::OursApplied => "ours applied",
            ConflictState::TheirsApplied => "theirs applied",
            ConflictState::MarkedResolved => "resolved",
        })
    }
}

/// Resolves conflicted files by taking one side wholesale.
///
/// Taking a side only rewrites the working tree; the path stays unmerged
/// until [`ConflictResolver::mark_resolved`] adds it to the index.
pub struct ConflictResolver<'a, E: GitExecutor + ?Sized> {
    executor: &'a E,
    workdir: PathBuf,
}

impl<'a, E: GitExecutor + ?Sized> ConflictResolver<'a, E> {
    pub fn new(executor: &'a E, workdir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            workdir: workdir.into(),
        }
    }

    /// Replace the working tree file with our side (`git checkout --ours`).
    pub fn resolve_ours(&self, path: &str) -> Result<(), ResolveError> {
        self.resolve(path, ConflictChoice::Ours)
    }

    /// Replace the working tree file with their side (`git checkout --theirs`).
    pub fn resolve_theirs(&self, path: &str) -> Result<(), ResolveError> {
        self.resolve(path, ConflictChoice::Theirs)
    }

    pub fn resolve(&self, path: &str, choice: ConflictChoice) -> Result<(), ResolveError> {
        self.mutate(["checkout", choice.flag(), "--", path])?;
        log::info!("[ConflictResolver] {path}: took {choice:?}");
        Ok(())
    }

    /// Record the working tree file as resolved (`git add`).
    pub fn mark_resolved(&self, path: &str) -> Result<(), ResolveError> {
        self.mutate(["add", "--", path])?;
        log::info!("[ConflictResolver] {path}: marked resolved");
        Ok(())
    }

    /// Derive the state of `path` from the index stages and the working tree.
    pub fn state(&self, path: &str) -> Result<ConflictState, ResolveError> {
        let unmerged = self.run(["ls-files", "--unmerged", "--", path])?;
        if unmerged.stdout.trim().is_empty() {
            return Ok(ConflictState::MarkedResolved);
        }

        let worktree = match fs::read(self.workdir.join(path)) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ConflictState::Unresolved),
            Err(e) => {
                return Err(ResolveError::WorktreeReadFailed {
                    path: path.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let state = if self.stage_content(2, path)?.as_deref() == Some(worktree.as_str()) {
            ConflictState::OursApplied
        } else if self.stage_content(3, path)?.as_deref() == Some(worktree.as_str()) {
            ConflictState::TheirsApplied
        } else {
            ConflictState::Unresolved
        };
        log::debug!("[ConflictResolver] {path}: {state}");
        Ok(state)
    }

    /// Blob at index stage `stage`, or `None` when that side has no version.
    fn stage_content(&self, stage: u8, path: &str) -> Result<Option<String>, ResolveError> {
        let object = format!(":{stage}:{path}");
        let invocation = Invocation::new(&self.workdir, ["show", object.as_str()]);
        let output = self.executor.execute(&invocation)?;
        Ok(output.success().then_some(output.stdout))
    }

    fn mutate<const N: usize>(&self, args: [&str; N]) -> Result<ProcessOutput, ResolveError> {
        let _guard = WorkdirLock::acquire(&self.workdir);
        self.run(args)
    }

    fn run<const N: usize>(&self, args: [&str; N]) -> Result<ProcessOutput, ResolveError> {
        let invocation = Invocation::new(&self.workdir, args);
        Ok(self.executor.execute(&invocation)?.check(&invocation)?)
    }
}
