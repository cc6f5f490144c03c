use crate::StagingError;
use crate::config::PromptStrategy;
use crate::diff::{Chunk, FileDiff};
use crate::lock::WorkdirLock;
use crate::patch::{Answer, PROMPT_PADDING, PatchIntent, PromptResponder, encode_with_padding};
use crate::process::{GitExecutor, Invocation, ProcessOutput};
use std::path::PathBuf;

/// Pins `--patch` hunks to the shape [`crate::GitChunkStager`] parses and keeps
/// prompts free of color codes.
const PATCH_CONFIG: [&str; 6] = [
    "-c",
    "diff.context=3",
    "-c",
    "diff.interHunkContext=0",
    "-c",
    "color.interactive=never",
];

/// Result of applying one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub path: String,
    pub chunk_id: String,
    pub intent: PatchIntent,
    /// Answers sent to git, in order
    pub answers: Vec<String>,
    pub output: ProcessOutput,
}

/// Stages, unstages or discards single chunks through git's patch mode.
pub struct StagingEngine<'a, E: GitExecutor + ?Sized> {
    executor: &'a E,
    workdir: PathBuf,
    strategy: PromptStrategy,
    padding: usize,
}

impl<'a, E: GitExecutor + ?Sized> StagingEngine<'a, E> {
    pub fn new(executor: &'a E, workdir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            workdir: workdir.into(),
            strategy: PromptStrategy::default(),
            padding: PROMPT_PADDING,
        }
    }

    pub fn with_strategy(mut self, strategy: PromptStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Add `chunk` to the index.
    pub fn stage(&self, chunk: &Chunk, file_diff: &FileDiff) -> Result<StageOutcome, StagingError> {
        self.apply(chunk, file_diff, PatchIntent::Stage)
    }

    /// Remove `chunk` from the index. `file_diff` must come from `git diff --cached`.
    pub fn unstage(
        &self,
        chunk: &Chunk,
        file_diff: &FileDiff,
    ) -> Result<StageOutcome, StagingError> {
        self.apply(chunk, file_diff, PatchIntent::Unstage)
    }

    /// Throw away `chunk` from the working tree.
    pub fn reset(&self, chunk: &Chunk, file_diff: &FileDiff) -> Result<StageOutcome, StagingError> {
        self.apply(chunk, file_diff, PatchIntent::Reset)
    }

    /// Run the patch command for `intent` and accept exactly `chunk`.
    ///
    /// # Errors
    ///
    /// - [`StagingError::EmptyPath`] when the diff names no file
    /// - [`StagingError::ChunkNotInFile`] when `chunk` is not one of `file_diff`'s chunks
    /// - [`StagingError::TargetNotOffered`] when git never showed the chunk
    /// - a process error when git fails to start, times out or exits non-zero
    pub fn apply(
        &self,
        chunk: &Chunk,
        file_diff: &FileDiff,
        intent: PatchIntent,
    ) -> Result<StageOutcome, StagingError> {
        let path = target_path(file_diff)?;
        if file_diff.chunk(&chunk.id).is_none() {
            return Err(StagingError::ChunkNotInFile {
                id: chunk.id.clone(),
                path: path.to_string(),
            });
        }

        let invocation = Invocation::new(
            &self.workdir,
            PATCH_CONFIG
                .iter()
                .chain(intent.git_args())
                .copied()
                .chain(["--", path]),
        );

        let _guard = WorkdirLock::acquire(&self.workdir);
        log::debug!(
            "[StagingEngine] {intent} {} in {} ({:?})",
            chunk.header,
            path,
            self.strategy
        );

        let (answers, output) = match self.strategy {
            PromptStrategy::Interactive => self.run_interactive(&invocation, chunk, file_diff, path)?,
            PromptStrategy::Scripted => self.run_scripted(invocation, chunk, file_diff, intent)?,
        };

        log::info!("[StagingEngine] {intent}: {} of {path}", chunk.header);
        Ok(StageOutcome {
            path: path.to_string(),
            chunk_id: chunk.id.clone(),
            intent,
            answers,
            output,
        })
    }

    fn run_interactive(
        &self,
        invocation: &Invocation,
        chunk: &Chunk,
        file_diff: &FileDiff,
        path: &str,
    ) -> Result<(Vec<String>, ProcessOutput), StagingError> {
        let mut session = self.executor.open_session(invocation)?;
        let mut responder = PromptResponder::new(chunk, &file_diff.chunks);
        let mut answers = Vec::new();

        while let Some(prompt) = session.next_prompt()? {
            let answer = responder.respond(&prompt);
            log::debug!(
                "[StagingEngine] {:?} {} [{}] -> {answer}",
                prompt.position,
                prompt.action,
                prompt.choices.join(",")
            );
            session.answer(answer.as_str())?;
            answers.push(answer.to_string());
            if answer == Answer::Quit {
                break;
            }
        }

        let output = session.finish()?.check(invocation)?;
        if !responder.accepted() {
            return Err(StagingError::TargetNotOffered {
                id: chunk.id.clone(),
                path: path.to_string(),
                prompts: responder.offered(),
            });
        }
        Ok((answers, output))
    }

    fn run_scripted(
        &self,
        invocation: Invocation,
        chunk: &Chunk,
        file_diff: &FileDiff,
        intent: PatchIntent,
    ) -> Result<(Vec<String>, ProcessOutput), StagingError> {
        let answers = encode_with_padding(chunk, &file_diff.chunks, intent, self.padding);
        let mut stdin = answers.join("\n");
        stdin.push('\n');

        let invocation = invocation.with_stdin(stdin);
        let output = self.executor.execute(&invocation)?.check(&invocation)?;
        Ok((answers, output))
    }
}

/// Path handed to git: the pre-image path, or the post-image path for additions.
fn target_path(file_diff: &FileDiff) -> Result<&str, StagingError> {
    [&file_diff.from_file_path, &file_diff.to_file_path]
        .into_iter()
        .find(|path| !path.is_empty())
        .map(String::as_str)
        .ok_or(StagingError::EmptyPath)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::process::fake::{FakeGit, SessionScript};
    use similar_asserts::assert_eq;

    const THREE_CHUNKS: &str = "diff --git a/f.txt b/f.txt\nindex 1111111..2222222 100644\n--- a/f.txt\n+++ b/f.txt\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n@@ -10,3 +10,3 @@\n j\n-k\n+K\n l\n@@ -20,3 +20,3 @@\n t\n-u\n+U\n v\n";

    fn file_diff() -> FileDiff {
        FileDiff::parse(THREE_CHUNKS).unwrap()
    }

    /// What git prints for each chunk of `file_diff`.
    fn displays(file_diff: &FileDiff, action: &str) -> Vec<String> {
        let total = file_diff.chunks.len();
        file_diff
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let body: String = chunk.lines.iter().map(|line| format!("{}\n", line.raw)).collect();
                format!("{body}({}/{total}) {action} [y,n,q,a,d,e,?]? ", i + 1)
            })
            .collect()
    }

    #[test]
    fn stage_second_chunk_answers_by_header() {
        let git = FakeGit::new();
        let file_diff = file_diff();
        git.push_session(SessionScript {
            displays: displays(&file_diff, "Stage this hunk"),
            exit_code: 0,
        });

        let engine = StagingEngine::new(&git, "/repo/stage-second");
        let outcome = engine.stage(&file_diff.chunks[1], &file_diff).unwrap();

        assert_eq!(outcome.answers, vec!["n", "y", "q"]);
        assert_eq!(*git.answers.borrow(), vec!["n", "y", "q"]);
        assert_eq!(
            git.call_lines(),
            vec!["-c diff.context=3 -c diff.interHunkContext=0 -c color.interactive=never add --patch -- f.txt"]
        );
        assert_eq!(outcome.path, "f.txt");
    }

    #[test]
    fn unstage_and_reset_use_their_commands() {
        let git = FakeGit::new();
        let file_diff = file_diff();
        git.push_session(SessionScript {
            displays: displays(&file_diff, "Unstage this hunk"),
            exit_code: 0,
        });
        git.push_session(SessionScript {
            displays: displays(&file_diff, "Discard this hunk from worktree"),
            exit_code: 0,
        });

        let engine = StagingEngine::new(&git, "/repo/unstage-reset");
        engine.unstage(&file_diff.chunks[0], &file_diff).unwrap();
        engine.reset(&file_diff.chunks[2], &file_diff).unwrap();

        assert_eq!(
            git.call_lines(),
            vec![
                "-c diff.context=3 -c diff.interHunkContext=0 -c color.interactive=never restore --staged --patch -- f.txt",
                "-c diff.context=3 -c diff.interHunkContext=0 -c color.interactive=never checkout --patch -- f.txt"
            ]
        );
        assert_eq!(*git.answers.borrow(), vec!["y", "q", "n", "n", "y"]);
    }

    #[test]
    fn chunk_from_another_file_is_rejected() {
        let git = FakeGit::new();
        let file_diff = file_diff();
        let other = FileDiff::parse(
            "diff --git a/g.txt b/g.txt\n--- a/g.txt\n+++ b/g.txt\n@@ -7 +7 @@\n-x\n+y\n",
        )
        .unwrap();

        let engine = StagingEngine::new(&git, "/repo/foreign");
        let result = engine.stage(&other.chunks[0], &file_diff);
        assert!(matches!(result, Err(StagingError::ChunkNotInFile { .. })));
        assert!(git.calls.borrow().is_empty());
    }

    #[test]
    fn diff_without_paths_is_rejected() {
        let git = FakeGit::new();
        let mut file_diff = file_diff();
        file_diff.from_file_path.clear();
        file_diff.to_file_path.clear();

        let engine = StagingEngine::new(&git, "/repo/no-path");
        let result = engine.stage(&file_diff.chunks[0], &file_diff);
        assert!(matches!(result, Err(StagingError::EmptyPath)));
    }

    #[test]
    fn added_file_uses_post_image_path() {
        let file_diff = FileDiff::parse(
            "diff --git a/new.rs b/new.rs\nnew file mode 100644\n--- /dev/null\n+++ b/new.rs\n@@ -0,0 +1 @@\n+fn new() {}\n",
        )
        .unwrap();
        assert_eq!(target_path(&file_diff).unwrap(), "new.rs");
    }

    #[test]
    fn target_never_shown_is_an_error() {
        let git = FakeGit::new();
        let file_diff = file_diff();
        let mut shown = displays(&file_diff, "Stage this hunk");
        shown.truncate(2);
        git.push_session(SessionScript {
            displays: shown,
            exit_code: 0,
        });

        let engine = StagingEngine::new(&git, "/repo/not-offered");
        let result = engine.stage(&file_diff.chunks[2], &file_diff);
        assert!(matches!(
            result,
            Err(StagingError::TargetNotOffered { prompts: 2, .. })
        ));
    }

    #[test]
    fn git_failure_is_reported() {
        let git = FakeGit::new();
        let file_diff = file_diff();
        git.push_session(SessionScript {
            displays: displays(&file_diff, "Stage this hunk"),
            exit_code: 128,
        });

        let engine = StagingEngine::new(&git, "/repo/failing");
        let result = engine.stage(&file_diff.chunks[0], &file_diff);
        assert!(matches!(
            result,
            Err(StagingError::ExitStatus { code: 128, .. })
        ));
    }

    #[test]
    fn scripted_strategy_feeds_encoded_answers() {
        let git = FakeGit::new();
        let file_diff = file_diff();

        let engine = StagingEngine::new(&git, "/repo/scripted")
            .with_strategy(PromptStrategy::Scripted)
            .with_padding(2);
        let outcome = engine.stage(&file_diff.chunks[1], &file_diff).unwrap();

        assert_eq!(outcome.answers, vec!["n", "y", "n", "n", "n"]);
        let calls = git.calls.borrow();
        assert_eq!(calls[0].stdin.as_deref(), Some("n\ny\nn\nn\nn\n"));
    }

    #[test]
    fn scripted_failure_is_reported() {
        let git = FakeGit::new();
        git.push_output("", 1);
        let file_diff = file_diff();

        let engine = StagingEngine::new(&git, "/repo/scripted-failing")
            .with_strategy(PromptStrategy::Scripted);
        let err = engine.reset(&file_diff.chunks[0], &file_diff).unwrap_err();
        assert!(matches!(
            err,
            StagingError::ExitStatus { ref command, .. } if command.ends_with("checkout --patch -- f.txt")
        ));
    }
}
