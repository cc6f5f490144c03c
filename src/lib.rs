use error_set::error_set;
use std::path::{Path, PathBuf};

pub mod config;
pub mod conflict;
pub mod diff;
pub mod lock;
pub mod parse;
pub mod patch;
pub mod process;
pub mod stage;
pub mod status;

pub use config::{Config, ConfigArgs, PromptStrategy};
pub use conflict::{ConflictChoice, ConflictResolver, ConflictSpan, ConflictState, conflict_spans};
pub use diff::{Chunk, Diff, FileDiff, FileStatus, Line, LineKind, format_diff};
pub use parse::{ChunkRef, ParseError, ParseWarning, parse_chunk_ref};
pub use patch::{PROMPT_PADDING, PatchIntent, encode};
pub use process::{GitExecutor, Invocation, PatchSession, ProcessOutput, SystemGit};
pub use stage::{StageOutcome, StagingEngine};
pub use status::StatusEntry;

error_set! {
    /// Top-level error for git-chunk-stager operations
    GitChunkStagerError := {
        #[display("No changes found in {file}")]
        NoChanges { file: String },
        #[display("{file} has {available} chunk(s), there is no chunk {index}")]
        ChunkOutOfRange { file: String, index: usize, available: usize },
        ParseError(ParseError),
        StagingError(StagingError),
        ResolveError(ResolveError),
    } || ProcessError

    /// Errors from applying a single chunk through git's patch mode
    StagingError := {
        #[display("Diff names neither a source nor a destination path")]
        EmptyPath,
        #[display("Chunk {id} is not part of the diff for {path}")]
        ChunkNotInFile { id: String, path: String },
        #[display("git never offered chunk {id} of {path} ({prompts} prompt(s) answered)")]
        TargetNotOffered { id: String, path: String, prompts: usize },
    } || ProcessError

    /// Errors from conflict resolution
    ResolveError := {
        #[display("Failed to read {path} from the working tree: {message}")]
        WorktreeReadFailed { path: String, message: String },
    } || ProcessError

    /// Errors from running git
    ProcessError := {
        #[display("Failed to run git {command}: {message}")]
        SpawnFailed { command: String, message: String },
        #[display("Failed to get stdin handle for git {command}")]
        StdinUnavailable { command: String },
        #[display("Failed to write to git {command}: {message}")]
        WriteFailed { command: String, message: String },
        #[display("Failed to wait for git {command}: {message}")]
        WaitFailed { command: String, message: String },
        #[display("Failed to read git output: {message}")]
        ReadFailed { message: String },
        #[display("git {command} did not finish within {millis}ms")]
        TimedOut { command: String, millis: u64 },
        #[display("git {command} exited with {code}: {output}")]
        ExitStatus { command: String, code: i32, output: String },
    }
}

/// Fixed hunk shape and path prefixes, whatever the user's diff config says.
/// The hunks must line up with the ones `--patch` mode offers.
const DIFF_ARGS: [&str; 7] = [
    "diff",
    "--no-ext-diff",
    "--no-color",
    "-U3",
    "--inter-hunk-context=0",
    "--src-prefix=a/",
    "--dst-prefix=b/",
];

/// Main interface for git-chunk-stager operations on one working directory
pub struct GitChunkStager<E: GitExecutor = SystemGit> {
    workdir: PathBuf,
    executor: E,
    config: Config,
}

impl GitChunkStager<SystemGit> {
    /// Create a stager for the repository at `workdir` with default settings
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self::with_config(workdir, Config::default())
    }

    pub fn with_config(workdir: impl Into<PathBuf>, config: Config) -> Self {
        let executor = SystemGit::from_config(&config);
        Self::with_executor(workdir, executor, config)
    }
}

impl<E: GitExecutor> GitChunkStager<E> {
    pub fn with_executor(workdir: impl Into<PathBuf>, executor: E, config: Config) -> Self {
        Self {
            workdir: workdir.into(),
            executor,
            config,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Unstaged changes for `paths` (all files if empty).
    ///
    /// # Examples
    /// ```no_run
    /// # use git_chunk_stager::GitChunkStager;
    /// let stager = GitChunkStager::new(".");
    /// let diff = stager.diff(&[]).unwrap();
    /// for file in &diff.files {
    ///     println!("{}: {} chunk(s)", file.path(), file.chunks.len());
    /// }
    /// ```
    pub fn diff(&self, paths: &[String]) -> Result<Diff, GitChunkStagerError> {
        self.parsed_diff(false, paths)
    }

    /// Staged changes for `paths` (all files if empty).
    pub fn diff_cached(&self, paths: &[String]) -> Result<Diff, GitChunkStagerError> {
        self.parsed_diff(true, paths)
    }

    fn parsed_diff(&self, cached: bool, paths: &[String]) -> Result<Diff, GitChunkStagerError> {
        let mut args = DIFF_ARGS.to_vec();
        if cached {
            args.push("--cached");
        }
        args.push("--");
        args.extend(paths.iter().map(String::as_str));

        let output = self.run(Invocation::new(&self.workdir, args))?;
        let diff = Diff::parse(&output.stdout);
        for warning in &diff.warnings {
            log::warn!("[GitChunkStager] {warning}");
        }
        Ok(diff)
    }

    /// Entries of `git status`, untracked files included.
    pub fn status(&self) -> Result<Vec<StatusEntry>, GitChunkStagerError> {
        let output = self.run(Invocation::new(
            &self.workdir,
            ["status", "--porcelain=v1", "-z", "--untracked-files=all"],
        ))?;
        Ok(StatusEntry::parse_porcelain(&output.stdout)?)
    }

    /// The unstaged (or staged, with `cached`) diff of a single file.
    pub fn file_diff(&self, path: &str, cached: bool) -> Result<FileDiff, GitChunkStagerError> {
        let diff = self.parsed_diff(cached, &[path.to_string()])?;
        diff.files
            .into_iter()
            .find(|file| file.to_file_path == path || file.from_file_path == path)
            .ok_or_else(|| GitChunkStagerError::NoChanges {
                file: path.to_string(),
            })
    }

    pub fn stage_chunk(
        &self,
        chunk: &Chunk,
        file_diff: &FileDiff,
    ) -> Result<StageOutcome, GitChunkStagerError> {
        Ok(self.engine().stage(chunk, file_diff)?)
    }

    pub fn unstage_chunk(
        &self,
        chunk: &Chunk,
        file_diff: &FileDiff,
    ) -> Result<StageOutcome, GitChunkStagerError> {
        Ok(self.engine().unstage(chunk, file_diff)?)
    }

    /// Discard a chunk from the working tree.
    pub fn reset_chunk(
        &self,
        chunk: &Chunk,
        file_diff: &FileDiff,
    ) -> Result<StageOutcome, GitChunkStagerError> {
        Ok(self.engine().reset(chunk, file_diff)?)
    }

    /// Apply `intent` to the chunk a `FILE:N` reference names.
    ///
    /// The file's diff is fetched fresh: the staged diff for
    /// [`PatchIntent::Unstage`], the unstaged diff otherwise.
    ///
    /// # Examples
    /// ```no_run
    /// # use git_chunk_stager::{GitChunkStager, PatchIntent, parse_chunk_ref};
    /// let stager = GitChunkStager::new(".");
    /// let chunk_ref = parse_chunk_ref("src/lib.rs:2").unwrap();
    /// stager.apply_chunk_ref(&chunk_ref, PatchIntent::Stage).unwrap();
    /// ```
    pub fn apply_chunk_ref(
        &self,
        chunk_ref: &ChunkRef,
        intent: PatchIntent,
    ) -> Result<StageOutcome, GitChunkStagerError> {
        let file_diff = self.file_diff(&chunk_ref.file, intent == PatchIntent::Unstage)?;
        let index = chunk_ref.index.get();
        let chunk = file_diff.chunks.get(index - 1).ok_or_else(|| {
            GitChunkStagerError::ChunkOutOfRange {
                file: chunk_ref.file.clone(),
                index,
                available: file_diff.chunks.len(),
            }
        })?;

        Ok(self.engine().apply(chunk, &file_diff, intent)?)
    }

    pub fn resolve_ours(&self, path: &str) -> Result<(), GitChunkStagerError> {
        Ok(self.resolver().resolve_ours(path)?)
    }

    pub fn resolve_theirs(&self, path: &str) -> Result<(), GitChunkStagerError> {
        Ok(self.resolver().resolve_theirs(path)?)
    }

    pub fn mark_resolved(&self, path: &str) -> Result<(), GitChunkStagerError> {
        Ok(self.resolver().mark_resolved(path)?)
    }

    pub fn conflict_state(&self, path: &str) -> Result<ConflictState, GitChunkStagerError> {
        Ok(self.resolver().state(path)?)
    }

    fn engine(&self) -> StagingEngine<'_, E> {
        StagingEngine::new(&self.executor, &self.workdir)
            .with_strategy(self.config.prompt_strategy)
            .with_padding(self.config.padding)
    }

    fn resolver(&self) -> ConflictResolver<'_, E> {
        ConflictResolver::new(&self.executor, &self.workdir)
    }

    fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ProcessError> {
        self.executor.execute(&invocation)?.check(&invocation)
    }
}
