use crate::patch::PROMPT_PADDING;
use std::path::PathBuf;
use std::time::Duration;

/// Seconds a git invocation may run before it is killed.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// How answers reach git's interactive patch prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptStrategy {
    /// Read each prompt and answer it after seeing which hunk git shows
    #[default]
    Interactive,
    /// Write a precomputed positional answer list to stdin up front
    Scripted,
}

/// Runtime settings shared by every git invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub git_binary: PathBuf,
    pub timeout: Duration,
    pub prompt_strategy: PromptStrategy,
    /// Extra `n` answers appended in [`PromptStrategy::Scripted`] mode
    pub padding: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            git_binary: PathBuf::from("git"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            prompt_strategy: PromptStrategy::default(),
            padding: PROMPT_PADDING,
        }
    }
}

/// Command line and environment overrides for [`Config`].
#[derive(Debug, Clone, PartialEq, Eq, clap::Args)]
pub struct ConfigArgs {
    /// Git executable to run
    #[arg(long, env = "GIT_CHUNK_STAGER_GIT", default_value = "git", global = true)]
    pub git: PathBuf,

    /// Seconds before a git invocation is killed
    #[arg(long, env = "GIT_CHUNK_STAGER_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    pub timeout: u64,

    /// Feed a precomputed answer list instead of reading git's prompts
    #[arg(long, env = "GIT_CHUNK_STAGER_SCRIPTED", global = true)]
    pub scripted: bool,

    /// Extra "n" answers appended in scripted mode
    #[arg(long, default_value_t = PROMPT_PADDING, global = true)]
    pub padding: usize,
}

impl From<ConfigArgs> for Config {
    fn from(args: ConfigArgs) -> Self {
        Self {
            git_binary: args.git,
            timeout: Duration::from_secs(args.timeout),
            prompt_strategy: if args.scripted {
                PromptStrategy::Scripted
            } else {
                PromptStrategy::Interactive
            },
            padding: args.padding,
        }
    }
}
