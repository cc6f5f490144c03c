use clap::{Args, CommandFactory, Parser, Subcommand};
use git_chunk_stager::{
    Config, ConfigArgs, GitChunkStager, PatchIntent, format_diff, parse_chunk_ref,
};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "git-chunk-stager")]
#[command(about = "Stage, unstage and discard individual diff chunks")]
#[command(version)]
struct Cli {
    /// Repository working directory
    #[arg(short = 'C', long = "repo", default_value = ".", global = true)]
    repo: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the diff with numbered chunks
    Show {
        /// Show staged changes instead of unstaged ones
        #[arg(long)]
        cached: bool,
        /// Limit the diff to these paths
        paths: Vec<String>,
    },
    /// Stage one chunk (e.g., src/lib.rs:2)
    Stage {
        /// Chunk reference as FILE:N, N counting from 1 in `show` order
        chunk: String,
    },
    /// Unstage one chunk, numbered as in `show --cached`
    Unstage { chunk: String },
    /// Discard one chunk from the working tree
    Discard { chunk: String },
    /// Resolve a conflicted file
    Resolve {
        path: String,
        #[command(flatten)]
        side: ResolveSide,
    },
    /// Print the resolution state of a conflicted file
    State { path: String },
    /// Generate shell completions
    Completions { shell: clap_complete::Shell },
    /// Generate a man page
    Man,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ResolveSide {
    /// Keep our version of the file
    #[arg(long)]
    ours: bool,
    /// Keep their version of the file
    #[arg(long)]
    theirs: bool,
    /// Mark the file as resolved as it is now
    #[arg(long)]
    mark: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let stager = GitChunkStager::with_config(&cli.repo, Config::from(cli.config));

    match cli.command {
        Commands::Show { cached, paths } => {
            let diff = if cached {
                stager.diff_cached(&paths)?
            } else {
                stager.diff(&paths)?
            };
            if diff.is_empty() {
                eprintln!("No changes");
            } else {
                print!("{}", format_diff(&diff));
            }
        }
        Commands::Stage { chunk } => apply(&stager, &chunk, PatchIntent::Stage)?,
        Commands::Unstage { chunk } => apply(&stager, &chunk, PatchIntent::Unstage)?,
        Commands::Discard { chunk } => apply(&stager, &chunk, PatchIntent::Reset)?,
        Commands::Resolve { path, side } => {
            if side.ours {
                stager.resolve_ours(&path)?;
            } else if side.theirs {
                stager.resolve_theirs(&path)?;
            } else {
                stager.mark_resolved(&path)?;
            }
            eprintln!("{path}: {}", stager.conflict_state(&path)?);
        }
        Commands::State { path } => println!("{}", stager.conflict_state(&path)?),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "git-chunk-stager", &mut io::stdout());
        }
        Commands::Man => clap_mangen::Man::new(Cli::command()).render(&mut io::stdout())?,
    }

    Ok(())
}

fn apply(stager: &GitChunkStager, chunk: &str, intent: PatchIntent) -> Result<(), Box<dyn std::error::Error>> {
    let chunk_ref = parse_chunk_ref(chunk)?;
    let outcome = stager.apply_chunk_ref(&chunk_ref, intent)?;
    eprintln!("{intent}: {} chunk {}", outcome.path, chunk_ref.index);
    Ok(())
}
