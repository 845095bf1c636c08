//! Command-line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Turn a novel into a game design, one chunk at a time.
#[derive(Parser, Debug)]
#[command(name = "novel-cli", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a novel, pausing at review checkpoints unless auto-approve is set
    Process(ProcessArgs),

    /// Inspect or edit the progress file
    #[command(subcommand)]
    Progress(ProgressCommands),
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Novel text file (UTF-8, GBK or UTF-16)
    #[arg(long)]
    pub novel: PathBuf,

    /// Project name; an existing project with this name is reused
    #[arg(long)]
    pub name: String,

    /// API key for the provider; falls back to the provider's environment variable
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// deepseek, openai or ollama
    #[arg(long, default_value = "deepseek")]
    pub provider: String,

    /// Chunks between review checkpoints
    #[arg(long, env = "REVIEW_INTERVAL", default_value_t = 10)]
    pub review_interval: u64,

    /// Pass checkpoints without asking and keep going after failed chunks
    #[arg(long)]
    pub auto_approve: bool,

    /// Continue from the stored progress instead of starting over
    #[arg(long)]
    pub resume: bool,

    /// Split on chapter headings (第X章) instead of fixed-size windows
    #[arg(long)]
    pub chapter_mode: bool,

    #[command(flatten)]
    pub files: FileArgs,
}

#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    /// Resume cursor and review gate
    #[arg(long, default_value = "tools/progress.json")]
    pub progress_file: PathBuf,

    /// SQLite database shared with the API server
    #[arg(long, env = "DATABASE_PATH", default_value = "data/game.db")]
    pub database: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ProgressCommands {
    /// Print the progress file and the next task
    Status {
        #[arg(long, default_value = "tools/progress.json")]
        progress_file: PathBuf,
    },
    /// Clear a pending review checkpoint
    Approve {
        #[arg(long, default_value = "tools/progress.json")]
        progress_file: PathBuf,
    },
    /// Mark the first `count` chunks as done
    Complete {
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        count: u64,
        #[arg(long, default_value = "tools/progress.json")]
        progress_file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn process_defaults() {
        let cli = Cli::try_parse_from([
            "novel-cli",
            "process",
            "--novel",
            "斗破苍穹.txt",
            "--name",
            "斗破",
            "--chapter-mode",
        ])
        .unwrap();
        let Commands::Process(args) = cli.command else {
            panic!("expected process");
        };
        assert_eq!(args.provider, "deepseek");
        assert!(args.chapter_mode);
        assert!(!args.resume);
        assert_eq!(args.files.progress_file, PathBuf::from("tools/progress.json"));
    }

    #[test]
    fn complete_rejects_zero() {
        assert!(Cli::try_parse_from(["novel-cli", "progress", "complete", "0"]).is_err());
        let cli = Cli::try_parse_from(["novel-cli", "progress", "complete", "12"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Progress(ProgressCommands::Complete { count: 12, .. })
        ));
    }
}
