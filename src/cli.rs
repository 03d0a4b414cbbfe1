use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "folio",
    about = "OCR document search with phrase-aware highlighting"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index the OCR files under a directory (incremental)
    Index(IndexArgs),
    /// Remove a document from the index
    Remove {
        /// Document name
        name: String,
    },
    /// Highlight query matches in indexed documents
    Highlight(HighlightArgs),
    /// Show index statistics
    Status(StatusArgs),
    /// Manage stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Directory holding .json OCR exports and .txt transcriptions
    pub dir: PathBuf,

    /// Only index files whose relative path matches this glob
    #[arg(long)]
    pub include: Vec<String>,

    /// Re-index files even if they have not changed
    #[arg(long)]
    pub force: bool,
}

// -- Highlight --

#[derive(Debug, Parser)]
pub struct HighlightArgs {
    /// The query, e.g. `+ship "brown fox"~2 car*`
    pub query: String,

    /// Treat the query as a JSON query tree
    #[arg(long)]
    pub json_query: bool,

    /// Highlight in this document (repeatable)
    #[arg(short = 'd', long = "doc")]
    pub docs: Vec<String>,

    /// Highlight in every indexed document
    #[arg(long, conflicts_with = "docs")]
    pub all_docs: bool,

    /// Highlight within this field (repeatable)
    #[arg(short = 'f', long = "field")]
    pub fields: Vec<String>,

    /// Override the neighbor branch ceiling
    #[arg(long)]
    pub max_branches: Option<usize>,

    /// Override the phrase slop ceiling
    #[arg(long)]
    pub max_slop: Option<u32>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Store a setting
    Set { key: String, value: String },
    /// Print a setting
    Get { key: String },
    /// Remove a setting, reverting to the default
    Unset { key: String },
    /// List stored settings
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "folio",
            &mut std::io::stdout(),
        );
    }
}
