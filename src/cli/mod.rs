//! Command-line interface parsing and handling
//!
//! A thin driver over the library: `edit` streams stdin into an editing
//! session, `arc` and `ask` call the request/response endpoints once.

pub mod arc;
pub mod ask;
pub mod edit;

use std::error::Error;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::cli::arc::run_arc;
use crate::cli::ask::run_ask;
use crate::cli::edit::run_edit;
use crate::core::config::Config;
use crate::core::store::DEFAULT_MANUSCRIPT_ID;
use crate::utils::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "manuscript-sync")]
#[command(version)]
#[command(about = "Live entity extraction and story analytics for a manuscript")]
#[command(
    long_about = "manuscript-sync keeps a manuscript in sync with a narrative-analysis \
service. While you write, paragraphs are sent for entity extraction after a short \
pause in typing, and the extracted characters, locations, objects, events and times \
are printed as they arrive.\n\n\
Environment Variables:\n\
  MANUSCRIPT_SYNC_BASE_URL   Analysis service address (defaults to http://localhost:8000)\n\
  RUST_LOG                   Diagnostic log filter (overrides -v)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Analysis service address
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Manuscript identifier
    #[arg(short = 'm', long, global = true, value_name = "ID", default_value = DEFAULT_MANUSCRIPT_ID)]
    pub manuscript: String,

    /// Read configuration from this file instead of the default location
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase diagnostic output (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Stream stdin into the manuscript and print extracted entities (default)
    Edit {
        /// Manuscript title
        #[arg(long)]
        title: Option<String>,
    },
    /// Show a character's sentiment arc
    Arc {
        /// Character name (may be several words)
        #[arg(required = true, num_args = 1..)]
        character: Vec<String>,
    },
    /// Ask a question about the manuscript
    Ask {
        /// The question (may be several words)
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        question: Vec<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config = Config::load(args.config.as_deref())?;
    let base_url = config.resolve_base_url(args.base_url.as_deref())?;

    match args.command.unwrap_or(Commands::Edit { title: None }) {
        Commands::Edit { title } => {
            run_edit(config.session_config(base_url), &args.manuscript, title).await
        }
        Commands::Arc { character } => {
            run_arc(&base_url, &args.manuscript, &character.join(" ")).await
        }
        Commands::Ask { question } => {
            run_ask(&base_url, &args.manuscript, &question.join(" ")).await
        }
    }
}
