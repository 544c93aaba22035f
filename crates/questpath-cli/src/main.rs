//! questpath CLI: the terminal front end for the learning engine.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use questpath_core::model::Tier;

mod commands;

#[derive(Parser)]
#[command(
    name = "questpath",
    version,
    about = "Gamified learning paths with XP, hearts and achievements"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and example curriculum
    Init,

    /// Validate curriculum TOML files
    Validate {
        /// Curriculum file or directory (defaults to `curriculum_dir`)
        #[arg(long)]
        curriculum: Option<PathBuf>,
    },

    /// List a subject's nodes with their lock state
    Nodes {
        #[arg(long)]
        user: String,

        #[arg(long)]
        subject: String,
    },

    /// Practice a node interactively
    Quiz {
        #[arg(long)]
        user: String,

        #[arg(long)]
        subject: String,

        /// Node to practice
        #[arg(long)]
        node: String,
    },

    /// Show a learner's progress
    Progress {
        #[arg(long)]
        user: String,

        /// Limit to one subject
        #[arg(long)]
        subject: Option<String>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record the one-time placement result for a subject
    Placement {
        #[arg(long)]
        user: String,

        #[arg(long)]
        subject: String,

        /// Tier the learner placed into
        #[arg(long)]
        tier: Tier,
    },

    /// Search subjects, sections and nodes
    Search {
        /// Case-insensitive search term (empty lists everything)
        #[arg(default_value = "")]
        term: String,

        /// Curriculum file or directory (defaults to `curriculum_dir`)
        #[arg(long)]
        curriculum: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "questpath=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { curriculum } => commands::validate::execute(curriculum, config),
        Commands::Nodes { user, subject } => commands::nodes::execute(user, subject, config).await,
        Commands::Quiz {
            user,
            subject,
            node,
        } => commands::quiz::execute(user, subject, node, config).await,
        Commands::Progress {
            user,
            subject,
            json,
        } => commands::progress::execute(user, subject, json, config).await,
        Commands::Placement {
            user,
            subject,
            tier,
        } => commands::placement::execute(user, subject, tier, config).await,
        Commands::Search { term, curriculum } => {
            commands::search::execute(term, curriculum, config)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
