//! parley CLI - local chat conversations with streaming replies.

use clap::{Parser, Subcommand};
use parley::cli;
use parley::config::{Config, load_config};
use parley::core::ConversationStatus;
use parley::logging::init_tracing;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about = "Local chat conversations with streaming replies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new conversation and print its ID.
    New {
        /// Title. Derived from the first message when omitted.
        #[arg(short, long)]
        title: Option<String>,
    },

    /// List conversations, most recently updated first.
    List {
        /// Only show conversations with this status (active, archived, trashed, deleted).
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of conversations to show. Defaults to 20.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a conversation transcript.
    Show {
        /// Conversation ID.
        id: String,

        /// Print the stored JSON document instead.
        #[arg(long)]
        json: bool,
    },

    /// Rename a conversation. An empty title restores the default.
    Rename {
        /// Conversation ID.
        id: String,

        /// New title.
        title: String,
    },

    /// Archive a conversation.
    Archive {
        /// Conversation ID.
        id: String,
    },

    /// Move a conversation to the trash.
    Trash {
        /// Conversation ID.
        id: String,
    },

    /// Return an archived or trashed conversation to the main list.
    Restore {
        /// Conversation ID.
        id: String,
    },

    /// Permanently delete a conversation.
    Purge {
        /// Conversation ID.
        id: String,
    },

    /// Delete archived and trashed conversations whose retention expired.
    Sweep,

    /// Permanently delete all conversations.
    Clear {
        /// Only delete conversations with this status.
        #[arg(short, long)]
        status: Option<String>,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Send a message and stream the reply.
    Send {
        /// Conversation ID.
        id: String,

        /// Message text.
        #[arg(default_value = "")]
        text: String,

        /// Attach a file. May be repeated.
        #[arg(short, long = "attach")]
        attach: Vec<PathBuf>,
    },

    /// Ask again for a reply to the latest message.
    Retry {
        /// Conversation ID.
        id: String,
    },
}

async fn dispatch(config: &Config, command: Commands) -> parley::Result<()> {
    match command {
        Commands::New { title } => cli::create::run(config, title.as_deref()),
        Commands::List { status, limit } => cli::list::run(config, status.as_deref(), limit),
        Commands::Show { id, json } => cli::show::run(config, &id, json),
        Commands::Rename { id, title } => cli::rename::run(config, &id, &title),
        Commands::Archive { id } => cli::status::run(config, &id, ConversationStatus::Archived),
        Commands::Trash { id } => cli::status::run(config, &id, ConversationStatus::Trashed),
        Commands::Restore { id } => cli::status::run(config, &id, ConversationStatus::Active),
        Commands::Purge { id } => cli::purge::run(config, &id),
        Commands::Sweep => cli::purge::sweep(config),
        Commands::Clear { status, yes } => cli::purge::clear(config, status.as_deref(), yes),
        Commands::Send { id, text, attach } => cli::send::run(config, &id, &text, &attach).await,
        Commands::Retry { id } => cli::send::retry(config, &id).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("parley: error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging.level);

    match dispatch(&config, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("parley: error: {e}");
            ExitCode::FAILURE
        }
    }
}
