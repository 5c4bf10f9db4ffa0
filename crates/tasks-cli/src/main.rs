//! Tasks CLI
//!
//! Command-line interface for Tasks - offline-first task lists with remote
//! sync.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tasks_core::{AuthHandle, AuthState, Config, SyncOrchestrator};

mod commands;
mod output;
mod prompt;

use commands::items::ItemFields;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "tasks")]
#[command(about = "Tasks - Offline-first task lists with remote sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show all lists
    #[command(alias = "ls")]
    Lists,
    /// Manage lists
    List {
        #[command(subcommand)]
        command: ListCommands,
    },
    /// Show the items of a list
    Show {
        /// List ID (full, prefix) or name
        list: String,
    },
    /// Add an item to a list
    Add {
        /// List ID (full, prefix) or name
        list: String,
        /// Item title
        title: String,
        #[command(flatten)]
        fields: ItemFields,
    },
    /// Toggle an item's completed flag
    Done {
        /// List ID (full, prefix) or name
        list: String,
        /// Item ID (full or prefix)
        item: String,
    },
    /// Edit an item
    Edit {
        /// List ID (full, prefix) or name
        list: String,
        /// Item ID (full or prefix)
        item: String,
        /// New title
        #[arg(short = 'T', long)]
        title: Option<String>,
        #[command(flatten)]
        fields: ItemFields,
        /// Indent one level
        #[arg(long, conflicts_with = "outdent")]
        indent: bool,
        /// Outdent one level
        #[arg(long)]
        outdent: bool,
        /// Remove the due date and time
        #[arg(long, conflicts_with_all = ["due", "time"])]
        clear_due: bool,
    },
    /// Delete an item
    Rm {
        /// List ID (full, prefix) or name
        list: String,
        /// Item ID (full or prefix)
        item: String,
    },
    /// Duplicate an item to the end of its list
    Dup {
        /// List ID (full, prefix) or name
        list: String,
        /// Item ID (full or prefix)
        item: String,
    },
    /// Pull remote lists, then push local ones
    Sync,
    /// Pull remote lists (remote wins)
    Load,
    /// Push local lists now
    Upload,
    /// Show sync status
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ListCommands {
    /// Create a new list
    #[command(alias = "add")]
    Create {
        /// Name (defaults to "Untitled List")
        name: Option<String>,
    },
    /// Rename a list
    Rename {
        /// List ID (full, prefix) or name
        list: String,
        /// New name
        name: String,
    },
    /// Delete a list and its items
    #[command(alias = "rm")]
    Delete {
        /// List ID (full, prefix) or name
        list: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, remote_db, user_id, debounce_ms, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands don't need the stores
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    let auth = AuthHandle::new(AuthState::from_user_id(config.user_id.clone()));
    let sync = SyncOrchestrator::open_with_config(&config, auth.subscribe())
        .context("Failed to open task storage")?;

    let is_write = matches!(
        &cli.command,
        Commands::List { .. }
            | Commands::Add { .. }
            | Commands::Done { .. }
            | Commands::Edit { .. }
            | Commands::Rm { .. }
            | Commands::Dup { .. }
    );
    let is_manual_sync = matches!(
        &cli.command,
        Commands::Sync | Commands::Load | Commands::Upload | Commands::Status
    );

    // First load of the session, so we edit what the remote has
    if !is_manual_sync {
        commands::sync::auto_load(&sync, &output).await;
    }

    let result = match cli.command {
        Commands::Lists => commands::lists::list_all(&sync, &output),
        Commands::List { command } => match command {
            ListCommands::Create { name } => commands::lists::create(&sync, name, &output),
            ListCommands::Rename { list, name } => {
                commands::lists::rename(&sync, &list, name, &output)
            }
            ListCommands::Delete { list, yes } => {
                commands::lists::delete(&sync, &list, yes, &output)
            }
        },
        Commands::Show { list } => commands::lists::show(&sync, &list, &output),
        Commands::Add {
            list,
            title,
            fields,
        } => commands::items::add(&sync, &list, title, &fields, &output),
        Commands::Done { list, item } => commands::items::toggle_done(&sync, &list, &item, &output),
        Commands::Edit {
            list,
            item,
            title,
            fields,
            indent,
            outdent,
            clear_due,
        } => {
            let edit = commands::items::ItemEdit {
                title,
                fields,
                indent,
                outdent,
                clear_due,
            };
            commands::items::edit(&sync, &list, &item, &edit, &output)
        }
        Commands::Rm { list, item } => commands::items::remove(&sync, &list, &item, &output),
        Commands::Dup { list, item } => commands::items::duplicate(&sync, &list, &item, &output),
        Commands::Sync => commands::sync::sync(&sync, &output).await,
        Commands::Load => commands::sync::load(&sync, &output).await,
        Commands::Upload => commands::sync::upload(&sync, &output).await,
        Commands::Status => commands::status::show(&sync, &config, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
    };

    // Push now instead of waiting out the debounce
    if is_write && result.is_ok() {
        commands::sync::flush(&sync, &output).await;
    }

    sync.shutdown();
    result
}

/// Initialize logging
///
/// Level comes from TASKS_LOG, then RUST_LOG, defaulting to warnings only.
/// Logs go to config.log_file when set, stderr otherwise.
fn init_logging(config: &Config) {
    let filter = std::env::var("TASKS_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "warn".to_string());
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    let Some(log_path) = &config.log_file else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
        return;
    };

    let log_file = match File::options().create(true).append(true).open(log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            return;
        }
    };

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Logging to {:?}", log_path);
}
