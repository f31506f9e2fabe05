//! Larder CLI
//!
//! Command-line interface for Larder - offline-first storage inventory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use larder_core::{Config, SqliteStore};

mod commands;
mod editor;
mod output;

use commands::item::ItemFields;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "larder")]
#[command(about = "Larder - Offline-first inventory of storage locations and items")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging to the log file
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in (demo account, no server round trip)
    Login {
        /// Email address; doubles as the user id
        email: String,
        /// Display name (defaults to the part before '@')
        #[arg(long)]
        name: Option<String>,
        /// Access token (defaults to the demo token)
        #[arg(long)]
        token: Option<String>,
    },
    /// Log out; local records are kept
    Logout,
    /// Manage storage locations
    Location {
        #[command(subcommand)]
        command: LocationCommands,
    },
    /// Manage stored items
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },
    /// Reconcile local records with the server
    Sync,
    /// Show login, last sync and pending changes
    Status,
    /// Query the server directly
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum LocationCommands {
    /// Create a location
    Add {
        /// Location name
        name: String,
        /// Description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List locations
    List,
    /// Show a location and its items
    Show {
        /// Location ID (full UUID or prefix)
        id: String,
    },
    /// Edit a location (prompts when no flags are given)
    Edit {
        /// Location ID (full UUID or prefix)
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a location
    Delete {
        /// Location ID (full UUID or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ItemCommands {
    /// Create an item
    Add {
        /// Item name
        name: String,
        /// Location ID (full UUID or prefix)
        #[arg(short, long)]
        location: String,
        #[command(flatten)]
        fields: ItemFields,
    },
    /// List items
    List {
        /// Only items in this location
        #[arg(short, long)]
        location: Option<String>,
    },
    /// Show an item
    Show {
        /// Item ID (full UUID or prefix)
        id: String,
    },
    /// Edit an item (prompts when no flags are given)
    Edit {
        /// Item ID (full UUID or prefix)
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// Move to this location
        #[arg(short, long)]
        location: Option<String>,
        #[command(flatten)]
        fields: ItemFields,
    },
    /// Delete an item
    Delete {
        /// Item ID (full UUID or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// List remote locations, or fetch one
    Locations {
        /// Remote location ID
        id: Option<String>,
    },
    /// List remote items, or fetch one
    Items {
        /// Remote item ID
        id: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, api_url, request_timeout_secs, log_file)
        key: String,
        /// Value to set
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    let store = match SqliteStore::open(&config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            if let Some(hint) = e.recovery_suggestion() {
                eprintln!("Hint: {}", hint);
            }
            return Err(e).context("Failed to open local database");
        }
    };

    match cli.command {
        Commands::Login { email, name, token } => {
            commands::auth::login(&store, email, name, token, &output)
        }
        Commands::Logout => commands::auth::logout(&store, &output),
        Commands::Location { command } => handle_location_command(command, &store, &output),
        Commands::Item { command } => handle_item_command(command, &store, &output),
        Commands::Sync => commands::sync::run(store, &config, &output).await,
        Commands::Status => commands::status::show(&store, &config, &output),
        Commands::Remote { command } => match command {
            RemoteCommands::Locations { id } => {
                commands::remote::locations(&store, &config, id, &output).await
            }
            RemoteCommands::Items { id } => {
                commands::remote::items(&store, &config, id, &output).await
            }
        },
        Commands::Config { command } => {
            handle_config_command(command, cli.config.as_ref(), &output)
        }
    }
}

fn handle_location_command(
    command: LocationCommands,
    store: &SqliteStore,
    output: &Output,
) -> Result<()> {
    match command {
        LocationCommands::Add { name, description } => {
            commands::location::add(store, name, description, output)
        }
        LocationCommands::List => commands::location::list(store, output),
        LocationCommands::Show { id } => commands::location::show(store, id, output),
        LocationCommands::Edit {
            id,
            name,
            description,
        } => commands::location::edit(store, id, name, description, output),
        LocationCommands::Delete { id, yes } => commands::location::delete(store, id, yes, output),
    }
}

fn handle_item_command(command: ItemCommands, store: &SqliteStore, output: &Output) -> Result<()> {
    match command {
        ItemCommands::Add {
            name,
            location,
            fields,
        } => commands::item::add(store, name, location, fields, output),
        ItemCommands::List { location } => commands::item::list(store, location, output),
        ItemCommands::Show { id } => commands::item::show(store, id, output),
        ItemCommands::Edit {
            id,
            name,
            location,
            fields,
        } => commands::item::edit(store, id, name, location, fields, output),
        ItemCommands::Delete { id, yes } => commands::item::delete(store, id, yes, output),
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Send tracing output to the log file so stdout stays clean
///
/// `LARDER_LOG` takes an `EnvFilter` directive and wins over `--verbose`.
fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_env("LARDER_LOG").unwrap_or_else(|_| {
        EnvFilter::new(format!("larder_core={},larder_cli={}", level, level))
    });

    let log_path = config.log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Warning: Could not open log file {}: {}",
                log_path.display(),
                e
            );
            return;
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();
}
