use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::ConfigLoader;
use crate::storage;

pub mod commands;

use self::commands::{AddArgs, BrowseArgs, DeckArgs, RemoveArgs};

#[derive(Parser, Debug)]
#[command(
    name = "pokedeck",
    version,
    about = "Browse the PokeAPI catalog and curate a persistent deck from the terminal"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over POKEDECK_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over POKEDECK_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive TUI (default when stdout is a terminal)
    Tui,
    /// Print one page of the catalog
    Browse(BrowseArgs),
    /// Fetch creatures from the catalog and add them to the deck
    Add(AddArgs),
    /// Remove creatures from the deck by id
    Remove(RemoveArgs),
    /// Print the deck with search, type filter and sort applied (default when piped)
    Deck(DeckArgs),
    /// List the category vocabulary
    Categories,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("POKEDECK_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("POKEDECK_DATA", path);
    }

    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let config = loader.load_or_init()?;
    let storage = storage::init(&paths, &config.storage)?;

    let config = Arc::new(config);
    let command = cli.command.unwrap_or_else(|| {
        if atty::is(atty::Stream::Stdout) {
            Commands::Tui
        } else {
            Commands::Deck(DeckArgs::default())
        }
    });
    match command {
        Commands::Tui => {
            let mut app = App::new(config, storage)?;
            commands::run_tui(&mut app)
        }
        Commands::Browse(args) => commands::browse(&config, args),
        Commands::Add(args) => commands::add(&config, storage, args),
        Commands::Remove(args) => commands::remove(storage, args),
        Commands::Deck(args) => commands::show_deck(&config, storage, args),
        Commands::Categories => commands::list_categories(&storage),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow::anyhow!("installing tracing subscriber: {err}"))?;
        Ok(())
    })
    .map(|_| ())
}
