use std::io;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pw_cli::commands::{allow, check, simulate, status, volume};
use pw_cli::{AllowAction, Cli, Commands, Config, VolumeAction};
use pw_db::Database;

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(Rc<Database>, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let path = &config.database_path;
    let db = Database::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok((Rc::new(db), config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so command output stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (db, config) = open_database(cli.config.as_deref())?;
    let mut out = io::stdout().lock();

    match command {
        Commands::Volume(action) => match action {
            VolumeAction::Get { origin } => volume::get(&mut out, &db, origin)?,
            VolumeAction::Set { value, origin } => volume::set(&mut out, &db, origin, *value)?,
        },
        Commands::Allow(action) => match action {
            AllowAction::List { json } => allow::list(&mut out, db, *json)?,
            AllowAction::Add { url } => allow::add(&mut out, db, url)?,
            AllowAction::Remove { index } => allow::remove(&mut out, db, *index)?,
        },
        Commands::Check { url } => check::run(&mut out, db, url)?,
        Commands::Status => status::run(&mut out, &db, &config.database_path)?,
        Commands::Simulate(args) => simulate::run(&mut out, db, &config, args)?,
    }

    Ok(())
}
