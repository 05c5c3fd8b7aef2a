//! Cardhouse command-line host.
//!
//! Owns the catalog manager for one command: opens the database, loads
//! settings, initializes the catalog, runs the command and shuts down.

mod args;
mod console;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cardhouse_core::catalog::resolve;
use cardhouse_core::{
    CatalogError, CatalogManager, CatalogSettings, Database, HttpFetcher, ImportOutcome, ShareOutcome,
};

use args::{Cli, Commands};
use console::ConsoleNotifier;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tracing::debug!("Starting cardhouse v{}", cardhouse_core::VERSION);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(message) = unreported_error(&e) {
                eprintln!("{}", message);
            }
            ExitCode::FAILURE
        }
    }
}

/// Catalog errors are shown where they occur, so only other errors are
/// printed on exit.
fn unreported_error(err: &anyhow::Error) -> Option<String> {
    if err.downcast_ref::<CatalogError>().is_some() {
        None
    } else {
        Some(format!("error: {:#}", err))
    }
}

fn init_logging(verbose: bool) {
    let directive = if verbose { "cardhouse=debug" } else { "cardhouse=info" };
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    if let Ok(directive) = directive.parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db = match &cli.root {
        Some(root) => Database::open_at(root.join("cardhouse.db")),
        None => Database::open(),
    }
    .context("Failed to open database")?;
    db.migrate().context("Failed to migrate database")?;

    let mut settings = CatalogSettings::load(&db);
    if let Some(root) = &cli.root {
        settings.relocate(root);
        if let Err(e) = settings.save(&db) {
            tracing::warn!("Failed to save settings: {:#}", e);
        }
    }

    if let Commands::Resolve { link } = &cli.command {
        match resolve(link, &settings.links.dynamic_link_domain) {
            Ok(Some(url)) => println!("{}", url),
            Ok(None) => println!("(no auto-update URL)"),
            Err(e) => {
                eprintln!("{}", e);
                return Err(e.into());
            }
        }
        return Ok(());
    }

    let notifier = Arc::new(ConsoleNotifier::new(cli.yes));
    let mut manager = CatalogManager::new(
        settings,
        Arc::new(HttpFetcher::new()),
        notifier,
        Box::new(db),
    );

    manager.initialize().await?;
    let result = dispatch(&mut manager, cli.command).await;
    manager.shutdown();
    result
}

async fn dispatch(manager: &mut CatalogManager, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::List => {
            for (id, descriptor) in manager.catalog() {
                let marker = if id == manager.current().id() { "*" } else { " " };
                match descriptor.metadata().auto_update_url.as_deref() {
                    Some(url) => println!("{} {}  <{}>", marker, id, url),
                    None => println!("{} {}", marker, id),
                }
            }
        }
        Commands::Import { path } => match manager.import(&path).await? {
            ImportOutcome::Imported(id) => println!("Imported {}", id),
            ImportOutcome::Cancelled => println!("Import cancelled"),
        },
        Commands::Download { url } => {
            let id = manager.download(&url).await?;
            println!("Downloaded {}", id);
        }
        Commands::Update { id } => {
            manager.update(id.as_deref()).await?;
            println!("Updated {}", id.as_deref().unwrap_or(manager.current().id()));
        }
        Commands::Select { id } => {
            manager.select(&id).await?;
            print_current(manager);
        }
        Commands::Next => {
            manager.select_next().await?;
            print_current(manager);
        }
        Commands::Previous => {
            manager.select_previous().await?;
            print_current(manager);
        }
        Commands::Delete => {
            if manager.request_delete().await? {
                print_current(manager);
            }
        }
        Commands::Share => {
            if let ShareOutcome::Exported(path) = manager.share()? {
                println!("Exported to {}", path.display());
            }
        }
        Commands::Export { id } => {
            let path = manager.export(id.as_deref())?;
            println!("Exported to {}", path.display());
        }
        Commands::Resolve { .. } => {}
        Commands::Open { link } => {
            let id = manager.open_link(&link).await?;
            println!("Downloaded {}", id);
        }
    }

    Ok(())
}

fn print_current(manager: &CatalogManager) {
    let current = manager.current();
    println!("Current: {} ({} cards)", current.id(), current.cards().len());
}
