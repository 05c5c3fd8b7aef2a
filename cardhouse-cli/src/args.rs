use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cardhouse")]
#[command(about = "Manage card game definition packages")]
#[command(version)]
pub struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Data directory holding games/, import/, export/ and the database
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List installed packages (current marked with *)
    List,

    /// Import a package archive (.zip, .tar.gz, .tar.xz)
    Import {
        /// Archive path; the file name (without extension) is the package id
        path: PathBuf,
    },

    /// Download a package from its metadata URL
    Download {
        /// Auto-update URL of the package metadata
        url: String,
    },

    /// Re-download a package from its auto-update URL
    Update {
        /// Package id (default: current)
        id: Option<String>,
    },

    /// Select a package as current
    Select {
        /// Package id
        id: String,
    },

    /// Select the next package
    Next,

    /// Select the previous package
    Previous,

    /// Delete the current package (asks first)
    Delete,

    /// Print a share message for the current package, or export it
    Share,

    /// Export a package to a zip archive
    Export {
        /// Package id (default: current)
        id: Option<String>,
    },

    /// Resolve a deep link to its auto-update URL without downloading
    Resolve {
        /// Deep link
        link: String,
    },

    /// Resolve a deep link and download the package it names
    Open {
        /// Deep link
        link: String,
    },
}
