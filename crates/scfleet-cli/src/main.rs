//! scfleet - Ship and component catalogs from Star Citizen game data
//!
//! Usage:
//!   scfleet list <p4k_file> [filter]               - List archive entries
//!   scfleet xml <p4k_file> <entry>                 - Print a binary XML entry as text
//!   scfleet dump <p4k_file> <record> [--depth N]   - Print a database record as JSON
//!   scfleet extract <p4k_file> -o <dir>            - Build the catalog into a directory
//!   scfleet crossref <dir> <matrix.json>           - Link ship-matrix entries to ships
//!   scfleet loadout <dir> <ship> [--swap port=component]...

mod commands;
mod util;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scfleet::dataforge::ResolverOptions;
use scfleet::{ArchiveOptions, ExtractOptions};

#[derive(Parser)]
#[command(name = "scfleet")]
#[command(version)]
#[command(about = "Ship and component catalogs from Star Citizen game data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files in the archive
    List {
        /// Path to the .p4k file
        p4k_file: PathBuf,
        /// Filter pattern (e.g., *.xml, Data/Scripts/*)
        filter: Option<String>,
    },
    /// Print a binary XML entry as text XML
    Xml {
        /// Path to the .p4k file
        p4k_file: PathBuf,
        /// Entry path inside the archive
        entry: String,
    },
    /// Print one database record, references followed, as JSON
    Dump {
        /// Path to the .p4k file
        p4k_file: PathBuf,
        /// Record id, file path or name
        record: String,
        /// How many references to follow
        #[arg(short, long, default_value_t = ResolverOptions::default().max_depth)]
        depth: u32,
    },
    /// Reconstruct ships, components and loadouts into a catalog directory
    Extract {
        /// Path to the .p4k file
        p4k_file: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = "catalog")]
        output: PathBuf,
        /// Keep test, AI and template vehicles
        #[arg(long)]
        include_non_playable: bool,
        /// Reconstruct records on one thread
        #[arg(long)]
        sequential: bool,
        /// Verify entry checksums
        #[arg(long)]
        verify_crc: bool,
        /// Resolution depth budget
        #[arg(long, default_value_t = ResolverOptions::default().max_depth)]
        max_depth: u32,
    },
    /// Link ship-matrix entries to catalog ships and rewrite the links
    Crossref {
        /// Catalog directory
        dir: PathBuf,
        /// Ship-matrix JSON export
        matrix: PathBuf,
    },
    /// Print loadout statistics for a ship
    Loadout {
        /// Catalog directory
        dir: PathBuf,
        /// Ship id, class name or display name
        ship: String,
        /// Hypothetical swap as port=component; an empty component empties the port
        #[arg(short, long = "swap")]
        swaps: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { p4k_file, filter } => {
            commands::list(&p4k_file, filter.as_deref())?;
        }
        Commands::Xml { p4k_file, entry } => {
            commands::xml(&p4k_file, &entry)?;
        }
        Commands::Dump {
            p4k_file,
            record,
            depth,
        } => {
            commands::dump(&p4k_file, &record, depth)?;
        }
        Commands::Extract {
            p4k_file,
            output,
            include_non_playable,
            sequential,
            verify_crc,
            max_depth,
        } => {
            let options = ExtractOptions {
                include_non_playable,
                parallel: !sequential,
                archive: ArchiveOptions { verify_crc },
                resolver: ResolverOptions { max_depth },
                ..Default::default()
            };
            commands::extract(&p4k_file, &output, options)?;
        }
        Commands::Crossref { dir, matrix } => {
            commands::crossref(&dir, &matrix)?;
        }
        Commands::Loadout { dir, ship, swaps } => {
            commands::loadout_stats(&dir, &ship, &swaps)?;
        }
    }

    Ok(())
}
