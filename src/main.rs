//! Operate and exercise the dircache directory listing cache.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dircache::config::Config;
use tracing::{error, info};

mod soak;
mod trc;

use crate::soak::SoakParams;
use crate::trc::Trc;

#[derive(Parser)]
#[command(
    version,
    about = "Capacity-bounded LRU cache of directory listings."
)]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to a dircache config TOML."
    )]
    config_path: Option<PathBuf>,

    #[arg(long, help = "Plain log output, without spinners.")]
    plain: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate the configuration, then print the effective options.
    Check,

    /// Run a concurrent synthetic readdir/lookup/invalidate workload against the cache.
    Soak {
        /// Number of worker threads.
        #[arg(long, default_value_t = 8)]
        threads: usize,

        /// Number of distinct directories in the working set.
        #[arg(long, default_value_t = 1024)]
        dirs: u64,

        /// Entries per directory listing.
        #[arg(long, default_value_t = 64)]
        entries: u64,

        /// Passes each worker makes over the working set.
        #[arg(long, default_value_t = 16)]
        rounds: u64,
    },
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    let mut trc = Trc::default();
    if args.plain {
        trc = trc.plain();
    }
    if let Err(e) = trc.init() {
        eprintln!(
            "Failed to initialize logging. Without logging, we can't provide any useful error \
             messages, so we have to exit: {e}"
        );
        std::process::exit(1);
    }

    let config = Config::load(args.config_path.as_deref()).unwrap_or_else(|e| {
        error!("Failed to load configuration: {e}");
        std::process::exit(1);
    });

    match args.command.unwrap_or(Command::Check) {
        Command::Check => match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                error!("Failed to render configuration: {e}");
                std::process::exit(1);
            }
        },
        Command::Soak {
            threads,
            dirs,
            entries,
            rounds,
        } => {
            let params = SoakParams {
                threads,
                dirs,
                entries,
                rounds,
            };
            match soak::run(&config.fs.dir_cache, params) {
                Ok(report) => {
                    info!(
                        capacity = report.capacity,
                        nentries = report.nentries,
                        "cache stayed within capacity"
                    );
                    match toml::to_string_pretty(&report.stats) {
                        Ok(rendered) => println!("{rendered}"),
                        Err(e) => error!("Failed to render stats: {e}"),
                    }
                }
                Err(e) => {
                    error!("Soak failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}
