//! silo - command-line access to any silo store
//!
//! Every subcommand takes a URL naming a node: `file:///tmp/x`, a plain
//! local path, `s3://bucket/key`, `gs://bucket/key`, `az://container/key`
//! or `memory-bucket://name/key`. The scheme picks the store, the rest of
//! the URL picks the node inside it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use silo_core::{Registry, SiloConfig, StreamStore, TracingStore};
use std::io;
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod target;

/// silo - one file and directory API over disk and object stores
#[derive(Parser)]
#[command(name = "silo")]
#[command(author, version, long_about = None)]
#[command(about = "One file and directory API over disk and object stores")]
struct Cli {
    /// Enable verbose output, including every store call
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file to use instead of the per-user one
    #[arg(long, global = true, env = "SILO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show metadata of a file or directory
    Stat {
        url: String,

        /// Print JSON instead of a listing line
        #[arg(long)]
        json: bool,
    },

    /// List a directory
    Ls {
        url: String,

        /// Print JSON instead of listing lines
        #[arg(long)]
        json: bool,
    },

    /// Create a directory
    Mkdir {
        url: String,

        /// Create missing parents, and succeed if the directory exists
        #[arg(short, long)]
        parents: bool,

        /// Permission bits, in octal
        #[arg(short, long, default_value = "755", value_parser = parse_mode)]
        mode: u32,
    },

    /// Remove a file or an empty directory
    Rm { url: String },

    /// Write the content of a file to stdout
    Cat { url: String },

    /// Store a local file, or stdin, at the URL
    Put {
        url: String,

        /// Local file to upload (defaults to stdin)
        file: Option<PathBuf>,
    },

    /// List every node below a directory, depth first
    Walk {
        url: String,

        /// Print one JSON object per node
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,

        /// Show the configuration file path
        #[arg(long)]
        path: bool,

        /// Write the default configuration if no file exists yet
        #[arg(long)]
        init: bool,
    },
}

fn parse_mode(s: &str) -> std::result::Result<u32, String> {
    u32::from_str_radix(s, 8).map_err(|e| format!("invalid octal mode {s}: {e}"))
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let result = run();

    match result {
        Ok(_) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(commands::exit_code(&e));
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SiloConfig> {
    let config = match path {
        Some(path) => SiloConfig::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SiloConfig::load().context("loading configuration")?,
    };
    Ok(config)
}

fn config_file(path: Option<&PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.clone()),
        None => Ok(SiloConfig::config_path()?),
    }
}

/// Registry with every scheme silo knows.
fn build_registry(config: SiloConfig) -> Result<Registry> {
    let mut registry = Registry::with_config(config);
    registry.register_defaults()?;
    silo_cloud::register_backends(&mut registry)?;
    debug!(schemes = ?registry.schemes(), "store registry ready");
    Ok(registry)
}

/// Open the store named by `arg` and return it with the node path.
fn open(
    cli_config: Option<&PathBuf>,
    arg: &str,
    verbose: bool,
) -> Result<(Box<dyn StreamStore>, String)> {
    let registry = build_registry(load_config(cli_config)?)?;
    let target = target::parse(arg)?;
    let store = registry
        .open_url(&target.store)
        .with_context(|| format!("opening {}", target.store))?;
    let store: Box<dyn StreamStore> = if verbose {
        Box::new(TracingStore::new(store, target.store.scheme()))
    } else {
        store
    };
    Ok((store, target.path))
}

fn config_command(cli_config: Option<&PathBuf>, show: bool, path: bool, init: bool) -> Result<()> {
    let file = config_file(cli_config)?;
    if init {
        if file.exists() {
            println!("{} already exists", file.display());
        } else {
            SiloConfig::default().save_to(&file)?;
            println!("wrote {}", file.display());
        }
    } else if show {
        let config = load_config(cli_config)?;
        print!("{}", toml::to_string_pretty(&config)?);
    } else if path {
        println!("{}", file.display());
    } else {
        eprintln!("Please specify --show, --path, or --init");
    }
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = cli.config.as_ref();
    let verbose = cli.verbose;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let (store, outcome) = match cli.command {
        Commands::Stat { url, json } => {
            let (store, path) = open(config, &url, verbose)?;
            let outcome = commands::stat(store.as_ref(), &path, json, &mut out);
            (store, outcome)
        }
        Commands::Ls { url, json } => {
            let (store, path) = open(config, &url, verbose)?;
            let outcome = commands::ls(store.as_ref(), &path, json, &mut out);
            (store, outcome)
        }
        Commands::Mkdir { url, parents, mode } => {
            let (store, path) = open(config, &url, verbose)?;
            let outcome = commands::mkdir(store.as_ref(), &path, parents, mode);
            (store, outcome)
        }
        Commands::Rm { url } => {
            let (store, path) = open(config, &url, verbose)?;
            let outcome = commands::rm(store.as_ref(), &path);
            (store, outcome)
        }
        Commands::Cat { url } => {
            let (store, path) = open(config, &url, verbose)?;
            let outcome = commands::cat(store.as_ref(), &path, &mut out);
            (store, outcome)
        }
        Commands::Put { url, file } => {
            let (store, path) = open(config, &url, verbose)?;
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let outcome = commands::put(store.as_ref(), &path, file.as_deref(), &mut input)
                .map(|_| ());
            (store, outcome)
        }
        Commands::Walk { url, json } => {
            let (store, path) = open(config, &url, verbose)?;
            let outcome = commands::walk_tree(store.as_ref(), &path, json, &mut out);
            (store, outcome)
        }
        Commands::Config { show, path, init } => {
            return config_command(config, show, path, init);
        }
    };

    // Release the store even when the command failed; report the first error.
    let closed = store.close();
    outcome?;
    closed?;
    Ok(())
}
