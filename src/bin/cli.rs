//! DuraKV CLI
//!
//! Runs one command against a snapshot file: load, apply, save on close.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use durakv::{Config, Context, DurableStore, Key, KvError, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// DuraKV CLI
#[derive(Parser, Debug)]
#[command(name = "durakv")]
#[command(about = "Versioned key-value store with snapshot durability")]
#[command(version)]
struct Args {
    /// Snapshot file (overrides DURAKV_PERSISTENCE_PATH)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Per-operation timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Replace a value only if its version matches
    Cas {
        /// The key to update
        key: String,

        /// Version the caller last observed
        expected_version: i64,

        /// The new value
        value: String,
    },

    /// List all keys
    List,

    /// Print the number of keys
    Size,

    /// Remove every key
    Clear,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,durakv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            process::exit(2);
        }
    };
    if let Some(file) = args.file.clone() {
        config.snapshot_path = Some(file);
    }
    if config.snapshot_path.is_none() {
        config.snapshot_path = Some(PathBuf::from("./durakv.json"));
    }
    // One-shot process: the final save on close is the flush that matters
    config.auto_save = false;
    config.save_on_shutdown = true;

    let store = match DurableStore::open(&config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            process::exit(1);
        }
    };

    let ctx = Context::with_timeout(Duration::from_millis(args.timeout_ms));
    let outcome = run(&store, &ctx, args.command);

    if let Err(e) = store.close() {
        tracing::error!("Failed to save snapshot: {}", e);
        process::exit(1);
    }

    match outcome {
        Ok(()) => {}
        Err(KvError::ConcurrentModification { current }) => {
            eprintln!(
                "conflict: current version {} holds {:?}",
                current.version, current.data
            );
            process::exit(3);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn run(store: &impl Store, ctx: &Context, command: Commands) -> durakv::Result<()> {
    match command {
        Commands::Get { key } => {
            let value = store.get(ctx, &Key::from(key))?;
            println!("{}\t(version {})", value.data, value.version);
        }
        Commands::Set { key, value } => {
            store.set(ctx, &Key::from(key), &value)?;
            println!("OK");
        }
        Commands::Del { key } => {
            let old = store.delete(ctx, &Key::from(key))?;
            println!("deleted {}", old.data);
        }
        Commands::Cas {
            key,
            expected_version,
            value,
        } => {
            let updated = store.compare_and_swap(ctx, &Key::from(key), expected_version, &value)?;
            println!("OK (version {})", updated.version);
        }
        Commands::List => {
            let mut keys = store.list(ctx)?;
            keys.sort();
            for key in keys {
                println!("{}", key);
            }
        }
        Commands::Size => println!("{}", store.size(ctx)?),
        Commands::Clear => {
            store.clear(ctx)?;
            println!("OK");
        }
    }
    Ok(())
}
