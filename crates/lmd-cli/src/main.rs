//! lmd: build and query character and token trigram language models.

mod ipc_client;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lmd_core::ipc::{
    Char3GramsRequest, Char3GramsResponse, TrigramMatches, TrigramsRequest, TrigramsResponse,
};
use lmd_core::Config;
use lmd_model::query::deadline_from;
use lmd_model::QueryEngine;
use lmd_update::Pipeline;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::ipc_client::QueryClient;

#[derive(Parser)]
#[command(name = "lmd")]
#[command(about = "Language model daemon: character and token trigram counts", long_about = None)]
#[command(version)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory (overrides the configuration file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add documents to the language models
    Update {
        /// Documents to read (plain text, optionally .gz)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Number of token trigram shards
        #[arg(long)]
        shards: Option<u32>,

        /// Flush an accumulator once its total exceeds this
        #[arg(long)]
        block_size: Option<u64>,

        /// Documents processed concurrently
        #[arg(long)]
        workers: Option<usize>,

        /// Writer threads
        #[arg(long)]
        writers: Option<usize>,
    },

    /// Rewrite every table file as a single record
    Compact,

    /// Look up character trigrams
    Char3grams {
        /// Trigram, or a regex with --regex
        q: String,

        /// Treat the query as a regular expression
        #[arg(long)]
        regex: bool,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Look up token trigrams
    Trigrams {
        first: String,
        second: Option<String>,
        third: Option<String>,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Stop a running daemon
    Shutdown,
}

#[derive(Args)]
struct QueryArgs {
    /// Give up after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Read the data directory directly instead of asking the daemon
    #[arg(long)]
    local: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Plain)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Plain,
}

/// Socket timeout used when no request timeout is given.
const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        lmd_core::logging::init_with_level("debug");
    } else {
        lmd_core::logging::init();
    }

    match cli.command {
        Commands::Update {
            files,
            shards,
            block_size,
            workers,
            writers,
        } => {
            let mut config = load_config(cli.data_dir)?;
            if let Some(n) = shards {
                config.shard_count = n;
            }
            if let Some(n) = block_size {
                config.block_size = n;
            }
            if let Some(n) = workers {
                config.workers = n;
            }
            if let Some(n) = writers {
                config.writers = n;
            }
            update(config, &files)?;
        }
        Commands::Compact => {
            let config = load_config(cli.data_dir)?;
            let summary = lmd_update::compact(&config).context("compaction failed")?;
            println!(
                "Compacted {} files: {} character trigrams, {} token trigrams",
                summary.files, summary.char_total, summary.trigram_total
            );
        }
        Commands::Char3grams { q, regex, query } => {
            let request = Char3GramsRequest {
                q,
                regex,
                timeout_ms: query.timeout_ms,
            };
            let response = if query.local {
                let config = load_config(cli.data_dir)?;
                QueryEngine::open(&config.data_dir, config.shard_count)
                    .char3grams(&request, deadline_from(request.timeout_ms))?
            } else {
                client(&query).char3grams(request)?
            };
            print_char3grams(&response, query.format)?;
        }
        Commands::Trigrams {
            first,
            second,
            third,
            query,
        } => {
            let request = TrigramsRequest {
                first,
                second: second.unwrap_or_default(),
                third: third.unwrap_or_default(),
                timeout_ms: query.timeout_ms,
            };
            let response = if query.local {
                let config = load_config(cli.data_dir)?;
                QueryEngine::open(&config.data_dir, config.shard_count)
                    .trigrams(&request, deadline_from(request.timeout_ms))?
            } else {
                client(&query).trigrams(request)?
            };
            print_trigrams(&response, query.format)?;
        }
        Commands::Shutdown => {
            QueryClient::new(lmd_core::ipc::socket_path(), DEFAULT_CLIENT_TIMEOUT).shutdown()?;
            println!("Daemon stopped");
        }
    }

    Ok(())
}

fn load_config(data_dir: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::load_or_default().context("failed to load configuration")?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    debug!("Using data directory {}", config.data_dir.display());
    Ok(config)
}

fn update(config: Config, files: &[PathBuf]) -> Result<()> {
    let summary = Pipeline::new(config)
        .run(files)
        .context("update failed")?;
    println!(
        "Updated from {} documents: {} character trigrams, {} token trigrams ({} flushes)",
        summary.documents, summary.char_total, summary.grand_total, summary.flushes
    );
    Ok(())
}

fn client(query: &QueryArgs) -> QueryClient {
    let timeout = query
        .timeout_ms
        // Leave the daemon time to report its own deadline.
        .map(|ms| Duration::from_millis(ms) + Duration::from_secs(1))
        .unwrap_or(DEFAULT_CLIENT_TIMEOUT);
    QueryClient::new(lmd_core::ipc::socket_path(), timeout)
}

fn print_char3grams(response: &Char3GramsResponse, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(response)?),
        Format::Plain => {
            for m in &response.matches {
                println!("{}\t{}", m.ngram, m.count);
            }
            println!("total\t{}", response.total);
        }
    }
    Ok(())
}

fn print_trigrams(response: &TrigramsResponse, format: Format) -> Result<()> {
    if let Format::Json = format {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    let first = response.request.first.trim().to_lowercase();
    let second = response.request.second.trim().to_lowercase();
    let third = response.request.third.trim().to_lowercase();
    match &response.matches {
        TrigramMatches::Seconds(seconds) => {
            for (s, thirds) in seconds {
                for (t, count) in thirds {
                    println!("{first} {s} {t}\t{count}");
                }
            }
        }
        TrigramMatches::Thirds(thirds) => {
            for (t, count) in thirds {
                println!("{first} {second} {t}\t{count}");
            }
        }
        TrigramMatches::Count(count) => println!("{first} {second} {third}\t{count}"),
    }
    println!("total\t{}", response.total);
    Ok(())
}
