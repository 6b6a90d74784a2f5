use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tether_core::BatchItem;
use tether_shortener::deletion::{DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_CAPACITY};

pub const STORAGE_BACKEND_ENV: &str = "TETHER_STORAGE_BACKEND";
pub const FILE_PATH_ENV: &str = "TETHER_FILE_PATH";
pub const MYSQL_DSN_ENV: &str = "TETHER_MYSQL_DSN";
pub const DELETE_BATCH_SIZE_ENV: &str = "TETHER_DELETE_BATCH_SIZE";
pub const DELETE_DEBOUNCE_MS_ENV: &str = "TETHER_DELETE_DEBOUNCE_MS";
pub const DELETE_QUEUE_CAPACITY_ENV: &str = "TETHER_DELETE_QUEUE_CAPACITY";
pub const STORE_TIMEOUT_MS_ENV: &str = "TETHER_STORE_TIMEOUT_MS";
pub const SHUTDOWN_TIMEOUT_SECS_ENV: &str = "TETHER_SHUTDOWN_TIMEOUT_SECS";
pub const LOG_JSON_ENV: &str = "TETHER_LOG_JSON";

pub const DEFAULT_DELETE_DEBOUNCE_MS: u64 = 450;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "memory")]
    Memory,
    #[value(name = "file")]
    File,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::Memory => write!(f, "memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tether", about = "Operate a tether short url store")]
pub struct CLI {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::Memory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = FILE_PATH_ENV, required_if_eq("storage", "file"))]
    pub file_path: Option<PathBuf>,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    #[arg(long, env = DELETE_BATCH_SIZE_ENV, default_value_t = DEFAULT_BATCH_SIZE)]
    pub delete_batch_size: usize,

    #[arg(long, env = DELETE_DEBOUNCE_MS_ENV, default_value_t = DEFAULT_DELETE_DEBOUNCE_MS)]
    pub delete_debounce_ms: u64,

    #[arg(long, env = DELETE_QUEUE_CAPACITY_ENV, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub delete_queue_capacity: usize,

    #[arg(long, env = STORE_TIMEOUT_MS_ENV, default_value_t = DEFAULT_STORE_TIMEOUT_MS)]
    pub store_timeout_ms: u64,

    #[arg(long, env = SHUTDOWN_TIMEOUT_SECS_ENV, default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_SECS)]
    pub shutdown_timeout_secs: u64,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, env = LOG_JSON_ENV)]
    pub log_json: bool,

    /// Prefix used when printing short links.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one URL, or print the code it already has.
    Shorten {
        url: String,
        #[arg(long, default_value_t = 0)]
        owner: i64,
        /// Seed for reproducible codes.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Shorten many URLs given as `correlation_id=url` pairs.
    Batch {
        #[arg(required = true, value_parser = parse_batch_item)]
        items: Vec<BatchItem>,
        #[arg(long, default_value_t = 0)]
        owner: i64,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the original URL behind a code.
    Resolve { code: String },
    /// Delete codes owned by a user.
    Delete {
        #[arg(required = true)]
        codes: Vec<String>,
        #[arg(long)]
        owner: i64,
    },
    /// List the live URLs a user created.
    List {
        #[arg(long)]
        owner: i64,
    },
    /// Count live URLs and their owners.
    Stats,
    /// Check that the storage backend is reachable.
    Ping,
}

fn parse_batch_item(raw: &str) -> Result<BatchItem, String> {
    match raw.split_once('=') {
        Some((correlation_id, original_url))
            if !correlation_id.is_empty() && !original_url.is_empty() =>
        {
            Ok(BatchItem {
                correlation_id: correlation_id.to_string(),
                original_url: original_url.to_string(),
            })
        }
        _ => Err(format!("expected correlation_id=url, got '{raw}'")),
    }
}
