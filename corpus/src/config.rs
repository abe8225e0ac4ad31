//! Configuration for corpus ingestion
//!
//! Every setting has an environment variable and a default; command-line
//! flags override both. Data directory precedence:
//! 1. CORPUS_DATA_DIR environment variable
//! 2. ~/.local/share/corpus (production default)
//! 3. ./data (fallback for development)

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

const DEFAULT_DATA_DIR: &str = ".local/share/corpus";
const DEV_DATA_DIR: &str = "./data";
const DB_FILE_NAME: &str = "corpus.db";

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BASE_MS: u64 = 200;
pub const DEFAULT_CLAIM_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_DB_CONNECTIONS: u32 = 5;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Get the data directory for persistence.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CORPUS_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_DATA_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

/// Get the SQLite database path: CORPUS_DB_PATH, else `corpus.db` in the
/// data directory.
pub fn get_db_path() -> PathBuf {
    match std::env::var("CORPUS_DB_PATH") {
        Ok(path) => PathBuf::from(path),
        Err(_) => get_data_dir().join(DB_FILE_NAME),
    }
}

pub fn get_batch_size() -> usize {
    env_or("CORPUS_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1)
}

pub fn get_workers() -> usize {
    env_or("CORPUS_WORKERS", DEFAULT_WORKERS).max(1)
}

pub fn get_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: env_or("CORPUS_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS),
        initial_backoff: Duration::from_millis(env_or("CORPUS_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS)),
        ..RetryPolicy::default()
    }
}

/// How long a claim may go unrenewed before another run may release it.
pub fn get_claim_timeout() -> Duration {
    Duration::from_secs(env_or("CORPUS_CLAIM_TIMEOUT_SECS", DEFAULT_CLAIM_TIMEOUT_SECS))
}

/// Pool size and lock wait for the corpus database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub max_connections: u32,
    /// How long a connection waits on a locked database before SQLITE_BUSY.
    pub busy_timeout: Duration,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_DB_CONNECTIONS,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl DatabaseSettings {
    pub fn from_env() -> Self {
        Self {
            max_connections: env_or("CORPUS_DB_CONNECTIONS", DEFAULT_DB_CONNECTIONS).max(1),
            busy_timeout: Duration::from_millis(env_or(
                "CORPUS_BUSY_TIMEOUT_MS",
                DEFAULT_BUSY_TIMEOUT_MS,
            )),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
                default
            }
        },
        Err(_) => default,
    }
}

/// Resolved settings for one ingestion run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rows per storage transaction.
    pub batch_size: usize,
    /// Concurrent source workers.
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Claims older than this are considered abandoned at startup.
    pub claim_timeout: Duration,
    /// Games where either rating is known and below this are skipped.
    pub min_elo: Option<i32>,
    /// Games where either rating is known and above this are skipped.
    pub max_elo: Option<i32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            claim_timeout: Duration::from_secs(DEFAULT_CLAIM_TIMEOUT_SECS),
            min_elo: None,
            max_elo: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            batch_size: get_batch_size(),
            workers: get_workers(),
            retry: get_retry_policy(),
            claim_timeout: get_claim_timeout(),
            min_elo: None,
            max_elo: None,
        }
    }
}
