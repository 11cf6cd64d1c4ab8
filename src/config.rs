//! Server configuration from flags and environment

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Parser)]
#[command(name = "reelcollab")]
#[command(about = "Collaboration requests and payment agreements between filmmakers")]
#[command(version)]
pub struct Config {
    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:reelcollab.db?mode=rwc")]
    pub database_url: String,

    /// Address to listen on
    #[arg(long, env = "REELCOLLAB_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Maximum pooled database connections
    #[arg(long, env = "REELCOLLAB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Attempts for reads that fail on the transport (including the first)
    #[arg(long, env = "REELCOLLAB_READ_RETRIES", default_value_t = 3)]
    pub read_retries: u32,

    /// Initial delay between read retries, doubled on each retry
    #[arg(long, env = "REELCOLLAB_RETRY_BACKOFF_MS", default_value_t = 100)]
    pub retry_backoff_ms: u64,

    /// Buffered change events per subscriber before it is considered lagged
    #[arg(long, env = "REELCOLLAB_CHANGE_FEED_CAPACITY", default_value_t = 256)]
    pub change_feed_capacity: usize,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.read_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}
