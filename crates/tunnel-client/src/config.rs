use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SERVER_URL: &str = "http://localhost:8010";
const DEFAULT_CACHE_DIR: &str = ".tunnel-cache";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    /// Directory holding one session cache file per server origin.
    pub cache_dir: PathBuf,
    /// Bound on every network call.
    pub timeout: Duration,
    /// Message sent automatically on entering `ready`.
    pub auto_send: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            auto_send: Some("ping".to_string()),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "tunnel-client")]
#[command(about = "Tunnel client - key exchange and one encrypted message")]
pub struct ClientArgs {
    /// Server base URL
    #[arg(long, env = "TUNNEL_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub server_url: String,

    /// Directory for the local session cache
    #[arg(long, env = "TUNNEL_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Message sent once the session is ready
    #[arg(long, default_value = "ping")]
    pub message: String,

    /// Per-request timeout
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl From<&ClientArgs> for ClientConfig {
    fn from(args: &ClientArgs) -> Self {
        Self {
            server_url: args.server_url.clone(),
            cache_dir: args.cache_dir.clone(),
            timeout: Duration::from_secs(args.timeout_secs.max(1)),
            auto_send: Some(args.message.clone()),
        }
    }
}
