use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tunnel_common::helpers::env_bool;

use crate::controller::ControllerConfig;
use crate::keys::DEFAULT_KEY_ID;
use crate::replay::ReplayGuard;

const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_PURGE_INTERVAL_SECS: u64 = 300;
const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Parser, Debug, Clone)]
#[command(name = "tunnel-server")]
#[command(about = "Tunnel server - X25519 key exchange and encrypted action tunnel")]
pub struct ServerArgs {
    /// HTTP listen address
    #[arg(long, env = "TUNNEL_LISTEN", default_value = "127.0.0.1:8010")]
    pub listen: SocketAddr,

    /// SQLite database holding sessions and the server key
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:tunnel.db?mode=rwc")]
    pub database_url: String,

    /// Identifier of the long-term server key pair
    #[arg(long, env = "TUNNEL_SERVER_KEY_ID", default_value = DEFAULT_KEY_ID)]
    pub key_id: String,

    /// Session lifetime from key exchange
    #[arg(long, env = "TUNNEL_SESSION_TTL_SECS", default_value_t = DEFAULT_SESSION_TTL_SECS)]
    pub session_ttl_secs: u64,

    /// Interval between expired-session sweeps
    #[arg(long, env = "TUNNEL_PURGE_INTERVAL_SECS", default_value_t = DEFAULT_PURGE_INTERVAL_SECS)]
    pub purge_interval_secs: u64,

    /// Reject envelopes already accepted within the EAPI window
    #[arg(long, env = "TUNNEL_REJECT_REPLAYS", default_value_t = true, action = clap::ArgAction::Set)]
    pub reject_replays: bool,

    /// Replay fingerprints remembered per session
    #[arg(long, env = "TUNNEL_REPLAY_CAPACITY", default_value_t = ReplayGuard::DEFAULT_MAX_PER_SESSION)]
    pub replay_capacity: usize,

    /// Browser origins allowed to call the API (comma-separated, `*` for any)
    #[arg(long = "cors-origin", env = "TUNNEL_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl ServerArgs {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            session_ttl: chrono::Duration::seconds(
                self.session_ttl_secs.min(MAX_SESSION_TTL_SECS) as i64,
            ),
            reject_replays: self.reject_replays,
            replay_capacity: self.replay_capacity,
        }
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

pub fn check_public_bind_allowed(addr: SocketAddr) -> anyhow::Result<()> {
    if addr.ip().is_loopback() {
        return Ok(());
    }
    if env_bool("TUNNEL_ALLOW_PUBLIC_BIND", false) {
        return Ok(());
    }
    Err(anyhow::anyhow!(
        "refusing non-loopback bind without TUNNEL_ALLOW_PUBLIC_BIND=1"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = ServerArgs::parse_from(["tunnel-server"]);
        assert_eq!(args.key_id, "production");
        assert_eq!(args.session_ttl_secs, 86_400);
        assert!(args.reject_replays);
        assert!(args.listen.ip().is_loopback());

        let config = args.controller_config();
        assert_eq!(config.session_ttl, chrono::Duration::hours(24));
        assert_eq!(config.replay_capacity, ReplayGuard::DEFAULT_MAX_PER_SESSION);
    }

    #[test]
    fn test_flags() {
        let args = ServerArgs::parse_from([
            "tunnel-server",
            "--reject-replays",
            "false",
            "--cors-origin",
            "http://a.test,http://b.test",
            "--purge-interval-secs",
            "0",
        ]);
        assert!(!args.reject_replays);
        assert_eq!(args.cors_origins.len(), 2);
        assert_eq!(args.purge_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_loopback_bind_allowed() {
        assert!(check_public_bind_allowed("127.0.0.1:8010".parse().unwrap()).is_ok());
        assert!(check_public_bind_allowed("[::1]:8010".parse().unwrap()).is_ok());
    }
}
