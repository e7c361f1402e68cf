//! Tunnel client.
//!
//! Runs the client handshake against a tunnel server: resume a cached
//! session or exchange keys, then send EAPI-authenticated encrypted messages.
//!
//! ```no_run
//! use tunnel_client::{connect, ClientConfig};
//!
//! # async fn demo() -> tunnel_common::Result<()> {
//! let mut handshake = connect(&ClientConfig::default())?;
//! handshake.run().await?;
//! println!("{:?}", handshake.last_reply());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod handshake;
pub mod transport;

pub use cache::{CachedSession, FileSessionCache, MemorySessionCache, SessionCache};
pub use client::TunnelClient;
pub use config::{ClientArgs, ClientConfig};
pub use handshake::{transition, Handshake, HandshakeEvent, HandshakeState};
pub use transport::{HttpTransport, Transport};

use tunnel_common::Result;

/// Build an HTTP handshake with a file-backed cache from `config`.
pub fn connect(config: &ClientConfig) -> Result<Handshake<HttpTransport, FileSessionCache>> {
    let transport = HttpTransport::new(&config.server_url, config.timeout)?;
    let cache = FileSessionCache::new(&config.cache_dir, transport.base_url());
    let client = TunnelClient::new(transport, cache)?;
    Ok(Handshake::new(client).with_auto_send(config.auto_send.clone()))
}
