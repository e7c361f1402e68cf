//! Tunnel CLI tools: key generation, EAPI inspection, server key lookup.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tunnel_common::helpers::normalize_base_url;
use tunnel_common::{Clock, SystemClock};
use tunnel_crypto::{compute_eapi_hex, epoch_at, AccessKey, KeyPair, EAPI_WINDOW_SECS};
use tunnel_server::keys::DEFAULT_KEY_ID;
use tunnel_server::{connect_database, ServerKeyStore};

#[derive(Parser, Debug)]
#[command(name = "tunnel")]
#[command(about = "Tunnel CLI tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new X25519 keypair
    Keygen {
        /// Write `<output>.key` and `<output>.pub` instead of printing
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Compute the EAPI token for an AccessKey
    Eapi {
        /// Hex-encoded 32-byte AccessKey
        #[arg(long)]
        access_key: String,

        /// Unix time in seconds (defaults to now)
        #[arg(long)]
        at: Option<i64>,
    },

    /// Show the stored server public key
    ServerKey {
        /// SQLite database of the server
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,

        /// Identifier of the server key pair
        #[arg(long, default_value = DEFAULT_KEY_ID)]
        key_id: String,

        /// Generate and store a key pair if none exists
        #[arg(long, default_value_t = false)]
        generate: bool,
    },

    /// Check that a tunnel server is up
    Ping {
        /// Server base URL
        #[arg(short, long, default_value = "http://localhost:8010")]
        server: String,
    },

    /// Show version information
    Version,
}

/// Write private key material, restricted to the owner (0600 on Unix).
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents.as_bytes())
}

fn keygen(output: Option<String>) -> Result<()> {
    let keypair = KeyPair::generate()?;
    let private_hex = hex::encode(keypair.private_bytes());

    match output {
        Some(output) => {
            let private_path = format!("{}.key", output);
            let public_path = format!("{}.pub", output);
            write_private(Path::new(&private_path), &format!("{private_hex}\n"))
                .with_context(|| format!("failed to write {private_path}"))?;
            fs::write(&public_path, format!("{}\n", keypair.public_hex()))
                .with_context(|| format!("failed to write {public_path}"))?;

            println!("Private key: {}", private_path);
            println!("Public key:  {}", public_path);
        }
        None => {
            println!("Private key: {}", private_hex);
            println!("Public key:  {}", keypair.public_hex());
        }
    }
    Ok(())
}

/// Token and epoch for `access_key` at `unix_secs`.
fn eapi_at(access_key: &str, unix_secs: i64) -> Result<(i64, String)> {
    let key = AccessKey::from_hex(access_key).context("invalid AccessKey")?;
    let epoch = epoch_at(unix_secs);
    Ok((epoch, compute_eapi_hex(&key, epoch)))
}

async fn server_key(database_url: &str, key_id: &str, generate: bool) -> Result<()> {
    let pool = connect_database(database_url)
        .await
        .with_context(|| format!("failed to open {database_url}"))?;
    let keys = ServerKeyStore::new(pool);

    let keypair = if generate {
        keys.load_or_generate(key_id).await?
    } else {
        keys.get(key_id)
            .await?
            .with_context(|| format!("no server key stored under '{key_id}'"))?
    };
    println!("{}", keypair.public_hex());
    Ok(())
}

async fn ping(server: &str) -> Result<()> {
    let url = format!("{}/health", normalize_base_url(server));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let start = std::time::Instant::now();
    let res = client.get(&url).send().await?;
    let status = res.status();
    let body: serde_json::Value = res.json().await.unwrap_or_default();

    if status.is_success() && body["status"] == "ok" {
        println!("Response from {}: RTT={:?}", server, start.elapsed());
        Ok(())
    } else {
        anyhow::bail!("{} is unhealthy: {} {}", server, status, body)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tunnel_common::init_tracing_with_default("warn");

    let args = Args::parse();

    match args.command {
        Command::Keygen { output } => keygen(output)?,
        Command::Eapi { access_key, at } => {
            let now = at.unwrap_or_else(|| SystemClock.unix_secs());
            let (epoch, token) = eapi_at(&access_key, now)?;
            let valid_until = (epoch + 2) * EAPI_WINDOW_SECS;
            println!("Epoch:       {}", epoch);
            println!("EAPI:        {}", token);
            println!("Valid until: {} (unix)", valid_until);
        }
        Command::ServerKey {
            database_url,
            key_id,
            generate,
        } => server_key(&database_url, &key_id, generate).await?,
        Command::Ping { server } => ping(&server).await?,
        Command::Version => {
            println!("tunnel {}", env!("CARGO_PKG_VERSION"));
            println!("Key exchange: X25519");
            println!("Key chain:    HKDF-SHA256");
            println!("Envelope:     AES-256-GCM");
        }
    }

    Ok(())
}
