use anyhow::bail;
use clap::Parser;
use tunnel_client::{connect, ClientArgs, ClientConfig, HandshakeState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ClientArgs::parse();
    tunnel_common::init_tracing_with_default(&format!("tunnel_client={}", args.log_level));

    let config = ClientConfig::from(&args);
    let mut handshake = connect(&config)?
        .on_state(|state| tracing::info!("state: {}", state))
        .on_error(|from, err| tracing::error!("failed in {}: {}", from, err));

    match handshake.run().await? {
        HandshakeState::MessageSent => {
            if let Some(reply) = handshake.last_reply() {
                println!("{reply}");
            }
            Ok(())
        }
        HandshakeState::Error => match handshake.last_error() {
            Some(err) => bail!("handshake failed: {err}"),
            None => bail!("handshake failed"),
        },
        state => {
            tracing::info!("handshake settled in {}", state);
            Ok(())
        }
    }
}
