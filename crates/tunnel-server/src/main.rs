use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tunnel_server::{
    bind_listener, config::check_public_bind_allowed, connect_database, router,
    spawn_session_sweeper, ServerArgs, ServerKeyStore, SessionController, SqliteSessionStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = ServerArgs::parse();
    tunnel_common::init_tracing_with_default(&format!(
        "tunnel_server={0},tower_http={0}",
        args.log_level
    ));

    check_public_bind_allowed(args.listen)?;

    let pool = connect_database(&args.database_url)
        .await
        .context("failed to open session database")?;
    tracing::info!("connected to session database");

    let keypair = ServerKeyStore::new(pool.clone())
        .load_or_generate(&args.key_id)
        .await
        .context("failed to load server key pair")?;

    let store = SqliteSessionStore::new(pool);
    let controller =
        Arc::new(SessionController::new(store, keypair).with_config(args.controller_config()));
    let sweeper = spawn_session_sweeper(controller.clone(), args.purge_interval());

    let app = router(controller, &args.cors_origins);

    let listener = bind_listener(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    tracing::info!("tunnel server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
