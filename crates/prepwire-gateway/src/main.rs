use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

mod app;
mod http;

#[derive(Parser)]
#[command(name = "prepwire-gateway", about = "Interview orchestration HTTP gateway")]
struct Args {
    /// Path to prepwire.toml (defaults to ~/.prepwire/prepwire.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prepwire_gateway=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config = prepwire_core::config::PrepwireConfig::load(args.config.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            prepwire_core::config::PrepwireConfig::default()
        });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config)?);
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Prepwire gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
