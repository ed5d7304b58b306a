use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use payments_gateway::accounts::{AccountStore, InMemoryAccountStore};
use payments_gateway::admission::AdmissionController;
use payments_gateway::config::Args;
use payments_gateway::state::AppState;
use payments_gateway::token::TokenService;
use payments_gateway::{app, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(args.log_json);

    let accounts = match &args.accounts {
        Some(path) => {
            let store = InMemoryAccountStore::from_file(path)?;
            info!(accounts = store.len(), path = %path.display(), "account store seeded");
            store
        }
        None => InMemoryAccountStore::new(),
    };
    let accounts: Arc<dyn AccountStore> = Arc::new(accounts);
    let tokens = Arc::new(TokenService::new(args.jwt_secret.as_bytes(), args.token_ttl()));

    let state = AppState::new(
        accounts,
        tokens,
        AdmissionController::default(),
        args.request_timeout(),
    );

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(port = args.port, "gateway running");
    info!(timeout = ?args.request_timeout(), "handler deadline");

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
