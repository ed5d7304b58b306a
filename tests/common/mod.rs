use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use payments_gateway::accounts::{Account, AccountStore, InMemoryAccountStore};
use payments_gateway::admission::AdmissionController;
use payments_gateway::app;
use payments_gateway::identity::Caller;
use payments_gateway::routes::{HandlerError, RequestContext, Route, RouteHandler};
use payments_gateway::state::{AppState, builtin_routes};
use payments_gateway::token::TokenService;
use tokio::net::TcpListener;

pub const SECRET: &[u8] = b"integration-test-secret";

pub struct TestGateway {
    pub addr: SocketAddr,
    pub tokens: Arc<TokenService>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

// Public route echoing the identity it was admitted under
struct WhoAmI;

#[async_trait]
impl RouteHandler for WhoAmI {
    async fn handle(&self, _request: RequestContext, caller: Caller) -> Result<Response, HandlerError> {
        Ok(Json(serde_json::json!({
            "status": true,
            "identity": caller.identity.key(),
        }))
        .into_response())
    }
}

/// Binds a gateway on an ephemeral port with one seeded account.
pub async fn spawn_gateway() -> TestGateway {
    let store = InMemoryAccountStore::new();
    store
        .insert(Account::new("alice@bank.test", "correct-horse"))
        .await
        .unwrap();
    let accounts: Arc<dyn AccountStore> = Arc::new(store);
    let tokens = Arc::new(TokenService::new(SECRET, Duration::from_secs(3600)));

    let mut routes = builtin_routes(tokens.clone());
    routes.register(Route::new("whoami", Method::GET, "/whoami", Arc::new(WhoAmI)));

    let state = AppState::with_routes(
        routes,
        accounts,
        tokens.clone(),
        AdmissionController::default(),
        Duration::from_secs(15),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestGateway { addr, tokens }
}
