use axum::http::Method;
use std::sync::Arc;
use std::time::Duration;

use crate::accounts::AccountStore;
use crate::admission::AdmissionController;
use crate::dispatcher::Dispatcher;
use crate::handlers::{LoginHandler, UserinfoHandler};
use crate::identity::IdentityResolver;
use crate::routes::{AuthMode, Route, RouteTable};
use crate::token::TokenService;

// app's shared state
pub struct AppState {
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<TokenService>,
        admission: AdmissionController,
        request_timeout: Duration,
    ) -> Arc<Self> {
        let routes = builtin_routes(tokens.clone());
        Self::with_routes(routes, accounts, tokens, admission, request_timeout)
    }

    pub fn with_routes(
        routes: RouteTable,
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<TokenService>,
        admission: AdmissionController,
        request_timeout: Duration,
    ) -> Arc<Self> {
        let resolver = IdentityResolver::new(accounts, tokens);
        Arc::new(Self {
            dispatcher: Dispatcher::new(routes, resolver, admission, request_timeout),
        })
    }
}

/// Routes served through the admission engine.
pub fn builtin_routes(tokens: Arc<TokenService>) -> RouteTable {
    let mut routes = RouteTable::new();
    routes
        .register(
            Route::new("login", Method::GET, "/login", Arc::new(LoginHandler::new(tokens)))
                .auth(AuthMode::CredentialPair)
                .timeout_hint_ms(1000),
        )
        .register(
            Route::new("userinfo", Method::GET, "/userinfo", Arc::new(UserinfoHandler))
                .auth(AuthMode::Token)
                .timeout_hint_ms(1000),
        );
    routes
}
