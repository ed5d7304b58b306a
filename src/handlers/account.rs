use async_trait::async_trait;
use axum::Json;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::sync::Arc;

use crate::identity::Caller;
use crate::routes::{HandlerError, RequestContext, RouteHandler};
use crate::token::TokenService;

// GET /login - exchanges a credential pair for a bearer token
pub struct LoginHandler {
    tokens: Arc<TokenService>,
}

impl LoginHandler {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl RouteHandler for LoginHandler {
    async fn handle(&self, _request: RequestContext, caller: Caller) -> Result<Response, HandlerError> {
        let account = caller.account.ok_or("account not resolved")?;
        let token = self.tokens.issue(&account.email)?;
        Ok(Json(json!({
            "authToken": token,
            "expiresIn": self.tokens.ttl().as_millis() as u64,
        }))
        .into_response())
    }
}

// GET /userinfo - the caller's own account, password omitted
pub struct UserinfoHandler;

#[async_trait]
impl RouteHandler for UserinfoHandler {
    async fn handle(&self, _request: RequestContext, caller: Caller) -> Result<Response, HandlerError> {
        let account = caller.account.ok_or("account not resolved")?;
        Ok(Json(account).into_response())
    }
}
