use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::Query;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tokio::task::JoinError;
use tracing::{error, warn};

use crate::admission::{AdmissionController, Decision};
use crate::error::GatewayError;
use crate::identity::{Caller, IdentityResolver};
use crate::metrics::{HANDLER_LATENCY, HANDLER_TIMEOUTS, REQUEST_TOTAL};
use crate::routes::{RequestContext, Route, RouteTable};

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Route lookup, identity resolution, admission, then the handler under a deadline.
pub struct Dispatcher {
    routes: RouteTable,
    resolver: IdentityResolver,
    admission: AdmissionController,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        routes: RouteTable,
        resolver: IdentityResolver,
        admission: AdmissionController,
        request_timeout: Duration,
    ) -> Self {
        Self {
            routes,
            resolver,
            admission,
            request_timeout,
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub async fn dispatch(&self, request: Request<Body>, peer: Option<SocketAddr>) -> Response {
        REQUEST_TOTAL.inc();
        match self.try_dispatch(request, peer).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }

    async fn try_dispatch(&self, request: Request<Body>, peer: Option<SocketAddr>) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let route = self.routes.lookup(parts.uri.path(), &parts.method)?;

        let query = if parts.uri.query().is_some() {
            Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?
                .0
        } else {
            HashMap::new()
        };

        let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| GatewayError::BadRequest(e.to_string()))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| GatewayError::BadRequest(e.to_string()))?
        };

        let context = RequestContext {
            method: parts.method,
            path: parts.uri.path().to_string(),
            headers: parts.headers,
            query,
            body,
            peer,
        };

        let caller = self.resolver.resolve(route.auth, &context).await?;

        let identity = &caller.identity;
        if let Decision::Deny(denial) =
            self.admission
                .admit(identity, route.timeout_hint, identity.uses_address_policy())
        {
            warn!(
                route = %route.name,
                identity = %identity,
                reason = denial.reason.as_str(),
                retry_after = ?denial.retry_after,
                "request rate limited"
            );
            return Err(GatewayError::RateLimited(denial));
        }

        self.run_guarded(route, context, caller).await
    }

    // The handler runs in its own task so a panic or an overrun never
    // reaches the connection; a result arriving after the deadline is dropped.
    async fn run_guarded(&self, route: &Route, context: RequestContext, caller: Caller) -> Result<Response, GatewayError> {
        let handler = Arc::clone(&route.handler);
        let started = Instant::now();
        let mut task = tokio::spawn(async move { handler.handle(context, caller).await });

        let outcome = tokio::time::timeout(self.request_timeout, &mut task).await;
        HANDLER_LATENCY.observe(started.elapsed().as_secs_f64());

        match outcome {
            Err(_) => {
                task.abort();
                HANDLER_TIMEOUTS.inc();
                error!(route = %route.name, timeout = ?self.request_timeout, "handler timed out");
                Err(GatewayError::HandlerTimeout)
            }
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(err))) => {
                error!(route = %route.name, error = %err, "handler failed");
                Err(GatewayError::Internal(err.to_string()))
            }
            Ok(Err(join_err)) => {
                let message = panic_message(join_err);
                error!(route = %route.name, error = %message, "handler panicked");
                Err(GatewayError::Internal(message))
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string()),
        Err(err) => err.to_string(),
    }
}
