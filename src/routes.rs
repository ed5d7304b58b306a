use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use serde_json::Value;

use crate::error::GatewayError;
use crate::identity::Caller;

/// How a route identifies its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Public route, keyed by caller address.
    None,
    /// `Authorization: Bearer <token>`.
    Token,
    /// `email` + `password` from the query or JSON body.
    CredentialPair,
}

/// Buffered request as seen by identity resolution and handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Value,
    pub peer: Option<SocketAddr>,
}

impl RequestContext {
    /// `email` and `password`, from the query when it carries an email,
    /// otherwise from the body. `None` if either is missing or empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let (email, password) = if self.query.contains_key("email") {
            (
                self.query.get("email").map(String::as_str),
                self.query.get("password").map(String::as_str),
            )
        } else {
            (
                self.body.get("email").and_then(Value::as_str),
                self.body.get("password").and_then(Value::as_str),
            )
        };
        match (email, password) {
            (Some(e), Some(p)) if !e.is_empty() && !p.is_empty() => Some((e, p)),
            _ => None,
        }
    }
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Business logic behind a route. Errors become a 500 carrying their message.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: RequestContext, caller: Caller) -> Result<Response, HandlerError>;
}

#[derive(Clone)]
pub struct Route {
    pub name: String,
    pub path: String,
    pub method: Method,
    pub auth: AuthMode,
    /// Spacing threshold for identified callers on this route.
    pub timeout_hint: Option<Duration>,
    pub handler: Arc<dyn RouteHandler>,
}

impl Route {
    pub fn new(name: &str, method: Method, path: &str, handler: Arc<dyn RouteHandler>) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            method,
            auth: AuthMode::None,
            timeout_hint: None,
            handler,
        }
    }

    pub fn auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    pub fn timeout_hint_ms(mut self, millis: u64) -> Self {
        self.timeout_hint = Some(Duration::from_millis(millis));
        self
    }
}

/// Routes keyed by path, one method per path.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route, replacing any previous route on the same path.
    pub fn register(&mut self, route: Route) -> &mut Self {
        tracing::info!(route = %route.name, method = %route.method, path = %route.path, "route loaded");
        self.routes.insert(route.path.clone(), route);
        self
    }

    pub fn lookup(&self, path: &str, method: &Method) -> Result<&Route, GatewayError> {
        let route = self.routes.get(path).ok_or(GatewayError::RouteNotFound)?;
        if !route.method.as_str().eq_ignore_ascii_case(method.as_str()) {
            return Err(GatewayError::MethodNotAllowed);
        }
        Ok(route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl RouteHandler for Noop {
        async fn handle(&self, _request: RequestContext, _caller: Caller) -> Result<Response, HandlerError> {
            Ok(().into_response())
        }
    }

    fn table() -> RouteTable {
        let mut table = RouteTable::new();
        table.register(Route::new("login", Method::GET, "/login", Arc::new(Noop)).auth(AuthMode::CredentialPair));
        table
    }

    #[test]
    fn lookup_distinguishes_missing_path_from_wrong_method() {
        let table = table();
        assert!(table.lookup("/login", &Method::GET).is_ok());
        assert!(matches!(table.lookup("/nope", &Method::GET), Err(GatewayError::RouteNotFound)));
        assert!(matches!(
            table.lookup("/login", &Method::POST),
            Err(GatewayError::MethodNotAllowed)
        ));
    }

    #[test]
    fn builder_sets_hint_and_auth() {
        let route = Route::new("x", Method::POST, "/x", Arc::new(Noop))
            .auth(AuthMode::Token)
            .timeout_hint_ms(1000);
        assert_eq!(route.auth, AuthMode::Token);
        assert_eq!(route.timeout_hint, Some(Duration::from_millis(1000)));
    }

    #[test]
    fn credentials_from_query_or_body() {
        let mut req = RequestContext {
            method: Method::GET,
            path: "/login".into(),
            headers: HeaderMap::new(),
            query: HashMap::new(),
            body: json!({"email": "b@x.com", "password": "pw"}),
            peer: None,
        };
        assert_eq!(req.credentials(), Some(("b@x.com", "pw")));

        // query wins once it names an email, even without a password
        req.query.insert("email".into(), "q@x.com".into());
        assert_eq!(req.credentials(), None);

        req.query.insert("password".into(), "qpw".into());
        assert_eq!(req.credentials(), Some(("q@x.com", "qpw")));
    }
}
