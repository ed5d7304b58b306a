use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::accounts::{Account, AccountStore};
use crate::error::GatewayError;
use crate::routes::{AuthMode, RequestContext};
use crate::token::TokenService;

pub const FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IdentityKind {
    /// Account email taken from a verified bearer token.
    Token,
    /// Lowercased email from a credential pair.
    Credential,
    /// Caller network address.
    Address,
}

/// Normalized caller key used to index admission state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    kind: IdentityKind,
    key: String,
}

impl Identity {
    pub fn new(kind: IdentityKind, key: impl Into<String>) -> Self {
        Self { kind, key: key.into() }
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn uses_address_policy(&self) -> bool {
        self.kind == IdentityKind::Address
    }

    // Short hash for logs, so emails and addresses never show up raw
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..12].to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.fingerprint())
    }
}

/// Resolved caller handed to route handlers.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: Identity,
    pub account: Option<Account>,
}

/// Second word of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .split_whitespace()
        .nth(1)
}

/// Forwarded client address if present, else the peer address.
pub fn caller_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(addr) => Some(addr.to_string()),
        None => peer.map(|p| p.ip().to_string()),
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<TokenService>,
}

impl IdentityResolver {
    pub fn new(accounts: Arc<dyn AccountStore>, tokens: Arc<TokenService>) -> Self {
        Self { accounts, tokens }
    }

    pub async fn resolve(&self, mode: AuthMode, request: &RequestContext) -> Result<Caller, GatewayError> {
        match mode {
            AuthMode::Token => self.from_token(request).await,
            AuthMode::CredentialPair => self.from_credentials(request).await,
            AuthMode::None => {
                let addr = caller_address(&request.headers, request.peer).ok_or(GatewayError::AddressUnavailable)?;
                Ok(Caller {
                    identity: Identity::new(IdentityKind::Address, addr),
                    account: None,
                })
            }
        }
    }

    async fn from_token(&self, request: &RequestContext) -> Result<Caller, GatewayError> {
        let token = bearer_token(&request.headers).ok_or(GatewayError::AuthMissing)?;

        let email = self.tokens.verify(token).map_err(|e| {
            debug!(error = %e, "token verification failed");
            GatewayError::AuthInvalid
        })?;

        // a valid token for a vanished account looks like any other bad token
        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(GatewayError::AuthInvalid)?;

        Ok(Caller {
            identity: Identity::new(IdentityKind::Token, account.email.clone()),
            account: Some(account),
        })
    }

    async fn from_credentials(&self, request: &RequestContext) -> Result<Caller, GatewayError> {
        let (email, password) = request.credentials().ok_or(GatewayError::MissingCredentials)?;

        let account = self
            .accounts
            .find_by_credentials(email, password)
            .await?
            .ok_or(GatewayError::InvalidCredentials)?;

        Ok(Caller {
            identity: Identity::new(IdentityKind::Credential, email.to_lowercase()),
            account: Some(account),
        })
    }
}
