use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid accounts file: {0}")]
    Parse(#[from] serde_json::Error),
}

// Account record as stored by the payments service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub email: String,
    // plaintext, compared by equality. Should become a salted hash.
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub affiliations: Vec<String>,
    #[serde(default)]
    pub affiliate: Option<String>,
    #[serde(default)]
    pub balance: Decimal,
}

impl Account {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_lowercase(),
            password: password.to_string(),
            user: None,
            affiliations: Vec::new(),
            affiliate: None,
            balance: Decimal::ZERO,
        }
    }
}

/// Account lookups used by identity resolution.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
    /// `email` is matched lowercased, `password` by exact equality.
    async fn find_by_credentials(&self, email: &str, password: &str) -> Result<Option<Account>, StoreError>;
    async fn insert(&self, account: Account) -> Result<(), StoreError>;
}

/// Accounts kept in memory, keyed by lowercased email.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<DashMap<String, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store from a JSON array of accounts.
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)?;
        let accounts: Vec<Account> = serde_json::from_str(&raw)?;
        let store = Self::new();
        for mut account in accounts {
            account.email = account.email.to_lowercase();
            store.accounts.insert(account.email.clone(), account);
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(email).map(|a| a.clone()))
    }

    async fn find_by_credentials(&self, email: &str, password: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .get(&email.to_lowercase())
            .filter(|a| a.password == password)
            .map(|a| a.clone()))
    }

    async fn insert(&self, mut account: Account) -> Result<(), StoreError> {
        account.email = account.email.to_lowercase();
        self.accounts.insert(account.email.clone(), account);
        Ok(())
    }
}
