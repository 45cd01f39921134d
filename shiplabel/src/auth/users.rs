//! Credential lookup.
//!
//! Handlers never reach for a process-wide user list; they go through the [`UserLookup`]
//! capability carried in the application state, so tests can hand in whatever accounts they need.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, instrument};

use crate::{
    auth::password::{self, Argon2Params},
    config::Config,
    errors::Error,
};

/// Stored credentials for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    /// Argon2 hash in PHC string format
    pub password_hash: String,
}

#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Find the credentials for `username`, if the account exists.
    async fn find_by_username(&self, username: &str) -> Option<CredentialRecord>;
}

/// Accounts held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryUsers {
    users: DashMap<String, CredentialRecord>,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account.
    pub fn insert(&self, record: CredentialRecord) {
        self.users.insert(record.username.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Build the account list from configuration.
    ///
    /// Accounts listed under `users` are taken as-is. When `admin_password` is set, the admin
    /// account is hashed with the configured Argon2 parameters and replaces any listed account of
    /// the same name.
    #[instrument(skip_all)]
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let users = Self::new();
        for account in &config.users {
            users.insert(CredentialRecord {
                username: account.username.clone(),
                password_hash: account.password_hash.clone(),
            });
        }

        if let Some(admin_password) = config.admin_password.clone() {
            let params = Argon2Params::from(config.auth.password.clone());
            let password_hash = tokio::task::spawn_blocking(move || password::hash_string_with_params(&admin_password, params))
                .await
                .map_err(|e| Error::Internal {
                    operation: format!("spawn password hashing task: {e}"),
                })??;

            users.insert(CredentialRecord {
                username: config.admin_username.clone(),
                password_hash,
            });
            info!("Seeded admin account '{}'", config.admin_username);
        }

        info!("Loaded {} user account(s)", users.len());
        Ok(users)
    }
}

#[async_trait]
impl UserLookup for InMemoryUsers {
    async fn find_by_username(&self, username: &str) -> Option<CredentialRecord> {
        self.users.get(username).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{fast_params, verify_string};
    use crate::config::UserAccount;

    fn fast_config() -> Config {
        let mut config = Config {
            secret_key: Some("key".to_string()),
            ..Default::default()
        };
        config.auth.password.argon2_memory_kib = 1024;
        config.auth.password.argon2_iterations = 1;
        config
    }

    #[tokio::test]
    async fn test_find_by_username() {
        let users = InMemoryUsers::new();
        users.insert(CredentialRecord {
            username: "dispatch".to_string(),
            password_hash: "hash".to_string(),
        });

        let found = users.find_by_username("dispatch").await.unwrap();
        assert_eq!(found.password_hash, "hash");
        assert!(users.find_by_username("Dispatch").await.is_none());
        assert!(users.find_by_username("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_from_config_without_admin_password() {
        let mut config = fast_config();
        config.users = vec![UserAccount {
            username: "clerk".to_string(),
            password_hash: password::hash_string_with_params("clerk-pass", fast_params()).unwrap(),
        }];

        let users = InMemoryUsers::from_config(&config).await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users.find_by_username("admin").await.is_none());

        let clerk = users.find_by_username("clerk").await.unwrap();
        assert!(verify_string("clerk-pass", &clerk.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_from_config_seeds_admin() {
        let mut config = fast_config();
        config.admin_username = "root".to_string();
        config.admin_password = Some("hunter2".to_string());
        config.users = vec![UserAccount {
            username: "root".to_string(),
            password_hash: "stale".to_string(),
        }];

        let users = InMemoryUsers::from_config(&config).await.unwrap();
        assert_eq!(users.len(), 1);

        let admin = users.find_by_username("root").await.unwrap();
        assert_ne!(admin.password_hash, "stale");
        assert!(verify_string("hunter2", &admin.password_hash).unwrap());
    }
}
