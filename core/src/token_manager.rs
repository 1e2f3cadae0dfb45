//! High level credential manager that wires the SQLite-backed settings and
//! trust stores to the validator.
//!
//! UI surfaces talk to this type only: they hand it a token to validate,
//! read back per-provider status, and ask for the token of the active model
//! without caring where trust flags are persisted.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use crate::db::DbPool;
use crate::logging::SqliteEventLog;
use crate::providers::Provider;
use crate::settings::{SettingsStore, SqliteSettingsStore};
use crate::trust::{CredentialKey, SqliteTrustStore, TrustStore};
use crate::validation::{
    HttpProbeExecutor, ProbeExecutor, TokenValidator, ValidationSnapshot, ValidationStatus,
    ValidatorConfig,
};

pub struct TokenManager {
    pool: DbPool,
    settings: Arc<SqliteSettingsStore>,
    trust: Arc<SqliteTrustStore>,
    validator: TokenValidator,
}

impl TokenManager {
    /// Construct a manager that probes providers over HTTPS.
    pub fn open(pool: DbPool, config: ValidatorConfig) -> Result<Arc<Self>> {
        let executor = Arc::new(HttpProbeExecutor::new()?);
        Ok(Self::new(pool, executor, config))
    }

    /// Construct a manager with a caller supplied probe executor.
    pub fn new(
        pool: DbPool,
        executor: Arc<dyn ProbeExecutor>,
        config: ValidatorConfig,
    ) -> Arc<Self> {
        let settings = Arc::new(SqliteSettingsStore::new(pool.clone()));
        let trust = Arc::new(SqliteTrustStore::new(pool.clone()));
        let validator = TokenValidator::new(executor, settings.clone(), trust.clone())
            .with_events(Arc::new(SqliteEventLog::new(pool.clone())))
            .with_config(config);
        Arc::new(Self {
            pool,
            settings,
            trust,
            validator,
        })
    }

    /// Return a clone of the underlying connection pool.
    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }

    pub fn settings(&self) -> &SqliteSettingsStore {
        &self.settings
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Probe `token` for `provider` and persist the outcome.
    pub async fn validate_token(&self, provider: Provider, token: &str) -> ValidationStatus {
        self.validator.validate(provider, token).await
    }

    pub fn status(&self, provider: Provider) -> ValidationStatus {
        self.validator.status(provider)
    }

    pub fn snapshot(&self) -> ValidationSnapshot {
        self.validator.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ValidationSnapshot> {
        self.validator.subscribe()
    }

    pub async fn is_credential_usable(&self, key: impl Into<CredentialKey>) -> bool {
        self.validator.is_credential_usable(key).await
    }

    /// Save a token without probing it. It stays unusable until validated.
    pub async fn store_token(&self, key: impl Into<CredentialKey>, token: &str) -> Result<()> {
        self.trust.store_credential(&key.into(), token).await
    }

    /// Token of the active model, only if it passed validation. For a custom
    /// provider the token must have been validated against the active
    /// model's named configuration.
    pub async fn token_for_active_model(&self) -> Result<Option<String>> {
        match self.settings.active_model().await? {
            Some(active) => self.trust.trusted_credential(&active.credential_key()).await,
            None => Ok(None),
        }
    }

    /// Re-run validation for every stored token, e.g. on startup after a
    /// restart reset the in-memory status table.
    pub async fn revalidate_stored(&self) -> Result<Vec<(CredentialKey, ValidationStatus)>> {
        let mut results = Vec::new();
        for provider in Provider::ALL.into_iter().filter(|p| !p.is_custom()) {
            let key = CredentialKey::from(provider);
            if let Some(token) = self.trust.stored_credential(&key).await? {
                let status = self.validator.validate(provider, &token).await;
                results.push((key, status));
            }
        }
        for config in self.settings.list_custom_providers().await? {
            let key = CredentialKey::custom(&config.name);
            if let Some(token) = self.trust.stored_credential(&key).await? {
                let status = self.validator.validate_custom(&config.name, &token).await;
                results.push((key, status));
            }
        }
        Ok(results)
    }
}
