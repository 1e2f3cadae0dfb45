//! Durable trust flags and the credential gate.
//!
//! A provider's stored credential is only handed out while its trust flag is
//! set; the flag is written by the validator after every completed probe.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use rusqlite::{params, OptionalExtension};
use time::OffsetDateTime;

use crate::db::{with_conn, DbPool};
use crate::providers::Provider;

/// Identifies one stored credential and its trust flag.
///
/// Built-in providers have a single slot each. Custom credentials are scoped
/// to the named configuration they were validated against, so a token proven
/// for one custom endpoint is never served for another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialKey {
    provider: Provider,
    custom_name: Option<String>,
}

impl CredentialKey {
    /// `custom_name` is ignored for built-in providers; blank names count as absent.
    pub fn new(provider: Provider, custom_name: Option<&str>) -> Self {
        let custom_name = custom_name
            .filter(|_| provider.is_custom())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        Self {
            provider,
            custom_name,
        }
    }

    pub fn custom(name: &str) -> Self {
        Self::new(Provider::Custom, Some(name))
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn custom_name(&self) -> Option<&str> {
        self.custom_name.as_deref()
    }

    /// Row key in `credentials` and `trust_flags`: the provider id, or
    /// `custom:<name>` for a named custom configuration.
    pub fn storage_id(&self) -> String {
        match &self.custom_name {
            Some(name) => format!("{}:{name}", self.provider.id()),
            None => self.provider.id().to_string(),
        }
    }
}

impl From<Provider> for CredentialKey {
    fn from(provider: Provider) -> Self {
        Self::new(provider, None)
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_id())
    }
}

#[async_trait]
pub trait TrustStore: Send + Sync {
    async fn set_trust_flag(&self, key: &CredentialKey, value: bool) -> Result<()>;

    /// `false` when never written.
    async fn trust_flag(&self, key: &CredentialKey) -> Result<bool>;

    /// Replacing the credential with a different value clears the flag.
    async fn store_credential(&self, key: &CredentialKey, credential: &str) -> Result<()>;

    async fn stored_credential(&self, key: &CredentialKey) -> Result<Option<String>>;

    /// Persist the validated credential together with its outcome.
    async fn record_validation(
        &self,
        key: &CredentialKey,
        credential: &str,
        trusted: bool,
    ) -> Result<()>;

    /// The stored credential, only if its trust flag is set.
    async fn trusted_credential(&self, key: &CredentialKey) -> Result<Option<String>> {
        if !self.trust_flag(key).await? {
            return Ok(None);
        }
        self.stored_credential(key).await
    }
}

/// [`TrustStore`] over the `trust_flags` and `credentials` tables.
#[derive(Clone)]
pub struct SqliteTrustStore {
    pool: DbPool,
}

impl SqliteTrustStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrustStore for SqliteTrustStore {
    async fn set_trust_flag(&self, key: &CredentialKey, value: bool) -> Result<()> {
        let id = key.storage_id();
        with_conn(&self.pool, move |conn| write_flag(conn, &id, value)).await
    }

    async fn trust_flag(&self, key: &CredentialKey) -> Result<bool> {
        let id = key.storage_id();
        with_conn(&self.pool, move |conn| read_flag(conn, &id)).await
    }

    async fn store_credential(&self, key: &CredentialKey, credential: &str) -> Result<()> {
        let id = key.storage_id();
        let credential = credential.trim().to_string();
        with_conn(&self.pool, move |conn| {
            let tx = conn.unchecked_transaction()?;
            let previous = load_secret(&tx, &id)?;
            if previous.as_deref() != Some(credential.as_str()) {
                write_flag(&tx, &id, false)?;
            }
            if credential.is_empty() {
                tx.execute("DELETE FROM credentials WHERE provider_id = ?1", params![id])?;
            } else {
                save_secret(&tx, &id, &credential)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn stored_credential(&self, key: &CredentialKey) -> Result<Option<String>> {
        let id = key.storage_id();
        with_conn(&self.pool, move |conn| load_secret(conn, &id)).await
    }

    async fn record_validation(
        &self,
        key: &CredentialKey,
        credential: &str,
        trusted: bool,
    ) -> Result<()> {
        let id = key.storage_id();
        let credential = credential.trim().to_string();
        with_conn(&self.pool, move |conn| {
            let tx = conn.unchecked_transaction()?;
            save_secret(&tx, &id, &credential)?;
            write_flag(&tx, &id, trusted)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn trusted_credential(&self, key: &CredentialKey) -> Result<Option<String>> {
        let id = key.storage_id();
        with_conn(&self.pool, move |conn| {
            let secret: Option<String> = conn
                .query_row(
                    "SELECT c.secret FROM credentials c
                     JOIN trust_flags f ON f.provider_id = c.provider_id
                     WHERE c.provider_id = ?1 AND f.trusted = 1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            secret.map(|s| decode_secret(&s)).transpose()
        })
        .await
    }
}

fn read_flag(conn: &rusqlite::Connection, id: &str) -> Result<bool> {
    let trusted: Option<i64> = conn
        .query_row(
            "SELECT trusted FROM trust_flags WHERE provider_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(trusted.unwrap_or(0) != 0)
}

fn write_flag(conn: &rusqlite::Connection, id: &str, value: bool) -> Result<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO trust_flags (provider_id, trusted, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(provider_id) DO UPDATE SET trusted = excluded.trusted, updated_at = excluded.updated_at",
        params![id, value as i32, now],
    )?;
    Ok(())
}

fn save_secret(conn: &rusqlite::Connection, id: &str, secret: &str) -> Result<()> {
    let encoded = B64_ENGINE.encode(secret.as_bytes());
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO credentials (provider_id, secret, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(provider_id) DO UPDATE SET secret = excluded.secret, updated_at = excluded.updated_at",
        params![id, encoded, now],
    )?;
    Ok(())
}

fn load_secret(conn: &rusqlite::Connection, id: &str) -> Result<Option<String>> {
    let secret: Option<String> = conn
        .query_row(
            "SELECT secret FROM credentials WHERE provider_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    secret.map(|s| decode_secret(&s)).transpose()
}

fn decode_secret(encoded: &str) -> Result<String> {
    let decoded = B64_ENGINE
        .decode(encoded.as_bytes())
        .map_err(|_| anyhow!("Failed to decode stored credential"))?;
    String::from_utf8(decoded).map_err(|_| anyhow!("Stored credential was not valid UTF-8"))
}
