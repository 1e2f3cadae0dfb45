//! Application configuration read by the validator: which model is active,
//! which custom providers exist, and whether the app runs local or remote
//! models. Persisted as rows in `app_settings` and `custom_providers`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::{with_conn, DbPool};
use crate::logging::log_event;
use crate::providers::Provider;
use crate::trust::CredentialKey;

const ACTIVE_KEY: &str = "ai.active";
const MODE_KEY: &str = "ai.mode";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    Local,
    #[default]
    Remote,
}

impl OperatingMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// The remote model the application currently uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveModel {
    #[serde(rename = "provider_id")]
    pub provider: Provider,
    #[serde(default)]
    pub model: Option<String>,
    /// Names the [`CustomProviderConfig`] when `provider` is custom.
    #[serde(default)]
    pub custom_provider_name: Option<String>,
}

impl ActiveModel {
    /// The credential slot this model draws its token from.
    pub fn credential_key(&self) -> CredentialKey {
        CredentialKey::new(self.provider, self.custom_provider_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomProviderConfig {
    pub name: String,
    pub base_url: String,
}

/// Read-only view of the configuration the validator depends on.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn active_model(&self) -> Result<Option<ActiveModel>>;
    async fn custom_provider(&self, name: &str) -> Result<Option<CustomProviderConfig>>;
    async fn operating_mode(&self) -> Result<OperatingMode>;
}

/// [`SettingsStore`] backed by the SQLite settings tables.
#[derive(Clone)]
pub struct SqliteSettingsStore {
    pool: DbPool,
}

impl SqliteSettingsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn set_active_model(&self, active: ActiveModel) -> Result<()> {
        with_conn(&self.pool, move |conn| {
            set_active_model(conn, &active)?;
            audit_settings_change(conn, "active model changed");
            Ok(())
        })
        .await
    }

    pub async fn set_operating_mode(&self, mode: OperatingMode) -> Result<()> {
        with_conn(&self.pool, move |conn| set_operating_mode(conn, mode)).await
    }

    pub async fn upsert_custom_provider(&self, config: CustomProviderConfig) -> Result<()> {
        with_conn(&self.pool, move |conn| {
            upsert_custom_provider(conn, &config)?;
            audit_settings_change(conn, "custom provider saved");
            Ok(())
        })
        .await
    }

    pub async fn remove_custom_provider(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        with_conn(&self.pool, move |conn| remove_custom_provider(conn, &name)).await
    }

    pub async fn list_custom_providers(&self) -> Result<Vec<CustomProviderConfig>> {
        with_conn(&self.pool, list_custom_providers).await
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn active_model(&self) -> Result<Option<ActiveModel>> {
        with_conn(&self.pool, read_active_model).await
    }

    async fn custom_provider(&self, name: &str) -> Result<Option<CustomProviderConfig>> {
        let name = name.to_string();
        with_conn(&self.pool, move |conn| get_custom_provider(conn, &name)).await
    }

    async fn operating_mode(&self) -> Result<OperatingMode> {
        with_conn(&self.pool, read_operating_mode).await
    }
}

pub fn read_active_model(conn: &rusqlite::Connection) -> Result<Option<ActiveModel>> {
    let value = read_setting(conn, ACTIVE_KEY)?;
    match value {
        Some(raw) => {
            let active = serde_json::from_str(&raw)
                .map_err(|err| anyhow!("Malformed active model setting: {err}"))?;
            Ok(Some(active))
        }
        None => Ok(None),
    }
}

pub fn set_active_model(conn: &rusqlite::Connection, active: &ActiveModel) -> Result<()> {
    write_setting(conn, ACTIVE_KEY, &serde_json::to_string(active)?)
}

pub fn read_operating_mode(conn: &rusqlite::Connection) -> Result<OperatingMode> {
    match read_setting(conn, MODE_KEY)?.as_deref() {
        Some("local") => Ok(OperatingMode::Local),
        Some("remote") | None => Ok(OperatingMode::Remote),
        Some(other) => Err(anyhow!("Unknown operating mode: {other}")),
    }
}

pub fn set_operating_mode(conn: &rusqlite::Connection, mode: OperatingMode) -> Result<()> {
    write_setting(conn, MODE_KEY, mode.as_str())
}

pub fn get_custom_provider(
    conn: &rusqlite::Connection,
    name: &str,
) -> Result<Option<CustomProviderConfig>> {
    let config = conn
        .query_row(
            "SELECT name, base_url FROM custom_providers WHERE name = ?1",
            params![name],
            |row| {
                Ok(CustomProviderConfig {
                    name: row.get(0)?,
                    base_url: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(config)
}

pub fn upsert_custom_provider(
    conn: &rusqlite::Connection,
    config: &CustomProviderConfig,
) -> Result<()> {
    let name = config.name.trim();
    if name.is_empty() {
        return Err(anyhow!("Custom provider name must not be empty"));
    }
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO custom_providers (name, base_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(name) DO UPDATE SET base_url = excluded.base_url, updated_at = excluded.updated_at",
        params![name, config.base_url.trim(), now],
    )?;
    Ok(())
}

pub fn remove_custom_provider(conn: &rusqlite::Connection, name: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM custom_providers WHERE name = ?1", params![name])?;
    Ok(removed > 0)
}

pub fn list_custom_providers(conn: &rusqlite::Connection) -> Result<Vec<CustomProviderConfig>> {
    let mut stmt = conn.prepare("SELECT name, base_url FROM custom_providers ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(CustomProviderConfig {
            name: row.get(0)?,
            base_url: row.get(1)?,
        })
    })?;

    let mut providers = Vec::new();
    for row in rows {
        providers.push(row?);
    }
    Ok(providers)
}

fn read_setting(conn: &rusqlite::Connection, key: &str) -> Result<Option<String>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM app_settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn write_setting(conn: &rusqlite::Connection, key: &str, value: &str) -> Result<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now],
    )?;
    Ok(())
}

fn audit_settings_change(conn: &rusqlite::Connection, message: &str) {
    let _ = log_event(
        conn,
        "info",
        Some("CFG-0001"),
        "token.settings",
        message,
        Some("Validation configuration updated"),
        None,
    );
}
