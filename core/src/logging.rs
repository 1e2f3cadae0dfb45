use r2d2_sqlite::rusqlite::{params, Connection};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::DbPool;

pub fn log_event(
    conn: &Connection,
    level: &str,
    code: Option<&str>,
    module: &str,
    message: &str,
    explain: Option<&str>,
    data: Option<Value>,
) -> rusqlite::Result<()> {
    let id = Uuid::new_v4().to_string();
    let ts = OffsetDateTime::now_utc().unix_timestamp();
    let data_str = data.map(|v| v.to_string());
    conn.execute(
        "INSERT INTO event_log (id, ts, level, code, module, message, explain, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![id, ts, level, code, module, message, explain, data_str],
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// A diagnostic the validator wants recorded.
#[derive(Debug, Clone)]
pub struct Event {
    pub level: EventLevel,
    pub code: Option<&'static str>,
    pub module: &'static str,
    pub message: String,
    pub explain: Option<&'static str>,
    pub data: Option<Value>,
}

/// Observability hook for conditions that must not be swallowed.
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

/// Mirrors events to the `log` facade and persists them to `event_log`.
///
/// The insert runs on the caller's thread before `record` returns, so no
/// event is lost when the runtime shuts down right after a validation.
#[derive(Clone)]
pub struct SqliteEventLog {
    pool: DbPool,
}

impl SqliteEventLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EventSink for SqliteEventLog {
    fn record(&self, event: Event) {
        emit_log(&event);
        let conn = match self.pool.get() {
            Ok(conn) => conn,
            Err(err) => {
                log::error!("event log unavailable, dropped [{:?}]: {err}", event.code);
                return;
            }
        };
        if let Err(err) = log_event(
            &conn,
            event.level.as_str(),
            event.code,
            event.module,
            &event.message,
            event.explain,
            event.data,
        ) {
            log::error!("failed to persist event log entry: {err}");
        }
    }
}

/// Sink that only forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn record(&self, event: Event) {
        emit_log(&event);
    }
}

fn emit_log(event: &Event) {
    let code = event.code.unwrap_or("-");
    match event.level {
        EventLevel::Info => log::info!(target: event.module, "[{code}] {}", event.message),
        EventLevel::Warn => log::warn!(target: event.module, "[{code}] {}", event.message),
        EventLevel::Error => log::error!(target: event.module, "[{code}] {}", event.message),
    }
}

/// Short stable identifier for a credential, safe to write to logs.
pub fn credential_fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    format!("{:x}", digest)[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;

    #[test]
    fn fingerprint_hides_secret() {
        let fp = credential_fingerprint("sk-live-123");
        assert_eq!(fp.len(), 12);
        assert!(!fp.contains("sk-live"));
        assert_eq!(fp, credential_fingerprint("sk-live-123"));
        assert_ne!(fp, credential_fingerprint("sk-live-124"));
    }

    #[test]
    fn sqlite_sink_writes_outside_runtime() {
        let pool = init_memory_db().unwrap();
        let sink = SqliteEventLog::new(pool.clone());
        sink.record(Event {
            level: EventLevel::Warn,
            code: Some("TKN-0300"),
            module: "token.validation",
            message: "indicator not updated".into(),
            explain: None,
            data: Some(serde_json::json!({ "provider": "openai" })),
        });
        let conn = pool.get().unwrap();
        let (code, level): (String, String) = conn
            .query_row("SELECT code, level FROM event_log", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(code, "TKN-0300");
        assert_eq!(level, "warn");
    }

    #[tokio::test]
    async fn sqlite_sink_persists_before_returning_inside_runtime() {
        let pool = init_memory_db().unwrap();
        let sink = SqliteEventLog::new(pool.clone());
        sink.record(Event {
            level: EventLevel::Error,
            code: Some("TKN-0500"),
            module: "token.validation",
            message: "failed to persist trust flag".into(),
            explain: None,
            data: None,
        });
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM event_log WHERE code = 'TKN-0500'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
