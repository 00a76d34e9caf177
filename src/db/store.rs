//! SQLite-backed store for targets, check results, and idempotency keys.

use std::path::Path;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqlResult, ToSql};
use thiserror::Error;
use uuid::Uuid;

use super::models::*;

/// Store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration error: {0}")]
    Migration(String),
}

/// Cursor for resuming a target listing: the `(created_at, id)` pair of the
/// last row already returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: String,
}

/// Thread-safe store over a single SQLite connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at the given path and apply the schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(())
    }

    // --- Targets ---

    /// Register a target, deduplicating on canonical URL and honoring a
    /// client-supplied idempotency key. Returns the target and whether it was
    /// newly created. The whole decision runs in one transaction:
    ///
    /// 1. An existing target with this canonical URL wins; a fresh
    ///    idempotency key is bound to it.
    /// 2. Otherwise an already-recorded idempotency key returns the target it
    ///    was first recorded against, even for a different URL.
    /// 3. Otherwise a new target is inserted.
    pub fn create_target(
        &self,
        original_url: &str,
        canonical_url: &str,
        host: &str,
        idempotency_key: Option<&str>,
    ) -> Result<(Target, bool), StoreError> {
        let id = generate_target_id();
        let now = Utc::now();

        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let existing = tx
            .query_row(
                "SELECT id, url, created_at FROM targets WHERE canonical_url = ?1",
                params![canonical_url],
                row_to_target,
            )
            .optional()?;
        if let Some(target) = existing {
            if let Some(key) = idempotency_key {
                tx.execute(
                    "INSERT OR IGNORE INTO idempotency_keys (key, target_id, created_at) VALUES (?1, ?2, ?3)",
                    params![key, target.id, fmt_ts(&now)],
                )?;
            }
            tx.commit()?;
            return Ok((target, false));
        }

        if let Some(key) = idempotency_key {
            let recorded: Option<String> = tx
                .query_row(
                    "SELECT target_id FROM idempotency_keys WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(target_id) = recorded {
                let target = tx.query_row(
                    "SELECT id, url, created_at FROM targets WHERE id = ?1",
                    params![target_id],
                    row_to_target,
                )?;
                tx.commit()?;
                return Ok((target, false));
            }
        }

        tx.execute(
            "INSERT INTO targets (id, url, canonical_url, host, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, original_url, canonical_url, host, fmt_ts(&now)],
        )?;
        if let Some(key) = idempotency_key {
            tx.execute(
                "INSERT INTO idempotency_keys (key, target_id, created_at) VALUES (?1, ?2, ?3)",
                params![key, id, fmt_ts(&now)],
            )?;
        }
        tx.commit()?;

        Ok((
            Target {
                id,
                url: original_url.to_string(),
                created_at: now,
            },
            true,
        ))
    }

    /// List targets in `(created_at, id)` order, optionally filtered to one
    /// host, resuming after `cursor`. Fetches one row past `limit` to decide
    /// whether a next page exists.
    pub fn list_targets(
        &self,
        host: Option<&str>,
        limit: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<TargetPage, StoreError> {
        let mut sql = String::from("SELECT id, url, created_at FROM targets");
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(host) = host {
            clauses.push("host = ?");
            args.push(Box::new(host.to_lowercase()));
        }
        if let Some(cursor) = cursor {
            clauses.push("(created_at > ? OR (created_at = ? AND id > ?))");
            let ts = fmt_ts(&cursor.created_at);
            args.push(Box::new(ts.clone()));
            args.push(Box::new(ts));
            args.push(Box::new(cursor.id.clone()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at, id LIMIT ?");
        args.push(Box::new((limit + 1) as i64));

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let mut items = stmt
            .query_map(params_from_iter(args.iter().map(|a| a.as_ref())), row_to_target)?
            .collect::<SqlResult<Vec<_>>>()?;

        let mut next_page_token = None;
        if items.len() > limit {
            items.truncate(limit);
            if let Some(last) = items.last() {
                next_page_token = Some(encode_page_token(&last.created_at, &last.id));
            }
        }

        Ok(TargetPage {
            items,
            next_page_token,
        })
    }

    /// Full snapshot of the registry for the scheduler.
    pub fn get_all_targets(&self) -> Result<Vec<Target>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, url, created_at FROM targets ORDER BY created_at, id")?;
        let targets = stmt
            .query_map([], row_to_target)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(targets)
    }

    // --- Check results ---

    /// Append one probe outcome for a target.
    pub fn save_check_result(&self, target_id: &str, result: &CheckResult) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO check_results (target_id, checked_at, status_code, latency_ms, error) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                target_id,
                fmt_ts(&result.checked_at),
                result.status_code,
                result.latency_ms,
                result.error,
            ],
        )?;
        Ok(())
    }

    /// Probe history for a target, most recent first. `since` is inclusive.
    pub fn get_check_results(
        &self,
        target_id: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<CheckResult>, StoreError> {
        let mut sql = String::from(
            "SELECT checked_at, status_code, latency_ms, error FROM check_results WHERE target_id = ?",
        );
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(target_id.to_string())];
        if let Some(since) = since {
            sql.push_str(" AND checked_at >= ?");
            args.push(Box::new(fmt_ts(&since)));
        }
        sql.push_str(" ORDER BY checked_at DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let results = stmt
            .query_map(params_from_iter(args.iter().map(|a| a.as_ref())), |row| {
                let checked_at: String = row.get(0)?;
                let status_code: Option<i64> = row.get(1)?;
                Ok(CheckResult {
                    checked_at: parse_ts(&checked_at).unwrap_or_else(Utc::now),
                    status_code: status_code.map(|c| c as u16),
                    latency_ms: row.get(2)?,
                    error: row.get(3)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(results)
    }

    // --- Idempotency keys ---

    /// Delete idempotency records older than the cutoff; returns the number
    /// removed. Exposed for a future maintenance task.
    pub fn cleanup_old_idempotency_keys(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM idempotency_keys WHERE created_at < ?1",
            params![fmt_ts(&older_than)],
        )?;
        Ok(deleted)
    }
}

fn row_to_target(row: &rusqlite::Row<'_>) -> SqlResult<Target> {
    let created_at: String = row.get(2)?;
    Ok(Target {
        id: row.get(0)?,
        url: row.get(1)?,
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    })
}

fn generate_target_id() -> String {
    format!("t_{}", Uuid::new_v4().simple())
}

/// Timestamps are stored as fixed-width RFC3339 with nanoseconds so that
/// lexicographic order in SQL equals chronological order.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// --- Page tokens ---

/// Encode a `(created_at, id)` cursor into an opaque page token.
pub fn encode_page_token(created_at: &DateTime<Utc>, id: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}_{}", fmt_ts(created_at), id))
}

/// Decode and validate a client-supplied page token.
///
/// The token is opaque to clients but never trusted structurally: the
/// timestamp must parse and the id must look like a target id before either
/// reaches a query.
pub fn decode_page_token(token: &str) -> Option<PageCursor> {
    let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
    let raw = String::from_utf8(bytes).ok()?;
    let (ts, id) = raw.split_once('_')?;
    let created_at = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
    if !is_valid_target_id(id) {
        return None;
    }
    Some(PageCursor {
        created_at,
        id: id.to_string(),
    })
}

fn is_valid_target_id(id: &str) -> bool {
    match id.strip_prefix("t_") {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric()),
        None => false,
    }
}
