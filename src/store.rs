//! Channel store — channels, their tokens, and test-result write-back,
//! backed by SQLite.
//!
//! The test-result update is a single statement against a single row.
//! Two fixed statement shapes exist so that a run without model data never
//! touches the previously stored `models_json`.

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::adapters::ProbeResult;
use crate::discovery::{Credential, TestSummary};
use crate::models::{models_from_json, models_to_json};
use crate::util::{mask_secret, now_epoch_secs, now_iso};

const UPDATE_TEST_RESULT_WITH_MODELS: &str =
    "UPDATE channels SET status = ?1, models_json = ?2, test_time = ?3, response_time_ms = ?4, updated_at = ?5 WHERE id = ?6";

const UPDATE_TEST_RESULT: &str =
    "UPDATE channels SET status = ?1, test_time = ?2, response_time_ms = ?3, updated_at = ?4 WHERE id = ?5";

// ── Types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Active,
    Error,
    Disabled,
    /// Never tested.
    Unknown,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Active => "active",
            ChannelStatus::Error => "error",
            ChannelStatus::Disabled => "disabled",
            ChannelStatus::Unknown => "unknown",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "active" => ChannelStatus::Active,
            "error" => ChannelStatus::Error,
            "disabled" => ChannelStatus::Disabled,
            _ => ChannelStatus::Unknown,
        }
    }
}

/// A channel row.
#[derive(Debug, Clone, Serialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// Legacy single key, used when the channel has no token rows.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub status: ChannelStatus,
    pub models_json: Option<String>,
    pub test_time: Option<i64>,
    pub response_time_ms: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// A token row belonging to a channel.
#[derive(Clone)]
pub struct ChannelToken {
    pub id: String,
    pub channel_id: String,
    pub name: Option<String>,
    pub api_key: String,
    pub created_at: String,
}

impl fmt::Debug for ChannelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelToken")
            .field("id", &self.id)
            .field("channel_id", &self.channel_id)
            .field("name", &self.name)
            .field("api_key", &mask_secret(&self.api_key))
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl From<&ChannelToken> for Credential {
    fn from(t: &ChannelToken) -> Self {
        Credential {
            id: Some(t.id.clone()),
            name: t.name.clone(),
            secret: t.api_key.clone(),
        }
    }
}

/// What a test run writes back to a channel.
///
/// `models_json` takes precedence over `models`. When neither is present,
/// or `models_json` is an empty string, the stored model list is left as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelTestUpdate {
    pub ok: bool,
    pub elapsed_ms: u64,
    pub models: Option<Vec<String>>,
    pub models_json: Option<String>,
}

impl ChannelTestUpdate {
    fn resolved_models_json(&self) -> Option<String> {
        match &self.models_json {
            Some(raw) => (!raw.is_empty()).then(|| raw.clone()),
            None => self.models.as_deref().map(models_to_json),
        }
    }
}

impl From<&TestSummary> for ChannelTestUpdate {
    /// Model data is only supplied when at least one token worked.
    fn from(summary: &TestSummary) -> Self {
        Self {
            ok: summary.ok,
            elapsed_ms: summary.elapsed_ms,
            models: summary.ok.then(|| summary.models.clone()),
            models_json: None,
        }
    }
}

impl From<&ProbeResult> for ChannelTestUpdate {
    fn from(result: &ProbeResult) -> Self {
        Self {
            ok: result.ok,
            elapsed_ms: result.elapsed_ms,
            models: result.ok.then(|| result.models.clone()),
            models_json: None,
        }
    }
}

// ── Store ───────────────────────────────────────────────────────────

pub struct ChannelStore {
    db: Mutex<Connection>,
}

impl ChannelStore {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let db = Connection::open(db_path)
            .with_context(|| format!("Failed to open channel database at {}", db_path.display()))?;
        db.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.pragma_update(None, "foreign_keys", "ON")?;
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                base_url TEXT NOT NULL,
                api_key TEXT,
                status TEXT NOT NULL DEFAULT 'unknown',
                models_json TEXT,
                test_time INTEGER,
                response_time_ms INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS channel_tokens (
                id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                name TEXT,
                api_key TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_channel_tokens_channel ON channel_tokens(channel_id, created_at);
            ",
        )?;

        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| anyhow!("channel store mutex poisoned"))
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    /// Write a test outcome onto a channel. Returns false if no row matched.
    pub fn update_channel_test_result(&self, id: &str, update: &ChannelTestUpdate) -> Result<bool> {
        let status = if update.ok { ChannelStatus::Active } else { ChannelStatus::Error };
        let now = now_epoch_secs();
        let elapsed = update.elapsed_ms as i64;
        let updated_at = now_iso();

        let db = self.conn()?;
        let rows = match update.resolved_models_json() {
            Some(models_json) => db.execute(
                UPDATE_TEST_RESULT_WITH_MODELS,
                params![status.as_str(), models_json, now, elapsed, updated_at, id],
            ),
            None => db.execute(
                UPDATE_TEST_RESULT,
                params![status.as_str(), now, elapsed, updated_at, id],
            ),
        }
        .with_context(|| format!("Failed to store test result for channel '{}'", id))?;

        tracing::debug!(channel_id = id, status = status.as_str(), elapsed_ms = update.elapsed_ms, rows, "Test result stored");
        Ok(rows > 0)
    }

    /// Insert a channel, or update its name/url/key if it already exists.
    /// Test-result columns are preserved on update.
    pub fn upsert_channel(&self, id: &str, name: &str, base_url: &str, api_key: Option<&str>) -> Result<()> {
        let now = now_iso();
        let db = self.conn()?;
        db.execute(
            "INSERT INTO channels (id, name, base_url, api_key, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'unknown', ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                base_url = excluded.base_url,
                api_key = excluded.api_key,
                updated_at = excluded.updated_at",
            params![id, name, base_url, api_key, now],
        )?;
        tracing::info!(channel_id = id, "Channel saved");
        Ok(())
    }

    /// Operator status override (e.g. disable a channel so scans skip it).
    pub fn set_channel_status(&self, id: &str, status: ChannelStatus) -> Result<bool> {
        let db = self.conn()?;
        let rows = db.execute(
            "UPDATE channels SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_iso(), id],
        )?;
        Ok(rows > 0)
    }

    pub fn remove_channel(&self, id: &str) -> Result<bool> {
        let db = self.conn()?;
        let rows = db.execute("DELETE FROM channels WHERE id = ?1", params![id])?;
        if rows > 0 {
            tracing::info!(channel_id = id, "Channel removed");
        }
        Ok(rows > 0)
    }

    /// Add (or replace) a token on a channel.
    pub fn add_token(&self, id: &str, channel_id: &str, name: Option<&str>, api_key: &str) -> Result<()> {
        let now = now_iso();
        let db = self.conn()?;
        db.execute(
            "INSERT INTO channel_tokens (id, channel_id, name, api_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                channel_id = excluded.channel_id,
                name = excluded.name,
                api_key = excluded.api_key",
            params![id, channel_id, name, api_key, now],
        )
        .with_context(|| format!("Failed to add token '{}' to channel '{}'", id, channel_id))?;
        tracing::info!(channel_id = channel_id, token_id = id, "Token saved");
        Ok(())
    }

    pub fn remove_token(&self, id: &str) -> Result<bool> {
        let db = self.conn()?;
        let rows = db.execute("DELETE FROM channel_tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<Channel>> {
        let db = self.conn()?;
        let channel = db
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_CHANNEL),
                params![id],
                channel_from_row,
            )
            .optional()?;
        Ok(channel)
    }

    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!("{} ORDER BY created_at, id", SELECT_CHANNEL))?;
        let channels = stmt
            .query_map([], channel_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(channels)
    }

    /// Channels a scan should test (everything not disabled).
    pub fn list_enabled_channels(&self) -> Result<Vec<Channel>> {
        Ok(self
            .list_channels()?
            .into_iter()
            .filter(|c| c.status != ChannelStatus::Disabled)
            .collect())
    }

    /// Tokens of a channel in insertion order.
    pub fn list_tokens(&self, channel_id: &str) -> Result<Vec<ChannelToken>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT id, channel_id, name, api_key, created_at FROM channel_tokens
             WHERE channel_id = ?1 ORDER BY created_at, rowid",
        )?;
        let tokens = stmt
            .query_map(params![channel_id], |row| {
                Ok(ChannelToken {
                    id: row.get(0)?,
                    channel_id: row.get(1)?,
                    name: row.get(2)?,
                    api_key: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tokens)
    }

    /// Decoded model list last stored for a channel.
    pub fn channel_models(&self, id: &str) -> Result<Vec<String>> {
        Ok(self
            .get_channel(id)?
            .and_then(|c| c.models_json)
            .map(|raw| models_from_json(&raw))
            .unwrap_or_default())
    }
}

const SELECT_CHANNEL: &str = "SELECT id, name, base_url, api_key, status, models_json, test_time, response_time_ms, created_at, updated_at FROM channels";

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    let status: String = row.get(4)?;
    Ok(Channel {
        id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
        api_key: row.get(3)?,
        status: ChannelStatus::parse(&status),
        models_json: row.get(5)?,
        test_time: row.get(6)?,
        response_time_ms: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
