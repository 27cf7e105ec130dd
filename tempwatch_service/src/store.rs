//! Chat snapshot persistence.
//!
//! A snapshot is the durable part of one chat's monitor: its explicitly
//! bound location and its watches with their armed/fired state. Snapshots are
//! keyed by chat id and written whenever a command or a tick changes them,
//! so a restart resumes every chat where it left off.
//!
//! Backends:
//! - `JsonFileStore`: one JSON object on disk, replaced atomically on write.
//! - `PostgresStore`: one `chat_snapshots` row per chat, JSONB document.
//! - `NullStore`: keeps nothing.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use postgres::{Client, NoTls};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alert::thresholds::Watch;
use crate::model::{ChatId, Location};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSnapshot {
    pub chat_id: ChatId,
    /// `None` when the chat uses the deployment's default location.
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub watches: Vec<Watch>,
}

impl ChatSnapshot {
    /// A snapshot with nothing worth keeping; stores delete instead of saving.
    pub fn is_blank(&self) -> bool {
        self.location.is_none() && self.watches.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] postgres::Error),
}

pub trait SnapshotStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<ChatSnapshot>, StoreError>;

    /// Upserts by chat id.
    fn save(&self, snapshot: &ChatSnapshot) -> Result<(), StoreError>;

    fn remove(&self, chat_id: ChatId) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

pub struct JsonFileStore {
    path: PathBuf,
    chats: Mutex<BTreeMap<String, ChatSnapshot>>,
}

impl JsonFileStore {
    /// Opens `path`, reading existing snapshots. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let chats = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self {
            path,
            chats: Mutex::new(chats),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_locked(&self, chats: &BTreeMap<String, ChatSnapshot>) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(chats)?;
        let tmp = self.path.with_extension("json.tmp");
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, text).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl SnapshotStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<ChatSnapshot>, StoreError> {
        let chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(chats.values().cloned().collect())
    }

    fn save(&self, snapshot: &ChatSnapshot) -> Result<(), StoreError> {
        let mut chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        chats.insert(snapshot.chat_id.to_string(), snapshot.clone());
        self.write_locked(&chats)
    }

    fn remove(&self, chat_id: ChatId) -> Result<(), StoreError> {
        let mut chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        if chats.remove(&chat_id.to_string()).is_some() {
            self.write_locked(&chats)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    /// Connects and creates the `chat_snapshots` table if needed.
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let mut client = Client::connect(database_url, NoTls)?;
        client.batch_execute(
            "CREATE TABLE IF NOT EXISTS chat_snapshots (
                chat_id    BIGINT PRIMARY KEY,
                snapshot   JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

impl SnapshotStore for PostgresStore {
    fn load_all(&self) -> Result<Vec<ChatSnapshot>, StoreError> {
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        let rows = client.query("SELECT snapshot FROM chat_snapshots ORDER BY chat_id", &[])?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in rows {
            let doc: serde_json::Value = row.get(0);
            snapshots.push(serde_json::from_value(doc)?);
        }
        Ok(snapshots)
    }

    fn save(&self, snapshot: &ChatSnapshot) -> Result<(), StoreError> {
        let doc = serde_json::to_value(snapshot)?;
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        client.execute(
            "INSERT INTO chat_snapshots (chat_id, snapshot, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (chat_id)
             DO UPDATE SET snapshot = EXCLUDED.snapshot, updated_at = now()",
            &[&snapshot.chat_id.0, &doc],
        )?;
        Ok(())
    }

    fn remove(&self, chat_id: ChatId) -> Result<(), StoreError> {
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        client.execute("DELETE FROM chat_snapshots WHERE chat_id = $1", &[&chat_id.0])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// No persistence
// ---------------------------------------------------------------------------

pub struct NullStore;

impl SnapshotStore for NullStore {
    fn load_all(&self) -> Result<Vec<ChatSnapshot>, StoreError> {
        Ok(Vec::new())
    }

    fn save(&self, _snapshot: &ChatSnapshot) -> Result<(), StoreError> {
        Ok(())
    }

    fn remove(&self, _chat_id: ChatId) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
