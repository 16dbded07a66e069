// ABOUTME: SQLite-backed preference store
// ABOUTME: Single prefs table keyed on (user, room, broker, plugin, key)

use super::{PrefQuery, Preference, PreferenceStore, Prefs};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct SqlitePrefs {
    db: Arc<Mutex<Connection>>,
}

impl SqlitePrefs {
    /// Open (or create) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create preference directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open preference database {}", path.display()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS prefs (
                user TEXT NOT NULL DEFAULT '',
                room TEXT NOT NULL DEFAULT '',
                broker TEXT NOT NULL DEFAULT '',
                plugin TEXT NOT NULL DEFAULT '',
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                UNIQUE (user, room, broker, plugin, key)
            )",
            [],
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or replace the row with the same scope and key.
    pub fn set(&self, pref: &Preference) -> Result<()> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        db.execute(
            "INSERT INTO prefs (user, room, broker, plugin, key, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (user, room, broker, plugin, key) DO UPDATE SET value = excluded.value",
            params![
                pref.user,
                pref.room,
                pref.broker,
                pref.plugin,
                pref.key,
                pref.value
            ],
        )?;
        tracing::debug!(key = %pref.key, plugin = %pref.plugin, "Preference stored");
        Ok(())
    }

    /// Remove the row with the same scope and key. Returns whether one existed.
    pub fn delete(&self, pref: &Preference) -> Result<bool> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        let n = db.execute(
            "DELETE FROM prefs
             WHERE user = ?1 AND room = ?2 AND broker = ?3 AND plugin = ?4 AND key = ?5",
            params![pref.user, pref.room, pref.broker, pref.plugin, pref.key],
        )?;
        Ok(n > 0)
    }
}

fn row_to_pref(row: &Row<'_>) -> rusqlite::Result<Preference> {
    Ok(Preference {
        user: row.get(0)?,
        room: row.get(1)?,
        broker: row.get(2)?,
        plugin: row.get(3)?,
        key: row.get(4)?,
        value: row.get(5)?,
        default: String::new(),
        success: true,
    })
}

impl PreferenceStore for SqlitePrefs {
    fn find(&self, query: &PrefQuery) -> Result<Prefs> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        let mut stmt = db.prepare(
            "SELECT user, room, broker, plugin, key, value FROM prefs
             WHERE (?1 = '' OR user = ?1)
               AND (?2 = '' OR room = ?2)
               AND (?3 = '' OR broker = ?3)
               AND (?4 = '' OR plugin = ?4)
               AND (?5 = '' OR key = ?5)
             ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(
                params![
                    query.user,
                    query.room,
                    query.broker,
                    query.plugin,
                    query.key
                ],
                row_to_pref,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Prefs::new(rows))
    }

    fn get(&self, query: &PrefQuery, default: &str) -> Result<Preference> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        let mut stmt = db.prepare(
            "SELECT user, room, broker, plugin, key, value FROM prefs
             WHERE key = ?5
               AND (user = '' OR user = ?1)
               AND (room = '' OR room = ?2)
               AND (broker = '' OR broker = ?3)
               AND (plugin = '' OR plugin = ?4)
             ORDER BY (user != '') * 8 + (broker != '') * 4 + (room != '') * 2 + (plugin != '') DESC,
                      rowid
             LIMIT 1",
        )?;
        let found = stmt.query_row(
            params![
                query.user,
                query.room,
                query.broker,
                query.plugin,
                query.key
            ],
            row_to_pref,
        );

        match found {
            Ok(pref) => Ok(Preference {
                default: default.to_string(),
                ..pref
            }),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(query.fallback(default)),
            Err(e) => Err(e.into()),
        }
    }
}
