//! SQLite-backed mapping store.

use crate::error::{Error, Result};
use crate::types::{ArchivedEntry, CompanionKind, MappingEntry, RegisteredTemplate};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use super::MappingStore;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS companion_mapping (
    template_id     TEXT PRIMARY KEY NOT NULL,
    companion_id    TEXT NOT NULL UNIQUE,
    kind            TEXT NOT NULL,
    companion_name  TEXT NOT NULL,
    created_at      INTEGER NOT NULL,
    ends_at         INTEGER
);

CREATE TABLE IF NOT EXISTS companion_archive (
    template_id     TEXT NOT NULL,
    companion_id    TEXT NOT NULL,
    kind            TEXT NOT NULL,
    companion_name  TEXT NOT NULL,
    created_at      INTEGER NOT NULL,
    archived_at     INTEGER NOT NULL,
    reason          TEXT NOT NULL,
    PRIMARY KEY (template_id, companion_id)
);

CREATE TABLE IF NOT EXISTS registered_template (
    id              TEXT PRIMARY KEY NOT NULL,
    display_name    TEXT NOT NULL,
    parent_group_id TEXT,
    created_at      INTEGER NOT NULL
);
";

const MAPPING_COLUMNS: &str =
    "template_id, companion_id, kind, companion_name, created_at, ends_at";
const ARCHIVE_COLUMNS: &str =
    "template_id, companion_id, kind, companion_name, created_at, archived_at, reason";
const TEMPLATE_COLUMNS: &str = "id, display_name, parent_group_id, created_at";

/// Mapping store connection wrapper.
///
/// Thread-safe via internal Mutex. All operations acquire the lock.
pub struct SqliteMappingStore {
    conn: Mutex<Connection>,
    /// Where an unreadable database file was moved on open, if anywhere.
    recovered_from: Option<PathBuf>,
}

impl SqliteMappingStore {
    /// Open the store at `path`, creating it if missing.
    ///
    /// An unreadable file is moved aside and replaced with an empty store;
    /// only a failure to create the fresh store is returned as an error.
    pub fn open(path: &Path) -> Result<Self> {
        match Self::try_open(path) {
            Ok(conn) => Ok(Self {
                conn: Mutex::new(conn),
                recovered_from: None,
            }),
            Err(Error::StoreCorrupt(reason)) => {
                let aside = Self::move_aside(path)?;
                warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    reason = %reason,
                    "Mapping store unreadable, starting with an empty store"
                );
                let conn = Self::try_open(path)?;
                Ok(Self {
                    conn: Mutex::new(conn),
                    recovered_from: Some(aside),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Open an in-memory store (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            recovered_from: None,
        })
    }

    /// Path the corrupt file was moved to, when `open` had to recover.
    pub fn recovered_from(&self) -> Option<&Path> {
        self.recovered_from.as_deref()
    }

    fn try_open(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        Self::migrate(&conn).map_err(Self::classify)?;
        Self::verify(&conn).map_err(Self::classify)?;
        info!(path = %path.display(), "Mapping store opened");
        Ok(conn)
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Integrity check plus a dry run of every query shape the store uses.
    fn verify(conn: &Connection) -> Result<()> {
        let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
        if check != "ok" {
            return Err(Error::StoreCorrupt(check));
        }
        conn.prepare(&format!("SELECT {MAPPING_COLUMNS} FROM companion_mapping LIMIT 1"))?;
        conn.prepare(&format!("SELECT {ARCHIVE_COLUMNS} FROM companion_archive LIMIT 1"))?;
        conn.prepare(&format!("SELECT {TEMPLATE_COLUMNS} FROM registered_template LIMIT 1"))?;
        Ok(())
    }

    /// Map unreadable-file failures to `StoreCorrupt`.
    fn classify(err: Error) -> Error {
        match err {
            Error::Database(rusqlite::Error::SqliteFailure(code, msg))
                if matches!(
                    code.code,
                    ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt
                ) =>
            {
                Error::StoreCorrupt(msg.unwrap_or_else(|| code.to_string()))
            }
            // Schema drift: a table exists without the columns we need.
            Error::Database(rusqlite::Error::SqliteFailure(code, Some(msg)))
                if code.code == ErrorCode::Unknown && msg.contains("no such column") =>
            {
                Error::StoreCorrupt(msg)
            }
            other => other,
        }
    }

    fn move_aside(path: &Path) -> Result<PathBuf> {
        let stamp = chrono::Utc::now().timestamp_millis();
        let mut aside = path.as_os_str().to_owned();
        aside.push(format!(".corrupt-{stamp}"));
        let aside = PathBuf::from(aside);
        std::fs::rename(path, &aside)?;
        Ok(aside)
    }

    fn map_entry(row: &rusqlite::Row) -> rusqlite::Result<MappingEntry> {
        Ok(MappingEntry {
            template_id: row.get(0)?,
            companion_id: row.get(1)?,
            kind: Self::parse_kind(row, 2)?,
            companion_name: row.get(3)?,
            created_at: row.get(4)?,
            ends_at: row.get(5)?,
        })
    }

    fn map_archived(row: &rusqlite::Row) -> rusqlite::Result<ArchivedEntry> {
        Ok(ArchivedEntry {
            template_id: row.get(0)?,
            companion_id: row.get(1)?,
            kind: Self::parse_kind(row, 2)?,
            companion_name: row.get(3)?,
            created_at: row.get(4)?,
            archived_at: row.get(5)?,
            reason: row.get(6)?,
        })
    }

    fn map_template(row: &rusqlite::Row) -> rusqlite::Result<RegisteredTemplate> {
        Ok(RegisteredTemplate {
            id: row.get(0)?,
            display_name: row.get(1)?,
            parent_group_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn parse_kind(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<CompanionKind> {
        let raw: String = row.get(idx)?;
        CompanionKind::from_str(&raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                format!("unknown companion kind: {raw}").into(),
            )
        })
    }
}

impl MappingStore for SqliteMappingStore {
    fn get(&self, template_id: &str) -> Result<Option<MappingEntry>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MAPPING_COLUMNS} FROM companion_mapping WHERE template_id = ?1"
        ))?;
        Ok(stmt
            .query_row(params![template_id], Self::map_entry)
            .optional()?)
    }

    fn find_by_companion(&self, companion_id: &str) -> Result<Option<MappingEntry>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MAPPING_COLUMNS} FROM companion_mapping WHERE companion_id = ?1"
        ))?;
        Ok(stmt
            .query_row(params![companion_id], Self::map_entry)
            .optional()?)
    }

    fn put(&self, entry: &MappingEntry) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            "INSERT INTO companion_mapping
             (template_id, companion_id, kind, companion_name, created_at, ends_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(template_id) DO UPDATE SET
                companion_id = excluded.companion_id,
                kind = excluded.kind,
                companion_name = excluded.companion_name,
                created_at = excluded.created_at,
                ends_at = excluded.ends_at",
            params![
                entry.template_id,
                entry.companion_id,
                entry.kind.as_str(),
                entry.companion_name,
                entry.created_at,
                entry.ends_at,
            ],
        )?;
        Ok(())
    }

    fn set_ends_at(&self, template_id: &str, ends_at: Option<i64>) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute(
            "UPDATE companion_mapping SET ends_at = ?2 WHERE template_id = ?1",
            params![template_id, ends_at],
        )?;
        Ok(rows > 0)
    }

    fn delete(&self, template_id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute(
            "DELETE FROM companion_mapping WHERE template_id = ?1",
            params![template_id],
        )?;
        Ok(rows > 0)
    }

    fn list(&self) -> Result<Vec<MappingEntry>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MAPPING_COLUMNS} FROM companion_mapping ORDER BY created_at"
        ))?;
        let entries = stmt
            .query_map([], Self::map_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn archive(&self, template_id: &str, reason: &str) -> Result<Option<ArchivedEntry>> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;

        let entry = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MAPPING_COLUMNS} FROM companion_mapping WHERE template_id = ?1"
            ))?;
            stmt.query_row(params![template_id], Self::map_entry)
                .optional()?
        };
        let Some(entry) = entry else {
            return Ok(None);
        };

        let archived = ArchivedEntry {
            template_id: entry.template_id,
            companion_id: entry.companion_id,
            kind: entry.kind,
            companion_name: entry.companion_name,
            created_at: entry.created_at,
            archived_at: chrono::Utc::now().timestamp_millis(),
            reason: reason.to_string(),
        };

        tx.execute(
            "INSERT OR REPLACE INTO companion_archive
             (template_id, companion_id, kind, companion_name, created_at, archived_at, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                archived.template_id,
                archived.companion_id,
                archived.kind.as_str(),
                archived.companion_name,
                archived.created_at,
                archived.archived_at,
                archived.reason,
            ],
        )?;
        tx.execute(
            "DELETE FROM companion_mapping WHERE template_id = ?1",
            params![template_id],
        )?;
        tx.commit()?;

        Ok(Some(archived))
    }

    fn get_archived(&self, template_id: &str) -> Result<Option<ArchivedEntry>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM companion_archive
             WHERE template_id = ?1 ORDER BY archived_at DESC LIMIT 1"
        ))?;
        Ok(stmt
            .query_row(params![template_id], Self::map_archived)
            .optional()?)
    }

    fn list_archived(&self) -> Result<Vec<ArchivedEntry>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM companion_archive ORDER BY archived_at DESC"
        ))?;
        let entries = stmt
            .query_map([], Self::map_archived)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn register_template(&self, template: &RegisteredTemplate) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            "INSERT INTO registered_template (id, display_name, parent_group_id, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                parent_group_id = excluded.parent_group_id",
            params![
                template.id,
                template.display_name,
                template.parent_group_id,
                template.created_at,
            ],
        )?;
        Ok(())
    }

    fn unregister_template(&self, template_id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute(
            "DELETE FROM registered_template WHERE id = ?1",
            params![template_id],
        )?;
        Ok(rows > 0)
    }

    fn get_template(&self, template_id: &str) -> Result<Option<RegisteredTemplate>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM registered_template WHERE id = ?1"
        ))?;
        Ok(stmt
            .query_row(params![template_id], Self::map_template)
            .optional()?)
    }

    fn list_templates(&self) -> Result<Vec<RegisteredTemplate>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM registered_template ORDER BY display_name"
        ))?;
        let templates = stmt
            .query_map([], Self::map_template)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(templates)
    }

    fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }
}
