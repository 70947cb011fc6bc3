//! # Triad Database
//!
//! One SQLite file (`.triad/triad.db` by default) shared by the conversation
//! store and the prompt library. Schema changes are applied in order from
//! [`MIGRATIONS`] and recorded in `schema_version`.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::PersistenceError;
use crate::skills::prompts;

type Result<T> = std::result::Result<T, PersistenceError>;

/// Ordered `(version, sql)` pairs
const MIGRATIONS: &[(i32, &str)] = &[(
    1,
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        thread_id  TEXT PRIMARY KEY,
        user_id    TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        history    TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_user
        ON conversations(user_id, updated_at);
    CREATE TABLE IF NOT EXISTS prompt_templates (
        slug       TEXT PRIMARY KEY,
        version    INTEGER NOT NULL DEFAULT 1,
        content    TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    "#,
)];

/// Newest schema this build knows
pub const SCHEMA_VERSION: i32 = 1;

/// A stored prompt and its edit count (seeded copies are version 1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub slug: String,
    pub content: String,
    pub version: i32,
}

pub struct TriadDb {
    conn: Arc<Mutex<Connection>>,
}

impl TriadDb {
    /// Open (or create) the database file, creating its directory first
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Shared handle for the conversation store
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PersistenceError::Lock(e.to_string()))
    }

    /// Insert bundled prompts whose slug is not stored yet; edited copies are kept
    pub fn seed_prompts(&self) -> Result<usize> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO prompt_templates (slug, version, content) VALUES (?1, 1, ?2)",
        )?;

        let mut inserted = 0;
        for (slug, content) in prompts::all_defaults() {
            inserted += stmt.execute(params![slug, content])?;
        }
        tracing::debug!(inserted, "Prompt seeding done");
        Ok(inserted)
    }

    /// Stored prompt for `slug`, if any
    pub fn prompt(&self, slug: &str) -> Result<Option<PromptTemplate>> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT content, version FROM prompt_templates WHERE slug = ?1",
                params![slug],
                |row| {
                    Ok(PromptTemplate {
                        slug: slug.to_string(),
                        content: row.get(0)?,
                        version: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    /// Replace a stage prompt and return its new version.
    ///
    /// Only the bundled slugs are editable and the text must not be blank.
    pub fn set_prompt(&self, slug: &str, content: &str) -> Result<i32> {
        if prompts::default_for(slug).is_none() {
            return Err(PersistenceError::UnknownPrompt(slug.to_string()));
        }
        if content.trim().is_empty() {
            return Err(PersistenceError::BlankPrompt(slug.to_string()));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let previous: Option<i32> = tx
            .query_row(
                "SELECT version FROM prompt_templates WHERE slug = ?1",
                params![slug],
                |row| row.get(0),
            )
            .optional()?;
        let version = previous.map_or(1, |v| v + 1);

        tx.execute(
            "INSERT INTO prompt_templates (slug, version, content) VALUES (?1, ?2, ?3)
             ON CONFLICT(slug) DO UPDATE SET
                 version = excluded.version,
                 content = excluded.content,
                 updated_at = datetime('now')",
            params![slug, version, content],
        )?;
        tx.commit()?;

        tracing::info!(slug, version, "Prompt updated");
        Ok(version)
    }

    /// Every stored prompt, ordered by slug
    pub fn list_prompts(&self) -> Result<Vec<PromptTemplate>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT slug, content, version FROM prompt_templates ORDER BY slug")?;
        let templates = stmt
            .query_map([], |row| {
                Ok(PromptTemplate {
                    slug: row.get(0)?,
                    content: row.get(1)?,
                    version: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(templates)
    }
}

/// Apply every migration newer than the recorded version, each in its own transaction
fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)")?;
    let current: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![version],
        )?;
        tx.commit()?;
        tracing::info!(version, "Applied database migration");
    }
    Ok(())
}
