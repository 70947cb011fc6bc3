//! # Conversation Store
//!
//! Durable record of completed runs, keyed by `thread_id`. The full final
//! [`PipelineState`] is stored as one JSON blob; saving the same thread again
//! replaces the blob and bumps `updated_at`.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::pipeline_state::PipelineState;
use crate::error::PersistenceError;

/// One stored conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationRecord {
    pub thread_id: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub history: PipelineState,
}

/// Listing entry for a user's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub thread_id: String,
    pub user_prompt: String,
}

/// Persistence seam used by the orchestrator and the read endpoints
pub trait ConversationStore: Send + Sync {
    /// Insert or replace the conversation for `state.thread_id`
    fn save(&self, user_id: &str, state: &PipelineState) -> Result<(), PersistenceError>;

    /// Final state of one conversation, if it exists
    fn load(&self, thread_id: &str) -> Result<Option<PipelineState>, PersistenceError>;

    /// Conversations for a user, most recently updated first
    fn list_for_user(&self, user_id: &str) -> Result<Vec<ConversationSummary>, PersistenceError>;
}

/// SQLite-backed store sharing the [`TriadDb`](super::db::TriadDb) connection
pub struct SqliteConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PersistenceError> {
        self.conn
            .lock()
            .map_err(|e| PersistenceError::Lock(e.to_string()))
    }

    /// Full record including timestamps
    pub fn record(&self, thread_id: &str) -> Result<Option<ConversationRecord>, PersistenceError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT thread_id, user_id, created_at, updated_at, history
                 FROM conversations WHERE thread_id = ?1",
                params![thread_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((thread_id, user_id, created_at, updated_at, history)) => {
                Ok(Some(ConversationRecord {
                    thread_id,
                    user_id,
                    created_at,
                    updated_at,
                    history: serde_json::from_str(&history)?,
                }))
            }
        }
    }
}

/// RFC3339 with microseconds so rows saved in quick succession still order
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

impl ConversationStore for SqliteConversationStore {
    #[tracing::instrument(skip(self, state), fields(thread_id = %state.thread_id))]
    fn save(&self, user_id: &str, state: &PipelineState) -> Result<(), PersistenceError> {
        let history = serde_json::to_string(state)?;
        let now = now_timestamp();

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO conversations (thread_id, user_id, created_at, updated_at, history)
            VALUES (?1, ?2, ?3, ?3, ?4)
            ON CONFLICT(thread_id) DO UPDATE SET
                history = excluded.history,
                updated_at = excluded.updated_at
            "#,
            params![state.thread_id, user_id, now, history],
        )?;

        tracing::debug!("Conversation saved");
        Ok(())
    }

    fn load(&self, thread_id: &str) -> Result<Option<PipelineState>, PersistenceError> {
        Ok(self.record(thread_id)?.map(|record| record.history))
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<ConversationSummary>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT thread_id, history FROM conversations
             WHERE user_id = ?1
             ORDER BY updated_at DESC, rowid DESC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (thread_id, history) = row?;
            let state: PipelineState = serde_json::from_str(&history)?;
            summaries.push(ConversationSummary {
                thread_id,
                user_prompt: state.user_prompt,
            });
        }
        Ok(summaries)
    }
}
