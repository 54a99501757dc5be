//! Conversation log repository
//!
//! Append-only, key-ordered log of answered turns per owner. The gateway
//! reads recent turns and the latest durable summary through the
//! `ConversationStore` trait; rows are only ever updated to set a title.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::time::{SystemTime, UNIX_EPOCH};

/// One stored turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub owner_id: String,
    pub title: Option<String>,
    pub user_message: String,
    pub model_response: String,
    pub memory_summary: Option<String>,
    pub created_at: i64,
}

/// Storage seam used by conversation memory
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one turn; returns the new row id
    async fn append(
        &self,
        owner: &str,
        user_message: &str,
        model_response: &str,
        memory_summary: Option<&str>,
    ) -> Result<i64>;

    /// Most recent `limit` turns, oldest first
    async fn recent(&self, owner: &str, limit: i64) -> Result<Vec<ConversationTurn>>;

    /// Summary carried by the newest turn that has one
    async fn latest_summary(&self, owner: &str) -> Result<Option<String>>;
}

pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        owner: &str,
        user_message: &str,
        model_response: &str,
        memory_summary: Option<&str>,
    ) -> Result<i64> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;

        let result = sqlx::query(
            "INSERT INTO conversation_turns (owner_id, user_message, model_response, memory_summary, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(owner)
        .bind(user_message)
        .bind(model_response)
        .bind(memory_summary)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to append conversation turn")?;

        Ok(result.last_insert_rowid())
    }

    pub async fn recent(&self, owner: &str, limit: i64) -> Result<Vec<ConversationTurn>> {
        let mut turns = self.history(owner, limit).await?;
        turns.reverse();
        Ok(turns)
    }

    /// Newest turns first, as shown in a history listing
    pub async fn history(&self, owner: &str, limit: i64) -> Result<Vec<ConversationTurn>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, title, user_message, model_response, memory_summary, created_at
            FROM conversation_turns
            WHERE owner_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(owner)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load conversation turns")?;

        Ok(rows
            .into_iter()
            .map(|row| ConversationTurn {
                id: row.get("id"),
                owner_id: row.get("owner_id"),
                title: row.get("title"),
                user_message: row.get("user_message"),
                model_response: row.get("model_response"),
                memory_summary: row.get("memory_summary"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn latest_summary(&self, owner: &str) -> Result<Option<String>> {
        let summary: Option<String> = sqlx::query_scalar(
            "SELECT memory_summary FROM conversation_turns WHERE owner_id = ? AND memory_summary IS NOT NULL ORDER BY id DESC LIMIT 1",
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load memory summary")?;

        Ok(summary)
    }

    /// Set the display title of one of the owner's turns.
    ///
    /// Returns false when no such turn belongs to the owner.
    pub async fn set_title(&self, owner: &str, id: i64, title: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE conversation_turns SET title = ? WHERE id = ? AND owner_id = ?")
                .bind(title)
                .bind(id)
                .bind(owner)
                .execute(&self.pool)
                .await
                .context("Failed to set conversation title")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    async fn append(
        &self,
        owner: &str,
        user_message: &str,
        model_response: &str,
        memory_summary: Option<&str>,
    ) -> Result<i64> {
        ConversationRepository::append(self, owner, user_message, model_response, memory_summary)
            .await
    }

    async fn recent(&self, owner: &str, limit: i64) -> Result<Vec<ConversationTurn>> {
        ConversationRepository::recent(self, owner, limit).await
    }

    async fn latest_summary(&self, owner: &str) -> Result<Option<String>> {
        ConversationRepository::latest_summary(self, owner).await
    }
}
