//! Conversation log subsystem
//!
//! History is append-only and read back oldest-first. Two stores:
//! - `PgConversationStore` — rows in `conversation_messages` with a sliding TTL
//! - `MemoryConversationStore` — process-local map, no expiry
//!
//! `ConversationManager` prefers the Postgres store and serves any call that
//! fails there from memory instead.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hairgator_core::config::ConversationConfig;
use hairgator_core::{ConversationKey, ConversationMessage, HairgatorError, Role};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(
        &self,
        key: &ConversationKey,
        message: &ConversationMessage,
    ) -> Result<(), HairgatorError>;

    /// The most recent `limit` messages, oldest first.
    async fn history(
        &self,
        key: &ConversationKey,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, HairgatorError>;

    fn name(&self) -> &str;
}

// ============================================================================
// MemoryConversationStore
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<String, Vec<ConversationMessage>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append(
        &self,
        key: &ConversationKey,
        message: &ConversationMessage,
    ) -> Result<(), HairgatorError> {
        self.conversations
            .write()
            .await
            .entry(key.storage_key())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn history(
        &self,
        key: &ConversationKey,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, HairgatorError> {
        let conversations = self.conversations.read().await;
        let messages = match conversations.get(&key.storage_key()) {
            Some(m) => m,
            None => return Ok(Vec::new()),
        };
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// PgConversationStore
// ============================================================================

/// Postgres-backed log. Every append pushes the expiry of the whole
/// conversation to `now + ttl`; expired rows are purged on append and never read.
#[derive(Debug, Clone)]
pub struct PgConversationStore {
    pool: PgPool,
    ttl: Duration,
}

impl PgConversationStore {
    pub fn new(pool: PgPool, ttl_seconds: i64) -> Self {
        Self {
            pool,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), HairgatorError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_messages (
                id BIGSERIAL PRIMARY KEY,
                conversation_key TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS conversation_messages_key_idx
            ON conversation_messages (conversation_key, id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Backs the expiry purge that runs on every append
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS conversation_messages_expires_idx
            ON conversation_messages (expires_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn append(
        &self,
        key: &ConversationKey,
        message: &ConversationMessage,
    ) -> Result<(), HairgatorError> {
        let storage_key = key.storage_key();
        let expires_at = Utc::now() + self.ttl;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM conversation_messages WHERE expires_at <= now()")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO conversation_messages (conversation_key, role, content, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&storage_key)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.timestamp)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversation_messages SET expires_at = $2 WHERE conversation_key = $1")
            .bind(&storage_key)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn history(
        &self,
        key: &ConversationKey,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, HairgatorError> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT role, content, created_at FROM (
                SELECT id, role, content, created_at
                FROM conversation_messages
                WHERE conversation_key = $1 AND expires_at > now()
                ORDER BY id DESC
                LIMIT $2
            ) recent
            ORDER BY id ASC
            "#,
        )
        .bind(key.storage_key())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(role, content, timestamp)| ConversationMessage {
                role: Role::parse(&role),
                content,
                timestamp,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// ConversationManager
// ============================================================================

pub struct ConversationManager {
    external: Option<Arc<dyn ConversationStore>>,
    memory: MemoryConversationStore,
}

impl ConversationManager {
    pub fn new(external: Option<Arc<dyn ConversationStore>>) -> Self {
        Self {
            external,
            memory: MemoryConversationStore::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Connect to Postgres when `database_url` is set; any failure leaves history in memory.
    pub async fn from_config(config: &ConversationConfig) -> Self {
        let Some(url) = config.database_url.as_deref().filter(|u| !u.is_empty()) else {
            tracing::info!("No conversation database configured, using in-memory history");
            return Self::in_memory();
        };

        let pool = match hairgator_core::db::create_pool(config, url).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "Conversation database unavailable, using in-memory history");
                return Self::in_memory();
            }
        };

        let store = PgConversationStore::new(pool, config.ttl_seconds);
        if let Err(e) = store.ensure_schema().await {
            tracing::warn!(error = %e, "Conversation schema setup failed, using in-memory history");
            return Self::in_memory();
        }

        tracing::info!(ttl_seconds = config.ttl_seconds, "Conversation history stored in Postgres");
        Self::new(Some(Arc::new(store)))
    }

    pub fn create_conversation(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Name of the store calls go to first.
    pub fn backend_name(&self) -> &str {
        match &self.external {
            Some(store) => store.name(),
            None => self.memory.name(),
        }
    }

    pub async fn add_message(&self, key: &ConversationKey, message: ConversationMessage) {
        if let Some(store) = &self.external {
            match store.append(key, &message).await {
                Ok(()) => return,
                Err(e) => tracing::warn!(
                    store = store.name(),
                    error = %e,
                    "Conversation append failed, keeping message in memory"
                ),
            }
        }
        // Memory store is infallible
        let _ = self.memory.append(key, &message).await;
    }

    pub async fn history(&self, key: &ConversationKey, limit: usize) -> Vec<ConversationMessage> {
        if let Some(store) = &self.external {
            match store.history(key, limit).await {
                Ok(messages) => return messages,
                Err(e) => tracing::warn!(
                    store = store.name(),
                    error = %e,
                    "Conversation history read failed, reading from memory"
                ),
            }
        }
        self.memory.history(key, limit).await.unwrap_or_default()
    }
}

// ============================================================================
// TESTS
// ============================================================================
