//! Postgres-backed state store.
//!
//! One cursor row per relayer id plus one row per relayed nonce. Nonces are
//! stored as decimal text so the full uint256 range survives.

use std::collections::BTreeSet;
use std::str::FromStr;

use alloy::primitives::U256;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{RelayState, StateStore};
use crate::error::StoreError;

pub struct PgStateStore {
    pool: PgPool,
    relayer_id: String,
    /// Nonces already written, so a save only inserts the new ones
    persisted: Mutex<BTreeSet<U256>>,
}

impl PgStateStore {
    /// Connect and create the tables if they do not exist
    pub async fn connect(database_url: &str, relayer_id: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;
        let store = Self {
            pool,
            relayer_id: relayer_id.to_string(),
            persisted: Mutex::new(BTreeSet::new()),
        };
        store.ensure_schema().await?;
        info!(relayer_id, "Postgres state store ready");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relayer_cursor (
                relayer_id TEXT PRIMARY KEY,
                last_processed_block BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relayer_processed_nonces (
                relayer_id TEXT NOT NULL,
                nonce TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (relayer_id, nonce)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn load(&self) -> Result<Option<RelayState>, StoreError> {
        let cursor: Option<(i64,)> = sqlx::query_as(
            r#"SELECT last_processed_block FROM relayer_cursor WHERE relayer_id = $1"#,
        )
        .bind(&self.relayer_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((last_block,)) = cursor else {
            return Ok(None);
        };
        let last_block = u64::try_from(last_block)
            .map_err(|_| StoreError::Invalid(format!("negative cursor {}", last_block)))?;

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT nonce FROM relayer_processed_nonces WHERE relayer_id = $1"#,
        )
        .bind(&self.relayer_id)
        .fetch_all(&self.pool)
        .await?;

        let mut nonces = BTreeSet::new();
        for (raw,) in rows {
            let nonce = U256::from_str(&raw)
                .map_err(|e| StoreError::Invalid(format!("bad nonce {:?}: {}", raw, e)))?;
            nonces.insert(nonce);
        }

        *self.persisted.lock().await = nonces.clone();
        Ok(Some(RelayState::from_parts(last_block, nonces)))
    }

    async fn save(&self, state: &RelayState) -> Result<(), StoreError> {
        let last_block = i64::try_from(state.last_processed_block()).map_err(|_| {
            StoreError::Invalid(format!(
                "block {} does not fit BIGINT",
                state.last_processed_block()
            ))
        })?;

        let mut persisted = self.persisted.lock().await;
        let new_nonces: Vec<U256> = state
            .processed_nonces()
            .difference(&persisted)
            .copied()
            .collect();

        let mut tx = self.pool.begin().await?;
        for nonce in &new_nonces {
            sqlx::query(
                r#"
                INSERT INTO relayer_processed_nonces (relayer_id, nonce)
                VALUES ($1, $2)
                ON CONFLICT (relayer_id, nonce) DO NOTHING
                "#,
            )
            .bind(&self.relayer_id)
            .bind(nonce.to_string())
            .execute(&mut *tx)
            .await?;
        }

        // GREATEST keeps the stored cursor monotonic even if an older
        // snapshot is saved late
        sqlx::query(
            r#"
            INSERT INTO relayer_cursor (relayer_id, last_processed_block)
            VALUES ($1, $2)
            ON CONFLICT (relayer_id) DO UPDATE
            SET last_processed_block = GREATEST(relayer_cursor.last_processed_block, $2),
                updated_at = NOW()
            "#,
        )
        .bind(&self.relayer_id)
        .bind(last_block)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        persisted.extend(new_nonces.iter().copied());

        debug!(
            relayer_id = %self.relayer_id,
            last_processed_block = last_block,
            new_nonces = new_nonces.len(),
            "State checkpoint committed"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("postgres:{}", self.relayer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a Postgres instance"]
    async fn test_postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let relayer_id = format!("test-{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0));
        let store = PgStateStore::connect(&url, &relayer_id).await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        let mut state = RelayState::new(42);
        state.mark_processed(U256::from(1u64));
        state.mark_processed(U256::MAX);
        store.save(&state).await.unwrap();

        state.advance_to(50);
        state.mark_processed(U256::from(2u64));
        store.save(&state).await.unwrap();

        let fresh = PgStateStore::connect(&url, &relayer_id).await.unwrap();
        assert_eq!(fresh.load().await.unwrap().unwrap(), state);
    }
}
