//! Durable two-table swap store (C3), backed by `sqlx::PgPool` with
//! hand-written SQL, following the teacher's `db/mod.rs` convention: plain
//! async methods, each wrapped in `.wrap_err(...)`, returning typed
//! [`StoreError`] where the caller needs to distinguish "not found" from
//! "driver error" and `eyre::Result` everywhere else.

pub mod models;

pub use models::*;

use crate::errors::StoreError;
use crate::types::{SwapIdentifier, Status};
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::Mutex;

/// Durable store wrapping a Postgres connection pool plus the process-wide
/// `retryLock` that serializes `NotStable` status rewrites (§4.3, §5).
pub struct SwapStore {
    pool: PgPool,
    retry_lock: Mutex<()>,
}

/// Result of the capped, timestamp-bounded find queries (§4.3).
pub const FIND_PAGE_LIMIT: i64 = 500;

impl SwapStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .wrap_err("failed to connect to database")?;
        Ok(Self {
            pool,
            retry_lock: Mutex::new(()),
        })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .wrap_err("failed to run database migrations")?;
        Ok(())
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            retry_lock: Mutex::new(()),
        }
    }

    /// `AddSwap(row)` — idempotent insert; duplicate key returns
    /// [`StoreError::AlreadyExists`] (§4.3, and §7: "Store `AlreadyExists` on
    /// `AddSwap` is a success (idempotent registration)").
    pub async fn add_swap(&self, row: &NewSwapRow) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO swap (swap_key, from_chain_id, tx_id, log_index, to_chain_id,
                token_id, token, path, bind, from_address, value, amount_out_min,
                for_native, for_underlying, timestamp, status, memo)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)
            "#,
        )
        .bind(&row.swap_key)
        .bind(row.from_chain_id)
        .bind(&row.tx_id)
        .bind(row.log_index)
        .bind(row.to_chain_id)
        .bind(&row.token_id)
        .bind(&row.token)
        .bind(&row.path)
        .bind(&row.bind)
        .bind(&row.from_address)
        .bind(&row.value)
        .bind(&row.amount_out_min)
        .bind(row.for_native)
        .bind(row.for_underlying)
        .bind(row.timestamp)
        .bind(row.status)
        .bind(&row.memo)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::AlreadyExists)
            }
            Err(e) => Err(StoreError::DriverError(e)),
        }
    }

    pub async fn find_swap(&self, key: &SwapIdentifier) -> Result<Option<SwapRow>, StoreError> {
        let row = sqlx::query_as::<_, SwapRow>("SELECT * FROM swap WHERE swap_key = $1")
            .bind(key.key())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn find_swap_result(
        &self,
        key: &SwapIdentifier,
    ) -> Result<Option<SwapResultRow>, StoreError> {
        let row =
            sqlx::query_as::<_, SwapResultRow>("SELECT * FROM swap_result WHERE swap_key = $1")
                .bind(key.key())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    /// `UpdateSwapStatus(key, newStatus, ts, memo)` — serialized under
    /// `retryLock` when `newStatus = NotStable` so the status graph's retry
    /// edges are checked before rewriting (§4.3).
    pub async fn update_swap_status(
        &self,
        key: &SwapIdentifier,
        new_status: Status,
        timestamp: i64,
        memo: &str,
    ) -> Result<(), StoreError> {
        if matches!(new_status, Status::TxNotStable) {
            let _guard = self.retry_lock.lock().await;
            return self
                .update_swap_status_inner(key, new_status, timestamp, memo)
                .await;
        }
        self.update_swap_status_inner(key, new_status, timestamp, memo)
            .await
    }

    async fn update_swap_status_inner(
        &self,
        key: &SwapIdentifier,
        new_status: Status,
        timestamp: i64,
        memo: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE swap SET status = $1, timestamp = $2, memo = $3, updated_at = now()
               WHERE swap_key = $4"#,
        )
        .bind(new_status as i32)
        .bind(timestamp)
        .bind(memo)
        .bind(key.key())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// `FindSwapsWithStatus(status, sinceTs)` — capped, ascending by timestamp.
    pub async fn find_swaps_with_status(
        &self,
        status: Status,
        since_ts: i64,
    ) -> Result<Vec<SwapRow>, StoreError> {
        let rows = sqlx::query_as::<_, SwapRow>(
            r#"SELECT * FROM swap WHERE status = $1 AND timestamp >= $2
               ORDER BY timestamp ASC LIMIT $3"#,
        )
        .bind(status as i32)
        .bind(since_ts)
        .bind(FIND_PAGE_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// `FindSwapsByChainAndStatus(chainID, status, sinceTs)`.
    pub async fn find_swaps_by_chain_and_status(
        &self,
        chain_id: u64,
        status: Status,
        since_ts: i64,
    ) -> Result<Vec<SwapRow>, StoreError> {
        let rows = sqlx::query_as::<_, SwapRow>(
            r#"SELECT * FROM swap WHERE from_chain_id = $1 AND status = $2 AND timestamp >= $3
               ORDER BY timestamp ASC LIMIT $4"#,
        )
        .bind(chain_id as i64)
        .bind(status as i32)
        .bind(since_ts)
        .bind(FIND_PAGE_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn find_swap_results_with_status(
        &self,
        status: Status,
        since_ts: i64,
    ) -> Result<Vec<SwapResultRow>, StoreError> {
        let rows = sqlx::query_as::<_, SwapResultRow>(
            r#"SELECT * FROM swap_result WHERE status = $1 AND timestamp >= $2
               ORDER BY timestamp ASC LIMIT $3"#,
        )
        .bind(status as i32)
        .bind(since_ts)
        .bind(FIND_PAGE_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Creates the initial result row for a swap that has just verified
    /// (§4.6.1: "created, `MatchTxEmpty`" / "created, `WithBigValue`").
    pub async fn add_swap_result(&self, row: &NewSwapResultRow) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO swap_result (swap_key, from_chain_id, tx_id, log_index, status, memo, timestamp)
            VALUES ($1,$2,$3,$4,$5,$6,$7)
            "#,
        )
        .bind(&row.swap_key)
        .bind(row.from_chain_id)
        .bind(&row.tx_id)
        .bind(row.log_index)
        .bind(row.status)
        .bind(&row.memo)
        .bind(row.timestamp)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::AlreadyExists)
            }
            Err(e) => Err(StoreError::DriverError(e)),
        }
    }

    /// `UpdateSwapResult(key, updates)` - field-selective; only specified
    /// fields change. Per the Open Question resolution: clearing `swap_tx`
    /// (i.e. setting the new status to `MatchTxEmpty`) also clears
    /// `old_swap_txs`, `swap_height`, `swap_time` regardless of memo.
    pub async fn update_swap_result(
        &self,
        key: &SwapIdentifier,
        update: &SwapResultUpdate,
    ) -> Result<(), StoreError> {
        let clearing = matches!(update.status, Some(s) if s == Status::MatchTxEmpty as i32);

        let swap_tx = if clearing { Some(None) } else { update.swap_tx.clone() };
        let old_swap_txs = if clearing {
            Some(Vec::new())
        } else {
            update.old_swap_txs.clone()
        };
        let swap_height = if clearing { Some(None) } else { update.swap_height };
        let swap_time = if clearing { Some(None) } else { update.swap_time };

        let row = self
            .find_swap_result(key)
            .await?
            .ok_or(StoreError::NotFound)?;

        let next_swap_tx = swap_tx.unwrap_or(row.swap_tx);
        let next_old_swap_txs = old_swap_txs.unwrap_or(row.old_swap_txs);
        let next_swap_height = swap_height.unwrap_or(row.swap_height);
        let next_swap_time = swap_time.unwrap_or(row.swap_time);
        let next_swap_value = update.swap_value.clone().unwrap_or(row.swap_value);
        let next_swap_nonce = update.swap_nonce.unwrap_or(row.swap_nonce);
        let next_status = update.status.unwrap_or(row.status);
        let next_memo = update.memo.clone().unwrap_or(row.memo);

        sqlx::query(
            r#"UPDATE swap_result SET
                swap_tx = $1, old_swap_txs = $2, swap_height = $3, swap_time = $4,
                swap_value = $5, swap_nonce = $6, status = $7, memo = $8, updated_at = now()
               WHERE swap_key = $9"#,
        )
        .bind(&next_swap_tx)
        .bind(&next_old_swap_txs)
        .bind(next_swap_height)
        .bind(next_swap_time)
        .bind(&next_swap_value)
        .bind(next_swap_nonce)
        .bind(next_status)
        .bind(&next_memo)
        .bind(key.key())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// `FindSwapResultsForUser(chainID, address, offset, limit)` - negative
    /// limit means "newest first".
    pub async fn find_swap_results_for_user(
        &self,
        chain_id: u64,
        address: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SwapResultRow>, StoreError> {
        let (order, limit) = if limit < 0 {
            ("DESC", -limit)
        } else {
            ("ASC", limit)
        };
        let query = format!(
            r#"SELECT sr.* FROM swap_result sr
               JOIN swap s ON s.swap_key = sr.swap_key
               WHERE s.from_chain_id = $1 AND s.from_address = $2
               ORDER BY sr.timestamp {order}
               OFFSET $3 LIMIT $4"#
        );
        let rows = sqlx::query_as::<_, SwapResultRow>(&query)
            .bind(chain_id as i64)
            .bind(address)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Blacklist check consulted by the Verify and Swap workers (§4.6.1,
    /// §4.6.2). Addresses are stored lowercased.
    pub async fn is_blacklisted(&self, address: &str) -> Result<bool, StoreError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM swap_blacklist WHERE address = $1)",
        )
        .bind(address.to_lowercase())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn add_to_blacklist(&self, address: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO swap_blacklist (address) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(address.to_lowercase())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts used by the admin/status API (C9, ambient).
    pub async fn count_with_status(&self, status: Status) -> Result<i64, StoreError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM swap WHERE status = $1")
                .bind(status as i32)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Escape hatch for code that wants the raw row count via a fetched
    /// single-column query, e.g. the scanner's "already registered" check.
    pub async fn swap_exists(&self, key: &SwapIdentifier) -> Result<bool, StoreError> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM swap WHERE swap_key = $1)")
                .bind(key.key())
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }
}
