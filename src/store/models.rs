//! Row types for the `swap` and `swap_result` tables, following the teacher's
//! `db::models` convention of plain `sqlx::FromRow` structs plus `New*` insert
//! shapes.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Row in the `swap` table (§3 "Swap").
#[derive(Debug, Clone, FromRow)]
pub struct SwapRow {
    pub swap_key: String,
    pub from_chain_id: i64,
    pub tx_id: String,
    pub log_index: i32,
    pub to_chain_id: i64,
    pub token_id: String,
    pub token: String,
    pub path: Vec<String>,
    pub bind: String,
    pub from_address: String,
    pub value: String,
    pub amount_out_min: String,
    pub for_native: bool,
    pub for_underlying: bool,
    pub timestamp: i64,
    pub status: i32,
    pub memo: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for a new `swap` row.
#[derive(Debug, Clone)]
pub struct NewSwapRow {
    pub swap_key: String,
    pub from_chain_id: i64,
    pub tx_id: String,
    pub log_index: i32,
    pub to_chain_id: i64,
    pub token_id: String,
    pub token: String,
    pub path: Vec<String>,
    pub bind: String,
    pub from_address: String,
    pub value: String,
    pub amount_out_min: String,
    pub for_native: bool,
    pub for_underlying: bool,
    pub timestamp: i64,
    pub status: i32,
    pub memo: String,
}

/// Row in the `swap_result` table (§3 "SwapResult").
#[derive(Debug, Clone, FromRow)]
pub struct SwapResultRow {
    pub swap_key: String,
    pub from_chain_id: i64,
    pub tx_id: String,
    pub log_index: i32,
    pub swap_tx: Option<String>,
    pub old_swap_txs: Vec<String>,
    pub swap_height: Option<i64>,
    pub swap_time: Option<i64>,
    pub swap_value: Option<String>,
    pub swap_nonce: Option<i64>,
    pub status: i32,
    pub memo: String,
    pub timestamp: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for a new `swap_result` row, created empty by the Verifier
/// (§4.6.1: "created, `MatchTxEmpty`" / "created, `WithBigValue`").
#[derive(Debug, Clone)]
pub struct NewSwapResultRow {
    pub swap_key: String,
    pub from_chain_id: i64,
    pub tx_id: String,
    pub log_index: i32,
    pub status: i32,
    pub memo: String,
    pub timestamp: i64,
}

/// Field-selective update for `swap_result` (§4.3 `UpdateSwapResult`). `None`
/// means "leave unchanged"; setting `swap_tx` to `Some(None)` clears it (and,
/// per the Open Question resolution, also clears `old_swap_txs`,
/// `swap_height`, `swap_time` whenever the new status is `MatchTxEmpty`).
#[derive(Debug, Clone, Default)]
pub struct SwapResultUpdate {
    pub swap_tx: Option<Option<String>>,
    pub old_swap_txs: Option<Vec<String>>,
    pub swap_height: Option<Option<i64>>,
    pub swap_time: Option<Option<i64>>,
    pub swap_value: Option<Option<String>>,
    pub swap_nonce: Option<Option<i64>>,
    pub status: Option<i32>,
    pub memo: Option<String>,
}
