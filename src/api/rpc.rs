//! JSON-RPC 2.0 dispatch for `/rpc` (§6): one envelope, one `method` field,
//! `params` shaped per-method, matching the distilled spec's `swap.*`
//! method names verbatim.

use super::admin;
use super::AppState;
use crate::register::register_router_swap;
use crate::store::{SwapResultRow, SwapRow};
use crate::types::{SwapIdentifier, TxHash};
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    fn err(id: Value, message: impl ToString) -> Self {
        Self { id, result: None, error: Some(message.to_string()) }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterParams {
    chainid: u64,
    txid: String,
    logindex: u32,
}

#[derive(Debug, Deserialize)]
struct GetSwapParams {
    chainid: u64,
    txid: String,
    logindex: u32,
}

#[derive(Debug, Deserialize)]
struct GetHistoryParams {
    chainid: u64,
    address: String,
    #[serde(default)]
    offset: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    -50
}

/// A `Swap` row joined with its (possibly absent) `SwapResult`, the shape
/// returned by `GetRouterSwap`/`GetRouterSwapHistory`.
#[derive(Debug, Serialize)]
pub struct SwapInfoResponse {
    pub swap_key: String,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub tx_id: String,
    pub log_index: u32,
    pub token_id: String,
    pub token: String,
    pub path: Vec<String>,
    pub bind: String,
    pub from_address: String,
    pub value: String,
    pub amount_out_min: String,
    pub for_native: bool,
    pub for_underlying: bool,
    pub status: i32,
    pub memo: String,
    pub swap_tx: Option<String>,
    pub old_swap_txs: Vec<String>,
    pub swap_height: Option<i64>,
    pub swap_time: Option<i64>,
    pub swap_value: Option<String>,
    pub result_status: Option<i32>,
}

fn to_response(swap: SwapRow, result: Option<SwapResultRow>) -> SwapInfoResponse {
    SwapInfoResponse {
        swap_key: swap.swap_key,
        from_chain_id: swap.from_chain_id as u64,
        to_chain_id: swap.to_chain_id as u64,
        tx_id: swap.tx_id,
        log_index: swap.log_index as u32,
        token_id: swap.token_id,
        token: swap.token,
        path: swap.path,
        bind: swap.bind,
        from_address: swap.from_address,
        value: swap.value,
        amount_out_min: swap.amount_out_min,
        for_native: swap.for_native,
        for_underlying: swap.for_underlying,
        status: swap.status,
        memo: swap.memo,
        swap_tx: result.as_ref().and_then(|r| r.swap_tx.clone()),
        old_swap_txs: result.as_ref().map(|r| r.old_swap_txs.clone()).unwrap_or_default(),
        swap_height: result.as_ref().and_then(|r| r.swap_height),
        swap_time: result.as_ref().and_then(|r| r.swap_time),
        swap_value: result.as_ref().and_then(|r| r.swap_value.clone()),
        result_status: result.map(|r| r.status),
    }
}

pub async fn handle_rpc(State(state): State<AppState>, Json(req): Json<RpcRequest>) -> Json<RpcResponse> {
    let id = req.id.clone();
    let result = dispatch(&state, req).await;
    Json(match result {
        Ok(value) => RpcResponse::ok(id, value),
        Err(e) => RpcResponse::err(id, e),
    })
}

async fn dispatch(state: &AppState, req: RpcRequest) -> Result<Value, String> {
    match req.method.as_str() {
        "swap.RegisterRouterSwap" => register_router_swap_rpc(state, req.params).await,
        "swap.GetRouterSwap" => get_router_swap(state, req.params).await,
        "swap.GetRouterSwapHistory" => get_router_swap_history(state, req.params).await,
        "swap.GetVersionInfo" => Ok(Value::String(env!("CARGO_PKG_VERSION").to_string())),
        "swap.AdminCall" => admin::admin_call(state, req.params).await,
        other => Err(format!("unknown method: {}", other)),
    }
}

async fn register_router_swap_rpc(state: &AppState, params: Value) -> Result<Value, String> {
    let p: RegisterParams = serde_json::from_value(params).map_err(|e| e.to_string())?;
    let tx_id = TxHash::from_hex(&p.txid).map_err(|e| e.to_string())?;
    let outcomes = register_router_swap(&state.relayer, p.chainid, tx_id, p.logindex).await;
    let by_string_key: HashMap<String, String> =
        outcomes.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    serde_json::to_value(by_string_key).map_err(|e| e.to_string())
}

async fn get_router_swap(state: &AppState, params: Value) -> Result<Value, String> {
    let p: GetSwapParams = serde_json::from_value(params).map_err(|e| e.to_string())?;
    let tx_id = TxHash::from_hex(&p.txid).map_err(|e| e.to_string())?;
    let identifier = SwapIdentifier::new(p.chainid, tx_id, p.logindex);

    let swap = state
        .relayer
        .store
        .find_swap(&identifier)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "swap not found".to_string())?;
    let result = state
        .relayer
        .store
        .find_swap_result(&identifier)
        .await
        .map_err(|e| e.to_string())?;

    serde_json::to_value(to_response(swap, result)).map_err(|e| e.to_string())
}

async fn get_router_swap_history(state: &AppState, params: Value) -> Result<Value, String> {
    let p: GetHistoryParams = serde_json::from_value(params).map_err(|e| e.to_string())?;

    let results = state
        .relayer
        .store
        .find_swap_results_for_user(p.chainid, &p.address.to_lowercase(), p.offset, p.limit)
        .await
        .map_err(|e| e.to_string())?;

    let mut out = Vec::with_capacity(results.len());
    for result in results {
        let identifier = SwapIdentifier::new(
            result.from_chain_id as u64,
            TxHash::from_hex(&result.tx_id).map_err(|e| e.to_string())?,
            result.log_index as u32,
        );
        if let Some(swap) = state
            .relayer
            .store
            .find_swap(&identifier)
            .await
            .map_err(|e| e.to_string())?
        {
            out.push(to_response(swap, Some(result)));
        }
    }

    serde_json::to_value(out).map_err(|e| e.to_string())
}
