//! `swap.AdminCall` (§6): an ECDSA-signed envelope carrying one of
//! `passbigvalue`, `reswap`, `replaceswap`. The raw call is
//! `signature(65 bytes) || canonical JSON payload`; the signer recovered
//! from the signature over `keccak256(payload)` must be in `relayer.admins`.

use super::AppState;
use crate::pipeline::replace_worker;
use crate::store::SwapResultUpdate;
use crate::types::{Address, SwapIdentifier, Status};
use alloy::primitives::Signature;
use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct AdminCallParams {
    #[serde(rename = "rawTx")]
    raw_tx: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct AdminPayload {
    method: String,
    params: Vec<String>,
}

pub async fn admin_call(state: &AppState, params: Value) -> Result<Value, String> {
    let p: AdminCallParams = parse_params(params)?;
    let raw = hex::decode(p.raw_tx.trim_start_matches("0x")).map_err(|e| e.to_string())?;
    if raw.len() <= 65 {
        return Err("rawTx too short to contain a signature".to_string());
    }
    let (sig_bytes, payload_bytes) = raw.split_at(65);

    let signature = Signature::from_raw(sig_bytes).map_err(|e| e.to_string())?;
    let hash = keccak256(payload_bytes);
    let recovered = signature
        .recover_address_from_prehash(&hash)
        .map_err(|e| e.to_string())?;
    let admin_addr = Address(recovered.into_array());

    if !state.relayer.admins.contains(&admin_addr) {
        return Err(format!("{} is not an authorized admin", admin_addr));
    }

    let payload: AdminPayload = serde_json::from_slice(payload_bytes).map_err(|e| e.to_string())?;

    match payload.method.as_str() {
        "passbigvalue" => pass_big_value(state, &payload.params).await,
        "reswap" => reswap(state, &payload.params).await,
        "replaceswap" => replaceswap(state, &payload.params).await,
        other => Err(format!("unknown admin method: {}", other)),
    }
}

/// `AdminCall` params are always positional JSON; `rawTx` may also arrive as
/// a bare single-element array (`["0x..."]`) per the distilled spec's
/// `(rawTx, result)` signature, where `result` is the RPC library's
/// out-parameter and carries no request data.
fn parse_params(params: Value) -> Result<AdminCallParams, String> {
    if let Value::Array(arr) = &params {
        if let Some(Value::String(s)) = arr.first() {
            return Ok(AdminCallParams { raw_tx: s.clone() });
        }
    }
    serde_json::from_value(params).map_err(|e| e.to_string())
}

fn swap_key_arg(params: &[String]) -> Result<&str, String> {
    params.first().map(|s| s.as_str()).ok_or_else(|| "missing swapKey argument".to_string())
}

async fn pass_big_value(state: &AppState, params: &[String]) -> Result<Value, String> {
    let key = swap_key_arg(params)?;
    let identifier = SwapIdentifier::parse_key(key).map_err(|e| e.to_string())?;

    let swap = state
        .relayer
        .store
        .find_swap(&identifier)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "swap not found".to_string())?;
    if swap.status != Status::TxWithBigValue as i32 {
        return Err("swap is not awaiting big-value approval".to_string());
    }

    state
        .relayer
        .store
        .update_swap_status(&identifier, Status::TxNotSwapped, crate::pipeline::now_secs(), "admin: passbigvalue")
        .await
        .map_err(|e| e.to_string())?;
    state
        .relayer
        .store
        .update_swap_result(
            &identifier,
            &SwapResultUpdate {
                status: Some(Status::MatchTxEmpty as i32),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| e.to_string())?;

    Ok(Value::String(format!("{} approved for swap", key)))
}

async fn reswap(state: &AppState, params: &[String]) -> Result<Value, String> {
    let key = swap_key_arg(params)?;
    let identifier = SwapIdentifier::parse_key(key).map_err(|e| e.to_string())?;

    state
        .relayer
        .store
        .update_swap_status(&identifier, Status::TxNotSwapped, crate::pipeline::now_secs(), "admin: reswap")
        .await
        .map_err(|e| e.to_string())?;
    // Clearing the result to MatchTxEmpty also clears swapTx/oldSwapTxs/
    // swapHeight/swapTime (I3), forcing the Swap worker to redo the build.
    state
        .relayer
        .store
        .update_swap_result(
            &identifier,
            &SwapResultUpdate {
                status: Some(Status::MatchTxEmpty as i32),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| e.to_string())?;

    Ok(Value::String(format!("{} reset for reswap", key)))
}

async fn replaceswap(state: &AppState, params: &[String]) -> Result<Value, String> {
    let key = swap_key_arg(params)?;
    let identifier = SwapIdentifier::parse_key(key).map_err(|e| e.to_string())?;

    replace_worker::force_replace(&state.relayer, &identifier)
        .await
        .map_err(|e| e.to_string())?;

    Ok(Value::String(format!("{} replacement submitted", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_params_accepts_bare_array_form() {
        let params = serde_json::json!(["0xdeadbeef"]);
        let parsed = parse_params(params).unwrap();
        assert_eq!(parsed.raw_tx, "0xdeadbeef");
    }

    #[test]
    fn parse_params_accepts_object_form() {
        let params = serde_json::json!({ "rawTx": "0xdeadbeef" });
        let parsed = parse_params(params).unwrap();
        assert_eq!(parsed.raw_tx, "0xdeadbeef");
    }

    #[test]
    fn parse_params_rejects_empty_array() {
        assert!(parse_params(serde_json::json!([])).is_err());
    }

    #[test]
    fn swap_key_arg_returns_first_element() {
        let params = vec!["56:0xabc:2".to_string(), "extra".to_string()];
        assert_eq!(swap_key_arg(&params).unwrap(), "56:0xabc:2");
    }

    #[test]
    fn swap_key_arg_errors_on_empty_params() {
        assert!(swap_key_arg(&[]).is_err());
    }
}
