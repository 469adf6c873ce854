//! Small `reqwest` wrapper around the external MPC (threshold-signature)
//! gateway (§4.5 Ambient): POST a sign request, then poll for the result -
//! the same "POST then poll" shape the pack's `x402` facilitator uses for
//! its client/server split, grounded in the teacher's general `reqwest`
//! dependency rather than any bespoke RPC framework.

use crate::errors::BuildError;
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    #[serde(rename = "keytype")]
    key_type: &'a str,
    message: String,
    #[serde(rename = "sigDataType")]
    sig_data_type: &'a str,
    #[serde(rename = "groupId")]
    group_id: &'a str,
    #[serde(rename = "threshold")]
    threshold: &'a str,
    mode: u32,
}

#[derive(Debug, Deserialize)]
struct SignAccepted {
    key: String,
}

#[derive(Debug, Deserialize)]
struct SignStatus {
    status: String,
    #[serde(default)]
    rsv: Option<String>,
}

/// A recovered `(r, s, v)` signature over the hash the bridge asked the MPC
/// group to sign.
pub struct MpcSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

pub struct MpcClient {
    http: reqwest::Client,
    api_address: String,
    group_id: String,
    threshold: String,
    mode: u32,
    sign_timeout: Duration,
}

impl MpcClient {
    pub fn new(
        api_address: String,
        group_id: String,
        threshold: String,
        mode: u32,
        sign_timeout_secs: u64,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_address,
            group_id,
            threshold,
            mode,
            sign_timeout: Duration::from_secs(sign_timeout_secs),
        }
    }

    /// Request a signature over `message_hash`, polling `GET
    /// /signstatus/{key}` until a result arrives or `sign_timeout` elapses.
    pub async fn sign(
        &self,
        message_hash: &[u8; 32],
        mpc_pubkey_hint: Option<&Address>,
    ) -> Result<MpcSignature, BuildError> {
        let req = SignRequest {
            key_type: "EC256K1",
            message: hex::encode(message_hash),
            sig_data_type: "hash",
            group_id: &self.group_id,
            threshold: &self.threshold,
            mode: self.mode,
        };

        let accepted: SignAccepted = self
            .http
            .post(format!("{}/sign", self.api_address))
            .json(&req)
            .send()
            .await
            .map_err(|e| BuildError::SignFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| BuildError::SignFailed(e.to_string()))?;

        debug!(key = %accepted.key, pubkey_hint = ?mpc_pubkey_hint, "MPC sign request accepted");

        let deadline = tokio::time::Instant::now() + self.sign_timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(BuildError::MpcTimeout);
            }

            let status: SignStatus = self
                .http
                .get(format!("{}/signstatus/{}", self.api_address, accepted.key))
                .send()
                .await
                .map_err(|e| BuildError::SignFailed(e.to_string()))?
                .json()
                .await
                .map_err(|e| BuildError::SignFailed(e.to_string()))?;

            match status.status.as_str() {
                "success" => {
                    let rsv = status.rsv.ok_or_else(|| {
                        BuildError::SignFailed("MPC returned success with no signature".into())
                    })?;
                    return parse_rsv(&rsv);
                }
                "failure" | "timeout" => {
                    return Err(BuildError::SignFailed(format!(
                        "MPC signing ended with status {}",
                        status.status
                    )));
                }
                _ => {
                    warn!(status = %status.status, "MPC signature still pending, polling again");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }
}

/// `rsv` is a hex-encoded 65-byte `r || s || v` blob, the dcrm group's
/// conventional signature encoding.
fn parse_rsv(rsv: &str) -> Result<MpcSignature, BuildError> {
    let bytes = hex::decode(rsv.strip_prefix("0x").unwrap_or(rsv))
        .map_err(|e| BuildError::SignFailed(format!("invalid rsv hex: {}", e)))?;
    if bytes.len() != 65 {
        return Err(BuildError::SignFailed(format!(
            "expected 65-byte rsv, got {}",
            bytes.len()
        )));
    }
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[0..32]);
    s.copy_from_slice(&bytes[32..64]);
    Ok(MpcSignature { r, s, v: bytes[64] })
}
