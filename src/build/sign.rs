//! Raw legacy-transaction assembly and signing, local or MPC (§4.5 "Sign").
//!
//! The router contract calls are hand-packed the same way the Config
//! Registry's `eth_call`s are (`abi::build_calldata`) rather than going
//! through a generated Solidity binding, so signing is done at the
//! transaction-envelope level instead of through a `sol!` contract handle.

use crate::build::mpc::MpcClient;
use crate::errors::BuildError;
use crate::types::Address;
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::primitives::{Address as AlloyAddress, Bytes, Signature, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;

/// Everything needed to assemble one EVM legacy transaction.
pub struct UnsignedTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub calldata: Vec<u8>,
}

impl UnsignedTx {
    fn into_tx_legacy(self) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Call(AlloyAddress::from_slice(&self.to.0)),
            value: U256::ZERO,
            input: Bytes::from(self.calldata),
        }
    }
}

/// Sign `unsigned` with a locally held private key (§4.5: "if the token's
/// key material is present locally, sign in-process"), returning EIP-155
/// encoded raw transaction bytes ready for `eth_sendRawTransaction`.
pub async fn sign_local(unsigned: UnsignedTx, private_key_hex: &str) -> Result<Vec<u8>, BuildError> {
    let signer: PrivateKeySigner = private_key_hex
        .parse()
        .map_err(|e| BuildError::SignFailed(format!("invalid private key: {}", e)))?;

    let tx = unsigned.into_tx_legacy();
    let sig_hash = tx.signature_hash();
    let signature = signer
        .sign_hash(&sig_hash)
        .await
        .map_err(|e| BuildError::SignFailed(e.to_string()))?;

    encode_signed(tx, signature)
}

/// Sign `unsigned` via the MPC group (§4.5: "assemble an MPC sign request:
/// hash the signing payload, POST to the MPC gateway, poll for the
/// signature, verify it against the MPC pubkey, assemble `(r, s, v)` per
/// EIP-155").
pub async fn sign_mpc(
    unsigned: UnsignedTx,
    mpc: &MpcClient,
    mpc_pubkey: Option<&Address>,
) -> Result<Vec<u8>, BuildError> {
    let tx = unsigned.into_tx_legacy();
    let sig_hash = tx.signature_hash();

    let hash_bytes: [u8; 32] = sig_hash.as_slice().try_into().unwrap();
    let sig = mpc.sign(&hash_bytes, mpc_pubkey).await?;
    let parity = (sig.v & 1) == 1;
    let signature = Signature::new(U256::from_be_bytes(sig.r), U256::from_be_bytes(sig.s), parity);

    encode_signed(tx, signature)
}

fn encode_signed(tx: TxLegacy, signature: Signature) -> Result<Vec<u8>, BuildError> {
    let signed = tx.into_signed(signature);
    let envelope = TxEnvelope::Legacy(signed);
    Ok(envelope.encoded_2718())
}
