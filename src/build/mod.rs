//! Builder/Signer (C5): turns a verified swap into a signed destination
//! transaction (§4.5).

pub mod mpc;
pub mod sign;

use crate::chain::ChainBridge;
use crate::errors::BuildError;
use crate::registry::abi;
use crate::types::{Address, ChainConfig, SwapIdentifier};
use mpc::MpcClient;
use num_bigint::BigInt;
use sign::UnsignedTx;
use std::time::{SystemTime, UNIX_EPOCH};

/// Caller-supplied overrides; `nonce`/`gas_price` are `None` on first
/// attempt and `Some` when the Replace worker rebuilds a stuck swap
/// (§4.6.4).
#[derive(Debug, Clone, Default)]
pub struct BuildExtra {
    pub nonce: Option<u64>,
    pub gas_price: Option<u128>,
}

/// Input to the Builder (§4.5).
pub struct BuildTxArgs {
    pub identifier: SwapIdentifier,
    pub to_chain_id: u64,
    pub from: Address,
    /// Destination-chain token address - the pipeline resolves the peer
    /// token via the registry before constructing these args, since
    /// `anySwapIn*` always takes the token as it exists on the chain the
    /// call executes on.
    pub token: Address,
    pub origin_value: BigInt,
    pub amount_out_min: BigInt,
    pub path: Vec<Address>,
    pub bind: Address,
    pub for_native: bool,
    pub for_underlying: bool,
    pub extra: BuildExtra,
}

/// Either a local key held in-process, or the MPC gateway.
pub enum Signer<'a> {
    Local(&'a str),
    Mpc {
        client: &'a MpcClient,
        pubkey: Option<&'a Address>,
    },
}

/// Result of a successful build+sign: the raw transaction plus the nonce
/// and gas price actually used, echoed back so the pipeline can persist
/// them (§4.5: "stamped onto the transaction and echoed back in the args").
/// `tx_hash` lets the pipeline commit the destination hash to the store
/// *before* broadcasting (§4.6.2: "the store write is the commit point").
pub struct BuiltTx {
    pub raw: Vec<u8>,
    pub nonce: u64,
    pub gas_price: u128,
    pub tx_hash: [u8; 32],
}

/// `anySwapIn*` selectors (§6), computed at runtime rather than hardcoded
/// (see [`abi::selector`]).
fn select_function(path_empty: bool, for_underlying: bool, for_native: bool) -> [u8; 4] {
    match (path_empty, for_underlying, for_native) {
        (true, false, _) => abi::selector("anySwapIn(bytes32,address,address,uint256,uint256)"),
        (true, true, _) => abi::selector("anySwapInUnderlying(bytes32,address,address,uint256,uint256)"),
        (false, _, false) => abi::selector(
            "anySwapInExactTokensForTokens(bytes32,uint256,uint256,address[],address,uint256,uint256)",
        ),
        (false, _, true) => abi::selector(
            "anySwapInExactTokensForNative(bytes32,uint256,uint256,address[],address,uint256,uint256)",
        ),
    }
}

fn pack_simple_call(
    selector: [u8; 4],
    txs: &SwapIdentifier,
    token: &Address,
    to: &Address,
    amount: &BigInt,
    from_chain_id: u64,
) -> Vec<u8> {
    let words = [
        txs.tx_id.0,
        abi::encode_address(token),
        abi::encode_address(to),
        abi::encode_bigint(amount),
        abi::encode_u256(from_chain_id),
    ];
    abi::build_calldata(selector, &words)
}

fn pack_trade_call(
    selector: [u8; 4],
    txs: &SwapIdentifier,
    amount_in: &BigInt,
    amount_out_min: &BigInt,
    path: &[Address],
    to: &Address,
    deadline: u64,
    from_chain_id: u64,
) -> Vec<u8> {
    // Head: txs, amountIn, amountOutMin, offset-to-path, to, deadline, fromChainID (7 words).
    const HEAD_WORDS: usize = 7;
    let path_offset = (HEAD_WORDS * abi::WORD) as u64;

    let mut words = vec![
        txs.tx_id.0,
        abi::encode_bigint(amount_in),
        abi::encode_bigint(amount_out_min),
        abi::encode_u256(path_offset),
        abi::encode_address(to),
        abi::encode_u256(deadline),
        abi::encode_u256(from_chain_id),
    ];
    words.extend(abi::encode_address_array(path));
    abi::build_calldata(selector, &words)
}

/// Build and sign one destination transaction (§4.5).
pub async fn build_and_sign(
    args: BuildTxArgs,
    dest_bridge: &ChainBridge,
    dest_cfg: &ChainConfig,
    signer: Signer<'_>,
) -> Result<BuiltTx, BuildError> {
    let path_empty = args.path.is_empty();
    let selector = select_function(path_empty, args.for_underlying, args.for_native);

    dest_bridge
        .check_balance(
            Some(&args.token),
            bigint_to_u128(&args.origin_value),
            crate::chain::DEFAULT_RESERVE_GAS,
        )
        .await?;

    let nonce = match args.extra.nonce {
        Some(n) => n,
        None => {
            let fetched = dest_bridge.get_pool_nonce_with_retry(&args.from).await?;
            dest_bridge.nonce_allocator().adjust_nonce(args.from, fetched).await
        }
    };

    let gas_price = match args.extra.gas_price {
        Some(p) => p,
        None => dest_bridge
            .suggest_gas_price(dest_cfg)
            .await
            .map_err(|e| BuildError::RpcQueryError(e.to_string()))?,
    };

    let calldata = if path_empty {
        pack_simple_call(
            selector,
            &args.identifier,
            &args.token,
            &args.bind,
            &args.origin_value,
            args.identifier.from_chain_id,
        )
    } else {
        let deadline = now_secs() + dest_cfg.swap_deadline_offset;
        pack_trade_call(
            selector,
            &args.identifier,
            &args.origin_value,
            &args.amount_out_min,
            &args.path,
            &args.bind,
            deadline,
            args.identifier.from_chain_id,
        )
    };

    let unsigned = UnsignedTx {
        chain_id: args.to_chain_id,
        nonce,
        gas_price,
        gas_limit: dest_cfg.default_gas_limit,
        to: dest_cfg.router_contract,
        calldata,
    };

    let raw = match signer {
        Signer::Local(private_key) => sign::sign_local(unsigned, private_key).await?,
        Signer::Mpc { client, pubkey } => sign::sign_mpc(unsigned, client, pubkey).await?,
    };
    let tx_hash = alloy_primitives::keccak256(&raw).0;

    Ok(BuiltTx {
        raw,
        nonce,
        gas_price,
        tx_hash,
    })
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn bigint_to_u128(value: &BigInt) -> u128 {
    value.to_string().parse().unwrap_or(u128::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::abi::WordReader;
    use crate::types::TxHash;

    #[test]
    fn select_function_picks_anyswapin_for_empty_path() {
        assert_eq!(
            select_function(true, false, false),
            abi::selector("anySwapIn(bytes32,address,address,uint256,uint256)")
        );
    }

    #[test]
    fn select_function_picks_underlying_variant() {
        assert_eq!(
            select_function(true, true, false),
            abi::selector("anySwapInUnderlying(bytes32,address,address,uint256,uint256)")
        );
    }

    #[test]
    fn select_function_picks_trade_variant_by_for_native() {
        assert_eq!(
            select_function(false, false, false),
            abi::selector(
                "anySwapInExactTokensForTokens(bytes32,uint256,uint256,address[],address,uint256,uint256)"
            )
        );
        assert_eq!(
            select_function(false, false, true),
            abi::selector(
                "anySwapInExactTokensForNative(bytes32,uint256,uint256,address[],address,uint256,uint256)"
            )
        );
    }

    #[test]
    fn pack_simple_call_prefixes_selector_and_encodes_amount() {
        let identifier = SwapIdentifier::new(56, TxHash([0x11; 32]), 0);
        let token = Address([0x22; 20]);
        let to = Address([0x33; 20]);
        let amount = BigInt::from(1_000_000u64);
        let selector = abi::selector("anySwapIn(bytes32,address,address,uint256,uint256)");

        let calldata = pack_simple_call(selector, &identifier, &token, &to, &amount, 56);

        assert_eq!(&calldata[0..4], &selector);
        // 5 head words after the selector: txid, token, to, amount, fromChainID.
        assert_eq!(calldata.len(), 4 + 5 * abi::WORD);
        let reader = WordReader::new(&calldata[4..]);
        assert_eq!(reader.address_at(1).unwrap(), token);
        assert_eq!(reader.address_at(2).unwrap(), to);
        assert_eq!(reader.bigint_at(3).unwrap(), amount);
        assert_eq!(reader.u64_at(4).unwrap(), 56);
    }

    #[test]
    fn pack_trade_call_places_path_after_the_fixed_head() {
        let identifier = SwapIdentifier::new(56, TxHash([0x11; 32]), 0);
        let path = vec![Address([0x01; 20]), Address([0x02; 20]), Address([0x03; 20])];
        let to = Address([0x33; 20]);
        let selector = abi::selector(
            "anySwapInExactTokensForTokens(bytes32,uint256,uint256,address[],address,uint256,uint256)",
        );

        let calldata = pack_trade_call(
            selector,
            &identifier,
            &BigInt::from(500u64),
            &BigInt::from(1u64),
            &path,
            &to,
            123456,
            56,
        );

        let reader = WordReader::new(&calldata[4..]);
        // Head word 3 (index 3) holds the byte offset to the path's length word.
        let path_offset = reader.u64_at(3).unwrap() as usize;
        assert_eq!(path_offset, 7 * abi::WORD);
        let decoded_path = reader.address_array_at(3).unwrap();
        assert_eq!(decoded_path, path);
    }
}
