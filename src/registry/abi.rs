//! Minimal fixed-layout ABI helpers for the config registry's positional
//! tuple decoding (§4.1: "ABI-packed fixed-layout tuples (12 slots, 32 bytes
//! each) decoded positionally"). This is not a general Solidity ABI codec -
//! only the handful of shapes the config contract and router/log decoding
//! need, hand-rolled in the style of the teacher's manual byte slicing in
//! `types.rs` (`EvmAddress::from_bytes32`/`as_bytes32`).

use crate::types::Address;
use eyre::{eyre, Result};
use num_bigint::BigInt;

pub const WORD: usize = 32;

/// A cursor over 32-byte words, used to decode both `eth_call` return data
/// and log `data` segments.
pub struct WordReader<'a> {
    data: &'a [u8],
}

impl<'a> WordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn word_count(&self) -> usize {
        self.data.len() / WORD
    }

    pub fn word(&self, index: usize) -> Result<&'a [u8]> {
        let start = index * WORD;
        let end = start + WORD;
        if end > self.data.len() {
            return Err(eyre!(
                "word index {} out of range ({} bytes available)",
                index,
                self.data.len()
            ));
        }
        Ok(&self.data[start..end])
    }

    pub fn u64_at(&self, index: usize) -> Result<u64> {
        let w = self.word(index)?;
        // Big-endian, left-padded; take the low 8 bytes.
        Ok(u64::from_be_bytes(w[24..32].try_into().unwrap()))
    }

    pub fn u32_at(&self, index: usize) -> Result<u32> {
        Ok(self.u64_at(index)? as u32)
    }

    pub fn bool_at(&self, index: usize) -> Result<bool> {
        Ok(self.u64_at(index)? != 0)
    }

    pub fn address_at(&self, index: usize) -> Result<Address> {
        Address::from_bytes32(self.word(index)?)
    }

    /// A `uint256`/`int256` word read as an unsigned big integer.
    pub fn bigint_at(&self, index: usize) -> Result<BigInt> {
        let w = self.word(index)?;
        Ok(BigInt::from_bytes_be(num_bigint::Sign::Plus, w))
    }

    /// A float encoded as a fixed-point integer scaled by 1e6, the config
    /// contract's convention for human-readable parameters (§4.1: "values
    /// expressed in base units are converted to human units by dividing by
    /// `10^decimals`").
    pub fn fixed_point_at(&self, index: usize, scale_decimals: u32) -> Result<f64> {
        let raw = self.u64_at(index)?;
        Ok(raw as f64 / 10f64.powi(scale_decimals as i32))
    }

    /// A right-padded ASCII string stored in a single word (used for short
    /// identifiers like `blockChain`), trimmed of trailing NULs.
    pub fn short_string_at(&self, index: usize) -> Result<String> {
        let w = self.word(index)?;
        let end = w.iter().position(|&b| b == 0).unwrap_or(w.len());
        Ok(String::from_utf8_lossy(&w[..end]).into_owned())
    }

    /// Decode a dynamic `address[]` whose offset word points at `base_offset
    /// + offset`, per standard ABI dynamic-array encoding: length word
    /// followed by that many address words.
    pub fn address_array_at(&self, offset_index: usize) -> Result<Vec<Address>> {
        let rel_offset = self.u64_at(offset_index)? as usize;
        let len_index = rel_offset / WORD;
        let len = self.u64_at(len_index)? as usize;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.address_at(len_index + 1 + i)?);
        }
        Ok(out)
    }
}

/// Encode a `uint256` function argument as a left-padded 32-byte word.
pub fn encode_u256(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..32].copy_from_slice(&value.to_be_bytes());
    out
}

/// Encode an `address` function argument as a left-padded 32-byte word.
pub fn encode_address(addr: &Address) -> [u8; 32] {
    addr.as_bytes32()
}

/// Encode a `uint256` function argument from a big integer, left-padded.
/// Callers are expected to pass non-negative values representable in 256
/// bits, which holds for every swap amount in this system.
pub fn encode_bigint(value: &BigInt) -> [u8; 32] {
    let (_, be_bytes) = value.to_bytes_be();
    let mut out = [0u8; 32];
    let n = be_bytes.len().min(32);
    out[32 - n..].copy_from_slice(&be_bytes[be_bytes.len() - n..]);
    out
}

/// Encode a dynamic `address[]` array body (length word followed by each
/// element), for manual placement in a call's tail section.
pub fn encode_address_array(addrs: &[Address]) -> Vec<[u8; 32]> {
    let mut out = Vec::with_capacity(1 + addrs.len());
    out.push(encode_u256(addrs.len() as u64));
    for a in addrs {
        out.push(encode_address(a));
    }
    out
}

/// Build raw calldata: 4-byte selector followed by concatenated 32-byte
/// argument words, matching the Builder's ABI packing convention (§4.5).
pub fn build_calldata(selector: [u8; 4], words: &[[u8; 32]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + words.len() * WORD);
    out.extend_from_slice(&selector);
    for w in words {
        out.extend_from_slice(w);
    }
    out
}

/// The first 4 bytes of `keccak256(signature)`, the standard Solidity
/// function selector, computed at runtime the same way the teacher's
/// `ChainKey` derives its hash identifiers in `types.rs`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = alloy_primitives::keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.0[0..4]);
    out
}

/// The full `keccak256(signature)` of an event signature, used as `topic0`
/// instead of a hardcoded literal - same reasoning as [`selector`].
pub fn topic(signature: &str) -> [u8; 32] {
    alloy_primitives::keccak256(signature.as_bytes()).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_the_spec_literals() {
        // §6 "ABI function selectors".
        assert_eq!(selector("anySwapIn(bytes32,address,address,uint256,uint256)"), [0x82, 0x5b, 0xb1, 0x3c]);
        assert_eq!(
            selector("anySwapInUnderlying(bytes32,address,address,uint256,uint256)"),
            [0x3f, 0x88, 0xde, 0x89]
        );
        assert_eq!(
            selector("anySwapInExactTokensForTokens(bytes32,uint256,uint256,address[],address,uint256,uint256)"),
            [0x2f, 0xc1, 0xe7, 0x28]
        );
        assert_eq!(
            selector("anySwapInExactTokensForNative(bytes32,uint256,uint256,address[],address,uint256,uint256)"),
            [0x52, 0xa3, 0x97, 0xd5]
        );
    }

    #[test]
    fn u256_round_trips_through_encode_and_word_reader() {
        let word = encode_u256(424242);
        let data = word.to_vec();
        let reader = WordReader::new(&data);
        assert_eq!(reader.u64_at(0).unwrap(), 424242);
    }

    #[test]
    fn address_round_trips_through_encode_and_word_reader() {
        let addr = Address([0x11; 20]);
        let word = encode_address(&addr);
        let reader = WordReader::new(&word);
        assert_eq!(reader.address_at(0).unwrap(), addr);
    }

    #[test]
    fn bigint_round_trips_through_encode_and_word_reader() {
        let value = BigInt::from(123_456_789_012_345u64);
        let word = encode_bigint(&value);
        let reader = WordReader::new(&word);
        assert_eq!(reader.bigint_at(0).unwrap(), value);
    }

    #[test]
    fn address_array_decodes_offset_length_and_elements() {
        let a = Address([0x01; 20]);
        let b = Address([0x02; 20]);
        let path = vec![a, b];

        // One head word (the offset, pointing just past itself) followed by
        // the dynamic array body (length + elements), matching standard ABI
        // dynamic-array layout.
        let mut data = Vec::new();
        data.extend_from_slice(&encode_u256(WORD as u64));
        data.extend(encode_address_array(&path).concat());

        let reader = WordReader::new(&data);
        let decoded = reader.address_array_at(0).unwrap();
        assert_eq!(decoded, path);
    }

    #[test]
    fn fixed_point_at_scales_by_the_given_decimals() {
        let data = encode_u256(1_500_000); // 1.5 scaled by 1e6
        let reader = WordReader::new(&data);
        assert_eq!(reader.fixed_point_at(0, 6).unwrap(), 1.5);
    }

    #[test]
    fn short_string_at_trims_trailing_nuls() {
        let mut word = [0u8; 32];
        word[..3].copy_from_slice(b"eth");
        let reader = WordReader::new(&word);
        assert_eq!(reader.short_string_at(0).unwrap(), "eth");
    }

    #[test]
    fn word_out_of_range_is_an_error() {
        let data = encode_u256(1);
        let reader = WordReader::new(&data);
        assert!(reader.word(1).is_err());
    }

    #[test]
    fn build_calldata_prefixes_selector_before_words() {
        let sel = [0xde, 0xad, 0xbe, 0xef];
        let words = [encode_u256(1), encode_u256(2)];
        let calldata = build_calldata(sel, &words);
        assert_eq!(calldata.len(), 4 + 2 * WORD);
        assert_eq!(&calldata[0..4], &sel);
        assert_eq!(&calldata[4..36], &encode_u256(1));
    }
}
