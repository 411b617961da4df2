//! Input hardening validators.
//!
//! A perimeter of lightweight checks run on every store/handler boundary.
//! These panic on violation by design: a value that fails
//! one of these checks indicates a programming error upstream (a caller
//! passing unvalidated data across a trust boundary), not a recoverable
//! runtime condition.
//!
//! Ported from `examples/original_source/riccardobl/nwcprovider/paranoia.py`.

use bitcoin::hashes::{sha256, Hash};

/// sha256 of known untyped-None sentinels (`""`, `" "`, `"None"`, `"True"`,
/// `"False"`) that occasionally leak into hex-typed fields when an upstream
/// caller serializes an absent value as its string representation instead
/// of omitting it.
fn bad_sha256_sentinels() -> [[u8; 32]; 5] {
    [
        sha256::Hash::hash(b"").to_byte_array(),
        sha256::Hash::hash(b" ").to_byte_array(),
        sha256::Hash::hash(b"None").to_byte_array(),
        sha256::Hash::hash(b"True").to_byte_array(),
        sha256::Hash::hash(b"False").to_byte_array(),
    ]
}

/// A 64-character lowercase hex string decoding to exactly 32 bytes, that is
/// not one of the known untyped-None sentinel hashes.
pub fn is_hex32(value: &str) -> bool {
    if value.len() != 64 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }
    let Ok(bytes) = hex::decode(value) else {
        return false;
    };
    let Ok(arr): Result<[u8; 32], _> = bytes.try_into() else {
        return false;
    };
    !bad_sha256_sentinels().contains(&arr)
}

/// A short, printable string with no control characters.
pub fn is_printable_short_string(value: &str, max_len: usize) -> bool {
    !value.is_empty()
        && value.chars().count() <= max_len
        && value.chars().all(|c| !c.is_control())
}

/// A millisatoshi amount in `[0, 10^10]`.
pub fn is_positive_msats(value: i64) -> bool {
    (0..=10_000_000_000).contains(&value)
}

/// A unix timestamp that fits in a signed 32-bit integer (consistent with
/// `expires_at == 0` meaning "never" elsewhere in the data model).
pub fn is_unix_timestamp(value: i64) -> bool {
    (0..=i64::from(i32::MAX)).contains(&value)
}

/// An alphanumeric (plus `_`/`-`) wallet id, non-empty and reasonably short.
pub fn is_wallet_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 128
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Panics if `value` is not a valid hex32 string. Use at store/handler
/// boundaries where a malformed pubkey/payment-hash would otherwise
/// propagate silently.
pub fn assert_hex32(value: &str, field: &str) {
    assert!(is_hex32(value), "invalid hex32 for {field}: {value:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_known_sentinels() {
        let none_hash = hex::encode(sha256::Hash::hash(b"None").to_byte_array());
        assert!(!is_hex32(&none_hash));
    }

    #[test]
    fn accepts_real_hash() {
        let good = hex::encode(sha256::Hash::hash(b"real payload").to_byte_array());
        assert!(is_hex32(&good));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_hex32("abcd"));
    }

    #[test]
    fn msats_bounds() {
        assert!(is_positive_msats(0));
        assert!(is_positive_msats(10_000_000_000));
        assert!(!is_positive_msats(-1));
        assert!(!is_positive_msats(10_000_000_001));
    }

    #[test]
    fn wallet_id_charset() {
        assert!(is_wallet_id("wallet-1_A"));
        assert!(!is_wallet_id("wallet 1"));
        assert!(!is_wallet_id(""));
    }
}
