//! Canonical serialization, schnorr signing/verification, and NIP-04 payload
//! encryption.
//!
//! Key types mirror `cashu::nuts::nut01`: thin newtypes over
//! `bitcoin::secp256k1` that carry hex (de)serialization and a `Deref` to the
//! inner secp256k1 type.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1::{self, ecdh, rand::rngs::OsRng, All, Keypair, Message, Secp256k1};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::Error;

/// Shared secp256k1 context, randomized once at process start.
///
/// Mirrors `cashu::util::SECP256K1`.
pub static SECP256K1: Lazy<Secp256k1<All>> = Lazy::new(|| {
    let mut ctx = Secp256k1::new();
    let mut rng = secp256k1::rand::thread_rng();
    ctx.randomize(&mut rng);
    ctx
});

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// A 32-byte secp256k1 secret key.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    inner: secp256k1::SecretKey,
}

impl Deref for SecretKey {
    type Target = secp256k1::SecretKey;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey").field("inner", &"[REDACTED]").finish()
    }
}

impl From<secp256k1::SecretKey> for SecretKey {
    fn from(inner: secp256k1::SecretKey) -> Self {
        Self { inner }
    }
}

impl SecretKey {
    /// Generate a new random secret key.
    ///
    /// This is the provider's own keypair generator: called once at first
    /// boot, after which the key is persisted and reused.
    pub fn generate() -> Self {
        let (secret_key, _) = SECP256K1.generate_keypair(&mut OsRng);
        Self { inner: secret_key }
    }

    /// Parse from a 32-byte hex string.
    pub fn from_hex(hex: impl AsRef<str>) -> Result<Self, Error> {
        Ok(Self {
            inner: secp256k1::SecretKey::from_str(hex.as_ref())?,
        })
    }

    /// Hex-encode the secret bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.secret_bytes())
    }

    /// The x-only public key corresponding to this secret key.
    pub fn x_only_public_key(&self) -> PublicKey {
        let keypair = Keypair::from_secret_key(&SECP256K1, &self.inner);
        PublicKey {
            inner: keypair.x_only_public_key().0,
        }
    }

    fn keypair(&self) -> Keypair {
        Keypair::from_secret_key(&SECP256K1, &self.inner)
    }
}

/// A 32-byte x-only secp256k1 public key, as used throughout Nostr.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey {
    inner: secp256k1::XOnlyPublicKey,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl PublicKey {
    /// Parse from a 32-byte x-only hex string.
    pub fn from_hex(hex: impl AsRef<str>) -> Result<Self, Error> {
        Ok(Self {
            inner: secp256k1::XOnlyPublicKey::from_str(hex.as_ref())?,
        })
    }

    /// Hex-encode the x-only bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.serialize())
    }

    /// Reconstruct a compressed (33-byte) point by prepending `0x02`,
    /// matching Nostr's convention that x-only keys always carry an even
    /// y-coordinate; needed by libraries (here: ECDH) that want a full
    /// public key rather than an x-only one.
    fn to_compressed_public_key(self) -> Result<secp256k1::PublicKey, Error> {
        let mut bytes = [0u8; 33];
        bytes[0] = 0x02;
        bytes[1..].copy_from_slice(&self.inner.serialize());
        Ok(secp256k1::PublicKey::from_slice(&bytes)?)
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(hex: &str) -> Result<Self, Self::Err> {
        Self::from_hex(hex)
    }
}

/// Serialize a value the way the NIP-01 event id hash requires: compact
/// separators, no escaping of non-ASCII characters, and fields whose value
/// is JSON `null` omitted entirely. This is the exact serialization NIP-01
/// event ids are hashed over.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_canonical_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let mut first = true;
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                if !first {
                    out.push(',');
                }
                first = false;
                write_canonical_string(k, out);
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
    }
}

/// Write a JSON string without escaping non-ASCII characters (matching the
/// reference NIP-01 id algorithm, which only escapes the JSON-mandatory
/// characters: `"`, `\`, and control characters).
fn write_canonical_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// `sha256(canonical_json([0, pubkey, created_at, kind, tags, content]))`
pub fn event_id(
    pubkey: &PublicKey,
    created_at: u64,
    kind: u16,
    tags: &Value,
    content: &str,
) -> [u8; 32] {
    let tuple = Value::Array(vec![
        Value::from(0),
        Value::from(pubkey.to_hex()),
        Value::from(created_at),
        Value::from(kind),
        tags.clone(),
        Value::from(content),
    ]);
    let serialized = canonical_json(&tuple);
    sha256::Hash::hash(serialized.as_bytes()).to_byte_array()
}

/// Sign a 32-byte message digest with BIP-340 schnorr, using the x-only
/// public key derived from `secret_key`.
pub fn sign_schnorr(secret_key: &SecretKey, message_digest: &[u8; 32]) -> [u8; 64] {
    let msg = Message::from_digest(*message_digest);
    let sig = SECP256K1.sign_schnorr(&msg, &secret_key.keypair());
    sig.serialize()
}

/// Verify a BIP-340 schnorr signature against an x-only public key.
pub fn verify_schnorr(pubkey: &PublicKey, message_digest: &[u8; 32], sig: &[u8; 64]) -> bool {
    let msg = Message::from_digest(*message_digest);
    let signature = match secp256k1::schnorr::Signature::from_slice(sig) {
        Ok(s) => s,
        Err(_) => return false,
    };
    SECP256K1
        .verify_schnorr(&signature, &msg, &pubkey.inner)
        .is_ok()
}

/// NIP-04 payload encryption: ECDH shared secret + AES-256-CBC + PKCS7,
/// textually framed as `base64(ciphertext) + "?iv=" + base64(iv)`.
pub mod nip04 {
    use super::*;

    /// Source of initialization vectors. Production code must always use
    /// [`IvSource::Random`]; [`IvSource::Deterministic`] exists only so
    /// tests can assert on exact ciphertext bytes.
    #[derive(Debug, Clone, Copy)]
    pub enum IvSource {
        /// Cryptographic RNG (the only production-safe choice).
        Random,
        /// `sha256(seed)[..16]` — deterministic, test-only.
        Deterministic(u64),
    }

    fn shared_secret_x(secret_key: &SecretKey, counterparty: &PublicKey) -> Result<[u8; 32], Error> {
        let full_pubkey = (*counterparty).to_compressed_public_key()?;
        let shared = ecdh::SharedSecret::new(&full_pubkey, &secret_key.inner);
        // `SharedSecret::new` already returns sha256(compressed x-coordinate
        // point), matching NIP-04's `ECDH().x` convention used by reference
        // clients; we only need the raw 32 bytes here.
        Ok(*shared.as_ref())
    }

    fn iv_bytes(source: IvSource) -> [u8; 16] {
        match source {
            IvSource::Random => {
                let mut iv = [0u8; 16];
                rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut iv);
                iv
            }
            IvSource::Deterministic(seed) => {
                let hash = sha256::Hash::hash(&seed.to_le_bytes());
                let mut iv = [0u8; 16];
                iv.copy_from_slice(&hash.to_byte_array()[..16]);
                iv
            }
        }
    }

    /// Encrypt `plaintext` for `counterparty`, using `secret_key`'s side of
    /// the ECDH exchange.
    pub fn encrypt(
        secret_key: &SecretKey,
        counterparty: &PublicKey,
        plaintext: &str,
        iv_source: IvSource,
    ) -> Result<String, Error> {
        let key = shared_secret_x(secret_key, counterparty)?;
        let iv = iv_bytes(iv_source);

        let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(format!(
            "{}?iv={}",
            BASE64.encode(ciphertext),
            BASE64.encode(iv)
        ))
    }

    /// Decrypt a `<ciphertext_b64>?iv=<iv_b64>` payload from `counterparty`.
    pub fn decrypt(
        secret_key: &SecretKey,
        counterparty: &PublicKey,
        payload: &str,
    ) -> Result<String, Error> {
        let (ciphertext_b64, iv_b64) = payload
            .split_once("?iv=")
            .ok_or(Error::InvalidCiphertextShape)?;
        if iv_b64.is_empty() || ciphertext_b64.is_empty() {
            return Err(Error::InvalidCiphertextShape);
        }

        let key = shared_secret_x(secret_key, counterparty)?;
        let ciphertext = BASE64.decode(ciphertext_b64)?;
        let iv_bytes = BASE64.decode(iv_b64)?;
        if iv_bytes.len() != 16 {
            return Err(Error::InvalidCiphertextShape);
        }
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&iv_bytes);

        let plaintext = Aes256CbcDec::new(&key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| Error::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::nip04::IvSource;
    use super::*;

    fn keypair() -> (SecretKey, PublicKey) {
        let sk = SecretKey::generate();
        let pk = sk.x_only_public_key();
        (sk, pk)
    }

    #[test]
    fn nip04_round_trip() {
        let (alice_sk, alice_pk) = keypair();
        let (bob_sk, bob_pk) = keypair();

        let content = "hello from alice";
        let encrypted = nip04::encrypt(&alice_sk, &bob_pk, content, IvSource::Random).unwrap();
        let decrypted = nip04::decrypt(&bob_sk, &alice_pk, &encrypted).unwrap();
        assert_eq!(decrypted, content);
    }

    #[test]
    fn nip04_deterministic_iv_is_reproducible() {
        let (alice_sk, _) = keypair();
        let bob_pk = keypair().1;

        let a = nip04::encrypt(&alice_sk, &bob_pk, "msg", IvSource::Deterministic(7)).unwrap();
        let b = nip04::encrypt(&alice_sk, &bob_pk, "msg", IvSource::Deterministic(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nip04_rejects_malformed_shape() {
        let (sk, _) = keypair();
        let pk = keypair().1;
        assert!(nip04::decrypt(&sk, &pk, "not-a-valid-payload").is_err());
        assert!(nip04::decrypt(&sk, &pk, "abc?iv=").is_err());
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let (sk, pk) = keypair();
        let digest = sha256::Hash::hash(b"some event bytes").to_byte_array();
        let sig = sign_schnorr(&sk, &digest);
        assert!(verify_schnorr(&pk, &digest, &sig));

        let mut tampered = digest;
        tampered[0] ^= 0xff;
        assert!(!verify_schnorr(&pk, &tampered, &sig));
    }

    #[test]
    fn canonical_json_omits_nulls_and_is_compact() {
        let value = serde_json::json!({"a": 1, "b": null, "c": [1, 2, null]});
        let s = canonical_json(&value);
        assert_eq!(s, r#"{"a":1,"c":[1,2,null]}"#);
        assert!(!s.contains(", "));
        assert!(!s.contains(": "));
    }

    #[test]
    fn canonical_json_passes_non_ascii_through_unescaped() {
        let value = serde_json::json!({"x": "héllo→wörld"});
        let s = canonical_json(&value);
        assert!(s.contains("héllo→wörld"));
    }
}
