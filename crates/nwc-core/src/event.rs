//! NIP-01 event envelope: the in-memory shape, builder, and verification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::{self, PublicKey, SecretKey};
use crate::error::Error;

/// Kind of a provider-info event (NIP-47).
pub const KIND_INFO: u16 = 13194;
/// Kind of a NWC request event.
pub const KIND_REQUEST: u16 = 23194;
/// Kind of a NWC response event.
pub const KIND_RESPONSE: u16 = 23195;

/// A single Nostr tag: an ordered list of strings, first element the tag name.
pub type Tag = Vec<String>;

/// A NIP-01 event, as exchanged over the relay wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostrEvent {
    /// `sha256(canonical_json([0, pubkey, created_at, kind, tags, content]))`, hex
    pub id: String,
    /// Author public key, hex x-only
    pub pubkey: String,
    /// Seconds since epoch
    pub created_at: u64,
    /// Event kind
    pub kind: u16,
    /// Ordered list of tags
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Event content (for NIP-47 request/response events: a NIP-04 ciphertext)
    pub content: String,
    /// 64-byte schnorr signature, hex
    pub sig: String,
}

impl NostrEvent {
    /// Find the first tag matching `name` and return its second element.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// All values of tags matching `name` (e.g. all `e`-tags on a response event).
    pub fn tag_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name))
            .filter_map(|t| t.get(1))
            .map(String::as_str)
    }

    fn tags_json(&self) -> Value {
        Value::Array(
            self.tags
                .iter()
                .map(|t| Value::Array(t.iter().map(|s| Value::from(s.as_str())).collect()))
                .collect(),
        )
    }

    fn computed_id(&self) -> Result<[u8; 32], Error> {
        let pubkey = PublicKey::from_hex(&self.pubkey)?;
        Ok(crypto::event_id(
            &pubkey,
            self.created_at,
            self.kind,
            &self.tags_json(),
            &self.content,
        ))
    }

    /// Verify that `id` matches the canonical hash of the event's fields and
    /// that `sig` is a valid schnorr signature over that id for `pubkey`.
    ///
    /// Failures here are never surfaced to the counterparty — the caller
    /// should drop the event silently.
    pub fn verify(&self) -> bool {
        let Ok(computed) = self.computed_id() else {
            return false;
        };
        let id_hex = hex::encode(computed);
        if id_hex != self.id {
            return false;
        }

        let Ok(pubkey) = PublicKey::from_hex(&self.pubkey) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(&self.sig) else {
            return false;
        };
        let Ok(sig): Result<[u8; 64], _> = sig_bytes.try_into() else {
            return false;
        };

        crypto::verify_schnorr(&pubkey, &computed, &sig)
    }

    /// The `expiration` tag value (NIP-40), if present and parseable.
    pub fn expiration(&self) -> Option<u64> {
        self.tag_value("expiration").and_then(|v| v.parse().ok())
    }
}

/// Builds and signs events.
#[derive(Debug)]
pub struct EventBuilder {
    kind: u16,
    content: String,
    tags: Vec<Tag>,
}

impl EventBuilder {
    /// Start building an event of the given `kind` with the given `content`.
    pub fn new(kind: u16, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tags: Vec::new(),
        }
    }

    /// Append a tag.
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Append several tags.
    pub fn tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Sign with `secret_key` at the given `created_at` timestamp, producing
    /// a fully-formed, self-consistent [`NostrEvent`].
    pub fn sign(self, secret_key: &SecretKey, created_at: u64) -> NostrEvent {
        let pubkey = secret_key.x_only_public_key();
        let tags_json = Value::Array(
            self.tags
                .iter()
                .map(|t| Value::Array(t.iter().map(|s| Value::from(s.as_str())).collect()))
                .collect(),
        );
        let id = crypto::event_id(&pubkey, created_at, self.kind, &tags_json, &self.content);
        let sig = crypto::sign_schnorr(secret_key, &id);

        NostrEvent {
            id: hex::encode(id),
            pubkey: pubkey.to_hex(),
            created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: hex::encode(sig),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> u64 {
        1_700_000_000
    }

    #[test]
    fn sign_then_verify_round_trip() {
        let sk = SecretKey::generate();
        let event = EventBuilder::new(KIND_REQUEST, "hello")
            .tag(vec!["p".into(), "abc".into()])
            .sign(&sk, now());
        assert!(event.verify());
    }

    #[test]
    fn mutating_any_field_flips_verification() {
        let sk = SecretKey::generate();
        let event = EventBuilder::new(KIND_REQUEST, "hello")
            .tag(vec!["p".into(), "abc".into()])
            .sign(&sk, now());

        let mut bad_content = event.clone();
        bad_content.content = "tampered".into();
        assert!(!bad_content.verify());

        let mut bad_created_at = event.clone();
        bad_created_at.created_at += 1;
        assert!(!bad_created_at.verify());

        let mut bad_kind = event.clone();
        bad_kind.kind += 1;
        assert!(!bad_kind.verify());

        let mut bad_tags = event.clone();
        bad_tags.tags.push(vec!["x".into()]);
        assert!(!bad_tags.verify());

        let mut bad_pubkey = event.clone();
        bad_pubkey.pubkey = SecretKey::generate().x_only_public_key().to_hex();
        assert!(!bad_pubkey.verify());
    }

    #[test]
    fn tag_value_lookup() {
        let sk = SecretKey::generate();
        let event = EventBuilder::new(KIND_REQUEST, "c")
            .tag(vec!["p".into(), "provider-pubkey".into()])
            .tag(vec!["e".into(), "req-id-1".into()])
            .tag(vec!["e".into(), "req-id-2".into()])
            .sign(&sk, now());

        assert_eq!(event.tag_value("p"), Some("provider-pubkey"));
        assert_eq!(
            event.tag_values("e").collect::<Vec<_>>(),
            vec!["req-id-1", "req-id-2"]
        );
        assert_eq!(event.tag_value("missing"), None);
    }
}
