//! Decrypt → route to method handler → build/sign/encrypt response. This
//! module does not touch the relay or
//! [`crate::subscription::MainSubscription`] directly; [`crate::service`]
//! wires those around it.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::budget::is_permitted;
use crate::crypto::nip04::IvSource;
use crate::crypto::{canonical_json, nip04, PublicKey, SecretKey};
use crate::error::{HandlerError, NwcErrorCode};
use crate::budget::SUPPORTED_METHODS;
use crate::event::{EventBuilder, NostrEvent, Tag, KIND_INFO, KIND_RESPONSE};
use crate::handlers::{self, HandlerContext, ResponseTuple};
use crate::store::Store;

/// Decrypts, authorizes, and routes inbound NIP-47 requests, producing
/// signed, encrypted response events.
pub struct Dispatcher {
    provider_sk: SecretKey,
    provider_pk: PublicKey,
    store: Arc<dyn Store>,
    handler_ctx: HandlerContext,
}

impl Dispatcher {
    /// Build a dispatcher around the provider's own keypair.
    pub fn new(provider_sk: SecretKey, store: Arc<dyn Store>, handler_ctx: HandlerContext) -> Self {
        let provider_pk = provider_sk.x_only_public_key();
        Self {
            provider_sk,
            provider_pk,
            store,
            handler_ctx,
        }
    }

    /// The provider's own x-only pubkey.
    pub fn provider_pubkey(&self) -> PublicKey {
        self.provider_pk
    }

    /// Build and sign the kind-13194 provider-info event published on every
    /// (re)connect: `content` is the space-joined list of supported method
    /// names, tagged `["p", provider_pubkey]`.
    pub fn build_info_event(&self, now: u64) -> NostrEvent {
        EventBuilder::new(KIND_INFO, SUPPORTED_METHODS.join(" "))
            .tag(vec!["p".into(), self.provider_pk.to_hex()])
            .sign(&self.provider_sk, now)
    }

    /// Process one inbound request event, returning zero or more signed
    /// response events to publish. Envelope/signature failures return an
    /// empty list silently rather than a wire error, since there is no
    /// reliable way to address an error response back to the sender.
    pub async fn handle_request(&self, event: &NostrEvent, now: u64) -> Vec<NostrEvent> {
        if !event.verify() {
            return Vec::new();
        }
        if let Some(expiration) = event.expiration() {
            if expiration < now {
                return Vec::new();
            }
        }
        if event.tag_value("p") != Some(&self.provider_pk.to_hex()) {
            return Vec::new();
        }

        let Ok(counterparty) = PublicKey::from_hex(&event.pubkey) else {
            return Vec::new();
        };
        let Ok(plaintext) = nip04::decrypt(&self.provider_sk, &counterparty, &event.content) else {
            return Vec::new();
        };
        let Ok(request) = serde_json::from_str::<Value>(&plaintext) else {
            return Vec::new();
        };
        let Some(method) = request.get("method").and_then(Value::as_str).map(str::to_string) else {
            return Vec::new();
        };
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

        let tuples = self.authorize_and_dispatch(&event.pubkey, &method, params, now).await;
        tuples
            .into_iter()
            .map(|tuple| self.build_response(event, &method, tuple, now))
            .collect()
    }

    async fn authorize_and_dispatch(
        &self,
        pubkey: &str,
        method: &str,
        params: Value,
        now: u64,
    ) -> Vec<ResponseTuple> {
        let client = match self.store.get_client_key(pubkey).await {
            Ok(Some(client)) => client,
            Ok(None) => {
                return vec![ResponseTuple::err(HandlerError::new(
                    NwcErrorCode::Unauthorized,
                    "no active client key",
                ))]
            }
            Err(e) => return vec![ResponseTuple::err(HandlerError::internal(e))],
        };

        if client.is_expired(now) {
            return vec![ResponseTuple::err(HandlerError::new(
                NwcErrorCode::Unauthorized,
                "client key expired",
            ))];
        }
        if self.store.touch_last_used(pubkey, now).await.is_err() {
            return vec![ResponseTuple::err(HandlerError::internal("failed to touch last_used"))];
        }
        if !is_permitted(&client.permissions, method) {
            return vec![ResponseTuple::err(HandlerError::new(
                NwcErrorCode::Restricted,
                format!("method not permitted: {method}"),
            ))];
        }

        match handlers::dispatch(&self.handler_ctx, &client, method, params).await {
            Some(tuples) => tuples,
            None => vec![ResponseTuple::err(HandlerError::new(
                NwcErrorCode::NotImplemented,
                format!("unknown method: {method}"),
            ))],
        }
    }

    fn build_response(&self, request: &NostrEvent, method: &str, tuple: ResponseTuple, now: u64) -> NostrEvent {
        let mut body = json!({ "result_type": method });
        if let Some(result) = tuple.result {
            body["result"] = result;
        }
        if let Some(error) = tuple.error {
            body["error"] = json!(error);
        }
        let plaintext = canonical_json(&body);

        let counterparty = PublicKey::from_hex(&request.pubkey)
            .expect("request.pubkey already verified by handle_request");
        let encrypted = nip04::encrypt(&self.provider_sk, &counterparty, &plaintext, IvSource::Random)
            .expect("encryption of our own well-formed plaintext cannot fail");

        let mut tags: Vec<Tag> = tuple.extra_tags;
        tags.push(vec!["e".into(), request.id.clone()]);
        tags.push(vec!["p".into(), request.pubkey.clone()]);

        EventBuilder::new(KIND_RESPONSE, encrypted)
            .tags(tags)
            .sign(&self.provider_sk, now)
    }
}
