//! End-to-end scenarios exercised against [`MemoryStore`]/[`FakeWallet`]
//! with a real encrypted request/response round trip through [`Dispatcher`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use nwc_core::crypto::nip04::IvSource;
use nwc_core::crypto::{canonical_json, nip04, PublicKey, SecretKey};
use nwc_core::dispatcher::Dispatcher;
use nwc_core::event::{EventBuilder, NostrEvent, KIND_REQUEST};
use nwc_core::handlers::HandlerContext;
use nwc_core::queue::ExecutionQueue;
use nwc_core::store::memory::MemoryStore;
use nwc_core::store::{Budget, ClientKey, Store};
use nwc_core::wallet::fake::FakeWallet;
use serde_json::{json, Value};

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_secs()
}

struct Fixture {
    dispatcher: Dispatcher,
    store: Arc<MemoryStore>,
}

async fn fixture() -> Fixture {
    let provider_sk = SecretKey::generate();
    let store = Arc::new(MemoryStore::new());
    let wallet = Arc::new(FakeWallet::new(1_000_000));
    let queue = ExecutionQueue::spawn(store.clone(), 32);
    let ctx = HandlerContext {
        wallet,
        store: store.clone(),
        queue,
        alias: "test provider".into(),
    };
    let dispatcher = Dispatcher::new(provider_sk, store.clone(), ctx);
    Fixture { dispatcher, store }
}

async fn register_client(store: &MemoryStore, pubkey: &str, permissions: &str, expires_at: u64) {
    store
        .put_client_key(ClientKey {
            pubkey: pubkey.to_string(),
            wallet_id: "default".into(),
            description: "test client".into(),
            permissions: permissions.to_string(),
            created_at: now(),
            expires_at,
            last_used: 0,
        })
        .await
        .unwrap();
}

fn build_request(
    client_sk: &SecretKey,
    provider_pk: &PublicKey,
    method: &str,
    params: Value,
) -> NostrEvent {
    let body = json!({ "method": method, "params": params });
    let plaintext = canonical_json(&body);
    let content = nip04::encrypt(client_sk, provider_pk, &plaintext, IvSource::Random).unwrap();
    EventBuilder::new(KIND_REQUEST, content)
        .tag(vec!["p".into(), provider_pk.to_hex()])
        .sign(client_sk, now())
}

fn decrypt_response(client_sk: &SecretKey, provider_pk: &PublicKey, response: &NostrEvent) -> Value {
    let plaintext = nip04::decrypt(client_sk, provider_pk, &response.content).unwrap();
    serde_json::from_str(&plaintext).unwrap()
}

#[tokio::test]
async fn make_invoice_scenario() {
    let fx = fixture().await;
    let client_sk = SecretKey::generate();
    register_client(&fx.store, &client_sk.x_only_public_key().to_hex(), "invoice", 0).await;

    let provider_pk = fx.dispatcher.provider_pubkey();
    let request = build_request(
        &client_sk,
        &provider_pk,
        "make_invoice",
        json!({ "amount": 123_000, "description": "test 123", "expiry": 1000 }),
    );

    let t0 = now();
    let responses = fx.dispatcher.handle_request(&request, t0).await;
    assert_eq!(responses.len(), 1);
    let body = decrypt_response(&client_sk, &provider_pk, &responses[0]);

    assert!(body.get("error").is_none(), "unexpected error: {body:?}");
    let result = &body["result"];
    assert_eq!(result["type"], "incoming");
    assert_eq!(result["amount"], 123_000);
    let invoice: lightning_invoice::Bolt11Invoice =
        result["invoice"].as_str().unwrap().parse().unwrap();
    assert_eq!(invoice.amount_milli_satoshis(), Some(123_000));
    let expires_at = result["expires_at"].as_u64().unwrap();
    assert!(expires_at >= t0 && expires_at <= t0 + 1000 + 10);
}

#[tokio::test]
async fn pay_invoice_happy_path() {
    let fx1 = fixture().await; // wallet1's provider
    let client1_sk = SecretKey::generate();
    register_client(&fx1.store, &client1_sk.x_only_public_key().to_hex(), "invoice balance", 0).await;

    let provider1_pk = fx1.dispatcher.provider_pubkey();
    let make_req = build_request(
        &client1_sk,
        &provider1_pk,
        "make_invoice",
        json!({ "amount": 123_000, "description": "coffee" }),
    );
    let responses = fx1.dispatcher.handle_request(&make_req, now()).await;
    let invoice_body = decrypt_response(&client1_sk, &provider1_pk, &responses[0]);
    let bolt11 = invoice_body["result"]["invoice"].as_str().unwrap().to_string();

    let fx2 = fixture().await; // wallet2's provider
    let client2_sk = SecretKey::generate();
    register_client(&fx2.store, &client2_sk.x_only_public_key().to_hex(), "pay balance", 0).await;
    let provider2_pk = fx2.dispatcher.provider_pubkey();

    let pay_req = build_request(&client2_sk, &provider2_pk, "pay_invoice", json!({ "invoice": bolt11 }));
    let responses = fx2.dispatcher.handle_request(&pay_req, now()).await;
    let pay_body = decrypt_response(&client2_sk, &provider2_pk, &responses[0]);
    assert!(pay_body.get("error").is_none(), "unexpected error: {pay_body:?}");
    assert!(pay_body["result"]["preimage"].as_str().unwrap().len() == 64);

    let balance_req = build_request(&client2_sk, &provider2_pk, "get_balance", json!({}));
    let responses = fx2.dispatcher.handle_request(&balance_req, now()).await;
    let balance_body = decrypt_response(&client2_sk, &provider2_pk, &responses[0]);
    assert_eq!(balance_body["result"]["balance"], 1_000_000 - 123_000);
}

#[tokio::test]
async fn multi_pay_invoice_scenario() {
    let payee1 = fixture().await;
    let payee1_client_sk = SecretKey::generate();
    register_client(&payee1.store, &payee1_client_sk.x_only_public_key().to_hex(), "invoice", 0).await;
    let payee1_pk = payee1.dispatcher.provider_pubkey();

    let mut invoices = Vec::new();
    for label in ["invoice1", "invoice2"] {
        let req = build_request(
            &payee1_client_sk,
            &payee1_pk,
            "make_invoice",
            json!({ "amount": 123_000, "description": label }),
        );
        let responses = payee1.dispatcher.handle_request(&req, now()).await;
        let body = decrypt_response(&payee1_client_sk, &payee1_pk, &responses[0]);
        invoices.push(body["result"]["invoice"].as_str().unwrap().to_string());
    }

    let payee2 = fixture().await;
    let payee2_client_sk = SecretKey::generate();
    register_client(&payee2.store, &payee2_client_sk.x_only_public_key().to_hex(), "invoice", 0).await;
    let payee2_pk = payee2.dispatcher.provider_pubkey();
    let req = build_request(
        &payee2_client_sk,
        &payee2_pk,
        "make_invoice",
        json!({ "amount": 123_000, "description": "invoice3" }),
    );
    let responses = payee2.dispatcher.handle_request(&req, now()).await;
    let body = decrypt_response(&payee2_client_sk, &payee2_pk, &responses[0]);
    invoices.push(body["result"]["invoice"].as_str().unwrap().to_string());

    let payer = fixture().await;
    let payer_client_sk = SecretKey::generate();
    register_client(&payer.store, &payer_client_sk.x_only_public_key().to_hex(), "pay balance", 0).await;
    let payer_pk = payer.dispatcher.provider_pubkey();

    let multi_req = build_request(
        &payer_client_sk,
        &payer_pk,
        "multi_pay_invoice",
        json!({
            "invoices": [
                { "id": "invoice1", "invoice": invoices[0] },
                { "id": "invoice2", "invoice": invoices[1] },
                { "invoice": invoices[2] },
            ]
        }),
    );
    let responses = payer.dispatcher.handle_request(&multi_req, now()).await;
    assert_eq!(responses.len(), 3);

    for (i, response) in responses.iter().enumerate() {
        let body = decrypt_response(&payer_client_sk, &payer_pk, response);
        assert!(body.get("error").is_none(), "unexpected error on invoice {i}: {body:?}");
        assert!(body["result"]["preimage"].as_str().unwrap().len() == 64);
        let d_tag = response.tag_value("d").unwrap();
        if i < 2 {
            assert_eq!(d_tag, format!("invoice{}", i + 1));
        } else {
            assert_eq!(d_tag.len(), 64); // payment hash, since no id was given
        }
    }

    let balance_req = build_request(&payer_client_sk, &payer_pk, "get_balance", json!({}));
    let responses = payer.dispatcher.handle_request(&balance_req, now()).await;
    let body = decrypt_response(&payer_client_sk, &payer_pk, &responses[0]);
    assert_eq!(body["result"]["balance"], 1_000_000 - 3 * 123_000);
}

#[tokio::test]
async fn quota_exceeded_scenario() {
    let payee = fixture().await;
    let payee_client_sk = SecretKey::generate();
    register_client(&payee.store, &payee_client_sk.x_only_public_key().to_hex(), "invoice", 0).await;
    let payee_pk = payee.dispatcher.provider_pubkey();

    let fx = fixture().await;
    let client_sk = SecretKey::generate();
    let client_pubkey = client_sk.x_only_public_key().to_hex();
    register_client(&fx.store, &client_pubkey, "pay", 0).await;
    let created_at = now();
    fx.store
        .add_budget(Budget {
            id: String::new(),
            pubkey: client_pubkey.clone(),
            budget_msats: 100_000,
            refresh_window: 3600,
            created_at,
        })
        .await
        .unwrap();
    let provider_pk = fx.dispatcher.provider_pubkey();

    async fn invoice_for(payee: &Fixture, payee_client_sk: &SecretKey, payee_pk: &PublicKey, amount: u64) -> String {
        let req = build_request(payee_client_sk, payee_pk, "make_invoice", json!({ "amount": amount, "description": "x" }));
        let responses = payee.dispatcher.handle_request(&req, now()).await;
        let body = decrypt_response(payee_client_sk, payee_pk, &responses[0]);
        body["result"]["invoice"].as_str().unwrap().to_string()
    }

    let bolt11_a = invoice_for(&payee, &payee_client_sk, &payee_pk, 99_000).await;
    let pay_req = build_request(&client_sk, &provider_pk, "pay_invoice", json!({ "invoice": bolt11_a }));
    let responses = fx.dispatcher.handle_request(&pay_req, now()).await;
    let body = decrypt_response(&client_sk, &provider_pk, &responses[0]);
    assert!(body.get("error").is_none(), "first payment should succeed: {body:?}");

    let bolt11_b = invoice_for(&payee, &payee_client_sk, &payee_pk, 2_000).await;
    let pay_req = build_request(&client_sk, &provider_pk, "pay_invoice", json!({ "invoice": bolt11_b }));
    let responses = fx.dispatcher.handle_request(&pay_req, now()).await;
    let body = decrypt_response(&client_sk, &provider_pk, &responses[0]);
    assert_eq!(body["error"]["code"], "QUOTA_EXCEEDED");

    let bolt11_c = invoice_for(&payee, &payee_client_sk, &payee_pk, 100_000).await;
    let pay_req = build_request(&client_sk, &provider_pk, "pay_invoice", json!({ "invoice": bolt11_c }));
    let responses = fx.dispatcher.handle_request(&pay_req, created_at + 3601).await;
    let body = decrypt_response(&client_sk, &provider_pk, &responses[0]);
    assert!(body.get("error").is_none(), "payment after cycle refresh should succeed: {body:?}");
}

#[tokio::test]
async fn unauthorized_on_expiry_scenario() {
    let fx = fixture().await;
    let client_sk = SecretKey::generate();
    let t0 = now();
    register_client(&fx.store, &client_sk.x_only_public_key().to_hex(), "balance", t0 + 1).await;
    let provider_pk = fx.dispatcher.provider_pubkey();

    let request = build_request(&client_sk, &provider_pk, "get_balance", json!({}));
    let responses = fx.dispatcher.handle_request(&request, t0 + 2).await;
    let body = decrypt_response(&client_sk, &provider_pk, &responses[0]);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn restricted_scenario() {
    let fx = fixture().await;
    let client_sk = SecretKey::generate();
    register_client(&fx.store, &client_sk.x_only_public_key().to_hex(), "info", 0).await;
    let provider_pk = fx.dispatcher.provider_pubkey();

    let request = build_request(
        &client_sk,
        &provider_pk,
        "make_invoice",
        json!({ "amount": 1000, "description": "x" }),
    );
    let responses = fx.dispatcher.handle_request(&request, now()).await;
    let body = decrypt_response(&client_sk, &provider_pk, &responses[0]);
    assert_eq!(body["error"]["code"], "RESTRICTED");
}
