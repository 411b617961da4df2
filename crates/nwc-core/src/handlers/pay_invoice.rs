use std::time::Duration;

use bitcoin::hashes::Hash;
use serde_json::{json, Value};

use super::{missing_param, HandlerContext, ResponseTuple};
use crate::error::{Error, HandlerError, NwcErrorCode};
use crate::store::ClientKey;

/// Poll interval while waiting for a payment the host wallet accepted but
/// has not yet settled.
const PREIMAGE_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Wall-clock cap on the preimage wait; past this the payment is reported as
/// `PAYMENT_FAILED` even though the host wallet may still resolve it later.
const PREIMAGE_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

fn payment_hash_of(invoice: &lightning_invoice::Bolt11Invoice) -> String {
    hex::encode(invoice.payment_hash().to_byte_array())
}

/// Wait out the gap between a host wallet accepting a payment and it
/// actually settling, polling [`crate::wallet::HostWallet::check_transaction_status`]
/// at [`PREIMAGE_POLL_INTERVAL`] up to [`PREIMAGE_WAIT_TIMEOUT`].
///
/// Runs after `tracked_spend` returns, never inside its action closure:
/// that closure executes on the execution queue's single consumer task, and
/// a poll loop nested in there would stall every other client's budget-gated
/// spends for the duration of the wait.
async fn wait_for_preimage(ctx: &HandlerContext, wallet_id: &str, payment_hash: &str) -> Result<String, Error> {
    let deadline = tokio::time::Instant::now() + PREIMAGE_WAIT_TIMEOUT;
    loop {
        if let Some(tx) = ctx.wallet.check_transaction_status(wallet_id, payment_hash).await? {
            if let Some(preimage) = tx.preimage.filter(|p| !p.is_empty()) {
                return Ok(preimage);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::PaymentFailed("timed out waiting for payment to settle".into()));
        }
        tokio::time::sleep(PREIMAGE_POLL_INTERVAL).await;
    }
}

/// Run the single-invoice pay pipeline: decode, `tracked_spend`, wait out any
/// pending settlement, translate the outcome into one [`ResponseTuple`].
async fn pay_single(ctx: &HandlerContext, client: &ClientKey, bolt11: &str) -> ResponseTuple {
    let invoice: lightning_invoice::Bolt11Invoice = match bolt11.parse() {
        Ok(invoice) => invoice,
        Err(e) => return ResponseTuple::err(HandlerError::internal(e)),
    };
    let Some(amount_msats) = invoice.amount_milli_satoshis() else {
        return ResponseTuple::err(HandlerError::internal("amountless invoice requires an amount"));
    };
    let payment_hash = payment_hash_of(&invoice);

    let wallet = ctx.wallet.clone();
    let wallet_id = client.wallet_id.clone();
    let bolt11_owned = bolt11.to_string();
    let spend = ctx
        .queue
        .tracked_spend(client.pubkey.clone(), amount_msats, move || {
            Box::pin(async move { wallet.pay_invoice(&wallet_id, &bolt11_owned, None).await })
        })
        .await;

    match spend {
        Ok(None) => ResponseTuple::err(HandlerError::new(NwcErrorCode::QuotaExceeded, "budget exceeded")),
        Ok(Some(result)) if !result.preimage.is_empty() => ResponseTuple::ok(json!({ "preimage": result.preimage })),
        Ok(Some(_)) => match wait_for_preimage(ctx, &client.wallet_id, &payment_hash).await {
            Ok(preimage) => ResponseTuple::ok(json!({ "preimage": preimage })),
            Err(Error::PaymentFailed(msg)) => ResponseTuple::err(HandlerError::new(NwcErrorCode::PaymentFailed, msg)),
            Err(e) => ResponseTuple::err(HandlerError::internal(e)),
        },
        Err(Error::PaymentFailed(msg)) => ResponseTuple::err(HandlerError::new(NwcErrorCode::PaymentFailed, msg)),
        Err(e) => ResponseTuple::err(HandlerError::internal(e)),
    }
}

/// Handles `pay_invoice`.
pub async fn pay_invoice(ctx: &HandlerContext, client: &ClientKey, params: Value) -> ResponseTuple {
    let Some(bolt11) = params.get("invoice").and_then(Value::as_str) else {
        return missing_param("invoice");
    };
    pay_single(ctx, client, bolt11).await
}

/// Handles `multi_pay_invoice`: one response tuple per invoice, each
/// independent — a per-invoice failure never aborts the others.
pub async fn multi_pay_invoice(ctx: &HandlerContext, client: &ClientKey, params: Value) -> Vec<ResponseTuple> {
    let Some(invoices) = params.get("invoices").and_then(Value::as_array) else {
        return vec![missing_param("invoices")];
    };

    let mut entries = Vec::with_capacity(invoices.len());
    for entry in invoices {
        let Some(bolt11) = entry.get("invoice").and_then(Value::as_str) else {
            return vec![missing_param("invoice")];
        };
        let id = entry.get("id").and_then(Value::as_str).map(str::to_string);
        entries.push((id, bolt11.to_string()));
    }

    let mut out = Vec::with_capacity(entries.len());
    for (id, bolt11) in entries {
        let tag_value = match id {
            Some(id) => id,
            None => match bolt11.parse::<lightning_invoice::Bolt11Invoice>() {
                Ok(invoice) => payment_hash_of(&invoice),
                Err(e) => {
                    out.push(ResponseTuple::err(HandlerError::internal(e)));
                    continue;
                }
            },
        };
        let tuple = pay_single(ctx, client, &bolt11).await.with_tags(vec![vec!["d".into(), tag_value]]);
        out.push(tuple);
    }
    out
}
