//! Thin adapters from NIP-47 methods to host-wallet calls. Each handler
//! receives `(ctx, client, params)` and returns a list of response tuples;
//! only `multi_pay_invoice` ever returns more than one. `client.wallet_id`
//! is threaded through to the host wallet on every call, so one process can
//! serve several clients bound to different wallets.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{HandlerError, NwcErrorCode};
use crate::event::Tag;
use crate::queue::ExecutionQueue;
use crate::store::{ClientKey, Store};
use crate::wallet::{HostWallet, Transaction};

mod get_balance;
mod get_info;
mod list_transactions;
mod lookup_invoice;
mod make_invoice;
mod pay_invoice;

/// One response event's worth of content: at most one of `result`/`error`,
/// plus any tags beyond the mandatory `e`/`p` pair the dispatcher appends.
#[derive(Debug, Clone)]
pub struct ResponseTuple {
    /// The `result` field, present on success.
    pub result: Option<Value>,
    /// The `error` field, present on failure.
    pub error: Option<HandlerError>,
    /// Extra tags, e.g. `["d", id]` for `multi_pay_invoice`.
    pub extra_tags: Vec<Tag>,
}

impl ResponseTuple {
    pub(crate) fn ok(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
            extra_tags: Vec::new(),
        }
    }

    pub(crate) fn err(error: HandlerError) -> Self {
        Self {
            result: None,
            error: Some(error),
            extra_tags: Vec::new(),
        }
    }

    fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.extra_tags = tags;
        self
    }
}

/// Shared JSON shape for a transaction, used by `lookup_invoice` and
/// `list_transactions`.
fn transaction_to_json(tx: &Transaction) -> Value {
    let mut value = serde_json::json!({
        "type": tx.transaction_type,
        "invoice": tx.invoice,
        "payment_hash": tx.payment_hash,
        "amount": tx.amount_msats,
        "fees_paid": tx.fees_msats,
        "description": tx.description,
        "created_at": tx.created_at,
        "settled_at": tx.settled_at,
    });
    if tx.settled_at.is_some() || tx.transaction_type == "incoming" {
        value["preimage"] = serde_json::json!(tx.preimage);
    }
    value
}

fn missing_param(name: &str) -> ResponseTuple {
    ResponseTuple::err(HandlerError::new(
        NwcErrorCode::Internal,
        format!("missing required param: {name}"),
    ))
}

/// Everything a handler needs beyond the request itself.
pub struct HandlerContext {
    /// The host wallet backend.
    pub wallet: Arc<dyn HostWallet>,
    /// The durable store.
    pub store: Arc<dyn Store>,
    /// The budget-gated spend queue.
    pub queue: ExecutionQueue,
    /// The site alias/title surfaced in `get_info`.
    pub alias: String,
}

/// Route `method` to its handler. `None` if `method` is not implemented
/// (caller should emit `NOT_IMPLEMENTED`).
pub async fn dispatch(
    ctx: &HandlerContext,
    client: &ClientKey,
    method: &str,
    params: Value,
) -> Option<Vec<ResponseTuple>> {
    let tuples = match method {
        "pay_invoice" => vec![pay_invoice::pay_invoice(ctx, client, params).await],
        "multi_pay_invoice" => pay_invoice::multi_pay_invoice(ctx, client, params).await,
        "make_invoice" => vec![make_invoice::make_invoice(ctx, client, params).await],
        "lookup_invoice" => vec![lookup_invoice::lookup_invoice(ctx, client, params).await],
        "list_transactions" => vec![list_transactions::list_transactions(ctx, client, params).await],
        "get_balance" => vec![get_balance::get_balance(ctx, client).await],
        "get_info" => vec![get_info::get_info(ctx, client).await],
        _ => return None,
    };
    Some(tuples)
}
