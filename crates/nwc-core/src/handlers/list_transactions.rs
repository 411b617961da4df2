use serde_json::{json, Value};

use super::{transaction_to_json, HandlerContext, ResponseTuple};
use crate::error::HandlerError;
use crate::store::ClientKey;
use crate::validate::is_unix_timestamp;

/// Handles `list_transactions`. `type` is pushed into the backend call so
/// the host wallet filters before it paginates: applying `limit`/`offset`
/// here, after the backend already paginated the unfiltered set, would
/// silently under-fill a page.
pub async fn list_transactions(ctx: &HandlerContext, client: &ClientKey, params: Value) -> ResponseTuple {
    let from = params.get("from").and_then(Value::as_u64);
    let until = params.get("until").and_then(Value::as_u64);
    let limit = params.get("limit").and_then(Value::as_u64).or(Some(10));
    let offset = params.get("offset").and_then(Value::as_u64).or(Some(0));
    let unpaid = params.get("unpaid").and_then(Value::as_bool).unwrap_or(false);
    let filter_type = params.get("type").and_then(Value::as_str);

    if let Some(from) = from {
        if !is_unix_timestamp(from as i64) {
            return ResponseTuple::err(HandlerError::internal("from out of range"));
        }
    }
    if let Some(until) = until {
        if !is_unix_timestamp(until as i64) {
            return ResponseTuple::err(HandlerError::internal("until out of range"));
        }
    }

    match ctx
        .wallet
        .list_transactions(&client.wallet_id, from, until, limit, offset, unpaid, filter_type)
        .await
    {
        Ok(transactions) => {
            let transactions: Vec<Value> = transactions.iter().map(transaction_to_json).collect();
            ResponseTuple::ok(json!({ "transactions": transactions }))
        }
        Err(e) => ResponseTuple::err(HandlerError::internal(e)),
    }
}
