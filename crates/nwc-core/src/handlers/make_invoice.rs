use serde_json::{json, Value};

use super::{missing_param, HandlerContext, ResponseTuple};
use crate::error::HandlerError;
use crate::store::ClientKey;
use crate::validate::{is_positive_msats, is_printable_short_string};

/// 32 zero bytes, hex-encoded: substituted when the host wallet reports no
/// preimage (e.g. a mock backend).
const ZERO_PREIMAGE: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Longest `description` a client may request; matches [`is_printable_short_string`]'s call here.
const MAX_DESCRIPTION_LEN: usize = 639;

/// Handles `make_invoice`.
pub async fn make_invoice(ctx: &HandlerContext, client: &ClientKey, params: Value) -> ResponseTuple {
    let Some(amount_msats) = params.get("amount").and_then(Value::as_u64) else {
        return missing_param("amount");
    };
    if !is_positive_msats(amount_msats as i64) {
        return ResponseTuple::err(HandlerError::internal("amount out of range"));
    }
    let description = params.get("description").and_then(Value::as_str).unwrap_or_default();
    if !description.is_empty() && !is_printable_short_string(description, MAX_DESCRIPTION_LEN) {
        return ResponseTuple::err(HandlerError::internal("description is not a short printable string"));
    }
    let expiry = params.get("expiry").and_then(Value::as_u64).unwrap_or(86_400);

    match ctx.wallet.make_invoice(&client.wallet_id, amount_msats, description, expiry).await {
        Ok(tx) => {
            let mut result = json!({
                "type": "incoming",
                "invoice": tx.invoice,
                "description": tx.description,
                "payment_hash": tx.payment_hash,
                "amount": tx.amount_msats,
                "fees_paid": tx.fees_msats,
                "created_at": tx.created_at,
            });
            if params.get("expiry").is_some() {
                result["expires_at"] = json!(tx.created_at + expiry);
            }
            result["preimage"] = json!(tx.preimage.unwrap_or_else(|| ZERO_PREIMAGE.to_string()));
            ResponseTuple::ok(result)
        }
        Err(e) => ResponseTuple::err(HandlerError::internal(e)),
    }
}
