use bitcoin::hashes::Hash;
use serde_json::Value;

use super::{missing_param, transaction_to_json, HandlerContext, ResponseTuple};
use crate::error::HandlerError;
use crate::store::ClientKey;
use crate::validate::is_hex32;

/// Handles `lookup_invoice`.
pub async fn lookup_invoice(ctx: &HandlerContext, client: &ClientKey, params: Value) -> ResponseTuple {
    let payment_hash = if let Some(hash) = params.get("payment_hash").and_then(Value::as_str) {
        hash.to_string()
    } else if let Some(bolt11) = params.get("invoice").and_then(Value::as_str) {
        match bolt11.parse::<lightning_invoice::Bolt11Invoice>() {
            Ok(invoice) => hex::encode(invoice.payment_hash().to_byte_array()),
            Err(e) => return ResponseTuple::err(HandlerError::internal(e)),
        }
    } else {
        return missing_param("payment_hash or invoice");
    };
    if !is_hex32(&payment_hash) {
        return ResponseTuple::err(HandlerError::internal("payment_hash is not a valid hex32"));
    }

    match ctx.wallet.lookup_invoice(&client.wallet_id, &payment_hash).await {
        Ok(Some(tx)) => ResponseTuple::ok(transaction_to_json(&tx)),
        Ok(None) => ResponseTuple::err(HandlerError::internal("no such payment")),
        Err(e) => ResponseTuple::err(HandlerError::internal(e)),
    }
}
