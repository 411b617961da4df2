use serde_json::json;

use super::{HandlerContext, ResponseTuple};
use crate::error::HandlerError;
use crate::store::ClientKey;

/// Handles `get_balance`.
pub async fn get_balance(ctx: &HandlerContext, client: &ClientKey) -> ResponseTuple {
    match ctx.wallet.get_balance(&client.wallet_id).await {
        Ok(balance) => ResponseTuple::ok(json!({ "balance": balance })),
        Err(e) => ResponseTuple::err(HandlerError::internal(e)),
    }
}
