use serde_json::json;

use super::{HandlerContext, ResponseTuple};
use crate::budget::permitted_supported_methods;
use crate::store::ClientKey;

/// Handles `get_info`. Never fails: an empty permission set simply yields an
/// empty `methods` list.
pub async fn get_info(ctx: &HandlerContext, client: &ClientKey) -> ResponseTuple {
    ResponseTuple::ok(json!({
        "alias": ctx.alias,
        "color": "",
        "network": "mainnet",
        "block_height": 0,
        "block_hash": "",
        "methods": permitted_supported_methods(&client.permissions),
    }))
}
