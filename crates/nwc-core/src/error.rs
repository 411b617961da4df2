//! Error types
//!
//! Wire-facing errors are a tagged struct (`HandlerError`), not an exception
//! hierarchy, so that the shape serialized to NIP-47 response events is a
//! plain `{code, message}` JSON object.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Internal error type for everything that is not a wire-facing handler
/// error: crypto failures, relay I/O, store I/O, malformed events.
#[derive(Debug, Error)]
pub enum Error {
    /// Store operation failed
    #[error("store error: {0}")]
    Store(String),
    /// Host wallet operation failed
    #[error("host wallet error: {0}")]
    Wallet(String),
    /// Host wallet reported a failed payment
    #[error("payment failed: {0}")]
    PaymentFailed(String),
    /// secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    /// NIP-04 payload was not in the `<ciphertext>?iv=<iv>` shape
    #[error("invalid nip04 payload shape")]
    InvalidCiphertextShape,
    /// AES-CBC decryption or padding failed
    #[error("decryption failed")]
    DecryptionFailed,
    /// base64 decoding failed
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
    /// JSON (de)serialization failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Bolt11 invoice could not be parsed
    #[error(transparent)]
    InvoiceParse(#[from] lightning_invoice::ParseOrSemanticError),
    /// Event signature did not verify
    #[error("signature verification failed")]
    InvalidSignature,
    /// A value failed an input-hardening validator
    #[error("validation failed: {0}")]
    Validation(String),
    /// The execution queue consumer task is gone
    #[error("execution queue closed")]
    QueueClosed,
    /// The relay client was shut down while a send was waiting to connect
    #[error("relay client shut down")]
    ShuttingDown,
    /// Websocket transport error
    #[error(transparent)]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The string error codes surfaced to NWC clients, per NIP-47.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NwcErrorCode {
    /// Unknown method
    #[serde(rename = "NOT_IMPLEMENTED")]
    NotImplemented,
    /// Pubkey has no active `ClientKey`
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    /// Pubkey present but method not allowed by its permissions
    #[serde(rename = "RESTRICTED")]
    Restricted,
    /// One or more budgets would be exceeded
    #[serde(rename = "QUOTA_EXCEEDED")]
    QuotaExceeded,
    /// Host wallet reported a failed payment (also used for insufficient balance)
    #[serde(rename = "PAYMENT_FAILED")]
    PaymentFailed,
    /// Any uncaught error
    #[serde(rename = "INTERNAL")]
    Internal,
}

/// A wire-facing NIP-47 error: `{code, message}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerError {
    /// The error code
    pub code: NwcErrorCode,
    /// Human-readable message
    pub message: String,
}

impl HandlerError {
    /// Build a new handler error
    pub fn new(code: NwcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `{code: INTERNAL, message}`
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::new(NwcErrorCode::Internal, message.to_string())
    }
}

impl From<Error> for HandlerError {
    fn from(err: Error) -> Self {
        match err {
            Error::PaymentFailed(msg) => HandlerError::new(NwcErrorCode::PaymentFailed, msg),
            other => HandlerError::internal(other),
        }
    }
}
