use std::time::Duration;

use crate::session::value::SessionKey;

/// Core error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The request carried a cookie that failed verification. Callers usually
    /// treat this as "no session yet".
    #[error("Failed to decode session cookie: {0}")]
    Decode(CodecError),

    #[error("Failed to encode session cookie: {0}")]
    Encode(CodecError),

    /// No backend record exists for the derived key.
    #[error("Session record not found: {0}")]
    NotFound(String),

    #[error("Session payload too large: {size} bytes exceeds limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializeError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Store construction failed: {0}")]
    Construction(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

impl SessionError {
    /// True when the backend had no record for the session key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_))
    }

    /// True when the cookie could not be verified.
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, SessionError::Decode(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("hash key is not set")]
    HashKeyMissing,

    #[error("invalid block key length {0} (expected 16 or 32 bytes)")]
    InvalidBlockKey(usize),

    #[error("no codecs configured")]
    NoCodecs,

    #[error("the value is too long")]
    TooLong,

    #[error("the value could not be base64 decoded")]
    Base64,

    #[error("the value is not valid")]
    InvalidFormat,

    #[error("the value is not valid (hash mismatch)")]
    InvalidMac,

    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("timestamp is too new")]
    TooNew,

    #[error("expired timestamp")]
    Expired,

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("non-string key value, cannot serialize session to JSON: {0}")]
    NonStringKey(SessionKey),

    #[error("non-finite number under key {0} cannot be represented in JSON")]
    NonFinite(String),

    #[error("session payload is not a JSON object")]
    NotAnObject,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary encoding error: {0}")]
    Binary(#[from] bincode::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected backend reply: {0}")]
    Protocol(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
