pub mod secure_cookie;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CodecError;

pub use secure_cookie::SecureCookie;

/// Turns a session identifier into a tamper-evident cookie value and back.
pub trait TokenCodec: Send + Sync {
    fn encode(&self, name: &str, value: &str) -> Result<String, CodecError>;

    fn decode(&self, name: &str, encoded: &str) -> Result<String, CodecError>;

    /// Update the codec's time bound. Returns `false` if the codec has none.
    fn set_max_age(&mut self, _secs: i64) -> bool {
        false
    }
}

/// An authentication key with an optional encryption key.
///
/// Several pairs enable key rotation: new values are written with the first
/// pair, and older pairs are still accepted when decoding.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub hash_key: Vec<u8>,
    pub block_key: Option<Vec<u8>>,
}

impl KeyPair {
    pub fn new(hash_key: impl Into<Vec<u8>>) -> Self {
        Self {
            hash_key: hash_key.into(),
            block_key: None,
        }
    }

    pub fn with_block_key(mut self, block_key: impl Into<Vec<u8>>) -> Self {
        self.block_key = Some(block_key.into());
        self
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("hash_key", &format_args!("<{} bytes>", self.hash_key.len()))
            .field("block_key", &self.block_key.as_ref().map(|k| k.len()))
            .finish()
    }
}

/// Build one [`SecureCookie`] per key pair.
pub fn codecs_from_pairs(pairs: &[KeyPair]) -> Result<Vec<Box<dyn TokenCodec>>, CodecError> {
    if pairs.is_empty() {
        return Err(CodecError::HashKeyMissing);
    }
    pairs
        .iter()
        .map(|pair| {
            SecureCookie::new(&pair.hash_key, pair.block_key.as_deref())
                .map(|c| Box::new(c) as Box<dyn TokenCodec>)
        })
        .collect()
}

/// Encode with the first codec that succeeds.
pub fn encode_multi(
    name: &str,
    value: &str,
    codecs: &[Box<dyn TokenCodec>],
) -> Result<String, CodecError> {
    let mut first_err = None;
    for codec in codecs {
        match codec.encode(name, value) {
            Ok(encoded) => return Ok(encoded),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    Err(first_err.unwrap_or(CodecError::NoCodecs))
}

/// Decode with each codec in order, returning the first success.
/// When every codec fails, the first codec's error is returned.
pub fn decode_multi(
    name: &str,
    encoded: &str,
    codecs: &[Box<dyn TokenCodec>],
) -> Result<String, CodecError> {
    let mut first_err = None;
    for codec in codecs {
        match codec.decode(name, encoded) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    Err(first_err.unwrap_or(CodecError::NoCodecs))
}

/// Random bytes from the operating system's CSPRNG.
pub fn generate_random_key(len: usize) -> Vec<u8> {
    let mut key = vec![0u8; len];
    OsRng.fill_bytes(&mut key);
    key
}
