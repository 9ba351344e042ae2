//! HMAC-authenticated, optionally AES-GCM encrypted cookie values.
//!
//! Wire format (every base64 segment is URL-safe, unpadded):
//!
//! ```text
//! base64( timestamp "|" base64(value) "|" mac )
//! ```
//!
//! where `mac = HMAC-SHA256(name "|" timestamp "|" base64(value))` and `value`
//! is `nonce || ciphertext` when a block key is configured.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CodecError;

use super::TokenCodec;

type HmacSha256 = Hmac<Sha256>;

/// Maximum length of an encoded value, matching what browsers accept for a cookie.
pub const MAX_ENCODED_LENGTH: usize = 4096;

const NONCE_LEN: usize = 12;

enum BlockCipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl BlockCipher {
    fn new(key: &[u8]) -> Result<Self, CodecError> {
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .map(|c| BlockCipher::Aes128(Box::new(c)))
                .map_err(|_| CodecError::InvalidBlockKey(key.len())),
            32 => Aes256Gcm::new_from_slice(key)
                .map(|c| BlockCipher::Aes256(Box::new(c)))
                .map_err(|_| CodecError::InvalidBlockKey(key.len())),
            n => Err(CodecError::InvalidBlockKey(n)),
        }
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let (nonce, ciphertext) = match self {
            BlockCipher::Aes128(c) => {
                let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
                (nonce, c.encrypt(&nonce, plaintext))
            }
            BlockCipher::Aes256(c) => {
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                (nonce, c.encrypt(&nonce, plaintext))
            }
        };
        let ciphertext = ciphertext.map_err(|e| CodecError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        if data.len() < NONCE_LEN {
            return Err(CodecError::Decrypt("the value could not be decrypted".into()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce);
        let plaintext = match self {
            BlockCipher::Aes128(c) => c.decrypt(nonce, ciphertext),
            BlockCipher::Aes256(c) => c.decrypt(nonce, ciphertext),
        };
        plaintext.map_err(|e| CodecError::Decrypt(e.to_string()))
    }
}

/// Signs, and optionally encrypts, short string values for use in cookies.
pub struct SecureCookie {
    hash_key: Vec<u8>,
    block: Option<BlockCipher>,
    max_age: i64,
    min_age: i64,
}

impl std::fmt::Debug for SecureCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureCookie")
            .field("encrypted", &self.block.is_some())
            .field("max_age", &self.max_age)
            .field("min_age", &self.min_age)
            .finish()
    }
}

impl SecureCookie {
    /// Create a codec. `hash_key` is required; `block_key` must be 16 or 32 bytes when given.
    pub fn new(hash_key: &[u8], block_key: Option<&[u8]>) -> Result<Self, CodecError> {
        if hash_key.is_empty() {
            return Err(CodecError::HashKeyMissing);
        }
        let block = block_key
            .filter(|k| !k.is_empty())
            .map(BlockCipher::new)
            .transpose()?;
        Ok(Self {
            hash_key: hash_key.to_vec(),
            block,
            max_age: crate::session::DEFAULT_COOKIE_MAX_AGE,
            min_age: 0,
        })
    }

    /// Reject values older than `secs`. Zero disables the check.
    pub fn with_max_age(mut self, secs: i64) -> Self {
        self.max_age = secs;
        self
    }

    /// Reject values newer than `secs`.
    pub fn with_min_age(mut self, secs: i64) -> Self {
        self.min_age = secs;
        self
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    fn mac(&self, payload: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.hash_key)
            .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
        mac.update(payload);
        mac
    }

    pub(crate) fn encode_at(&self, name: &str, value: &str, now: i64) -> Result<String, CodecError> {
        let mut raw = value.as_bytes().to_vec();
        if let Some(block) = &self.block {
            raw = block.encrypt(&raw)?;
        }
        let encoded_value = URL_SAFE_NO_PAD.encode(&raw);

        let signed = format!("{name}|{now}|{encoded_value}");
        let tag = self.mac(signed.as_bytes()).finalize().into_bytes();

        let mut body = format!("{now}|{encoded_value}|").into_bytes();
        body.extend_from_slice(&tag);

        let encoded = URL_SAFE_NO_PAD.encode(&body);
        if encoded.len() > MAX_ENCODED_LENGTH {
            return Err(CodecError::TooLong);
        }
        Ok(encoded)
    }

    pub(crate) fn decode_at(&self, name: &str, encoded: &str, now: i64) -> Result<String, CodecError> {
        if encoded.len() > MAX_ENCODED_LENGTH {
            return Err(CodecError::TooLong);
        }
        let body = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(|_| CodecError::Base64)?;

        let mut parts = body.splitn(3, |b| *b == b'|');
        let (Some(ts), Some(encoded_value), Some(tag)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CodecError::InvalidFormat);
        };

        let mut signed = Vec::with_capacity(name.len() + ts.len() + encoded_value.len() + 2);
        signed.extend_from_slice(name.as_bytes());
        signed.push(b'|');
        signed.extend_from_slice(ts);
        signed.push(b'|');
        signed.extend_from_slice(encoded_value);
        self.mac(&signed)
            .verify_slice(tag)
            .map_err(|_| CodecError::InvalidMac)?;

        let issued: i64 = std::str::from_utf8(ts)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CodecError::InvalidTimestamp)?;
        if self.min_age != 0 && issued > now.saturating_sub(self.min_age) {
            return Err(CodecError::TooNew);
        }
        if self.max_age != 0 && issued < now.saturating_sub(self.max_age) {
            return Err(CodecError::Expired);
        }

        let mut raw = URL_SAFE_NO_PAD
            .decode(encoded_value)
            .map_err(|_| CodecError::Base64)?;
        if let Some(block) = &self.block {
            raw = block.decrypt(&raw)?;
        }
        String::from_utf8(raw).map_err(|_| CodecError::InvalidFormat)
    }
}

impl TokenCodec for SecureCookie {
    fn encode(&self, name: &str, value: &str) -> Result<String, CodecError> {
        self.encode_at(name, value, chrono::Utc::now().timestamp())
    }

    fn decode(&self, name: &str, encoded: &str) -> Result<String, CodecError> {
        self.decode_at(name, encoded, chrono::Utc::now().timestamp())
    }

    fn set_max_age(&mut self, secs: i64) -> bool {
        self.max_age = secs;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_signed_roundtrip() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap();
        let encoded = codec.encode("mysession", "ABCDEFGHIJKLMNOPQRST").unwrap();
        assert!(!encoded.contains('='));
        assert_eq!(codec.decode("mysession", &encoded).unwrap(), "ABCDEFGHIJKLMNOPQRST");
    }

    #[test]
    fn test_encrypted_roundtrip() {
        for block_key in [&b"0123456789abcdef"[..], &[7u8; 32][..]] {
            let codec = SecureCookie::new(HASH_KEY, Some(block_key)).unwrap();
            let encoded = codec.encode("s", "secret-id").unwrap();
            // The identifier must not appear in clear text.
            let body = URL_SAFE_NO_PAD.decode(&encoded).unwrap();
            let body = String::from_utf8_lossy(&body);
            let plain_segment = URL_SAFE_NO_PAD.encode("secret-id");
            assert!(!body.contains(&plain_segment));
            assert_eq!(codec.decode("s", &encoded).unwrap(), "secret-id");
        }
    }

    #[test]
    fn test_name_is_authenticated() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap();
        let encoded = codec.encode("a", "value").unwrap();
        assert_eq!(codec.decode("b", &encoded), Err(CodecError::InvalidMac));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap();
        let other = SecureCookie::new(b"another-hash-key", None).unwrap();
        let encoded = codec.encode("s", "value").unwrap();
        assert_eq!(other.decode("s", &encoded), Err(CodecError::InvalidMac));
    }

    #[test]
    fn test_tampered_value_rejected() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap();
        let encoded = codec.encode("s", "value").unwrap();
        let mut body = URL_SAFE_NO_PAD.decode(&encoded).unwrap();
        let idx = body.iter().position(|b| *b == b'|').unwrap() + 1;
        body[idx] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(&body);
        assert_eq!(codec.decode("s", &tampered), Err(CodecError::InvalidMac));
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap();
        assert_eq!(codec.decode("s", "***"), Err(CodecError::Base64));
        let no_pipes = URL_SAFE_NO_PAD.encode("nopipes");
        assert_eq!(codec.decode("s", &no_pipes), Err(CodecError::InvalidFormat));
        let too_long = "a".repeat(MAX_ENCODED_LENGTH + 1);
        assert_eq!(codec.decode("s", &too_long), Err(CodecError::TooLong));
    }

    #[test]
    fn test_expired() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap().with_max_age(60);
        let now = 1_700_000_000;
        let encoded = codec.encode_at("s", "v", now).unwrap();
        assert_eq!(codec.decode_at("s", &encoded, now + 60).unwrap(), "v");
        assert_eq!(codec.decode_at("s", &encoded, now + 61), Err(CodecError::Expired));
    }

    #[test]
    fn test_zero_max_age_never_expires() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap().with_max_age(0);
        let encoded = codec.encode_at("s", "v", 0).unwrap();
        assert_eq!(codec.decode_at("s", &encoded, 1_700_000_000).unwrap(), "v");
    }

    #[test]
    fn test_too_new() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap().with_min_age(10);
        let now = 1_700_000_000;
        let encoded = codec.encode_at("s", "v", now).unwrap();
        assert_eq!(codec.decode_at("s", &encoded, now + 5), Err(CodecError::TooNew));
        assert_eq!(codec.decode_at("s", &encoded, now + 10).unwrap(), "v");
    }

    #[test]
    fn test_extreme_bounds_do_not_overflow() {
        let now = 1_700_000_000;
        let codec = SecureCookie::new(HASH_KEY, None).unwrap().with_max_age(i64::MAX);
        let encoded = codec.encode_at("s", "v", now).unwrap();
        assert_eq!(codec.decode_at("s", &encoded, now).unwrap(), "v");

        let codec = codec.with_max_age(i64::MIN);
        assert_eq!(codec.decode_at("s", &encoded, now), Err(CodecError::Expired));

        let codec = SecureCookie::new(HASH_KEY, None)
            .unwrap()
            .with_min_age(i64::MIN);
        let encoded = codec.encode_at("s", "v", now).unwrap();
        assert_eq!(codec.decode_at("s", &encoded, now).unwrap(), "v");
    }

    #[test]
    fn test_set_max_age() {
        let mut codec = SecureCookie::new(HASH_KEY, None).unwrap();
        assert!(codec.set_max_age(120));
        assert_eq!(codec.max_age(), 120);
    }

    #[test]
    fn test_invalid_keys() {
        assert_eq!(SecureCookie::new(b"", None).unwrap_err(), CodecError::HashKeyMissing);
        assert_eq!(
            SecureCookie::new(HASH_KEY, Some(b"short")).unwrap_err(),
            CodecError::InvalidBlockKey(5)
        );
        // An empty block key means "sign only".
        assert!(SecureCookie::new(HASH_KEY, Some(b"")).is_ok());
    }
}
