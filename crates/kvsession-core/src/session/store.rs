use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http::HeaderMap;
use tracing::{debug, warn};

use crate::backend::{RecordStore, PONG};
use crate::codec::{self, KeyPair, TokenCodec};
use crate::config::StoreConfig;
use crate::error::{BackendError, Result, SessionError};

use super::cookie::{new_cookie, read_cookie, set_cookie};
use super::registry::Registry;
use super::serializer::{BinarySerializer, SessionSerializer};
use super::{Options, Session};

/// Upper bound on every backend round-trip.
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(3);

/// Default record TTL, in seconds, for sessions whose max-age is 0.
pub const DEFAULT_RECORD_MAX_AGE: i64 = 60 * 20;

/// Default cap on the serialized payload size.
pub const DEFAULT_MAX_LENGTH: usize = 4096;

pub const DEFAULT_KEY_PREFIX: &str = "session_";

/// Random bytes in a session identifier (20 characters once encoded).
const ID_BYTES: usize = 15;

/// Trait for session stores: build a session from a request, persist it into a response.
#[async_trait]
pub trait Store: Send + Sync {
    /// Build a session for `name` from the request cookies.
    ///
    /// Always returns a usable session. The error, if any, explains why it is
    /// new: the cookie did not verify, or the record is missing or unreadable.
    async fn new_session(&self, headers: &HeaderMap, name: &str) -> (Session, Option<SessionError>);

    /// Persist the session and append its cookie to `headers`.
    async fn save(&self, headers: &mut HeaderMap, session: &mut Session) -> Result<()>;
}

/// Session store backed by a key-value [`RecordStore`].
///
/// Only the session values are persisted, under `key_prefix + session.id`.
/// The cookie carries the identifier, signed (and optionally encrypted) by the
/// configured codecs.
pub struct KvStore {
    backend: Arc<dyn RecordStore>,
    codecs: Vec<Box<dyn TokenCodec>>,
    options: Options,
    default_max_age: i64,
    max_length: usize,
    key_prefix: String,
    serializer: Box<dyn SessionSerializer>,
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("codecs", &self.codecs.len())
            .field("options", &self.options)
            .field("default_max_age", &self.default_max_age)
            .field("max_length", &self.max_length)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl KvStore {
    /// Create a store and probe the backend.
    ///
    /// The first key pair's hash key is required; further pairs are accepted
    /// for decoding older cookies.
    pub async fn new(backend: Arc<dyn RecordStore>, key_pairs: &[KeyPair]) -> Result<Self> {
        let codecs = codec::codecs_from_pairs(key_pairs)
            .map_err(|e| SessionError::Construction(format!("invalid key pairs: {e}")))?;
        let store = Self {
            backend,
            codecs,
            options: Options::default(),
            default_max_age: DEFAULT_RECORD_MAX_AGE,
            max_length: DEFAULT_MAX_LENGTH,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            serializer: Box::new(BinarySerializer),
        };
        store.ping().await?;
        Ok(store)
    }

    /// Create a store with settings taken from configuration.
    pub async fn from_config(
        backend: Arc<dyn RecordStore>,
        config: &StoreConfig,
        key_pairs: &[KeyPair],
    ) -> Result<Self> {
        let mut store = Self::new(backend, key_pairs).await?;
        store.set_options(config.cookie_options());
        store.set_max_age(config.max_age);
        store.set_default_max_age(config.default_max_age);
        store.set_max_length(config.max_length);
        store.set_key_prefix(config.key_prefix.clone());
        store.set_serializer(config.serializer.build());
        Ok(store)
    }

    /// Probe the backend; anything but a timely `PONG` is a construction failure.
    async fn ping(&self) -> Result<()> {
        match with_timeout(self.backend.ping()).await {
            Ok(reply) if reply == PONG => Ok(()),
            Ok(reply) => Err(SessionError::Construction(format!(
                "unexpected ping reply: {reply:?}"
            ))),
            Err(e) => Err(SessionError::Construction(e.to_string())),
        }
    }

    /// Returns the session for `name`, registering it in `registry` so repeated
    /// lookups within one request share the same instance.
    pub async fn get<'r>(
        &self,
        registry: &'r mut Registry,
        headers: &HeaderMap,
        name: &str,
    ) -> (&'r mut Session, Option<&'r SessionError>) {
        registry.get(self, headers, name).await
    }

    /// Backend key for a session identifier.
    pub fn record_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// Read the session's record and merge it into `session.values`.
    ///
    /// Returns `Ok(true)` when a record was found and decoded. A missing record is
    /// `Err(SessionError::NotFound)`, which callers treat as "no session".
    pub async fn load(&self, session: &mut Session) -> Result<bool> {
        let key = self.record_key(&session.id);
        let data = with_timeout(self.backend.get(&key))
            .await?
            .ok_or(SessionError::NotFound(key))?;
        self.serializer.deserialize(&data, &mut session.values)?;
        Ok(true)
    }

    /// Write the session's values with the session TTL, or the store default when it is 0.
    async fn persist(&self, session: &Session) -> Result<()> {
        let data = self.serializer.serialize(&session.values)?;
        if self.max_length != 0 && data.len() > self.max_length {
            return Err(SessionError::PayloadTooLarge {
                size: data.len(),
                max: self.max_length,
            });
        }

        let age = if session.options.max_age == 0 {
            self.default_max_age
        } else {
            session.options.max_age
        };
        let ttl = Duration::from_secs(age.max(0) as u64);
        let key = self.record_key(&session.id);
        with_timeout(self.backend.set(&key, &data, ttl)).await?;
        Ok(())
    }

    /// Remove the session's record. A missing record is not an error.
    pub async fn delete(&self, session: &Session) -> Result<()> {
        let key = self.record_key(&session.id);
        with_timeout(self.backend.delete(&key)).await?;
        Ok(())
    }

    /// Limit the size of serialized sessions. 0 disables the limit.
    pub fn set_max_length(&mut self, max_length: usize) {
        self.max_length = max_length;
    }

    /// Prefix for backend keys. Existing records keep their old keys.
    pub fn set_key_prefix(&mut self, prefix: impl Into<String>) {
        self.key_prefix = prefix.into();
    }

    pub fn set_serializer(&mut self, serializer: Box<dyn SessionSerializer>) {
        self.serializer = serializer;
    }

    /// Set the maximum age, in seconds, of new sessions' cookies and records.
    ///
    /// The codecs' signature time bound follows the same value, so cookies are
    /// neither accepted past their lifetime nor rejected early.
    pub fn set_max_age(&mut self, max_age: i64) {
        self.options.max_age = max_age;
        for (i, codec) in self.codecs.iter_mut().enumerate() {
            if !codec.set_max_age(max_age) {
                warn!("Codec {} cannot change its max age", i);
            }
        }
    }

    /// Record TTL used for sessions whose max-age is 0.
    pub fn set_default_max_age(&mut self, secs: i64) {
        self.default_max_age = secs;
    }

    /// Replace the default options copied into new sessions.
    ///
    /// This does not touch the codecs' time bound; use [`KvStore::set_max_age`] for that.
    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn default_max_age(&self) -> i64 {
        self.default_max_age
    }
}

#[async_trait]
impl Store for KvStore {
    async fn new_session(&self, headers: &HeaderMap, name: &str) -> (Session, Option<SessionError>) {
        let mut session = Session::new(name, self.options.clone());

        let Some(cookie) = read_cookie(headers, name) else {
            return (session, None);
        };

        match codec::decode_multi(name, &cookie, &self.codecs) {
            Ok(id) => session.id = id,
            Err(e) => {
                debug!("Ignoring session cookie {}: {}", name, e);
                return (session, Some(SessionError::Decode(e)));
            }
        }

        match self.load(&mut session).await {
            Ok(found) => {
                session.is_new = !found;
                (session, None)
            }
            Err(e) => {
                debug!("No stored session for cookie {}: {}", name, e);
                (session, Some(e))
            }
        }
    }

    async fn save(&self, headers: &mut HeaderMap, session: &mut Session) -> Result<()> {
        if session.options.max_age <= 0 {
            self.delete(session).await?;
            session.id.clear();
            let cookie = new_cookie(session.name(), "", &session.options);
            return set_cookie(headers, &cookie);
        }

        if session.id.is_empty() {
            session.id = generate_session_id();
        }
        self.persist(session).await?;

        let encoded = codec::encode_multi(session.name(), &session.id, &self.codecs)
            .map_err(SessionError::Encode)?;
        let cookie = new_cookie(session.name(), &encoded, &session.options);
        set_cookie(headers, &cookie)
    }
}

/// A fresh identifier: 15 random bytes, URL-safe base64 without padding.
pub fn generate_session_id() -> String {
    URL_SAFE_NO_PAD.encode(codec::generate_random_key(ID_BYTES))
}

async fn with_timeout<T>(
    fut: impl Future<Output = std::result::Result<T, BackendError>>,
) -> std::result::Result<T, BackendError> {
    tokio::time::timeout(BACKEND_TIMEOUT, fut)
        .await
        .map_err(|_| BackendError::Timeout(BACKEND_TIMEOUT))?
}
