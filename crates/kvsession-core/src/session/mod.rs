pub mod cookie;
pub mod registry;
pub mod serializer;
pub mod store;
pub mod value;

use serde::{Deserialize, Serialize};

pub use registry::Registry;
pub use serializer::{BinarySerializer, JsonSerializer, SerializerKind, SessionSerializer};
pub use store::{KvStore, Store};
pub use value::{SessionKey, SessionValue, Values};

/// Amount of time, in seconds, for cookies to expire by default (30 days).
pub const DEFAULT_COOKIE_MAX_AGE: i64 = 86400 * 30;

/// Reserved key under which flash messages are kept.
const FLASHES_KEY: &str = "_flash";

/// SameSite attribute for the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// Per-session cookie and lifetime policy.
///
/// A session gets its own copy of the store defaults at creation time, so later
/// changes to the store do not touch sessions that were already handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub path: String,
    pub domain: Option<String>,
    /// Lifetime in seconds. `<= 0` marks the session for deletion on save;
    /// `0` on a saved session means "use the store's default record TTL".
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: DEFAULT_COOKIE_MAX_AGE,
            secure: false,
            http_only: true,
            same_site: Some(SameSite::Lax),
        }
    }
}

/// A user session bound to a cookie name.
#[derive(Debug, Clone)]
pub struct Session {
    /// Random identifier, empty until the first save.
    pub id: String,
    pub values: Values,
    pub options: Options,
    /// True until a record was loaded from the backend.
    pub is_new: bool,
    name: String,
}

impl Session {
    pub fn new(name: impl Into<String>, options: Options) -> Self {
        Self {
            id: String::new(),
            values: Values::new(),
            options,
            is_new: true,
            name: name.into(),
        }
    }

    /// The cookie name this session was created for.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: impl Into<SessionKey>) -> Option<&SessionValue> {
        self.values.get(&key.into())
    }

    pub fn insert(
        &mut self,
        key: impl Into<SessionKey>,
        value: impl Into<SessionValue>,
    ) -> Option<SessionValue> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: impl Into<SessionKey>) -> Option<SessionValue> {
        self.values.remove(&key.into())
    }

    pub fn contains_key(&self, key: impl Into<SessionKey>) -> bool {
        self.values.contains_key(&key.into())
    }

    /// Remove every value. Identifier and options are kept.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Append a flash message; it survives until the next call to [`Session::flashes`].
    pub fn add_flash(&mut self, value: impl Into<SessionValue>) {
        let entry = self
            .values
            .entry(SessionKey::from(FLASHES_KEY))
            .or_insert_with(|| SessionValue::List(Vec::new()));
        match entry {
            SessionValue::List(items) => items.push(value.into()),
            other => *other = SessionValue::List(vec![value.into()]),
        }
    }

    /// Take all pending flash messages.
    pub fn flashes(&mut self) -> Vec<SessionValue> {
        match self.values.remove(&SessionKey::from(FLASHES_KEY)) {
            Some(SessionValue::List(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = Session::new("mysession", Options::default());
        assert_eq!(session.name(), "mysession");
        assert!(session.id.is_empty());
        assert!(session.is_new);
        assert!(session.values.is_empty());
        assert_eq!(session.options.max_age, DEFAULT_COOKIE_MAX_AGE);
    }

    #[test]
    fn test_session_values() {
        let mut session = Session::new("s", Options::default());
        session.insert("count", 1);
        session.insert(42i64, "answer");

        assert_eq!(session.get("count").and_then(|v| v.as_i64()), Some(1));
        assert_eq!(session.get(42i64).and_then(|v| v.as_str()), Some("answer"));
        assert!(session.contains_key("count"));

        assert_eq!(session.remove("count"), Some(SessionValue::Int(1)));
        assert!(!session.contains_key("count"));

        session.clear();
        assert!(session.values.is_empty());
    }

    #[test]
    fn test_flashes_are_consumed() {
        let mut session = Session::new("s", Options::default());
        session.add_flash("saved");
        session.add_flash("welcome back");

        let flashes = session.flashes();
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[0].as_str(), Some("saved"));
        assert!(session.flashes().is_empty());
    }

    #[test]
    fn test_options_copy_is_independent() {
        let defaults = Options::default();
        let mut session = Session::new("s", defaults.clone());
        session.options.max_age = -1;
        assert_eq!(defaults.max_age, DEFAULT_COOKIE_MAX_AGE);
    }
}
