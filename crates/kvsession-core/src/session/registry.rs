use std::collections::hash_map::Entry;
use std::collections::HashMap;

use http::HeaderMap;
use tracing::warn;

use crate::error::{Result, SessionError};

use super::store::Store;
use super::Session;

/// Request-scoped cache of sessions by cookie name.
///
/// The first lookup of a name builds the session through the store; later
/// lookups within the same request return that same instance, together with
/// the error reported when it was built.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<String, (Session, Option<SessionError>)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session registered under `name`, creating it on first use.
    pub async fn get(
        &mut self,
        store: &dyn Store,
        headers: &HeaderMap,
        name: &str,
    ) -> (&mut Session, Option<&SessionError>) {
        let (session, err) = match self.sessions.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(store.new_session(headers, name).await),
        };
        (session, err.as_ref())
    }

    /// Save every registered session into the response headers.
    ///
    /// All sessions are attempted; the first failure is returned.
    pub async fn save_all(&mut self, store: &dyn Store, headers: &mut HeaderMap) -> Result<()> {
        let mut first_err = None;
        for (name, (session, _)) in self.sessions.iter_mut() {
            if let Err(e) = store.save(headers, session).await {
                warn!("Failed to save session {}: {}", name, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
