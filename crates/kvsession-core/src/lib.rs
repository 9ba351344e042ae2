//! Cookie-identified sessions persisted in a key-value backend.
//!
//! The cookie carries only a signed (optionally encrypted) session identifier;
//! the session values live in a [`backend::RecordStore`] under
//! `key_prefix + identifier` with a TTL.

pub mod error;
pub mod config;
pub mod session;
pub mod codec;
pub mod backend;
pub mod service;

pub use error::{Result, SessionError};
pub use session::{KvStore, Options, Registry, Session, Store};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
