//! Persistence layer for the novel bot.
//!
//! Sessions, their message history and payment records live behind the
//! [`SessionStore`] trait. [`JsonSessionStore`] keeps one JSON document per user
//! and commits each mutation with an atomic file replace (write to
//! temp file, then rename), so a failed write never leaves a partial state.
//!
//! # Example
//!
//! ```no_run
//! use novel_persistence::{JsonSessionStore, SessionStore};
//!
//! # async fn demo() -> novel_persistence::Result<()> {
//! let store = JsonSessionStore::open("/home/user/.novel-bot/state/sessions").await?;
//! let session = store.create(42, "thread_abc").await?;
//! store.append_message(&session.id, "Привет!", false).await?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod error;
pub mod json_store;
pub mod store;

pub use error::{PersistenceError, Result};
pub use json_store::JsonSessionStore;
pub use store::SessionStore;
