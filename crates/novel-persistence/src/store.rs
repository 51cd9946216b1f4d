//! SessionStore trait definition.
//!
//! The engine talks to persistence only through this trait. Every mutating
//! call is its own transaction: it either fully commits or leaves the store
//! exactly as it was.

use async_trait::async_trait;

use novel_models::{Message, PaymentRecord, Session, SessionId, SessionUpdate};

use crate::error::Result;

/// Storage for sessions, their messages and payment records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session of a user, if any.
    async fn get(&self, user_id: i64) -> Result<Option<Session>>;

    /// Fetch a session by id.
    async fn get_by_id(&self, session_id: &SessionId) -> Result<Option<Session>>;

    /// Insert a fresh session for a user.
    ///
    /// Fails with [`PersistenceError::Conflict`] if the user already has a
    /// session row.
    ///
    /// [`PersistenceError::Conflict`]: crate::PersistenceError::Conflict
    async fn create(&self, user_id: i64, thread_id: &str) -> Result<Session>;

    /// Delete any existing session of the user (with its messages) and insert
    /// a fresh one, in a single commit.
    ///
    /// Returns the new session and the replaced one, if there was one.
    async fn replace(&self, user_id: i64, thread_id: &str) -> Result<(Session, Option<Session>)>;

    /// Delete a session and its messages. Returns false if it did not exist.
    async fn delete(&self, session_id: &SessionId) -> Result<bool>;

    /// Apply a partial update and return the updated session.
    ///
    /// Rejects updates that would leave `needs_payment` set without
    /// `is_completed`.
    async fn update(&self, session_id: &SessionId, update: SessionUpdate) -> Result<Session>;

    /// Append a message to a session's history.
    async fn append_message(
        &self,
        session_id: &SessionId,
        content: &str,
        is_user: bool,
    ) -> Result<Message>;

    /// All messages of a session, oldest first.
    async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>>;

    /// The most recent assistant message of a session.
    async fn last_assistant_message(&self, session_id: &SessionId) -> Result<Option<Message>>;

    /// Record a confirmed payment.
    async fn record_payment(&self, record: PaymentRecord) -> Result<()>;

    /// All payments of a user, oldest first.
    async fn payments(&self, user_id: i64) -> Result<Vec<PaymentRecord>>;
}
