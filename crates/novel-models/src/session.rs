//! Session and message types.
//!
//! A [`Session`] tracks one playthrough for one user: the remote assistant
//! thread it talks to and its completion/payment state. [`Message`]s are the
//! cleaned conversation history owned by a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, SessionId};

/// One playthrough of the novel for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for the session.
    pub id: SessionId,

    /// Telegram user id. At most one session exists per user.
    pub user_id: i64,

    /// Remote assistant thread handle.
    pub thread_id: String,

    /// Advisory progress marker.
    #[serde(default)]
    pub current_scene: u32,

    /// The story reached an end.
    #[serde(default)]
    pub is_completed: bool,

    /// A new session may not be created until payment clears this flag.
    #[serde(default)]
    pub needs_payment: bool,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session row was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates a fresh session with all flags cleared and scene 0.
    pub fn new(user_id: i64, thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id,
            thread_id: thread_id.into(),
            current_scene: 0,
            is_completed: false,
            needs_payment: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if `needs_payment` implies `is_completed`.
    pub fn is_consistent(&self) -> bool {
        !self.needs_payment || self.is_completed
    }

    /// Returns true if this session blocks creation of a new one.
    pub fn blocks_restart(&self) -> bool {
        self.needs_payment
    }

    /// Applies a partial update and bumps `updated_at`.
    pub fn apply(&mut self, update: &SessionUpdate) {
        if let Some(ref thread_id) = update.thread_id {
            self.thread_id = thread_id.clone();
        }
        if let Some(scene) = update.current_scene {
            self.current_scene = scene;
        }
        if let Some(completed) = update.is_completed {
            self.is_completed = completed;
        }
        if let Some(needs_payment) = update.needs_payment {
            self.needs_payment = needs_payment;
        }
        self.updated_at = Utc::now();
    }
}

/// A partial update to a session row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub thread_id: Option<String>,
    pub current_scene: Option<u32>,
    pub is_completed: Option<bool>,
    pub needs_payment: Option<bool>,
}

impl SessionUpdate {
    /// Marks the story finished and blocks restarts until payment.
    ///
    /// This is the only constructor that sets `needs_payment = true`, and it
    /// always sets `is_completed` with it.
    pub fn complete() -> Self {
        Self {
            is_completed: Some(true),
            needs_payment: Some(true),
            ..Default::default()
        }
    }

    /// Clears the payment block after a confirmed restart payment.
    pub fn payment_cleared() -> Self {
        Self {
            needs_payment: Some(false),
            ..Default::default()
        }
    }

    /// Points the session at a replacement remote thread.
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Default::default()
        }
    }

    /// Advances the scene marker.
    pub fn scene(scene: u32) -> Self {
        Self {
            current_scene: Some(scene),
            ..Default::default()
        }
    }

    /// Returns true if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A persisted conversation message. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message.
    pub id: MessageId,

    /// Owning session.
    pub session_id: SessionId,

    /// Cleaned narrative text.
    pub content: String,

    /// True for user-authored messages, false for assistant replies.
    pub is_user: bool,

    /// When the message was stored.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a new message for a session.
    pub fn new(session_id: SessionId, content: impl Into<String>, is_user: bool) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            content: content.into(),
            is_user,
            created_at: Utc::now(),
        }
    }
}
