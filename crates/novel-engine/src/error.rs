//! Error types for the session engine.

use thiserror::Error;

use novel_assistant::GatewayError;
use novel_models::SessionId;
use novel_persistence::PersistenceError;

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Assistant service error.
    #[error("Assistant error: {0}")]
    Gateway(#[from] GatewayError),

    /// Session store error.
    #[error("Store error: {0}")]
    Store(#[from] PersistenceError),

    /// The session row disappeared while a turn was in flight.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The story already ended; a new one needs a restart.
    #[error("Session already completed: {0}")]
    SessionCompleted(SessionId),

    /// The assistant kept asking for tools without ever replying.
    #[error("Tool loop exceeded {0} rounds")]
    ToolLoop(u32),
}

impl EngineError {
    /// Returns true if the assistant service refused us.
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Gateway(err) if err.is_permission())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
