//! Novel session engine.
//!
//! The engine owns the life of a story: it creates and retires sessions,
//! drives each turn through the assistant gateway, executes the story tools
//! the assistant calls, and hands segmented replies to a [`Delivery`].
//!
//! # Overview
//!
//! - [`NovelEngine`]: session lifecycle and the turn protocol
//! - [`StoryTool`]: closed set of tools the assistant may call
//! - [`Delivery`]: outbound seam implemented by the transport
//! - [`PaymentService`]: applies confirmed payments
//! - [`UserLocks`]: serializes lifecycle operations per user
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use novel_engine::{EngineConfig, NovelEngine, TurnInput};
//!
//! let engine = NovelEngine::new(gateway, store, EngineConfig::new(assistant_id));
//! if let Some(session) = engine.create_session(user_id).await? {
//!     engine.process_turn(&session, TurnInput::Kickoff, &delivery).await;
//! }
//! ```

pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod locks;
pub mod payment;
pub mod tools;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, Prompts};
pub use delivery::{Delivery, Notice};
pub use engine::{NovelEngine, TurnInput, TurnOutcome};
pub use error::{EngineError, Result};
pub use locks::UserLocks;
pub use payment::{PaymentEffect, PaymentService};
pub use tools::{assistant_spec, EndReason, StoryTool, ToolCallError};
