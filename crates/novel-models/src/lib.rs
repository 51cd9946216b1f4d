//! Core data models for the novel bot.
//!
//! This crate provides the data types shared by every other crate:
//! sessions and their message history, delivery segments produced from
//! assistant replies, and payment records.

pub mod ids;
pub mod payment;
pub mod segment;
pub mod session;

pub use ids::{MessageId, SessionId};
pub use payment::{PaymentPayload, PaymentRecord};
pub use segment::Segment;
pub use session::{Message, Session, SessionUpdate};
