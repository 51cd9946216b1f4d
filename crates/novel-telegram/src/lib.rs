//! Telegram front end for the interactive novel.
//!
//! This crate wires the novel engine to Telegram: commands and menu buttons
//! become engine calls, and engine output is rendered back into the chat as
//! text and images.
//!
//! # Features
//!
//! - Reply-keyboard menu: start, restart, continue, donate, help
//! - Story turns from free text, with long replies split to fit Telegram
//! - Story images downloaded once and cached on disk
//! - Telegram Stars invoices for restarts and donations
//!
//! # Environment Variables
//!
//! Required:
//! - `BOT_TOKEN`: Bot token from @BotFather
//! - `BOT_OPENAI_API_KEY`: OpenAI API key
//!
//! Optional:
//! - `BOT_ASSISTANT_ID`: Assistant to use (created from `BOT_SCENARIO_PATH` if unset)
//! - `BOT_OWNERS`: Owner user ids, e.g. `[123, 456]`
//! - `BOT_RESTART_COST`: Stars per restart (default: 10)
//! - `NOVEL_STATE_DIR`: State directory (default: ~/.novel-bot)
//!
//! # Commands
//!
//! - `/start` - Greeting and main menu
//! - `/help` - How to play
//! - `/donate <1..2500>` - Donation invoice
//! - `/ping` - Liveness check for owners

pub mod assistant;
pub mod bot;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod images;
pub mod keyboards;
pub mod state;
pub mod texts;

pub use assistant::{resolve_assistant_id, AssistantSource};
pub use bot::NovelBot;
pub use delivery::TelegramDelivery;
pub use error::{Result, TelegramError};
pub use images::ImageCache;
pub use state::{BotState, SharedState};
