//! Shared state for the Telegram bot.

use std::sync::Arc;

use teloxide::prelude::*;

use novel_core::BotConfig;
use novel_engine::{NovelEngine, PaymentService};

use crate::delivery::TelegramDelivery;
use crate::images::ImageCache;

/// Everything handlers need, built once at startup.
pub struct BotState {
    pub engine: NovelEngine,
    pub payments: PaymentService,
    pub images: Arc<ImageCache>,
    pub config: BotConfig,
}

impl BotState {
    pub fn new(
        engine: NovelEngine,
        payments: PaymentService,
        images: ImageCache,
        config: BotConfig,
    ) -> Self {
        Self {
            engine,
            payments,
            images: Arc::new(images),
            config,
        }
    }

    /// Delivery into the given chat.
    pub fn delivery(&self, bot: &Bot, chat_id: ChatId) -> TelegramDelivery {
        TelegramDelivery::new(bot.clone(), chat_id, Arc::clone(&self.images))
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.config.is_owner(user_id)
    }
}

/// Shared handle passed into every handler.
pub type SharedState = Arc<BotState>;
