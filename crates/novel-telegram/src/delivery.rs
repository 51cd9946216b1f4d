//! Telegram rendering of engine output.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{debug, error, warn};

use novel_engine::{Delivery, Notice};
use novel_models::Segment;

use crate::images::ImageCache;
use crate::keyboards::main_menu;
use crate::texts;

/// Telegram's limit on one text message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// File name attached to uploaded story images.
const IMAGE_FILE_NAME: &str = "image.webp";

/// Delivers segments into one chat.
pub struct TelegramDelivery {
    bot: Bot,
    chat_id: ChatId,
    images: Arc<ImageCache>,
}

impl TelegramDelivery {
    pub fn new(bot: Bot, chat_id: ChatId, images: Arc<ImageCache>) -> Self {
        Self {
            bot,
            chat_id,
            images,
        }
    }

    async fn send_text(&self, text: &str) {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            if let Err(e) = self.bot.send_message(self.chat_id, chunk).await {
                error!(chat_id = %self.chat_id, error = %e, "Failed to send text segment");
            }
        }
    }

    async fn send_image(&self, image_id: &str) {
        let bytes = match self.images.fetch(image_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(chat_id = %self.chat_id, image_id, error = %e, "Image unavailable");
                self.send_text(texts::IMAGE_FAILED).await;
                return;
            }
        };

        let photo = InputFile::memory(bytes).file_name(IMAGE_FILE_NAME);
        match self.bot.send_photo(self.chat_id, photo).await {
            Ok(_) => debug!(chat_id = %self.chat_id, image_id, "Image sent"),
            Err(e) => {
                error!(chat_id = %self.chat_id, image_id, error = %e, "Failed to send image");
                self.send_text(texts::IMAGE_FAILED).await;
            }
        }
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    async fn deliver(&self, segments: &[Segment]) {
        for segment in segments {
            match segment {
                Segment::Text(text) => self.send_text(text).await,
                Segment::Image(id) => self.send_image(id).await,
            }
        }
    }

    async fn notify(&self, notice: Notice) {
        let has_active_novel = notice != Notice::StoryCompleted;
        let result = self
            .bot
            .send_message(self.chat_id, texts::notice(notice))
            .reply_markup(main_menu(has_active_novel))
            .await;
        if let Err(e) = result {
            error!(chat_id = %self.chat_id, ?notice, error = %e, "Failed to send notice");
        }
    }
}

/// Split text into chunks of at most `limit` characters, preferring line
/// breaks. Never splits inside a character.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        let hard = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = match rest[..hard].rfind('\n') {
            Some(i) if i > 0 => i,
            _ => hard,
        };
        chunks.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start_matches('\n');
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
