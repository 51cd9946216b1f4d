//! Main Telegram bot implementation.

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, PreCheckoutQuery};
use tracing::{info, warn};

use crate::error::{Result, TelegramError};
use crate::handlers::{
    handle_callback, handle_command, handle_message, handle_pre_checkout,
    handle_successful_payment, Command,
};
use crate::state::{BotState, SharedState};

/// The novel bot: long polling plus the update dispatcher.
pub struct NovelBot {
    bot: Bot,
    state: SharedState,
}

impl NovelBot {
    /// Create a bot for the token in the state's configuration.
    pub fn new(state: BotState) -> Self {
        let bot = Bot::new(state.config.token.clone());
        Self {
            bot,
            state: Arc::new(state),
        }
    }

    /// Get the bot's username.
    pub async fn get_me(&self) -> Result<String> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TelegramError::BotStartFailed(e.to_string()))?;
        Ok(me.username().to_string())
    }

    /// Run the dispatcher until Ctrl-C.
    pub async fn start_polling(&self) -> Result<()> {
        let username = self.get_me().await?;
        info!(%username, "Starting Telegram bot in polling mode...");

        let state_for_commands = Arc::clone(&self.state);
        let state_for_payments = Arc::clone(&self.state);
        let state_for_messages = Arc::clone(&self.state);

        let handler = dptree::entry()
            .branch(
                Update::filter_pre_checkout_query().endpoint(|bot: Bot, q: PreCheckoutQuery| async move {
                    handle_pre_checkout(bot, q).await
                }),
            )
            .branch(
                Update::filter_callback_query().endpoint(|bot: Bot, q: CallbackQuery| async move {
                    handle_callback(bot, q).await
                }),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| msg.successful_payment().is_some())
                    .endpoint(move |bot: Bot, msg: Message| {
                        let state = Arc::clone(&state_for_payments);
                        info!(chat_id = %msg.chat.id, "Successful payment received");
                        async move { handle_successful_payment(bot, msg, state).await }
                    }),
            )
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
                        let state = Arc::clone(&state_for_commands);
                        info!(chat_id = %msg.chat.id, "Command matched: {:?}", cmd);
                        async move { handle_command(bot, msg, cmd, state).await }
                    }),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| {
                        msg.text()
                            .map(|t| !t.starts_with('/'))
                            .unwrap_or(false)
                    })
                    .endpoint(move |bot: Bot, msg: Message| {
                        let state = Arc::clone(&state_for_messages);
                        async move { handle_message(bot, msg, state).await }
                    }),
            );

        info!("Bot is running! Send /start to begin.");

        Dispatcher::builder(self.bot.clone(), handler)
            .default_handler(|upd| async move {
                warn!("Unhandled update: {:?}", upd.kind);
            })
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!("Bot stopped");
        Ok(())
    }
}
