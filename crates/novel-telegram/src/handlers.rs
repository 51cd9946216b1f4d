//! Update handlers for the Telegram bot.

use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatAction, LabeledPrice, ParseMode, PreCheckoutQuery};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use novel_engine::{Delivery, PaymentEffect, TurnInput};
use novel_models::PaymentPayload;

use crate::delivery::{split_message, MAX_MESSAGE_CHARS};
use crate::keyboards::{invoice_keyboard, main_menu, MenuAction, INVOICE_CANCEL};
use crate::state::SharedState;
use crate::texts;

/// Currency of Telegram Stars invoices.
const STARS_CURRENCY: &str = "XTR";

/// Bounds of a single donation, in stars.
const MIN_DONATION: u32 = 1;
const MAX_DONATION: u32 = 2500;

/// Bot commands that can be invoked with /.
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "Главное меню")]
    Start,

    #[command(description = "Как играть")]
    Help,

    #[command(description = "Поддержать проект звёздами: /donate <1..2500>")]
    Donate(String),

    #[command(description = "Проверка связи (для владельцев)")]
    Ping,
}

/// Telegram user id of the sender. Falls back to the chat id, which is the
/// same thing in private chats.
fn sender_id(msg: &Message) -> i64 {
    msg.from
        .as_ref()
        .map(|user| user.id.0 as i64)
        .unwrap_or(msg.chat.id.0)
}

/// Parse a donation amount. Only plain digits within bounds are accepted.
pub fn parse_donation(arg: &str) -> Option<u32> {
    let arg = arg.trim();
    if arg.is_empty() || !arg.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    arg.parse::<u32>()
        .ok()
        .filter(|amount| (MIN_DONATION..=MAX_DONATION).contains(amount))
}

/// Whether the user has a story in progress.
async fn has_active_novel(state: &SharedState, user_id: i64) -> bool {
    match state.engine.get_session(user_id).await {
        Ok(session) => session.is_some_and(|s| !s.is_completed),
        Err(e) => {
            warn!(user_id, error = %e, "Failed to read session");
            false
        }
    }
}

/// Handle the /start command.
pub async fn handle_start(bot: Bot, msg: Message, state: SharedState) -> ResponseResult<()> {
    let user_id = sender_id(&msg);
    info!(chat_id = %msg.chat.id, user_id, "User started bot");

    if state.is_owner(user_id) {
        bot.send_message(msg.chat.id, texts::HELLO_OWNER).await?;
    }

    let active = has_active_novel(&state, user_id).await;
    bot.send_message(msg.chat.id, texts::HELLO)
        .reply_markup(main_menu(active))
        .await?;
    Ok(())
}

/// Handle the /help command and the help button.
pub async fn handle_help(bot: Bot, msg: Message, state: SharedState) -> ResponseResult<()> {
    let active = has_active_novel(&state, sender_id(&msg)).await;
    bot.send_message(msg.chat.id, texts::HELP)
        .parse_mode(ParseMode::Html)
        .reply_markup(main_menu(active))
        .await?;
    Ok(())
}

/// Handle the /ping command. Silent for anyone but the owners.
pub async fn handle_ping(bot: Bot, msg: Message, state: SharedState) -> ResponseResult<()> {
    let user_id = sender_id(&msg);
    if !state.is_owner(user_id) {
        debug!(user_id, "Ignoring ping from non-owner");
        return Ok(());
    }
    bot.send_message(msg.chat.id, texts::PONG).await?;
    Ok(())
}

/// Handle the /donate command.
pub async fn handle_donate(
    bot: Bot,
    msg: Message,
    state: SharedState,
    arg: String,
) -> ResponseResult<()> {
    let Some(amount) = parse_donation(&arg) else {
        bot.send_message(msg.chat.id, texts::DONATE_USAGE)
            .parse_mode(ParseMode::Html)
            .await?;
        return Ok(());
    };

    info!(chat_id = %msg.chat.id, amount, "Sending donation invoice");
    send_stars_invoice(
        &bot,
        msg.chat.id,
        &state,
        texts::DONATE_INVOICE_TITLE,
        &texts::donate_description(amount),
        PaymentPayload::Donation(amount),
        amount,
    )
    .await
}

/// Handle a parsed command.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: SharedState,
) -> ResponseResult<()> {
    match cmd {
        Command::Start => handle_start(bot, msg, state).await,
        Command::Help => handle_help(bot, msg, state).await,
        Command::Donate(arg) => handle_donate(bot, msg, state, arg).await,
        Command::Ping => handle_ping(bot, msg, state).await,
    }
}

/// Handle a non-command text message: menu buttons, then story input.
pub async fn handle_message(bot: Bot, msg: Message, state: SharedState) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let user_id = sender_id(&msg);

    match MenuAction::from_text(text) {
        Some(MenuAction::Novel) | Some(MenuAction::Restart) => {
            start_novel(&bot, msg.chat.id, user_id, &state).await
        }
        Some(MenuAction::Continue) => continue_novel(&bot, msg.chat.id, user_id, &state).await,
        Some(MenuAction::Help) => handle_help(bot, msg, state).await,
        Some(MenuAction::Donate) => {
            bot.send_message(msg.chat.id, texts::DONATE_USAGE)
                .parse_mode(ParseMode::Html)
                .await?;
            Ok(())
        }
        None => {
            let text = text.to_string();
            story_input(&bot, msg.chat.id, user_id, text, &state).await
        }
    }
}

/// Start a fresh story, or ask for a restart payment if the last one ended.
async fn start_novel(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    state: &SharedState,
) -> ResponseResult<()> {
    let loading = bot.send_message(chat_id, texts::LOADING).await?;

    let created = state.engine.create_session(user_id).await;

    if let Err(e) = bot.delete_message(chat_id, loading.id).await {
        debug!(chat_id = %chat_id, error = %e, "Failed to remove loading message");
    }

    match created {
        Ok(Some(session)) => {
            info!(user_id, session_id = %session.id, "Novel started");
            bot.send_message(chat_id, texts::NOVEL_STARTED)
                .reply_markup(main_menu(true))
                .await?;
            bot.send_chat_action(chat_id, ChatAction::Typing).await?;

            let delivery = state.delivery(bot, chat_id);
            let outcome = state
                .engine
                .process_turn(&session, TurnInput::Kickoff, &delivery)
                .await;
            debug!(user_id, ?outcome, "Kickoff turn finished");
        }
        Ok(None) => {
            info!(user_id, "Restart requires payment");
            bot.send_message(chat_id, texts::PAYMENT_REQUIRED)
                .reply_markup(main_menu(false))
                .await?;
            send_restart_invoice(bot, chat_id, state).await?;
        }
        Err(e) => {
            error!(user_id, error = %e, "Failed to start novel");
            bot.send_message(chat_id, texts::START_ERROR)
                .reply_markup(main_menu(false))
                .await?;
        }
    }
    Ok(())
}

/// Resend the last thing the story said.
async fn continue_novel(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    state: &SharedState,
) -> ResponseResult<()> {
    let session = match state.engine.get_session(user_id).await {
        Ok(Some(session)) if !session.is_completed => session,
        Ok(_) => {
            bot.send_message(chat_id, texts::NO_ACTIVE_NOVEL)
                .reply_markup(main_menu(false))
                .await?;
            return Ok(());
        }
        Err(e) => {
            error!(user_id, error = %e, "Failed to read session");
            bot.send_message(chat_id, texts::PROCESSING_ERROR).await?;
            return Ok(());
        }
    };

    let last = match state.engine.get_last_assistant_message(&session).await {
        Ok(last) => last.filter(|text| !text.trim().is_empty()),
        Err(e) => {
            error!(user_id, error = %e, "Failed to read last story message");
            None
        }
    };

    let Some(text) = last else {
        bot.send_message(chat_id, texts::NOTHING_TO_CONTINUE)
            .reply_markup(main_menu(true))
            .await?;
        return Ok(());
    };

    for chunk in split_message(&text, MAX_MESSAGE_CHARS) {
        bot.send_message(chat_id, chunk)
            .reply_markup(main_menu(true))
            .await?;
    }
    Ok(())
}

/// Feed free text into the active story.
async fn story_input(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    text: String,
    state: &SharedState,
) -> ResponseResult<()> {
    let session = match state.engine.get_session(user_id).await {
        Ok(Some(session)) if !session.is_completed => session,
        Ok(_) => {
            bot.send_message(chat_id, texts::NO_ACTIVE_NOVEL)
                .reply_markup(main_menu(false))
                .await?;
            return Ok(());
        }
        Err(e) => {
            error!(user_id, error = %e, "Failed to read session");
            let delivery = state.delivery(bot, chat_id);
            delivery.notify(novel_engine::Notice::ProcessingError).await;
            return Ok(());
        }
    };

    bot.send_chat_action(chat_id, ChatAction::Typing).await?;

    let delivery = state.delivery(bot, chat_id);
    let outcome = state
        .engine
        .process_turn(&session, TurnInput::User(text), &delivery)
        .await;
    debug!(user_id, session_id = %session.id, ?outcome, "Turn finished");
    Ok(())
}

async fn send_restart_invoice(bot: &Bot, chat_id: ChatId, state: &SharedState) -> ResponseResult<()> {
    let cost = state.payments.restart_cost();
    send_stars_invoice(
        bot,
        chat_id,
        state,
        texts::RESTART_INVOICE_TITLE,
        texts::RESTART_INVOICE_DESCRIPTION,
        PaymentPayload::Restart,
        cost,
    )
    .await
}

async fn send_stars_invoice(
    bot: &Bot,
    chat_id: ChatId,
    state: &SharedState,
    title: &str,
    description: &str,
    payload: PaymentPayload,
    amount: u32,
) -> ResponseResult<()> {
    bot.send_invoice(
        chat_id,
        title,
        description,
        payload.to_string(),
        state.config.provider_token.clone(),
        STARS_CURRENCY,
        vec![LabeledPrice::new(STARS_CURRENCY, amount)],
    )
    .reply_markup(invoice_keyboard(amount))
    .await?;
    Ok(())
}

/// Approve checkouts whose payload we issued.
pub async fn handle_pre_checkout(bot: Bot, query: PreCheckoutQuery) -> ResponseResult<()> {
    match query.invoice_payload.parse::<PaymentPayload>() {
        Ok(payload) => {
            debug!(user_id = query.from.id.0, %payload, "Approving checkout");
            bot.answer_pre_checkout_query(query.id, true).await?;
        }
        Err(e) => {
            warn!(user_id = query.from.id.0, error = %e, "Rejecting checkout");
            bot.answer_pre_checkout_query(query.id, false)
                .error_message(texts::PAYMENT_ERROR)
                .await?;
        }
    }
    Ok(())
}

/// Apply a completed payment. A restart payment starts the new story right away.
pub async fn handle_successful_payment(
    bot: Bot,
    msg: Message,
    state: SharedState,
) -> ResponseResult<()> {
    let Some(payment) = msg.successful_payment() else {
        return Ok(());
    };
    let user_id = sender_id(&msg);
    let amount = payment.total_amount as u32;

    let payload = match payment.invoice_payload.parse::<PaymentPayload>() {
        Ok(payload) => payload,
        Err(e) => {
            error!(user_id, amount, error = %e, "Payment with unknown payload");
            bot.send_message(msg.chat.id, texts::PAYMENT_ERROR).await?;
            return Ok(());
        }
    };

    match state
        .payments
        .on_payment_confirmed(user_id, payload, amount)
        .await
    {
        Ok(effect) => {
            bot.send_message(msg.chat.id, texts::PAYMENT_SUCCESS)
                .parse_mode(ParseMode::Html)
                .await?;
            if effect == PaymentEffect::RestartUnlocked {
                start_novel(&bot, msg.chat.id, user_id, &state).await?;
            }
        }
        Err(e) => {
            error!(user_id, amount, %payload, error = %e, "Failed to apply payment");
            bot.send_message(msg.chat.id, texts::PAYMENT_ERROR).await?;
        }
    }
    Ok(())
}

/// Handle inline button presses under invoices.
pub async fn handle_callback(bot: Bot, query: CallbackQuery) -> ResponseResult<()> {
    bot.answer_callback_query(query.id.clone()).await?;

    if query.data.as_deref() != Some(INVOICE_CANCEL) {
        debug!(data = ?query.data, "Ignoring unknown callback");
        return Ok(());
    }

    if let Some(message) = query.regular_message() {
        if let Err(e) = bot.delete_message(message.chat.id, message.id).await {
            debug!(error = %e, "Failed to remove cancelled invoice");
        }
        bot.send_message(message.chat.id, texts::PAYMENT_CANCELLED)
            .await?;
    }
    Ok(())
}
