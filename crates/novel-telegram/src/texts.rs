//! User-facing strings.

use novel_engine::Notice;

pub const BUTTON_NOVEL: &str = "🎮 Новелла";
pub const BUTTON_RESTART: &str = "🔄 Рестарт";
pub const BUTTON_CONTINUE: &str = "📖 Продолжить";
pub const BUTTON_DONATE: &str = "💝 Донат";
pub const BUTTON_HELP: &str = "❓ Помощь";

pub const HELLO: &str = "Привет! Я расскажу тебе интерактивную историю, в которой решения принимаешь ты.";

pub const HELLO_OWNER: &str = "Привет, владелец! Бот работает.";

pub const PONG: &str = "Понг! Бот на связи.";

pub const HELP: &str = "<b>Как играть</b>\n\n\
    🎮 Новелла - начать историю\n\
    📖 Продолжить - повторить последнее сообщение истории\n\
    🔄 Рестарт - начать заново\n\
    💝 Донат - поддержать проект\n\n\
    Отвечай на вопросы истории обычными сообщениями.\n\
    Поддержать звёздами: <code>/donate 50</code>";

pub const NOVEL_STARTED: &str = "История начинается!";

pub const LOADING: &str = "⌛️ Загрузка истории...";

pub const NO_ACTIVE_NOVEL: &str = "У вас нет активной новеллы. Нажмите '🎮 Новелла' чтобы начать.";

pub const NOTHING_TO_CONTINUE: &str = "Пока нечего продолжать. Напишите что-нибудь, чтобы продолжить историю.";

pub const PAYMENT_REQUIRED: &str = "История завершена. Чтобы начать новую, оплатите рестарт.";

pub const STORY_COMPLETED: &str = "История завершена! Чтобы начать новую, нажмите '🎮 Новелла'";

pub const PROCESSING_ERROR: &str = "Произошла ошибка при обработке сообщения. Пожалуйста, попробуйте ещё раз.";

pub const SERVICE_UNAVAILABLE: &str = "Сервис временно недоступен. Пожалуйста, попробуйте позже.";

pub const START_ERROR: &str = "Не удалось начать историю. Пожалуйста, попробуйте ещё раз.";

pub const IMAGE_FAILED: &str = "Не удалось загрузить изображение";

pub const RESTART_INVOICE_TITLE: &str = "Рестарт новеллы";

pub const RESTART_INVOICE_DESCRIPTION: &str = "Откройте новую историю с самого начала";

pub const DONATE_INVOICE_TITLE: &str = "Поддержка проекта";

pub const DONATE_USAGE: &str = "Укажите количество звёзд от 1 до 2500, например: <code>/donate 50</code>";

pub const PAYMENT_SUCCESS: &str = "<b>Спасибо!</b> Платёж получен.";

pub const PAYMENT_ERROR: &str = "Не удалось обработать платёж. Напишите нам, мы разберёмся.";

pub const CANCEL_BUTTON: &str = "Отмена";

pub const PAYMENT_CANCELLED: &str = "Оплата отменена.";

/// Label of an invoice pay button.
pub fn pay_button(amount: u32) -> String {
    format!("Оплатить {} ⭐️", amount)
}

/// Description of a donation invoice.
pub fn donate_description(amount: u32) -> String {
    format!("Донат {} ⭐️ на развитие истории", amount)
}

/// Text sent for an engine notice.
pub fn notice(notice: Notice) -> &'static str {
    match notice {
        Notice::StoryCompleted => STORY_COMPLETED,
        Notice::ServiceUnavailable => SERVICE_UNAVAILABLE,
        Notice::ProcessingError => PROCESSING_ERROR,
    }
}
