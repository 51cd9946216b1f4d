//! Reply keyboards.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use crate::texts::{
    pay_button, BUTTON_CONTINUE, BUTTON_DONATE, BUTTON_HELP, BUTTON_NOVEL, BUTTON_RESTART,
    CANCEL_BUTTON,
};

/// Callback data of the invoice cancel button.
pub const INVOICE_CANCEL: &str = "invoice_cancel";

/// A menu button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Novel,
    Restart,
    Continue,
    Donate,
    Help,
}

impl MenuAction {
    /// Match a message text against the menu buttons.
    pub fn from_text(text: &str) -> Option<Self> {
        match text.trim() {
            BUTTON_NOVEL => Some(Self::Novel),
            BUTTON_RESTART => Some(Self::Restart),
            BUTTON_CONTINUE => Some(Self::Continue),
            BUTTON_DONATE => Some(Self::Donate),
            BUTTON_HELP => Some(Self::Help),
            _ => None,
        }
    }
}

/// Button labels of the main menu, row by row.
pub fn main_menu_rows(has_active_novel: bool) -> Vec<Vec<&'static str>> {
    if has_active_novel {
        vec![
            vec![BUTTON_NOVEL, BUTTON_CONTINUE],
            vec![BUTTON_RESTART, BUTTON_DONATE],
            vec![BUTTON_HELP],
        ]
    } else {
        vec![vec![BUTTON_NOVEL, BUTTON_DONATE], vec![BUTTON_HELP]]
    }
}

/// The persistent main menu.
pub fn main_menu(has_active_novel: bool) -> KeyboardMarkup {
    let rows = main_menu_rows(has_active_novel)
        .into_iter()
        .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>());
    KeyboardMarkup::new(rows).resize_keyboard().persistent()
}

/// Pay and cancel buttons under an invoice. The pay button must come first.
pub fn invoice_keyboard(amount: u32) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::pay(pay_button(amount))],
        vec![InlineKeyboardButton::callback(CANCEL_BUTTON, INVOICE_CANCEL)],
    ])
}
