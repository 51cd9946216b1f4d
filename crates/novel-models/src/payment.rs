//! Payment records and invoice payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Invoice payload for a novel restart.
pub const RESTART_PAYLOAD: &str = "novel_restart";

/// Suffix of donation payloads, e.g. `50_stars`.
const DONATION_SUFFIX: &str = "_stars";

/// What an invoice was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPayload {
    /// Unlocks a new playthrough after a completed one.
    Restart,
    /// Voluntary donation of the given number of stars.
    Donation(u32),
}

impl fmt::Display for PaymentPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restart => write!(f, "{}", RESTART_PAYLOAD),
            Self::Donation(amount) => write!(f, "{}{}", amount, DONATION_SUFFIX),
        }
    }
}

impl FromStr for PaymentPayload {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == RESTART_PAYLOAD {
            return Ok(Self::Restart);
        }
        s.strip_suffix(DONATION_SUFFIX)
            .and_then(|n| n.parse().ok())
            .map(Self::Donation)
            .ok_or_else(|| format!("unknown payment payload: {}", s))
    }
}

/// A confirmed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Paying user.
    pub user_id: i64,
    /// Amount in stars.
    pub amount: u32,
    /// What was paid for.
    pub payload: PaymentPayload,
    /// When the payment was confirmed.
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Creates a record stamped with the current time.
    pub fn new(user_id: i64, amount: u32, payload: PaymentPayload) -> Self {
        Self {
            user_id,
            amount,
            payload,
            created_at: Utc::now(),
        }
    }
}
