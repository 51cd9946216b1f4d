//! Payment confirmation handling.

use std::sync::Arc;

use tracing::{info, warn};

use novel_models::{PaymentPayload, PaymentRecord, SessionUpdate};
use novel_persistence::SessionStore;

use crate::error::Result;

/// What a confirmed payment changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEffect {
    /// The player may start a new story.
    RestartUnlocked,
    /// A donation of the given number of stars was recorded.
    Donation(u32),
}

/// Applies confirmed payments to sessions.
pub struct PaymentService {
    store: Arc<dyn SessionStore>,
    restart_cost: u32,
}

impl PaymentService {
    /// Create a service charging `restart_cost` stars per restart.
    pub fn new(store: Arc<dyn SessionStore>, restart_cost: u32) -> Self {
        Self {
            store,
            restart_cost,
        }
    }

    /// Price of a restart, in stars.
    pub fn restart_cost(&self) -> u32 {
        self.restart_cost
    }

    /// Record a confirmed payment and apply its effect.
    pub async fn on_payment_confirmed(
        &self,
        user_id: i64,
        payload: PaymentPayload,
        amount: u32,
    ) -> Result<PaymentEffect> {
        self.store
            .record_payment(PaymentRecord::new(user_id, amount, payload))
            .await?;

        match payload {
            PaymentPayload::Restart => {
                if amount < self.restart_cost {
                    warn!(user_id, amount, expected = self.restart_cost, "Restart paid below price");
                }
                if let Some(session) = self.store.get(user_id).await? {
                    if session.needs_payment {
                        self.store
                            .update(&session.id, SessionUpdate::payment_cleared())
                            .await?;
                    }
                }
                info!(user_id, amount, "Restart unlocked");
                Ok(PaymentEffect::RestartUnlocked)
            }
            PaymentPayload::Donation(stars) => {
                info!(user_id, stars, "Donation received");
                Ok(PaymentEffect::Donation(stars))
            }
        }
    }
}
