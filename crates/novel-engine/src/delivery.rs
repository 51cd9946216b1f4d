//! Outbound side of a turn.

use async_trait::async_trait;

use novel_models::Segment;

/// Fixed user-facing notices. Carry no internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The story ended; a restart needs payment.
    StoryCompleted,
    /// The assistant service refused us.
    ServiceUnavailable,
    /// Any other failure while processing a turn.
    ProcessingError,
}

/// Renders segments and notices to the user.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Deliver segments in order. Failures of single items are handled
    /// inside; the call as a whole never fails.
    async fn deliver(&self, segments: &[Segment]);

    /// Send a fixed notice.
    async fn notify(&self, notice: Notice);
}
