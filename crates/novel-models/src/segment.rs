//! Delivery segments produced from a raw assistant reply.

use serde::{Deserialize, Serialize};

/// A unit of assistant output, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Segment {
    /// Cleaned narrative text.
    Text(String),
    /// Opaque storage id of an image to fetch and send.
    Image(String),
}

impl Segment {
    /// Creates a text segment.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// Creates an image segment.
    pub fn image(reference: impl Into<String>) -> Self {
        Self::Image(reference.into())
    }

    /// Returns the text content, if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Image(_) => None,
        }
    }

    /// Returns the image reference, if this is an image segment.
    pub fn as_image(&self) -> Option<&str> {
        match self {
            Self::Image(id) => Some(id),
            Self::Text(_) => None,
        }
    }
}
