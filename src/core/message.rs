//! Chat messages exchanged with a capability.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation.
    System,
    /// Input to the model.
    User,
    /// Output of the model.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

/// A single chat message.
///
/// Messages are built once and shared by reference afterwards; the protocol
/// never edits a message that has been appended to a conversation.
///
/// # Examples
///
/// ```
/// use minions_rs::core::{Message, Role};
///
/// let msg = Message::user("What is the diagnosis?");
/// assert_eq!(msg.role, Role::User);
/// assert!(msg.images.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author role.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Ordered image references for multimodal backends.
    #[serde(default, skip_serializing_if = "images_empty")]
    pub images: Option<Vec<String>>,
}

#[allow(clippy::ref_option)]
fn images_empty(images: &Option<Vec<String>>) -> bool {
    images.as_ref().is_none_or(Vec::is_empty)
}

impl Message {
    /// Creates a message with the given role.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: None,
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attaches image references.
    #[must_use]
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = Some(images);
        self
    }
}
