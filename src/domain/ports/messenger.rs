//! Messenger port - outbound email.

use async_trait::async_trait;

use crate::domain::error::DeliveryError;

/// A resolved attachment ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub file_id: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// An outbound email message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Sender; the robot's address when it has one, else the provider
    /// default applies.
    pub from: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<EmailAttachment>,
}

/// The email library behind the delivery center.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send through the named channel.
    async fn send(&self, channel: &str, message: OutboundEmail) -> Result<(), DeliveryError>;
}
