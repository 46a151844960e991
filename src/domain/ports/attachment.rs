//! Attachment service port.
//!
//! Attachments travel as opaque wrappers (`__<uploader>://<fileID>`,
//! parsed by [`crate::domain::models::AttachmentWrapper`]); this port
//! resolves a file id to bytes and metadata.

use async_trait::async_trait;

use crate::domain::error::DeliveryError;

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub content_type: String,
    #[allow(dead_code)]
    pub filename: Option<String>,
}

/// Resolves attachment file ids.
#[async_trait]
pub trait AttachmentService: Send + Sync {
    async fn read(&self, file_id: &str) -> Result<Vec<u8>, DeliveryError>;

    async fn info(&self, file_id: &str) -> Result<AttachmentInfo, DeliveryError>;
}
