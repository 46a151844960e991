//! Delivery domain model.
//!
//! A delivery request separates what to deliver (content) from where it
//! came from (context). Channels are never carried on the request; the
//! delivery center derives them from the robot's preferences.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::trigger::TriggerType;

/// A delivery channel kind. Wire-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Email,
    Webhook,
    Process,
    /// Reserved for subscription-based notification fan-out
    Notify,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Webhook => "webhook",
            Self::Process => "process",
            Self::Notify => "notify",
        }
    }
}

/// One configured destination within a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryTarget {
    Email {
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },
    Webhook {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    Process {
        name: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl DeliveryTarget {
    /// Short label used in per-target results.
    pub fn label(&self) -> String {
        match self {
            Self::Email { to, .. } => to.clone(),
            Self::Webhook { url, .. } => url.clone(),
            Self::Process { name, .. } => name.clone(),
        }
    }
}

/// A robot's preference entry for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelPreference {
    pub channel: DeliveryType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub targets: Vec<DeliveryTarget>,
}

const fn default_enabled() -> bool {
    true
}

/// What to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeliveryContent {
    pub summary: String,
    pub body: String,
    /// Attachment wrappers, `__<uploader>://<fileID>`
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Where the content came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryContext {
    pub member_id: String,
    pub execution_id: String,
    pub trigger_type: TriggerType,
    pub team_id: String,
}

/// The input to the delivery center. Carries no channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub content: DeliveryContent,
    pub context: DeliveryContext,
}

/// Outcome of one target on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub channel: DeliveryType,
    /// Target label (address, URL, or process name)
    pub target: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate outcome across all targets of all enabled channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Logical AND of all target successes
    pub success: bool,
    pub results: Vec<ChannelResult>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DeliveryResult {
    /// Aggregate per-target results.
    pub fn from_results(results: Vec<ChannelResult>) -> Self {
        Self {
            success: results.iter().all(|r| r.success),
            results,
            extra: BTreeMap::new(),
        }
    }
}

/// The opaque attachment reference `__<uploader>://<fileID>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentWrapper {
    pub uploader: String,
    pub file_id: String,
}

impl AttachmentWrapper {
    /// Parse a wrapper string. Returns `None` for plain references.
    ///
    /// Parsed left-to-right: a leading `__`, then the uploader up to the
    /// first `://`, then the file id.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("__")?;
        let (uploader, file_id) = rest.split_once("://")?;
        if uploader.is_empty() || file_id.is_empty() {
            return None;
        }
        Some(Self {
            uploader: uploader.to_string(),
            file_id: file_id.to_string(),
        })
    }

    /// Whether the string is a well-formed wrapper.
    pub fn is_wrapper(s: &str) -> bool {
        Self::parse(s).is_some()
    }
}

impl std::fmt::Display for AttachmentWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "__{}://{}", self.uploader, self.file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapper_parse() {
        let w = AttachmentWrapper::parse("__s3://file-123").unwrap();
        assert_eq!(w.uploader, "s3");
        assert_eq!(w.file_id, "file-123");
        assert_eq!(w.to_string(), "__s3://file-123");
    }

    #[test]
    fn test_wrapper_rejects_malformed() {
        assert!(AttachmentWrapper::parse("s3://file-123").is_none());
        assert!(AttachmentWrapper::parse("__s3:file-123").is_none());
        assert!(AttachmentWrapper::parse("__://file-123").is_none());
        assert!(AttachmentWrapper::parse("__s3://").is_none());
        assert!(!AttachmentWrapper::is_wrapper("plain.pdf"));
    }

    #[test]
    fn test_wrapper_file_id_may_contain_separators() {
        let w = AttachmentWrapper::parse("__store://a/b://c").unwrap();
        assert_eq!(w.uploader, "store");
        assert_eq!(w.file_id, "a/b://c");
    }

    #[test]
    fn test_delivery_result_aggregation() {
        let all_ok = DeliveryResult::from_results(vec![
            ChannelResult {
                channel: DeliveryType::Email,
                target: "a@x.com".to_string(),
                success: true,
                detail: None,
            },
            ChannelResult {
                channel: DeliveryType::Webhook,
                target: "https://x".to_string(),
                success: true,
                detail: None,
            },
        ]);
        assert!(all_ok.success);

        let one_failed = DeliveryResult::from_results(vec![
            ChannelResult {
                channel: DeliveryType::Email,
                target: "a@x.com".to_string(),
                success: true,
                detail: None,
            },
            ChannelResult {
                channel: DeliveryType::Process,
                target: "notify_crm".to_string(),
                success: false,
                detail: Some("exit 1".to_string()),
            },
        ]);
        assert!(!one_failed.success);

        // Vacuous truth: no targets configured still counts as success
        assert!(DeliveryResult::from_results(vec![]).success);
    }
}
