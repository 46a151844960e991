//! Delivery center - multi-target fan-out (P4).
//!
//! Channels come from the robot's preferences, never from the request.
//! Every target of every enabled channel yields one [`ChannelResult`];
//! the aggregate success is the AND over all of them, so partial
//! failure stays visible.

use std::sync::Arc;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::domain::models::{
    AttachmentWrapper, ChannelResult, DeliveryRequest, DeliveryResult, DeliveryTarget,
    DeliveryType, Robot,
};
use crate::domain::ports::{
    AttachmentService, EmailAttachment, Messenger, OutboundEmail, ProcessExecutor,
};

/// Process-wide messenger channel used for outbound email, settable at
/// init.
static DEFAULT_EMAIL_CHANNEL: RwLock<Option<String>> = RwLock::new(None);

/// The messenger channel the email fan-out sends through.
pub fn default_email_channel() -> String {
    DEFAULT_EMAIL_CHANNEL
        .read()
        .ok()
        .and_then(|guard| guard.clone())
        .unwrap_or_else(|| "default".to_string())
}

/// Override the process-wide email channel. Call once at init.
pub fn set_default_email_channel(name: impl Into<String>) {
    if let Ok(mut guard) = DEFAULT_EMAIL_CHANNEL.write() {
        *guard = Some(name.into());
    }
}

/// Fan-out of delivery requests to the robot's configured channels.
pub struct DeliveryCenter {
    messenger: Arc<dyn Messenger>,
    attachments: Arc<dyn AttachmentService>,
    processes: Arc<dyn ProcessExecutor>,
    http: reqwest::Client,
}

impl DeliveryCenter {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        attachments: Arc<dyn AttachmentService>,
        processes: Arc<dyn ProcessExecutor>,
    ) -> Self {
        Self {
            messenger,
            attachments,
            processes,
            http: reqwest::Client::new(),
        }
    }

    /// Deliver to every target of every enabled channel preference.
    pub async fn deliver(&self, robot: &Robot, request: &DeliveryRequest) -> DeliveryResult {
        let mut results = Vec::new();

        for preference in &robot.config.delivery {
            if !preference.enabled {
                continue;
            }
            match preference.channel {
                DeliveryType::Email => {
                    let attachments = self.resolve_attachments(&request.content.attachments).await;
                    for target in &preference.targets {
                        results.push(self.deliver_email(robot, request, target, &attachments).await);
                    }
                }
                DeliveryType::Webhook => {
                    for target in &preference.targets {
                        results.push(self.deliver_webhook(request, target).await);
                    }
                }
                DeliveryType::Process => {
                    for target in &preference.targets {
                        results.push(self.deliver_process(request, target).await);
                    }
                }
                DeliveryType::Notify => {
                    // Subscription-based fan-out lives outside the core
                    debug!(member_id = %robot.member_id, "notify channel reserved, skipping");
                }
            }
        }

        DeliveryResult::from_results(results)
    }

    /// Resolve attachment wrappers to bytes and MIME. Unresolvable
    /// wrappers are reported as errors so the email targets fail
    /// visibly instead of sending incomplete mail.
    async fn resolve_attachments(
        &self,
        references: &[String],
    ) -> Result<Vec<EmailAttachment>, String> {
        let mut resolved = Vec::new();
        for reference in references {
            let Some(wrapper) = AttachmentWrapper::parse(reference) else {
                warn!(reference = %reference, "Skipping non-wrapper attachment reference");
                continue;
            };
            let info = self
                .attachments
                .info(&wrapper.file_id)
                .await
                .map_err(|e| format!("attachment '{reference}': {e}"))?;
            let bytes = self
                .attachments
                .read(&wrapper.file_id)
                .await
                .map_err(|e| format!("attachment '{reference}': {e}"))?;
            resolved.push(EmailAttachment {
                file_id: wrapper.file_id,
                content_type: info.content_type,
                bytes,
            });
        }
        Ok(resolved)
    }

    async fn deliver_email(
        &self,
        robot: &Robot,
        request: &DeliveryRequest,
        target: &DeliveryTarget,
        attachments: &Result<Vec<EmailAttachment>, String>,
    ) -> ChannelResult {
        let DeliveryTarget::Email { to, from } = target else {
            return mismatched(DeliveryType::Email, target);
        };

        let attachments = match attachments {
            Ok(resolved) => resolved.clone(),
            Err(reason) => {
                return ChannelResult {
                    channel: DeliveryType::Email,
                    target: to.clone(),
                    success: false,
                    detail: Some(reason.clone()),
                }
            }
        };

        let message = OutboundEmail {
            from: from.clone().or_else(|| robot.email.clone()),
            to: to.clone(),
            subject: request.content.summary.clone(),
            body: request.content.body.clone(),
            attachments,
        };

        match self.messenger.send(&default_email_channel(), message).await {
            Ok(()) => ChannelResult {
                channel: DeliveryType::Email,
                target: to.clone(),
                success: true,
                detail: None,
            },
            Err(e) => ChannelResult {
                channel: DeliveryType::Email,
                target: to.clone(),
                success: false,
                detail: Some(e.to_string()),
            },
        }
    }

    async fn deliver_webhook(
        &self,
        request: &DeliveryRequest,
        target: &DeliveryTarget,
    ) -> ChannelResult {
        let DeliveryTarget::Webhook { url, headers } = target else {
            return mismatched(DeliveryType::Webhook, target);
        };

        let mut call = self.http.post(url).json(&request.content);
        for (name, value) in headers {
            call = call.header(name, value);
        }

        match call.send().await {
            Ok(response) => {
                let status = response.status();
                ChannelResult {
                    channel: DeliveryType::Webhook,
                    target: url.clone(),
                    success: status.as_u16() < 400,
                    detail: Some(format!("HTTP {status}")),
                }
            }
            Err(e) => ChannelResult {
                channel: DeliveryType::Webhook,
                target: url.clone(),
                success: false,
                detail: Some(e.to_string()),
            },
        }
    }

    async fn deliver_process(
        &self,
        request: &DeliveryRequest,
        target: &DeliveryTarget,
    ) -> ChannelResult {
        let DeliveryTarget::Process { name, args } = target else {
            return mismatched(DeliveryType::Process, target);
        };

        // Content first, then the configured extra arguments
        let mut call_args = vec![serde_json::to_value(&request.content).unwrap_or_default()];
        call_args.extend(args.iter().map(|a| serde_json::Value::String(a.clone())));

        match self.processes.call(name, &call_args).await {
            Ok(_) => ChannelResult {
                channel: DeliveryType::Process,
                target: name.clone(),
                success: true,
                detail: None,
            },
            Err(e) => ChannelResult {
                channel: DeliveryType::Process,
                target: name.clone(),
                success: false,
                detail: Some(e.to_string()),
            },
        }
    }
}

fn mismatched(channel: DeliveryType, target: &DeliveryTarget) -> ChannelResult {
    ChannelResult {
        channel,
        target: target.label(),
        success: false,
        detail: Some(format!(
            "target kind does not match {} channel",
            channel.as_str()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{DeliveryError, ProcessError};
    use crate::domain::models::{
        DeliveryContent, DeliveryContext, MemberRecord, TriggerType,
    };
    use crate::domain::ports::AttachmentInfo;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    struct RecordingMessenger {
        sent: Mutex<Vec<(String, OutboundEmail)>>,
        fail_to: Option<String>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send(&self, channel: &str, message: OutboundEmail) -> Result<(), DeliveryError> {
            if self.fail_to.as_deref() == Some(message.to.as_str()) {
                return Err(DeliveryError::Email("mailbox unavailable".to_string()));
            }
            self.sent.lock().await.push((channel.to_string(), message));
            Ok(())
        }
    }

    struct StaticAttachments;

    #[async_trait]
    impl AttachmentService for StaticAttachments {
        async fn read(&self, file_id: &str) -> Result<Vec<u8>, DeliveryError> {
            if file_id == "missing" {
                return Err(DeliveryError::Attachment(file_id.to_string()));
            }
            Ok(b"bytes".to_vec())
        }

        async fn info(&self, file_id: &str) -> Result<AttachmentInfo, DeliveryError> {
            if file_id == "missing" {
                return Err(DeliveryError::Attachment(file_id.to_string()));
            }
            Ok(AttachmentInfo {
                content_type: "application/pdf".to_string(),
                filename: Some(format!("{file_id}.pdf")),
            })
        }
    }

    struct StubProcesses {
        fail: bool,
    }

    #[async_trait]
    impl ProcessExecutor for StubProcesses {
        async fn call(
            &self,
            name: &str,
            args: &[serde_json::Value],
        ) -> Result<serde_json::Value, ProcessError> {
            if self.fail {
                return Err(ProcessError::Failed {
                    name: name.to_string(),
                    message: "exit 1".to_string(),
                });
            }
            Ok(json!({"name": name, "argc": args.len()}))
        }
    }

    fn robot_with_delivery(delivery: serde_json::Value) -> Robot {
        Robot::from_record(&MemberRecord {
            member_id: "r1".to_string(),
            team_id: "t1".to_string(),
            member_type: "robot".to_string(),
            status: "active".to_string(),
            autonomous_mode: true,
            display_name: "r1".to_string(),
            system_prompt: None,
            robot_email: Some("robot@team.example".to_string()),
            robot_config: json!({"identity": {"role": "analyst"}, "delivery": delivery}),
        })
        .unwrap()
    }

    fn request() -> DeliveryRequest {
        DeliveryRequest {
            content: DeliveryContent {
                summary: "Q3 report".to_string(),
                body: "revenue grew 4%".to_string(),
                attachments: vec![],
            },
            context: DeliveryContext {
                member_id: "r1".to_string(),
                execution_id: "e1".to_string(),
                trigger_type: TriggerType::Clock,
                team_id: "t1".to_string(),
            },
        }
    }

    fn center(messenger: RecordingMessenger, fail_process: bool) -> DeliveryCenter {
        DeliveryCenter::new(
            Arc::new(messenger),
            Arc::new(StaticAttachments),
            Arc::new(StubProcesses { fail: fail_process }),
        )
    }

    #[tokio::test]
    async fn test_email_uses_robot_address_as_default_from() {
        let robot = robot_with_delivery(json!([
            {"channel": "email", "targets": [{"kind": "email", "to": "boss@x.com"}]}
        ]));
        let messenger = RecordingMessenger {
            sent: Mutex::new(Vec::new()),
            fail_to: None,
        };
        let center = center(messenger, false);

        let result = center.deliver(&robot, &request()).await;
        assert!(result.success);
        assert_eq!(result.results.len(), 1);
    }

    #[tokio::test]
    async fn test_attachments_resolved_through_collaborator() {
        let robot = robot_with_delivery(json!([
            {"channel": "email", "targets": [{"kind": "email", "to": "boss@x.com"}]}
        ]));
        let messenger = RecordingMessenger {
            sent: Mutex::new(Vec::new()),
            fail_to: None,
        };
        let messenger_sent = Arc::new(messenger);
        let center = DeliveryCenter::new(
            Arc::clone(&messenger_sent) as Arc<dyn Messenger>,
            Arc::new(StaticAttachments),
            Arc::new(StubProcesses { fail: false }),
        );

        let mut req = request();
        req.content.attachments = vec![
            "__s3://report-q3".to_string(),
            "plain-reference.pdf".to_string(), // not a wrapper, skipped
        ];
        let result = center.deliver(&robot, &req).await;
        assert!(result.success);

        let sent = messenger_sent.sent.lock().await;
        let (_, email) = &sent[0];
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].file_id, "report-q3");
        assert_eq!(email.attachments[0].content_type, "application/pdf");
        assert_eq!(email.from.as_deref(), Some("robot@team.example"));
    }

    #[tokio::test]
    async fn test_unresolvable_attachment_fails_email_targets() {
        let robot = robot_with_delivery(json!([
            {"channel": "email", "targets": [{"kind": "email", "to": "boss@x.com"}]}
        ]));
        let center = center(
            RecordingMessenger {
                sent: Mutex::new(Vec::new()),
                fail_to: None,
            },
            false,
        );

        let mut req = request();
        req.content.attachments = vec!["__s3://missing".to_string()];
        let result = center.deliver(&robot, &req).await;
        assert!(!result.success);
        assert!(result.results[0].detail.as_ref().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_process_channel_passes_content_first() {
        let robot = robot_with_delivery(json!([
            {"channel": "process", "targets": [
                {"kind": "process", "name": "notify_crm", "args": ["--fast"]}
            ]}
        ]));
        let center = center(
            RecordingMessenger {
                sent: Mutex::new(Vec::new()),
                fail_to: None,
            },
            false,
        );

        let result = center.deliver(&robot, &request()).await;
        assert!(result.success);
        assert_eq!(result.results[0].target, "notify_crm");
    }

    #[tokio::test]
    async fn test_webhook_success_iff_status_below_400() {
        let mut server = mockito::Server::new_async().await;
        let ok_mock = server
            .mock("POST", "/hook-ok")
            .match_header("x-team", "t1")
            .with_status(201)
            .create_async()
            .await;
        let bad_mock = server
            .mock("POST", "/hook-bad")
            .with_status(500)
            .create_async()
            .await;

        let robot = robot_with_delivery(json!([
            {"channel": "webhook", "targets": [
                {"kind": "webhook", "url": format!("{}/hook-ok", server.url()),
                 "headers": {"x-team": "t1"}},
                {"kind": "webhook", "url": format!("{}/hook-bad", server.url())}
            ]}
        ]));
        let center = center(
            RecordingMessenger {
                sent: Mutex::new(Vec::new()),
                fail_to: None,
            },
            false,
        );

        let result = center.deliver(&robot, &request()).await;
        assert!(!result.success, "one failing target fails the aggregate");
        assert_eq!(result.results.len(), 2);
        assert!(result.results[0].success);
        assert!(!result.results[1].success);
        ok_mock.assert_async().await;
        bad_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_disabled_channel_is_skipped() {
        let robot = robot_with_delivery(json!([
            {"channel": "email", "enabled": false,
             "targets": [{"kind": "email", "to": "boss@x.com"}]}
        ]));
        let center = center(
            RecordingMessenger {
                sent: Mutex::new(Vec::new()),
                fail_to: None,
            },
            false,
        );

        let result = center.deliver(&robot, &request()).await;
        assert!(result.success);
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn test_default_email_channel_settable() {
        assert_eq!(default_email_channel(), "default");
        set_default_email_channel("primary-smtp");
        assert_eq!(default_email_channel(), "primary-smtp");
        set_default_email_channel("default");
    }
}
