// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::AsyncSmtpTransport;
use lettre::{AsyncTransport, Tokio1Executor};
use tracing::warn;

use crate::config::settings::NotifySettings;
use crate::domain::models::job::ResearchJob;
use crate::infrastructure::notify::Notifier;

/// SMTP邮件通知器
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    /// 从配置构建通知器
    ///
    /// 通知未启用或配置不完整时返回None，调用方退回空实现。
    pub fn from_settings(settings: &NotifySettings) -> Option<Self> {
        if !settings.enabled {
            return None;
        }

        let host = settings.smtp_host.as_deref()?;
        let user = settings.smtp_user.clone()?;
        let pass = settings.smtp_pass.clone()?;
        let from_addr = settings.from_email.as_deref()?;

        let mailer = match AsyncSmtpTransport::<Tokio1Executor>::relay(host) {
            Ok(builder) => builder.credentials(Credentials::new(user, pass)).build(),
            Err(e) => {
                warn!("Invalid SMTP host, notifications disabled: {}", e);
                return None;
            }
        };

        let from = match from_addr.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                warn!("Invalid from address, notifications disabled: {}", e);
                return None;
            }
        };

        Some(Self { mailer, from })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify_job_ready(&self, job: &ResearchJob, recipient: Option<&str>) {
        let Some(recipient) = recipient else {
            return;
        };
        let to: Mailbox = match recipient.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                warn!(job_id = %job.id, "Invalid recipient address: {}", e);
                return;
            }
        };

        let subject = format!("Your research dossier on {} is ready", job.target);
        let body = format!(
            "The research job you requested has completed.\n\n\
             Target: {}\nKind: {}\nDepth: {}\nJob ID: {}\n\n\
             Download the report from your dashboard.\n",
            job.target, job.target_kind, job.depth, job.id
        );

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body);

        match message {
            Ok(message) => {
                if let Err(e) = self.mailer.send(message).await {
                    warn!(job_id = %job.id, "Failed to send report-ready email: {}", e);
                }
            }
            Err(e) => warn!(job_id = %job.id, "Failed to build report-ready email: {}", e),
        }
    }
}
