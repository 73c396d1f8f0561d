// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! SMTP transport with STARTTLS and login credentials.

use super::{MailError, Mailer, OutgoingMail, Recipient};
use crate::config::MailConfig;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

/// Sends mail through an authenticated STARTTLS relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the transport. No connection is made until the first send.
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(config.smtp_user.clone(), config.smtp_pass.clone()))
            .timeout(Some(config.timeout()))
            .build();

        Ok(Self {
            transport,
            from: mailbox(&Recipient::new(&config.from_name, &config.from_email))?,
        })
    }

    fn build_message(&self, mail: OutgoingMail) -> Result<Message, MailError> {
        let body = MultiPart::alternative_plain_html(mail.text, mail.html);
        let body = match mail.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| MailError::Build(e.to_string()))?;
                MultiPart::mixed()
                    .multipart(body)
                    .singlepart(Attachment::new(attachment.file_name).body(attachment.bytes.to_vec(), content_type))
            }
            None => body,
        };

        Message::builder()
            .from(self.from.clone())
            .to(mailbox(&mail.to)?)
            .reply_to(mailbox(&mail.reply_to)?)
            .subject(mail.subject)
            .multipart(body)
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let kind = mail.kind;
        let message = self.build_message(mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        debug!(kind = kind.as_str(), "Mail accepted by relay");
        Ok(())
    }
}

fn mailbox(recipient: &Recipient) -> Result<Mailbox, MailError> {
    let address = recipient
        .address
        .parse()
        .map_err(|e: lettre::address::AddressError| MailError::Address {
            address: recipient.address.clone(),
            reason: e.to_string(),
        })?;
    let name = Some(recipient.name.clone()).filter(|n| !n.is_empty());
    Ok(Mailbox::new(name, address))
}
