// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outbound mail: message model, transport seam and rendering.

pub mod render;
pub mod smtp;

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;

pub use render::{RenderContext, Renderable};
pub use smtp::SmtpMailer;

/// Mail errors.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid mail address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("Could not build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Name + address pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub address: String,
}

impl Recipient {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// File attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Which leg of a submission a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailKind {
    /// To the business inbox
    Notification,
    /// Back to the submitter
    AutoReply,
}

impl MailKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::AutoReply => "auto_reply",
        }
    }
}

/// A fully rendered message. The sender is a transport concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub kind: MailKind,
    pub to: Recipient,
    pub reply_to: Recipient,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachment: Option<MailAttachment>,
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message. Bounded; a timeout is an error.
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}
