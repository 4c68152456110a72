//! Customer support requests relayed to a fixed inbox.

use std::sync::Arc;
use tracing::info;

use super::email::{dispatch, Attachment, EmailMessage, EmailSender};
use crate::auth::utils::{normalize_email, valid_email};

/// Largest attachment accepted with a support request.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_SUPPORT_INBOX: &str = "support@localhost";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SupportError {
    #[error("a valid sender email is required")]
    InvalidSender,
    #[error("message is required")]
    EmptyMessage,
    #[error("attachment exceeds {} bytes", MAX_ATTACHMENT_BYTES)]
    AttachmentTooLarge,
}

/// Support request as submitted by a visitor.
#[derive(Debug, Default)]
pub struct SupportRequest {
    pub email: String,
    pub message: String,
    pub attachment: Option<Attachment>,
}

pub struct SupportDesk {
    mailer: Arc<dyn EmailSender>,
    inbox: String,
}

impl SupportDesk {
    #[must_use]
    pub fn new(mailer: Arc<dyn EmailSender>, inbox: impl Into<String>) -> Self {
        Self {
            mailer,
            inbox: inbox.into(),
        }
    }

    #[must_use]
    pub fn inbox(&self) -> &str {
        &self.inbox
    }

    /// Validate the request and queue it for delivery to the inbox.
    ///
    /// # Errors
    /// Returns a `SupportError` naming the first unusable field.
    pub fn submit(&self, request: SupportRequest) -> Result<(), SupportError> {
        let sender = normalize_email(&request.email);
        if !valid_email(&sender) {
            return Err(SupportError::InvalidSender);
        }
        let message = request.message.trim();
        if message.is_empty() {
            return Err(SupportError::EmptyMessage);
        }
        if request
            .attachment
            .as_ref()
            .is_some_and(|file| file.content.len() > MAX_ATTACHMENT_BYTES)
        {
            return Err(SupportError::AttachmentTooLarge);
        }

        info!(
            sender = %sender,
            attachment = request.attachment.is_some(),
            "support request queued"
        );
        dispatch(
            self.mailer.clone(),
            EmailMessage::support(&self.inbox, &sender, message, request.attachment),
        );
        Ok(())
    }
}
