//! Outgoing email: verification codes and support requests.
//!
//! Registration persists the account first and then hands the message to an
//! `EmailSender` on the blocking pool; support requests go the same way. Delivery is fire-and-forget: a failure
//! is logged and never reaches the client, and there is no retry.
//!
//! The default sender for local dev is `LogEmailSender`, which logs and returns `Ok(())`.
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

impl EmailMessage {
    /// Message carrying a verification code and the link that submits it.
    #[must_use]
    pub fn verification(to_email: &str, name: &str, code: &str, verify_url: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            subject: "Confirm your email".to_string(),
            body: format!(
                "Hello {name},\n\nYour verification code is {code}.\n\
                 Confirm your account at {verify_url}\n"
            ),
            attachment: None,
        }
    }

    /// Message relaying a customer's request to the support inbox.
    #[must_use]
    pub fn support(
        inbox: &str,
        sender: &str,
        message: &str,
        attachment: Option<Attachment>,
    ) -> Self {
        Self {
            to_email: inbox.to_string(),
            subject: "Support request".to_string(),
            body: format!("From: {sender}\n\n{message}\n"),
            attachment,
        }
    }
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error describing why it failed.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            body = %message.body,
            attachment = message.attachment.as_ref().map(|file| file.filename.as_str()),
            attachment_bytes = message.attachment.as_ref().map(|file| file.content.len()),
            "email send stub"
        );
        Ok(())
    }
}

/// Send `message` in the background.
pub fn dispatch(sender: Arc<dyn EmailSender>, message: EmailMessage) {
    tokio::task::spawn_blocking(move || {
        if let Err(err) = sender.send(&message) {
            error!(to_email = %message.to_email, "Failed to send email: {err:#}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct ChannelSender(Mutex<mpsc::UnboundedSender<EmailMessage>>);

    impl EmailSender for ChannelSender {
        fn send(&self, message: &EmailMessage) -> Result<()> {
            self.0
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .send(message.clone())?;
            Ok(())
        }
    }

    struct FailingSender;

    impl EmailSender for FailingSender {
        fn send(&self, _message: &EmailMessage) -> Result<()> {
            anyhow::bail!("smtp unavailable")
        }
    }

    #[test]
    fn verification_message_contains_code_and_link() {
        let message = EmailMessage::verification(
            "a@x.com",
            "Alice",
            "0042",
            "http://localhost/verify?code=0042",
        );
        assert_eq!(message.to_email, "a@x.com");
        assert!(message.body.contains("0042"));
        assert!(message.body.contains("http://localhost/verify?code=0042"));
    }

    #[test]
    fn support_message_keeps_sender_and_attachment() {
        let attachment = Attachment {
            filename: "receipt.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            content: b"%PDF".to_vec(),
        };
        let message = EmailMessage::support(
            "help@shop.dev",
            "a@x.com",
            "My order never arrived",
            Some(attachment.clone()),
        );
        assert_eq!(message.to_email, "help@shop.dev");
        assert!(message.body.starts_with("From: a@x.com"));
        assert!(message.body.contains("My order never arrived"));
        assert_eq!(message.attachment, Some(attachment));
        assert!(LogEmailSender.send(&message).is_ok());
    }

    #[test]
    fn log_sender_accepts_everything() {
        let message = EmailMessage::verification("a@x.com", "A", "1", "u");
        assert!(LogEmailSender.send(&message).is_ok());
    }

    #[tokio::test]
    async fn dispatch_delivers_in_background() -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender: Arc<dyn EmailSender> = Arc::new(ChannelSender(Mutex::new(tx)));
        let message = EmailMessage::verification("a@x.com", "A", "0001", "u");
        dispatch(sender, message.clone());
        assert_eq!(rx.recv().await, Some(message));
        Ok(())
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        dispatch(
            Arc::new(FailingSender),
            EmailMessage::verification("a@x.com", "A", "0001", "u"),
        );
        tokio::task::yield_now().await;
    }
}
