//! Outgoing email.
//!
//! Mail is a best-effort side effect: handlers log a failed send and carry
//! on. [`SmtpMailer`] delivers through an SMTP relay; [`LogMailer`] only
//! writes the message to the log and is used when no relay is configured.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Failure to build or deliver a message.
#[derive(Error, Debug)]
pub enum MailError {
    /// An address or the message itself was malformed.
    #[error("Invalid email: {0}")]
    Invalid(String),
    /// The relay refused or could not be reached.
    #[error("Failed to send email: {0}")]
    Transport(String),
}

/// Future returned by [`Mailer::send`].
pub type MailFuture<'a> = Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + 'a>>;

/// A plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Sends emails.
pub trait Mailer: Send + Sync {
    /// Delivers `email`.
    fn send(&self, email: Email) -> MailFuture<'_>;
}

/// SMTP settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// Relay host.
    pub host: String,
    /// Relay port (587 for STARTTLS).
    pub port: u16,
    /// Login, if the relay requires one.
    pub username: Option<String>,
    /// Password for `username`.
    pub password: Option<String>,
    /// `From` header, e.g. `TimeBank <noreply@example.com>`.
    pub from: String,
}

/// Mailer backed by an async lettre SMTP transport.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: lettre::message::Mailbox,
}

impl SmtpMailer {
    /// Builds the transport. No connection is made until the first send.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] if the relay host or the `from` address is invalid.
    pub fn new(settings: SmtpSettings) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| MailError::Invalid(format!("SMTP relay {}: {e}", settings.host)))?
            .port(settings.port);
        if let (Some(user), Some(pass)) = (settings.username, settings.password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }
        let from = settings
            .from
            .parse()
            .map_err(|e| MailError::Invalid(format!("from address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, email: Email) -> MailFuture<'_> {
        Box::pin(async move {
            let to = email
                .to
                .parse()
                .map_err(|e| MailError::Invalid(format!("to address: {e}")))?;
            let message = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(email.subject)
                .header(ContentType::TEXT_PLAIN)
                .body(email.body)
                .map_err(|e| MailError::Invalid(e.to_string()))?;

            self.transport
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| MailError::Transport(e.to_string()))
        })
    }
}

/// Mailer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: Email) -> MailFuture<'_> {
        Box::pin(async move {
            tracing::info!(to = %email.to, subject = %email.subject, "Email (not sent, SMTP disabled)");
            Ok(())
        })
    }
}

/// Notice to a provider about a new booking request.
#[must_use]
pub fn booking_requested(to: &str, receiver_name: &str, hours: &str, category: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "New booking request".to_string(),
        body: format!(
            "{receiver_name} has requested {hours} hour(s) of {category}.\n\n\
             Open TimeBank to accept or decline the request."
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let email = booking_requested("bob@example.com", "alice", "2", "gardening");
        assert!(email.body.contains("alice has requested 2 hour(s) of gardening"));
        LogMailer.send(email).await.unwrap();
    }

    #[test]
    fn smtp_mailer_rejects_a_bad_from_address() {
        let result = SmtpMailer::new(SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: None,
            password: None,
            from: "not an address".to_string(),
        });
        assert!(matches!(result, Err(MailError::Invalid(_))));
    }
}
