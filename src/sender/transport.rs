//! Mail transports used by `EmailSender`

use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{SmtpConfig, SmtpTls};

use super::{SendError, SenderConfigError};

/// Hands a built MIME message to a mail system.
///
/// Returns the provider's reply on acceptance.
#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, message: Message) -> Result<Option<String>, SendError>;
}

/// Async SMTP relay
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, SenderConfigError> {
        let builder = match config.tls {
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| SenderConfigError::Transport(e.to_string()))?,
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| SenderConfigError::Transport(e.to_string()))?,
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

/// Map an SMTP failure onto the retry classification.
///
/// Only explicit 5xx replies and client-side errors are permanent;
/// connection, TLS and timeout failures may clear up.
fn classify_smtp_error(err: lettre::transport::smtp::Error) -> SendError {
    if err.is_permanent() || err.is_client() {
        SendError::Permanent(err.to_string())
    } else {
        SendError::Transient(err.to_string())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn deliver(&self, message: Message) -> Result<Option<String>, SendError> {
        let response = self
            .transport
            .send(message)
            .await
            .map_err(classify_smtp_error)?;

        Ok(Some(response.code().to_string()))
    }
}

/// Logs messages instead of sending them
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, message: Message) -> Result<Option<String>, SendError> {
        let recipients: Vec<String> = message
            .envelope()
            .to()
            .iter()
            .map(|address| address.to_string())
            .collect();
        let size = message.formatted().len();

        tracing::info!(
            recipients = ?recipients,
            size_bytes = size,
            "Mail transport disabled, message logged instead of sent"
        );

        Ok(None)
    }
}
