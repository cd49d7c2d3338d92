//! Channel senders.
//!
//! A sender hands a rendered document to an external system for one
//! recipient and classifies failures as transient or permanent. Senders are
//! registered per `Channel` in a `SenderRegistry`.

mod email;
mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::SmtpConfig;
use crate::delivery::{Channel, ErrorInfo, ErrorKind};
use crate::template::RenderedDocument;

pub use email::EmailSender;
pub use transport::{LogMailTransport, MailTransport, SmtpMailTransport};

/// Failure reported by a sender
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Network trouble, timeouts, 4xx replies, throttling
    #[error("transient send failure: {0}")]
    Transient(String),
    /// Invalid recipient, 5xx rejection, unbuildable message
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

impl SendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SendError::Transient(_) => ErrorKind::Transient,
            SendError::Permanent(_) => ErrorKind::Permanent,
        }
    }
}

impl From<SendError> for ErrorInfo {
    fn from(err: SendError) -> Self {
        ErrorInfo {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Errors building senders from configuration
#[derive(Debug, Error)]
pub enum SenderConfigError {
    #[error("invalid sender address {0:?}: {1}")]
    InvalidFrom(String, String),
    #[error("failed to configure mail transport: {0}")]
    Transport(String),
}

/// Proof that a sender accepted a document
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub channel: Channel,
    /// Provider reply, e.g. the SMTP status line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<String>,
    pub accepted_at: DateTime<Utc>,
}

impl SendReceipt {
    pub fn new(channel: Channel, provider_response: Option<String>) -> Self {
        Self {
            channel,
            provider_response,
            accepted_at: Utc::now(),
        }
    }
}

/// Transmits rendered documents over one channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(
        &self,
        recipient: &str,
        document: &RenderedDocument,
    ) -> Result<SendReceipt, SendError>;
}

/// Maps each channel to its sender
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sender under its own channel, replacing any previous one
    pub fn register(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.channel(), sender);
    }

    /// Builder-style `register`
    pub fn with(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.register(sender);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelSender>> {
        self.senders.get(&channel).cloned()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.senders.keys().copied().collect()
    }
}

/// Build the registry from settings: SMTP when enabled, otherwise a
/// transport that only logs.
pub fn create_sender_registry(smtp: &SmtpConfig) -> Result<SenderRegistry, SenderConfigError> {
    let transport: Arc<dyn MailTransport> = if smtp.enabled {
        tracing::info!(host = %smtp.host, port = smtp.port, tls = ?smtp.tls, "Using SMTP mail transport");
        Arc::new(SmtpMailTransport::new(smtp)?)
    } else {
        tracing::warn!("SMTP disabled, email will be logged instead of sent");
        Arc::new(LogMailTransport)
    };

    let email = EmailSender::new(&smtp.from, transport)?;
    Ok(SenderRegistry::new().with(Arc::new(email)))
}
