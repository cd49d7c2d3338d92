use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;

use crate::delivery::Channel;
use crate::template::{RenderedDocument, PDF_MIME_TYPE};

use super::{ChannelSender, MailTransport, SendError, SendReceipt, SenderConfigError};

/// Sends rendered documents as email.
///
/// HTML documents become a `multipart/alternative` body; PDF documents are
/// attached to a short cover note.
pub struct EmailSender {
    from: Mailbox,
    transport: Arc<dyn MailTransport>,
}

impl EmailSender {
    pub fn new(from: &str, transport: Arc<dyn MailTransport>) -> Result<Self, SenderConfigError> {
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| SenderConfigError::InvalidFrom(from.to_string(), e.to_string()))?;
        Ok(Self { from, transport })
    }

    /// Build the MIME message for one recipient
    pub fn build_message(
        &self,
        recipient: &str,
        document: &RenderedDocument,
    ) -> Result<Message, SendError> {
        let to = parse_address("recipient", recipient)?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(document.subject.clone());
        if let Some(reply_to) = &document.reply_to {
            builder = builder.reply_to(parse_address("reply-to", reply_to)?);
        }
        if let Some(cc) = &document.cc {
            builder = builder.cc(parse_address("cc", cc)?);
        }

        let body = if document.is_pdf() {
            let content_type = ContentType::parse(PDF_MIME_TYPE)
                .map_err(|e| SendError::Permanent(e.to_string()))?;
            let file_name = document
                .file_name
                .clone()
                .unwrap_or_else(|| "document.pdf".to_string());
            let cover = document.text_body.clone().unwrap_or_default();

            MultiPart::mixed()
                .singlepart(SinglePart::plain(cover))
                .singlepart(Attachment::new(file_name).body(document.bytes.clone(), content_type))
        } else {
            let html = document
                .body_str()
                .ok_or_else(|| SendError::Permanent("html body is not valid UTF-8".to_string()))?
                .to_string();
            let text = document.text_body.clone().unwrap_or_default();

            MultiPart::alternative_plain_html(text, html)
        };

        builder
            .multipart(body)
            .map_err(|e| SendError::Permanent(format!("failed to build message: {e}")))
    }
}

/// A malformed address never becomes valid on retry
fn parse_address(role: &str, address: &str) -> Result<Mailbox, SendError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| SendError::Permanent(format!("invalid {role} {address:?}: {e}")))
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    #[tracing::instrument(
        name = "sender.email",
        skip(self, document),
        fields(transport = self.transport.name(), subject = %document.subject)
    )]
    async fn send(
        &self,
        recipient: &str,
        document: &RenderedDocument,
    ) -> Result<SendReceipt, SendError> {
        let message = self.build_message(recipient, document)?;
        let response = self.transport.deliver(message).await?;

        tracing::debug!(response = ?response, "Email accepted by transport");
        Ok(SendReceipt::new(Channel::Email, response))
    }
}
