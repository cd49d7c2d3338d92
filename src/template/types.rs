//! Template types and error definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delivery::{ErrorInfo, ErrorKind};

use super::substitution::placeholders;

/// Errors raised while rendering a document for a job
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Rendering failed: {0}")]
    Engine(String),

    /// The template source could not be reached (remote fetch, timeout)
    #[error("Template source unavailable: {0}")]
    Unavailable(String),
}

impl RenderError {
    /// Only an unreachable template source is worth retrying
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Unavailable(_) => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        }
    }
}

impl From<RenderError> for ErrorInfo {
    fn from(err: RenderError) -> Self {
        ErrorInfo {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Errors raised while building the template catalog at startup
#[derive(Debug, Error)]
pub enum TemplateLoadError {
    #[error("Failed to read template source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse template {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid template {id}: {reason}")]
    Invalid { id: String, reason: String },

    #[error("Duplicate template ID: {0}")]
    Duplicate(String),
}

/// Output format of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    /// HTML body with an optional plain-text alternative
    #[default]
    Html,
    /// PDF document rendered from `document`, with an optional cover text
    Pdf,
}

/// A document template definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Unique template identifier (alphanumeric, dash, underscore)
    pub id: String,

    /// Human-readable template name
    pub name: String,

    /// Subject line with {{field}} placeholders
    pub subject: String,

    #[serde(default)]
    pub format: TemplateFormat,

    /// HTML body (required for the html format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    /// Plain-text body or cover note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// PDF document text (required for the pdf format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,

    /// Context fields that must be present even if not referenced
    #[serde(default)]
    pub required: Vec<String>,

    /// Attachment file name for pdf output, may contain placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Reply-To address, may contain placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    /// Additional copy recipient, may contain placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Template {
    /// Validate the template definition
    pub fn validate(&self) -> Result<(), TemplateLoadError> {
        let invalid = |reason: &str| TemplateLoadError::Invalid {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() || self.id.len() > 64 {
            return Err(invalid("ID must be 1-64 characters"));
        }

        if !self
            .id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(
                "ID must contain only alphanumeric, dash, or underscore",
            ));
        }

        if self.name.is_empty() || self.name.len() > 256 {
            return Err(invalid("Name must be 1-256 characters"));
        }

        if self.subject.trim().is_empty() {
            return Err(invalid("Subject must not be empty"));
        }

        match self.format {
            TemplateFormat::Html if self.html.is_none() => {
                return Err(invalid("html format requires an html body"));
            }
            TemplateFormat::Pdf if self.document.is_none() => {
                return Err(invalid("pdf format requires a document body"));
            }
            _ => {}
        }

        for source in self.sources() {
            placeholders(source).map_err(|e| invalid(&e.to_string()))?;
        }

        Ok(())
    }

    fn sources(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.subject.as_str())
            .chain(self.html.as_deref())
            .chain(self.text.as_deref())
            .chain(self.document.as_deref())
            .chain(self.file_name.as_deref())
            .chain(self.reply_to.as_deref())
            .chain(self.cc.as_deref())
    }

    /// Summary for listing endpoints
    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            format: self.format,
            required: self.required.clone(),
            description: self.description.clone(),
        }
    }
}

/// Template listing entry
#[derive(Debug, Clone, Serialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub format: TemplateFormat,
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A rendered document ready to hand to a sender.
///
/// Lives only as long as the job that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub subject: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Plain-text alternative (html) or cover note (pdf)
    pub text_body: Option<String>,
    /// Attachment name when `bytes` is sent as a file
    pub file_name: Option<String>,
    pub reply_to: Option<String>,
    pub cc: Option<String>,
}

impl RenderedDocument {
    pub fn is_pdf(&self) -> bool {
        self.mime_type == super::PDF_MIME_TYPE
    }

    /// Body interpreted as UTF-8, for html documents
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn html_template() -> Template {
        Template {
            id: "welcome".to_string(),
            name: "Welcome".to_string(),
            subject: "Welcome {{name}}".to_string(),
            format: TemplateFormat::Html,
            html: Some("<p>Hi {{name}}</p>".to_string()),
            text: None,
            document: None,
            required: vec![],
            file_name: None,
            reply_to: None,
            cc: None,
            description: None,
        }
    }

    #[test]
    fn test_valid_template() {
        assert!(html_template().validate().is_ok());
    }

    #[test]
    fn test_invalid_id() {
        let mut template = html_template();
        template.id = "has space".to_string();
        assert!(matches!(
            template.validate(),
            Err(TemplateLoadError::Invalid { .. })
        ));
    }

    #[test]
    fn test_pdf_requires_document() {
        let mut template = html_template();
        template.format = TemplateFormat::Pdf;
        assert!(template.validate().is_err());

        template.document = Some("Total: {{total}}".to_string());
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_unclosed_placeholder_rejected() {
        let mut template = html_template();
        template.html = Some("<p>Hi {{name</p>".to_string());
        assert!(template.validate().is_err());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RenderError::TemplateNotFound("x".into()).kind(),
            ErrorKind::Permanent
        );
        assert_eq!(RenderError::MissingField("x".into()).kind(), ErrorKind::Permanent);
        assert_eq!(RenderError::Unavailable("x".into()).kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_deserialize_defaults() {
        let template: Template = serde_json::from_value(serde_json::json!({
            "id": "notice",
            "name": "Notice",
            "subject": "Notice",
            "html": "<p>Notice</p>"
        }))
        .unwrap();
        assert_eq!(template.format, TemplateFormat::Html);
        assert!(template.required.is_empty());
        assert!(template.reply_to.is_none());
    }

    #[test]
    fn test_malformed_reply_to_placeholder_rejected() {
        let mut template = html_template();
        template.reply_to = Some("{{email".to_string());
        assert!(template.validate().is_err());

        template.reply_to = Some("{{email}}".to_string());
        assert!(template.validate().is_ok());
    }
}
