//! Document template system.
//!
//! This module provides:
//! - Template definitions with `{{field}}` placeholders (html or pdf output)
//! - A read-only catalog loaded once at startup (built-ins + JSON files)
//! - A strict substitution engine: unresolved placeholders fail rendering
//! - A deterministic PDF writer for document templates
//!
//! # Example
//!
//! ```ignore
//! let store = TemplateStore::with_builtin();
//!
//! let context = json!({"code": "492817", "expires_minutes": 15});
//! let document = store.render("activation-code", context.as_object().unwrap())?;
//! assert_eq!(document.mime_type, HTML_MIME_TYPE);
//! ```

mod builtin;
mod pdf;
mod store;
mod substitution;
mod types;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use builtin::builtin_templates;
pub use pdf::write_text_pdf;
pub use store::{create_template_store, TemplateStore};
pub use substitution::{lookup, placeholders, substitute, Escape};
pub use types::{
    RenderError, RenderedDocument, Template, TemplateFormat, TemplateLoadError, TemplateSummary,
};

pub const HTML_MIME_TYPE: &str = "text/html; charset=utf-8";
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Turns a template ID and a data context into a document.
///
/// Implementations must be deterministic: the same template and context
/// always produce byte-identical output, so a retried job renders the same
/// document it rendered the first time.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(
        &self,
        template_id: &str,
        context: &Map<String, Value>,
    ) -> Result<RenderedDocument, RenderError>;
}
