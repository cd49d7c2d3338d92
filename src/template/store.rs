//! Read-only template catalog and document rendering

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::TemplateSettings;

use super::builtin::builtin_templates;
use super::pdf::write_text_pdf;
use super::substitution::{lookup, substitute, Escape};
use super::types::{
    RenderError, RenderedDocument, Template, TemplateFormat, TemplateLoadError, TemplateSummary,
};
use super::{DocumentRenderer, HTML_MIME_TYPE, PDF_MIME_TYPE};

/// Template catalog loaded once at startup.
///
/// The catalog is immutable after construction, so concurrent renders need no
/// locking.
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: HashMap<String, Template>,
}

impl TemplateStore {
    /// Build a catalog from template definitions; IDs must be unique
    pub fn from_templates(templates: Vec<Template>) -> Result<Self, TemplateLoadError> {
        let mut store = Self::default();
        for template in templates {
            template.validate()?;
            if store.templates.contains_key(&template.id) {
                return Err(TemplateLoadError::Duplicate(template.id));
            }
            store.templates.insert(template.id.clone(), template);
        }
        Ok(store)
    }

    /// Catalog containing only the built-in templates
    pub fn with_builtin() -> Self {
        let mut store = Self::default();
        for template in builtin_templates() {
            store.templates.insert(template.id.clone(), template);
        }
        store
    }

    /// Build the catalog described by the settings.
    ///
    /// Templates from the directory replace built-ins with the same ID.
    pub fn load(settings: &TemplateSettings) -> Result<Self, TemplateLoadError> {
        let mut store = if settings.include_builtin {
            Self::with_builtin()
        } else {
            Self::default()
        };

        if let Some(ref dir) = settings.dir {
            let loaded = load_dir(Path::new(dir))?;
            let mut seen = std::collections::HashSet::new();
            for template in loaded {
                if !seen.insert(template.id.clone()) {
                    return Err(TemplateLoadError::Duplicate(template.id));
                }
                if store.templates.contains_key(&template.id) {
                    tracing::info!(template_id = %template.id, "Overriding built-in template");
                }
                store.templates.insert(template.id.clone(), template);
            }
        }

        tracing::info!(count = store.templates.len(), "Template catalog loaded");
        Ok(store)
    }

    /// Get a template by ID
    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    /// Check if a template exists
    pub fn exists(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Get the number of templates
    pub fn count(&self) -> usize {
        self.templates.len()
    }

    /// List template summaries ordered by ID
    pub fn list(&self) -> Vec<TemplateSummary> {
        let mut summaries: Vec<_> = self.templates.values().map(Template::summary).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Render a template with the given context
    pub fn render(
        &self,
        id: &str,
        context: &Map<String, Value>,
    ) -> Result<RenderedDocument, RenderError> {
        let template = self
            .templates
            .get(id)
            .ok_or_else(|| RenderError::TemplateNotFound(id.to_string()))?;

        if let Some(missing) = template
            .required
            .iter()
            .find(|field| lookup(context, field).is_none())
        {
            return Err(RenderError::MissingField(missing.clone()));
        }

        let subject = substitute(&template.subject, context, Escape::None)?;
        let text_body = template
            .text
            .as_deref()
            .map(|text| substitute(text, context, Escape::None))
            .transpose()?;
        let address = |source: Option<&str>| {
            source
                .map(|value| substitute(value, context, Escape::None))
                .transpose()
                .map(|value| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
        };
        let reply_to = address(template.reply_to.as_deref())?;
        let cc = address(template.cc.as_deref())?;

        match template.format {
            TemplateFormat::Html => {
                let html = template.html.as_deref().ok_or_else(|| {
                    RenderError::Engine(format!("template {} has no html body", id))
                })?;
                let body = substitute(html, context, Escape::Html)?;

                Ok(RenderedDocument {
                    subject,
                    mime_type: HTML_MIME_TYPE.to_string(),
                    bytes: body.into_bytes(),
                    text_body,
                    file_name: None,
                    reply_to,
                    cc,
                })
            }
            TemplateFormat::Pdf => {
                let document = template.document.as_deref().ok_or_else(|| {
                    RenderError::Engine(format!("template {} has no document body", id))
                })?;
                let content = substitute(document, context, Escape::None)?;
                let file_name = match template.file_name.as_deref() {
                    Some(name) => substitute(name, context, Escape::None)?,
                    None => format!("{}.pdf", template.id),
                };

                Ok(RenderedDocument {
                    bytes: write_text_pdf(&subject, &content),
                    subject,
                    mime_type: PDF_MIME_TYPE.to_string(),
                    text_body,
                    file_name: Some(file_name),
                    reply_to,
                    cc,
                })
            }
        }
    }
}

#[async_trait]
impl DocumentRenderer for TemplateStore {
    async fn render(
        &self,
        template_id: &str,
        context: &Map<String, Value>,
    ) -> Result<RenderedDocument, RenderError> {
        TemplateStore::render(self, template_id, context)
    }
}

/// Read every `*.json` template in `dir`, in file name order
fn load_dir(dir: &Path) -> Result<Vec<Template>, TemplateLoadError> {
    let io_error = |source| TemplateLoadError::Io {
        path: dir.display().to_string(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = std::fs::read_to_string(&path).map_err(|source| TemplateLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let template: Template =
            serde_json::from_str(&raw).map_err(|source| TemplateLoadError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        template.validate()?;
        tracing::debug!(template_id = %template.id, path = %path.display(), "Loaded template");
        templates.push(template);
    }

    Ok(templates)
}

/// Create an Arc-wrapped template store from settings
pub fn create_template_store(
    settings: &TemplateSettings,
) -> Result<Arc<TemplateStore>, TemplateLoadError> {
    Ok(Arc::new(TemplateStore::load(settings)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn order_template() -> Template {
        Template {
            id: "order-shipped".to_string(),
            name: "Order Shipped".to_string(),
            subject: "Order {{order_id}} shipped".to_string(),
            format: TemplateFormat::Html,
            html: Some("<p>{{order_id}} via {{carrier}}</p>".to_string()),
            text: Some("{{order_id}} via {{carrier}}".to_string()),
            document: None,
            required: vec!["order_id".to_string()],
            file_name: None,
            reply_to: None,
            cc: None,
            description: None,
        }
    }

    #[test]
    fn test_render_html() {
        let store = TemplateStore::from_templates(vec![order_template()]).unwrap();
        let doc = store
            .render("order-shipped", &ctx(json!({"order_id": "ORD-1", "carrier": "A&B"})))
            .unwrap();

        assert_eq!(doc.subject, "Order ORD-1 shipped");
        assert_eq!(doc.mime_type, HTML_MIME_TYPE);
        assert_eq!(doc.body_str(), Some("<p>ORD-1 via A&amp;B</p>"));
        assert_eq!(doc.text_body.as_deref(), Some("ORD-1 via A&B"));
        assert!(doc.file_name.is_none());
    }

    #[test]
    fn test_render_unknown_template() {
        let store = TemplateStore::default();
        assert_eq!(
            store.render("nope", &Map::new()),
            Err(RenderError::TemplateNotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_render_missing_required_field() {
        let store = TemplateStore::from_templates(vec![order_template()]).unwrap();
        assert_eq!(
            store.render("order-shipped", &ctx(json!({"carrier": "A"}))),
            Err(RenderError::MissingField("order_id".to_string()))
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let store = TemplateStore::with_builtin();
        let context = ctx(json!({
            "invoice_number": "F-7",
            "customer": "ACME",
            "issued_on": "2024-05-01",
            "total": "99.00"
        }));

        let first = store.render("invoice", &context).unwrap();
        let second = store.render("invoice", &context).unwrap();
        assert_eq!(first, second);
        assert!(first.is_pdf());
        assert_eq!(first.file_name.as_deref(), Some("invoice-F-7.pdf"));
        assert_eq!(first.subject, "Invoice F-7");
    }

    #[test]
    fn test_render_contact_sets_reply_to() {
        let store = TemplateStore::with_builtin();
        let context = ctx(json!({
            "name": "Ana <script>",
            "email": "ana@example.com",
            "phone": "+56 9 1234 5678",
            "message": "Is the flat on 5th street still available?"
        }));

        let doc = store.render("contact", &context).unwrap();

        assert_eq!(doc.reply_to.as_deref(), Some("ana@example.com"));
        assert!(doc.cc.is_none());
        assert!(doc.subject.contains("Ana <script>"));
        assert!(doc.body_str().unwrap().contains("Ana &lt;script&gt;"));
    }

    #[test]
    fn test_render_contract_copies_agent() {
        let store = TemplateStore::with_builtin();
        let context = ctx(json!({
            "contract_number": "C-12",
            "client": "Ana Rojas",
            "agent": "Luis Soto",
            "agent_email": "luis@example.com",
            "property": "Av. Central 100, dept 12B",
            "start_date": "2026-11-01",
            "monthly_rent": "450000"
        }));

        let doc = store.render("contract", &context).unwrap();

        assert!(doc.is_pdf());
        assert_eq!(doc.file_name.as_deref(), Some("contract-C-12.pdf"));
        assert_eq!(doc.cc.as_deref(), Some("luis@example.com"));
        assert!(doc.bytes.starts_with(b"%PDF-1.4"));

        let missing = ctx(json!({"contract_number": "C-12", "client": "Ana Rojas"}));
        assert!(matches!(
            store.render("contract", &missing),
            Err(RenderError::MissingField(_))
        ));
    }

    #[test]
    fn test_render_debt_notice() {
        let store = TemplateStore::with_builtin();
        let context = ctx(json!({
            "debtor": "Ana Rojas",
            "property": "Av. Central 100, dept 12B",
            "amount_due": "900000",
            "months_overdue": 2,
            "pay_by": "2026-11-15"
        }));

        let doc = store.render("debt-notice", &context).unwrap();

        assert!(doc.is_pdf());
        assert_eq!(doc.file_name.as_deref(), Some("debt-notice.pdf"));
        assert_eq!(doc.subject, "Payment overdue for Av. Central 100, dept 12B");
        assert!(doc.reply_to.is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = TemplateStore::from_templates(vec![order_template(), order_template()]);
        assert!(matches!(result, Err(TemplateLoadError::Duplicate(_))));
    }

    #[test]
    fn test_list_sorted() {
        let store = TemplateStore::with_builtin();
        let ids: Vec<_> = store.list().into_iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![
                "activation-code",
                "contact",
                "contract",
                "debt-notice",
                "invoice",
                "password-reset",
                "welcome"
            ]
        );
    }

    #[test]
    fn test_load_dir_overrides_builtin() {
        let dir = std::env::temp_dir().join(format!("ara-templates-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("welcome.json"),
            json!({
                "id": "welcome",
                "name": "Custom welcome",
                "subject": "Hello {{name}}",
                "html": "<p>Hello {{name}}</p>"
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(dir.join("README.txt"), "ignored").unwrap();

        let store = TemplateStore::load(&TemplateSettings {
            dir: Some(dir.display().to_string()),
            include_builtin: true,
        })
        .unwrap();

        assert_eq!(store.count(), 7);
        assert_eq!(store.get("welcome").unwrap().name, "Custom welcome");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
