//! Variable substitution engine for templates.
//!
//! Placeholders are `{{field}}` or dotted paths such as `{{customer.name}}`;
//! whitespace inside the braces is ignored. Every placeholder must resolve
//! against the context, otherwise rendering fails with `MissingField`.

use serde_json::{Map, Value};

use super::types::RenderError;

/// How substituted values are written into the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    None,
    Html,
}

/// Render `template` against `context`
pub fn substitute(
    template: &str,
    context: &Map<String, Value>,
    escape: Escape,
) -> Result<String, RenderError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| RenderError::Engine("unclosed placeholder".to_string()))?;
        let path = after[..end].trim();
        if path.is_empty() {
            return Err(RenderError::Engine("empty placeholder".to_string()));
        }

        let value = lookup(context, path).ok_or_else(|| RenderError::MissingField(path.to_string()))?;
        let rendered = value_to_string(value);
        match escape {
            Escape::None => output.push_str(&rendered),
            Escape::Html => output.push_str(&escape_html(&rendered)),
        }

        rest = &after[end + 2..];
    }

    output.push_str(rest);
    Ok(output)
}

/// List the placeholder paths referenced by `template`
pub fn placeholders(template: &str) -> Result<Vec<String>, RenderError> {
    let mut found = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| RenderError::Engine("unclosed placeholder".to_string()))?;
        let path = after[..end].trim();
        if path.is_empty() {
            return Err(RenderError::Engine("empty placeholder".to_string()));
        }
        found.push(path.to_string());
        rest = &after[end + 2..];
    }

    Ok(found)
}

/// Resolve a dotted path; numeric segments index into arrays
pub fn lookup<'a>(context: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        // For arrays and objects, use JSON representation
        _ => value.to_string(),
    }
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
