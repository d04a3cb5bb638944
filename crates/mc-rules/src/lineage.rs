//! Lineage transformation templates.
//!
//! A transformation aspect (a `transformation_type`, an ordered
//! `input_columns` list, optionally a `description`) expands into one
//! derives-from edge per input column. The template keyed by the
//! transformation type (or the default template when the type is unknown)
//! supplies the edge properties; `{placeholders}` in template strings are
//! filled literally from the payload.

use mc_core::{Payload, PropertyMap};
use mc_registry::{LineageConfig, LineageTemplate};
use serde_json::Value;

/// Select the template for a payload's `transformation_type`, falling back
/// to the default template.
pub fn select_template<'a>(config: &'a LineageConfig, payload: &Payload) -> &'a LineageTemplate {
    transformation_type(payload)
        .and_then(|ty| config.transformation_templates.patterns.get(ty))
        .unwrap_or(&config.transformation_templates.default)
}

/// Render a template into edge properties for one triggering payload.
///
/// A `description` present in the payload wins over the template's
/// `description_template`.
pub fn render(template: &LineageTemplate, payload: &Payload) -> PropertyMap {
    let mut properties = PropertyMap::new();
    for (key, value_template) in &template.relationship_properties {
        properties.insert(
            key.clone(),
            Value::String(fill_placeholders(value_template, payload)),
        );
    }

    let description = payload
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            template
                .description_template
                .as_ref()
                .map(|t| fill_placeholders(t, payload))
        });
    if let Some(description) = description {
        properties.insert("description".to_string(), Value::String(description));
    }
    properties
}

fn transformation_type(payload: &Payload) -> Option<&str> {
    payload.get("transformation_type").and_then(Value::as_str)
}

/// Replace `{field}` placeholders with payload values, rendered literally:
/// strings as-is, arrays joined with ", ", scalars via their JSON form.
/// Placeholders naming absent fields are kept verbatim.
fn fill_placeholders(template: &str, payload: &Payload) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let field = &after[..close];
                match payload.get(field) {
                    Some(value) => out.push_str(&render_value(value)),
                    None => {
                        out.push('{');
                        out.push_str(field);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
