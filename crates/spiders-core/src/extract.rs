//! Rule-driven extraction from a fetched page.
//!
//! Rules run in declaration order over one response body. The HTML document
//! is parsed the first time an HTML rule needs it and the raw body is parsed
//! as JSON the first time a JSON rule needs it, so the parse cost is paid at
//! most once per page regardless of the number of rules.
//!
//! A JSON rule whose field already holds a value (left by an earlier HTML
//! rule) reads that value instead of the body. This lets a source select a
//! fragment, such as an inline `<script>` payload, and then query into it.

use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::jsonpath;
use crate::rules::{ExtractRule, FieldRule, HtmlRule, JsonRule, RuleSet};

/// Field name to extracted value: a string, or a list of strings.
pub type ExtractResult = Map<String, Value>;

/// Run every rule against `body`.
///
/// A failing rule is logged and its field left out of the result. The only
/// fatal condition is [`AppError::EmptyContent`]: a JSON rule with neither a
/// chained value nor a body to read.
pub fn extract(rules: &RuleSet, body: &str) -> Result<ExtractResult, AppError> {
    let mut document: Option<Html> = None;
    let mut body_json: Option<Result<Value, String>> = None;
    let mut result = ExtractResult::new();

    for FieldRule { field, rule } in rules {
        let outcome = match rule {
            ExtractRule::Html(html) => {
                let document = document.get_or_insert_with(|| Html::parse_document(body));
                extract_html(document, html)
            }
            ExtractRule::Json(json) => match result.get(field) {
                Some(chained) => parse_json(&chained_text(chained))
                    .and_then(|input| extract_json(&input, json)),
                None => {
                    if body.is_empty() {
                        return Err(AppError::EmptyContent);
                    }
                    match body_json.get_or_insert_with(|| parse_json(body)) {
                        Ok(input) => extract_json(input, json),
                        Err(e) => Err(e.clone()),
                    }
                }
            },
        };

        match outcome {
            Ok(value) => {
                tracing::debug!(%field, "Extracted field");
                result.insert(field.clone(), value);
            }
            Err(message) => {
                let err = AppError::ExtractionError {
                    field: field.clone(),
                    message,
                };
                tracing::warn!(error = %err, "Skipping field");
                result.remove(field);
            }
        }
    }

    Ok(result)
}

fn extract_html(document: &Html, rule: &HtmlRule) -> Result<Value, String> {
    let selector = Selector::parse(&rule.selector)
        .map_err(|e| format!("invalid selector '{}': {e}", rule.selector))?;
    let attr = rule.attr.as_deref();

    if rule.list {
        let values = document
            .select(&selector)
            .map(|element| Value::String(node_value(element, attr)))
            .collect();
        return Ok(Value::Array(values));
    }

    let value = document
        .select(&selector)
        .next()
        .map(|element| node_value(element, attr))
        .unwrap_or_default();
    Ok(Value::String(value))
}

/// Attribute value if `attr` is given (`None` when absent), else the
/// element's trimmed text.
/// A missing attribute reads as empty so list fields stay aligned with the
/// matched nodes.
fn node_value(element: ElementRef<'_>, attr: Option<&str>) -> String {
    match attr {
        Some(name) => element.value().attr(name).unwrap_or_default().to_string(),
        None => element.text().collect::<String>().trim().to_string(),
    }
}

fn extract_json(input: &Value, rule: &JsonRule) -> Result<Value, String> {
    match &rule.list_path {
        Some(list_path) => {
            let items = jsonpath::get(input, list_path)
                .map(jsonpath::as_list)
                .unwrap_or_default();
            let values = items
                .iter()
                .filter_map(|item| jsonpath::get(item, &rule.path))
                .map(|value| Value::String(jsonpath::to_text(&value)))
                .collect();
            Ok(Value::Array(values))
        }
        None => jsonpath::get(input, &rule.path)
            .map(|value| Value::String(jsonpath::to_text(&value)))
            .ok_or_else(|| format!("path '{}' matched nothing", rule.path)),
    }
}

fn parse_json(text: &str) -> Result<Value, String> {
    serde_json::from_str(text).map_err(|e| format!("invalid JSON input: {e}"))
}

/// Input text for a chained JSON rule. Lists are handed over as a JSON array.
fn chained_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
