//! Extraction rules and pagination parameters, decoded from a source's
//! stored JSON once when the source is loaded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Select nodes with a CSS selector and take their text (or an attribute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlRule {
    pub selector: String,
    /// One value per matched node instead of the first match only.
    #[serde(default)]
    pub list: bool,
    /// Attribute to read instead of the element's text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
}

impl HtmlRule {
    pub fn first(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            list: false,
            attr: None,
        }
    }

    pub fn all(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            list: true,
            attr: None,
        }
    }

    pub fn with_attr(mut self, attr: impl Into<String>) -> Self {
        self.attr = Some(attr.into());
        self
    }
}

/// Query a JSON document with a path expression (see [`crate::jsonpath`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRule {
    #[serde(default)]
    pub path: String,
    /// When set, iterate the array at this path and evaluate `path`
    /// relative to each element (an empty `path` takes the element itself).
    #[serde(
        default,
        rename = "list",
        alias = "listPath",
        skip_serializing_if = "Option::is_none"
    )]
    pub list_path: Option<String>,
}

impl JsonRule {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            list_path: None,
        }
    }

    pub fn list(list_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            list_path: Some(list_path.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractRule {
    Html(HtmlRule),
    Json(JsonRule),
}

/// A rule bound to the output field it populates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub field: String,
    pub rule: ExtractRule,
}

impl FieldRule {
    pub fn html(field: impl Into<String>, rule: HtmlRule) -> Self {
        Self {
            field: field.into(),
            rule: ExtractRule::Html(rule),
        }
    }

    pub fn json(field: impl Into<String>, rule: JsonRule) -> Self {
        Self {
            field: field.into(),
            rule: ExtractRule::Json(rule),
        }
    }
}

/// Stored shape of one field's descriptor: `{"html": {...}, "json": {...}}`.
#[derive(Debug, Deserialize)]
struct RuleDescriptor {
    #[serde(default)]
    html: Option<HtmlRule>,
    #[serde(default)]
    json: Option<JsonRule>,
}

/// Ordered extraction rules. Order is significant: a JSON rule may consume
/// the value an earlier HTML rule left under the same field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet(Vec<FieldRule>);

impl RuleSet {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self(rules)
    }

    /// Decode the stored `extract_rules` object.
    ///
    /// A descriptor carrying both `html` and `json` expands to the HTML rule
    /// followed by the JSON rule for the same field. Descriptors that carry
    /// neither, or fail to decode, produce no rule.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            if !value.is_null() {
                tracing::warn!("extract_rules is not an object, ignoring");
            }
            return Self::default();
        };

        let mut rules = Vec::with_capacity(object.len());
        for (field, raw) in object {
            let descriptor: RuleDescriptor = match serde_json::from_value(raw.clone()) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!(%field, error = %e, "Skipping undecodable rule");
                    continue;
                }
            };

            if let Some(html) = descriptor.html {
                rules.push(FieldRule::html(field.clone(), html));
            }
            if let Some(mut json) = descriptor.json {
                if json.list_path.as_deref() == Some("") {
                    json.list_path = None;
                }
                rules.push(FieldRule::json(field.clone(), json));
            }
        }
        Self(rules)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldRule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a FieldRule;
    type IntoIter = std::slice::Iter<'a, FieldRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// How one query parameter of the next page URL is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// `$0`: leave the parameter as it is.
    Keep,
    /// `$1`: substitute the cursor score.
    Cursor,
    Literal(String),
}

impl From<&str> for QueryValue {
    fn from(raw: &str) -> Self {
        match raw {
            "$0" => QueryValue::Keep,
            "$1" => QueryValue::Cursor,
            other => QueryValue::Literal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRewrite {
    pub name: String,
    pub value: QueryValue,
}

impl QueryRewrite {
    pub fn new(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            value: QueryValue::from(value),
        }
    }
}

/// Cursor pagination settings taken from a source's `params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollParams {
    /// Path into the serialized result map whose last element is the cursor.
    pub scroll: String,
    pub query: Vec<QueryRewrite>,
}

impl ScrollParams {
    /// Returns `None` unless `params.scroll` is a string.
    pub fn from_params(params: &Value) -> Option<Self> {
        let scroll = params.get("scroll")?.as_str()?.to_string();

        let query = params
            .get("query")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let name = item.get("name")?.as_str()?;
                        let value = item.get("value")?.as_str()?;
                        Some(QueryRewrite::new(name, value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self { scroll, query })
    }
}
