//! Cursor pagination: derive the next page's URL from a page's extraction
//! result.

use serde_json::Value;
use url::Url;

use crate::error::AppError;
use crate::jsonpath;
use crate::rules::{QueryValue, ScrollParams};

/// Build the URL of the page after `task_url`, or `None` when the scroll
/// path finds no cursor.
///
/// The cursor is the last element of whatever `scroll.scroll` selects in
/// `result`. Each query rewrite then either keeps the parameter (`$0`),
/// sets it to the cursor (`$1`), or sets it to its literal value. A
/// rewritten parameter replaces every existing occurrence of that name.
pub fn next_page_url(
    task_url: &str,
    result: &Value,
    scroll: &ScrollParams,
) -> Result<Option<Url>, AppError> {
    let Some(found) = jsonpath::get(result, &scroll.scroll) else {
        return Ok(None);
    };
    let Some(score) = jsonpath::as_list(found).pop() else {
        return Ok(None);
    };
    let cursor = jsonpath::to_text(&score);

    let mut url =
        Url::parse(task_url).map_err(|e| AppError::InvalidUrl(format!("{task_url}: {e}")))?;

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    for rewrite in &scroll.query {
        let value = match &rewrite.value {
            QueryValue::Keep => continue,
            QueryValue::Cursor => cursor.clone(),
            QueryValue::Literal(literal) => literal.clone(),
        };
        set_param(&mut pairs, &rewrite.name, value);
    }

    write_query(&mut url, &pairs);
    Ok(Some(url))
}

/// Whether `next` addresses the same page as the stored `task_url`.
///
/// Both sides go through the same parse and query encoding, so
/// `https://example.com?a=b%20c` and `https://example.com/?a=b+c` match.
pub fn same_page(next: &Url, task_url: &str) -> bool {
    let Ok(mut current) = Url::parse(task_url) else {
        return false;
    };
    let pairs: Vec<(String, String)> = current.query_pairs().into_owned().collect();
    write_query(&mut current, &pairs);
    current == *next
}

fn write_query(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
}

fn set_param(pairs: &mut Vec<(String, String)>, name: &str, value: String) {
    let Some(first) = pairs.iter().position(|(k, _)| k == name) else {
        pairs.push((name.to_string(), value));
        return;
    };

    pairs[first].1 = value;
    let mut index = 0;
    pairs.retain(|(k, _)| {
        let keep = k != name || index == first;
        index += 1;
        keep
    });
}
