//! Detail reference discovery on listing pages

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

/// Collects absolute links matching `pattern`, in document order without repeats
///
/// Fragments are dropped before comparison, so `a#top` and `a` are one reference.
pub fn discover_references(document: &Html, base: &Url, pattern: &Regex) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        })
        .filter(|url| pattern.is_match(url))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Builds references from the listing payload when the markup carries no links
///
/// Items come from `items` or `supports`, each `{id, slug}`, and become
/// `{listing}/{id}-{slug}` (or `{listing}/{id}` without a slug).
pub fn references_from_payload(props: &Value, listing_url: &str) -> Vec<String> {
    let items = ["items", "supports"]
        .iter()
        .filter_map(|k| props.get(*k))
        .filter_map(Value::as_array)
        .find(|items| !items.is_empty());

    let Some(items) = items else {
        return Vec::new();
    };

    let listing = listing_url.trim_end_matches('/');
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(|item| {
            let id = ["id", "support_id"]
                .iter()
                .filter_map(|k| item.get(*k))
                .find_map(|v| match v {
                    Value::Number(n) => Some(n.to_string()),
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    _ => None,
                })?;
            let slug = item.get("slug").and_then(Value::as_str).unwrap_or("");
            Some(if slug.is_empty() {
                format!("{}/{}", listing, id)
            } else {
                format!("{}/{}-{}", listing, id, slug)
            })
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
