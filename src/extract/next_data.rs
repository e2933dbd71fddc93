//! Next.js page payload access

use scraper::{Html, Selector};
use serde_json::Value;

/// Parses the `__NEXT_DATA__` script of a document
///
/// # Returns
///
/// * `Some(Value)` - The decoded payload
/// * `None` - The script is absent, empty or not valid JSON
pub fn next_data(document: &Html) -> Option<Value> {
    let selector = Selector::parse("script#__NEXT_DATA__").ok()?;
    let raw: String = document.select(&selector).next()?.text().collect();
    if raw.trim().is_empty() {
        return None;
    }
    serde_json::from_str(&raw).ok()
}

/// Returns `props.pageProps` of the payload, if it is an object
pub fn page_props(document: &Html) -> Option<Value> {
    let mut data = next_data(document)?;
    let props = data.get_mut("props")?.get_mut("pageProps")?.take();
    props.is_object().then_some(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(script: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><head></head><body><div id="__next"></div>{}</body></html>"#,
            script
        ))
    }

    #[test]
    fn test_page_props() {
        let doc = page(
            r#"<script id="__NEXT_DATA__" type="application/json">{"props":{"pageProps":{"itemData":{"id":30028}}},"page":"/x"}</script>"#,
        );

        assert_eq!(page_props(&doc), Some(json!({"itemData": {"id": 30028}})));
    }

    #[test]
    fn test_missing_script() {
        let doc = page(r#"<script>var x = 1;</script>"#);
        assert!(next_data(&doc).is_none());
        assert!(page_props(&doc).is_none());
    }

    #[test]
    fn test_invalid_payload() {
        let doc = page(r#"<script id="__NEXT_DATA__">{not json</script>"#);
        assert!(next_data(&doc).is_none());
    }

    #[test]
    fn test_page_props_not_object() {
        let doc = page(r#"<script id="__NEXT_DATA__">{"props":{"pageProps":[]}}</script>"#);
        assert!(next_data(&doc).is_some());
        assert!(page_props(&doc).is_none());
    }
}
