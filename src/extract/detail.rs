//! Extractor for Next.js detail pages
//!
//! A detail page yields its events (appended with dedup on name and options) and
//! one entity record (upserted by the target's entity key) carrying the name,
//! id, rarity, thumbnail, hint skills and detail URL. Entity field names carry
//! the target's prefix, so the supports target writes `SupportName` and so on.

use crate::config::TargetConfig;
use crate::crawler::{FetchError, Page};
use crate::extract::discovery::{discover_references, references_from_payload};
use crate::extract::events::parse_events;
use crate::extract::next_data::page_props;
use crate::extract::skills::SkillNames;
use crate::extract::{AppendRecord, Extraction, Extractor, ResourceRequest, UpsertRecord};
use crate::storage::Record;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

fn rarity_suffix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\((SSR|SR|R)\)").expect("valid regex"))
}

fn long_digits() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{4,}").expect("valid regex"))
}

/// Extractor for one configured target
pub struct NextDataExtractor<'a> {
    target: &'a TargetConfig,
    skills: &'a SkillNames,
    detail_pattern: Regex,
    lang: String,
}

impl<'a> NextDataExtractor<'a> {
    /// Creates an extractor
    ///
    /// # Arguments
    ///
    /// * `target` - Target whose datasets and detail pattern to use
    /// * `skills` - Skill name lookup for hint ids
    /// * `lang` - Preferred event language
    ///
    /// # Returns
    ///
    /// * `Ok(NextDataExtractor)` - Ready extractor
    /// * `Err(regex::Error)` - The detail pattern does not compile
    pub fn new(
        target: &'a TargetConfig,
        skills: &'a SkillNames,
        lang: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            target,
            skills,
            detail_pattern: Regex::new(&target.detail_pattern)?,
            lang: lang.to_string(),
        })
    }

    fn hints(&self, item: &Map<String, Value>) -> Vec<Value> {
        let Some(hints) = item.get("hints").and_then(Value::as_object) else {
            return Vec::new();
        };

        let mut collected: Vec<(String, String)> = Vec::new();

        let skill_ids = hints.get("hint_skills").and_then(Value::as_array);
        for id in skill_ids.into_iter().flatten() {
            let id = match id {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            let name = self.skills.name(&id).unwrap_or_default().to_string();
            collected.push((id, name));
        }

        let others = hints.get("hint_others").and_then(Value::as_array);
        for other in others.into_iter().flatten() {
            let name = match other {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) => ["name", "n", "label"]
                    .iter()
                    .filter_map(|k| o.get(*k))
                    .filter_map(Value::as_str)
                    .find(|s| !s.is_empty()),
                _ => None,
            };
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                collected.push((String::new(), name.to_string()));
            }
        }

        dedup_hints(collected)
            .into_iter()
            .map(|(id, name)| json!({"SkillId": id, "Name": name, "HintLevel": null}))
            .collect()
    }
}

/// Drops repeated hint names (case-insensitive), keeping the entry with a skill id
///
/// Unnamed skill hints are kept as-is since their ids still identify them.
fn dedup_hints(hints: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut kept: Vec<(String, String)> = Vec::new();
    let mut seen = HashSet::new();

    for (id, name) in hints {
        if name.is_empty() {
            kept.push((id, name));
            continue;
        }

        let key = name.to_lowercase();
        if seen.insert(key.clone()) {
            kept.push((id, name));
        } else if !id.is_empty() {
            if let Some(slot) = kept
                .iter_mut()
                .find(|(i, n)| i.is_empty() && n.to_lowercase() == key)
            {
                *slot = (id, name);
            }
        }
    }

    kept
}

fn text_field<'v>(item: Option<&'v Map<String, Value>>, keys: &[&str]) -> Option<&'v str> {
    let item = item?;
    keys.iter()
        .filter_map(|k| item.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn heading_text(document: &Html) -> Option<String> {
    let selector = Selector::parse("h1").ok()?;
    let text: String = document.select(&selector).next()?.text().collect();
    let text = text.replace('\u{a0}', " ").trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn og_image(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="og:image"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

/// Last non-empty path segment of the URL
fn slug_of(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// Maps numeric rarity 1-3, else the `(SSR)` style name suffix
fn rarity(item: Option<&Map<String, Value>>, name: &str) -> String {
    let numeric = item
        .and_then(|i| i.get("rarity"))
        .and_then(Value::as_u64)
        .and_then(|r| match r {
            1 => Some("R"),
            2 => Some("SR"),
            3 => Some("SSR"),
            _ => None,
        });

    if let Some(r) = numeric {
        return r.to_string();
    }

    rarity_suffix()
        .captures(name)
        .map(|c| c[1].to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

fn entity_id(slug: Option<&str>, item: Option<&Map<String, Value>>) -> Option<String> {
    if let Some(m) = slug.and_then(|s| long_digits().find(s)) {
        return Some(m.as_str().to_string());
    }

    let item = item?;
    ["id", "support_id"]
        .iter()
        .filter_map(|k| item.get(*k))
        .find_map(|v| match v {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
}

impl Extractor for NextDataExtractor<'_> {
    fn discover(&self, page: &Page) -> Result<Vec<String>, FetchError> {
        let base = Url::parse(&page.url)
            .map_err(|e| FetchError::structural(format!("bad listing URL {}: {}", page.url, e)))?;
        let document = Html::parse_document(&page.body);

        let references = discover_references(&document, &base, &self.detail_pattern);
        if !references.is_empty() {
            return Ok(references);
        }

        tracing::debug!("No detail links in markup of {}, trying page payload", page.url);
        Ok(page_props(&document)
            .map(|props| references_from_payload(&props, &self.target.listing_url))
            .unwrap_or_default())
    }

    fn extract(&self, page: &Page) -> Result<Extraction, FetchError> {
        let document = Html::parse_document(&page.body);
        let props = page_props(&document)
            .ok_or_else(|| FetchError::structural(format!("no page payload in {}", page.url)))?;

        let item = ["itemData", "item"]
            .iter()
            .filter_map(|k| props.get(*k))
            .find_map(Value::as_object);

        let name = text_field(item, &["name_en", "name"])
            .map(str::to_string)
            .or_else(|| heading_text(&document))
            .ok_or_else(|| FetchError::structural(format!("no identifying name in {}", page.url)))?;

        let url = Url::parse(&page.url).ok();
        let slug = url.as_ref().and_then(slug_of);
        let id = entity_id(slug.as_deref(), item);
        let key = slug.clone().unwrap_or_else(|| name.clone());

        let appends = props
            .get("eventData")
            .map(|events| parse_events(events, &self.lang))
            .unwrap_or_default()
            .into_iter()
            .map(|record| AppendRecord {
                path: self.target.events_path.clone(),
                record,
                dedup_keys: vec!["EventName".to_string(), "EventOptions".to_string()],
            })
            .collect();

        let field = |name: &str| self.target.entity_field(name);
        let image_field = field("Image");

        // The image stays empty unless a thumbnail resolves
        let mut patch = Record::new();
        patch.insert(self.target.entity_key.clone(), Value::String(key.clone()));
        patch.insert(field("Id"), id.map(Value::String).unwrap_or(Value::Null));
        patch.insert(field("Name"), Value::String(name.clone()));
        patch.insert(field("Rarity"), Value::String(rarity(item, &name)));
        patch.insert(image_field.clone(), Value::String(String::new()));
        patch.insert(
            field("Hints"),
            Value::Array(item.map(|i| self.hints(i)).unwrap_or_default()),
        );
        patch.insert(field("Url"), Value::String(page.url.clone()));

        let image = og_image(&document)
            .or_else(|| text_field(item, &["image", "img"]).map(str::to_string))
            .and_then(|src| match &url {
                Some(base) => base.join(&src).ok().map(|u| u.to_string()),
                None => Some(src),
            });
        let resources = image
            .into_iter()
            .map(|remote| ResourceRequest {
                remote,
                identity_hint: slug.clone(),
                field: image_field.clone(),
            })
            .collect();

        Ok(Extraction {
            label: name,
            appends,
            upsert: Some(UpsertRecord {
                path: self.target.entities_path.clone(),
                match_field: self.target.entity_key.clone(),
                match_value: key,
                patch,
            }),
            resources,
        })
    }
}
