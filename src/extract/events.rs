//! Event parsing from `pageProps.eventData`
//!
//! Event data is grouped by language, then by category. Each event has a name
//! (`n`), optional choices (`c`) and rewards (`r`); long key names are accepted
//! as well.

use crate::storage::Record;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Event categories, in output order
const CATEGORIES: [&str; 8] = [
    "wchoice", "nochoice", "version", "outings", "secret", "random", "arrows", "chain",
];

/// Text used when a reward list yields nothing readable
const NO_DETAILS: &str = "See details";

/// Option label for events without choices
const AUTO_OPTION: &str = "(Auto)";

fn stat_name(key: &str) -> &str {
    match key {
        "sp" => "Speed",
        "st" => "Stamina",
        "po" => "Power",
        "gu" => "Guts",
        "in" => "Intelligence",
        "wi" => "Wisdom",
        "sk" | "pt" => "Skill Points",
        "bo" => "Bond",
        "vi" => "Vitality",
        "mo" => "Motivation",
        other => other,
    }
}

fn compact_reward() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([a-z]{2})([+-]?\d+)").expect("static pattern"))
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            _ => true,
        })
}

fn signed(value: &serde_json::Number) -> String {
    let positive = value.as_f64().map(|v| v > 0.0).unwrap_or(false);
    if positive {
        format!("+{}", value)
    } else {
        value.to_string()
    }
}

/// Formats a reward list as `"Speed +10, Stamina +5"`
///
/// Object entries map stat keys to numbers (zero is dropped) or free text;
/// string entries use the compact `sp+10` form. Returns an empty string when
/// nothing is readable.
pub fn format_rewards(rewards: &[Value]) -> String {
    let mut parts = Vec::new();

    for reward in rewards {
        match reward {
            Value::Object(entries) => {
                for (key, value) in entries {
                    match value {
                        Value::Number(n) if n.as_f64() != Some(0.0) => {
                            parts.push(format!("{} {}", stat_name(key), signed(n)));
                        }
                        Value::String(text) => {
                            parts.push(format!("{}: {}", stat_name(key), text));
                        }
                        _ => {}
                    }
                }
            }
            Value::String(text) => {
                if let Some(caps) = compact_reward().captures(text) {
                    let Ok(amount) = caps[2].parse::<i64>() else {
                        continue;
                    };
                    let sign = if amount > 0 { "+" } else { "" };
                    parts.push(format!("{} {}{}", stat_name(&caps[1]), sign, amount));
                }
            }
            _ => {}
        }
    }

    parts.join(", ")
}

fn rewards_text(obj: &Map<String, Value>) -> String {
    let rewards = first_present(obj, &["r", "rewards"])
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let text = format_rewards(rewards);
    if text.is_empty() {
        NO_DETAILS.to_string()
    } else {
        text
    }
}

fn event_record(name: &str, option: &str, rewards: String) -> Record {
    let mut options = Map::new();
    options.insert(option.to_string(), Value::String(rewards));

    let mut record = Record::new();
    record.insert("EventName".to_string(), Value::String(name.to_string()));
    record.insert("EventOptions".to_string(), Value::Object(options));
    record
}

/// Parses event records from `eventData`
///
/// Events with choices yield one record per choice; events without choices
/// yield a single `(Auto)` record.
///
/// # Arguments
///
/// * `event_data` - The `eventData` value of the page props
/// * `lang` - Preferred language; falls back to `en`, then `ja`
pub fn parse_events(event_data: &Value, lang: &str) -> Vec<Record> {
    let Some(root) = event_data.as_object() else {
        return Vec::new();
    };

    let localized = [lang, "en", "ja"]
        .iter()
        .filter_map(|l| root.get(*l))
        .find_map(Value::as_object)
        .unwrap_or(root);

    let mut records = Vec::new();
    for category in CATEGORIES {
        let Some(events) = localized.get(category).and_then(Value::as_array) else {
            continue;
        };

        for event in events.iter().filter_map(Value::as_object) {
            let Some(name) = first_present(event, &["n", "name"]).and_then(Value::as_str) else {
                continue;
            };

            let choices = first_present(event, &["c", "choices"])
                .and_then(Value::as_array)
                .filter(|c| !c.is_empty());

            match choices {
                None => records.push(event_record(name, AUTO_OPTION, rewards_text(event))),
                Some(choices) => {
                    for choice in choices.iter().filter_map(Value::as_object) {
                        let label = first_present(choice, &["n", "name"])
                            .and_then(Value::as_str)
                            .unwrap_or("Option");
                        records.push(event_record(name, label, rewards_text(choice)));
                    }
                }
            }
        }
    }

    records
}
