//! Integration tests for the harvester
//!
//! These tests serve a listing page, detail pages and a thumbnail from a
//! wiremock server and run the real HTTP session, extractor and JSON store
//! end to end. The mock server is driven from its own tokio runtime; the
//! harvest itself runs on plain threads with blocking HTTP.

use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tora_harvest::config::TargetConfig;
use tora_harvest::crawler::{
    Coordinator, HttpFetcher, HttpSessionFactory, RateLimiter, RetryPolicy, RunSettings,
    SessionOptions,
};
use tora_harvest::extract::{NextDataExtractor, SkillNames};
use tora_harvest::output::RunStatistics;
use tora_harvest::storage::{read_dataset, site_path, JsonStore, ResourceCache};
use tora_harvest::HarvestError;
use wiremock::matchers::{header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_AGENT: &str = "TestHarvester/1.0 (+https://example.com/about; test@example.com)";

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

fn detail_page(head: &str, payload: Value) -> String {
    format!(
        r#"<!DOCTYPE html><html><head>{}</head><body><div id="__next"></div><script id="__NEXT_DATA__" type="application/json">{}</script></body></html>"#,
        head, payload
    )
}

/// Mounts the listing, two detail pages (one flaky), a gone page and a thumbnail
fn mount_site(rt: &Runtime, server: &MockServer) {
    let base = server.uri();

    let listing = r#"<!DOCTYPE html><html><body>
        <a href="/supports/1001-alpha">Alpha</a>
        <a href="/supports/1002-beta">Beta</a>
        <a href="/supports/1001-alpha">Alpha again</a>
        <a href="/supports/1003-gone">Gone</a>
        <a href="/about">About</a>
    </body></html>"#;

    let alpha = detail_page(
        &format!(
            r#"<meta property="og:image" content="{}/img/support_card_s_1001.png">"#,
            base
        ),
        json!({"props": {"pageProps": {
            "itemData": {"name_en": "Alpha Card", "rarity": 3, "hints": {"hint_skills": [200012]}},
            "eventData": {"en": {"wchoice": [{"n": "Training Together", "c": [
                {"n": "Let's go!", "r": [{"sp": 10}]},
                {"n": "Maybe later", "r": [{"mo": -1}]}
            ]}]}}
        }}}),
    );

    let beta = detail_page(
        "",
        json!({"props": {"pageProps": {
            "itemData": {"name": "Beta Card (SR)", "image": "/img/missing.png"},
            "eventData": {"en": {"nochoice": [{"n": "Café Break", "r": ["vi+15"]}]}}
        }}}),
    );

    rt.block_on(async {
        Mock::given(method("GET"))
            .and(path("/supports"))
            .respond_with(html(listing.to_string()))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/supports/1001-alpha"))
            .respond_with(html(alpha))
            .mount(server)
            .await;

        // First request for beta hits a transient server error
        Mock::given(method("GET"))
            .and(path("/supports/1002-beta"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/supports/1002-beta"))
            .respond_with(html(beta))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/supports/1003-gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/img/support_card_s_1001.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(b"\x89PNG\r\n\x1a\nalpha".to_vec()),
            )
            .expect(1)
            .mount(server)
            .await;
    });
}

fn target(base: &str, dir: &Path) -> TargetConfig {
    TargetConfig {
        name: "supports".to_string(),
        listing_url: format!("{}/supports", base),
        detail_pattern: r"/supports/\d+-".to_string(),
        events_path: dir.join("support_card.json"),
        entities_path: dir.join("support_hints.json"),
        entity_key: "SupportSlug".to_string(),
        entity_prefix: "Support".to_string(),
    }
}

/// Settings as the binary builds them: sessions visit the listing page first
fn settings(target: &TargetConfig, thumbs: &Path, workers: usize, retries: u32) -> RunSettings {
    RunSettings {
        workers,
        policy: RetryPolicy {
            retries,
            backoff_base: Duration::from_millis(10),
        },
        session: SessionOptions {
            server: "global".to_string(),
            locale: "en".to_string(),
            home_url: Some(target.listing_url.clone()),
        },
        resource_dir: thumbs.to_path_buf(),
    }
}

fn try_harvest(
    target: &TargetConfig,
    settings: RunSettings,
    skills: &SkillNames,
) -> Result<RunStatistics, HarvestError> {
    let limiter = RateLimiter::new(Duration::ZERO, Duration::ZERO);
    let store = JsonStore::new();
    let cache = ResourceCache::new(Box::new(HttpFetcher::new(USER_AGENT).unwrap()))
        .with_polite_delay(Duration::ZERO);
    let factory = HttpSessionFactory::new(USER_AGENT, Duration::from_secs(5)).with_pacer(&limiter);
    let extractor = NextDataExtractor::new(target, skills, "en").unwrap();

    let coordinator = Coordinator::new(settings, &factory, &extractor, &limiter, &store, &cache);
    coordinator.run(&target.listing_url)
}

fn harvest(target: &TargetConfig, thumbs: &Path, skills: &SkillNames) -> RunStatistics {
    try_harvest(target, settings(target, thumbs, 2, 3), skills).unwrap()
}

#[test]
fn test_full_harvest_against_mock_site() {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    mount_site(&rt, &server);

    let dir = TempDir::new().unwrap();
    let thumbs = dir.path().join("thumbs");
    let target = target(&server.uri(), dir.path());
    let skills = SkillNames::from_records(&[json!({"id": 200012, "name_en": "Corner Recovery"})]);

    let stats = harvest(&target, &thumbs, &skills);

    assert_eq!(stats.discovered, 3);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.recreations, 1);
    assert_eq!(stats.resources_cached, 1);

    // Events from both pages, non-ASCII kept verbatim
    let events = read_dataset(&target.events_path).unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.contains(&json!({
        "EventName": "Training Together",
        "EventOptions": {"Let's go!": "Speed +10"}
    })));
    assert!(events.contains(&json!({
        "EventName": "Café Break",
        "EventOptions": {"(Auto)": "Vitality +15"}
    })));
    let raw = std::fs::read_to_string(&target.events_path).unwrap();
    assert!(raw.contains("Café Break"));
    assert!(raw.ends_with("]\n"));

    // Entities keyed by slug, with the cached thumbnail or the remote fallback
    let entities = read_dataset(&target.entities_path).unwrap();
    assert_eq!(entities.len(), 2);

    let alpha = entities
        .iter()
        .find(|e| e["SupportSlug"] == "1001-alpha")
        .unwrap();
    assert_eq!(alpha["SupportId"], "1001");
    assert_eq!(alpha["SupportName"], "Alpha Card");
    assert_eq!(alpha["SupportRarity"], "SSR");
    assert_eq!(alpha["SupportHints"][0]["Name"], "Corner Recovery");
    let thumb = thumbs.join("1001-alpha.png");
    assert_eq!(alpha["SupportImage"], json!(site_path(&thumb)));
    assert!(alpha["SupportImage"].as_str().unwrap().starts_with('/'));
    assert_eq!(std::fs::read(&thumb).unwrap(), b"\x89PNG\r\n\x1a\nalpha");

    let beta = entities
        .iter()
        .find(|e| e["SupportSlug"] == "1002-beta")
        .unwrap();
    assert_eq!(beta["SupportRarity"], "SR");
    assert_eq!(
        beta["SupportImage"],
        json!(format!("{}/img/missing.png", server.uri()))
    );
    assert!(beta.get("Image").is_none());
}

#[test]
fn test_rerun_is_idempotent() {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    mount_site(&rt, &server);

    let dir = TempDir::new().unwrap();
    let thumbs = dir.path().join("thumbs");
    let target = target(&server.uri(), dir.path());
    let skills = SkillNames::default();

    harvest(&target, &thumbs, &skills);
    let events_before = read_dataset(&target.events_path).unwrap();

    let stats = harvest(&target, &thumbs, &skills);

    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.recreations, 0);
    assert_eq!(stats.records_inserted, 0);
    assert_eq!(stats.records_updated, 2);
    assert_eq!(read_dataset(&target.events_path).unwrap(), events_before);
    assert_eq!(read_dataset(&target.entities_path).unwrap().len(), 2);
    // The thumbnail mock expects exactly one download across both runs
}

#[test]
fn test_unreachable_listing_fails_discovery() {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    // One request per attempt; opening the listing is the session's first visit
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/supports"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server),
    );

    let dir = TempDir::new().unwrap();
    let target = target(&server.uri(), dir.path());
    let settings = settings(&target, &dir.path().join("thumbs"), 1, 1);

    let result = try_harvest(&target, settings, &SkillNames::default());

    assert!(
        matches!(result, Err(HarvestError::Discovery { .. })),
        "unexpected result: {:?}",
        result.map(|stats| stats.discovered)
    );
    assert!(!target.events_path.exists());
}

#[test]
fn test_sessions_visit_listing_once_with_cookies() {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    let listing = r#"<html><body><a href="/supports/1001-alpha">Alpha</a></body></html>"#;
    let alpha = detail_page(
        "",
        json!({"props": {"pageProps": {"itemData": {"name_en": "Alpha Card", "rarity": 2}}}}),
    );

    rt.block_on(async {
        // Discovery opens the listing directly; the worker session visits it once
        Mock::given(method("GET"))
            .and(path("/supports"))
            .respond_with(html(listing.to_string()))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/supports/1001-alpha"))
            .and(header_regex("cookie", "server=global"))
            .and(header_regex("cookie", "locale=en"))
            .respond_with(html(alpha))
            .expect(1)
            .mount(&server)
            .await;
    });

    let dir = TempDir::new().unwrap();
    let target = target(&server.uri(), dir.path());
    let settings = settings(&target, &dir.path().join("thumbs"), 1, 3);

    let stats = try_harvest(&target, settings, &SkillNames::default()).unwrap();

    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.attempts, 1);
    let entities = read_dataset(&target.entities_path).unwrap();
    assert_eq!(entities[0]["SupportName"], "Alpha Card");
    assert_eq!(entities[0]["SupportRarity"], "SR");
    assert_eq!(entities[0]["SupportImage"], "");
}
