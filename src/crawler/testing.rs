//! Scripted collaborators for crawler tests
//!
//! Sessions fail on demand: targets containing `down` always fail with a
//! retryable error, targets containing `missing` fail structurally, and the
//! first `fail_first` opens across all sessions fail with a retryable error.
//! After the first `pass_reset` state resets, the next `fail_reset` ones fail
//! the same way.

use crate::crawler::session::{FetchError, Page, Session, SessionFactory, SessionOptions};
use crate::extract::{AppendRecord, Extraction, Extractor, ResourceRequest, UpsertRecord};
use crate::storage::{DatasetStore, Record, ResourceFetcher, StoreError, StoreResult, UpsertOutcome};
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub(crate) struct SessionScript {
    pub refuse_create: bool,
    pub fail_first: u32,
    pub pass_reset: u32,
    pub fail_reset: u32,
}

#[derive(Debug, Default)]
struct Counters {
    create_calls: AtomicU32,
    creates: AtomicU32,
    resets: AtomicU32,
    closes: AtomicU32,
    opens: AtomicU32,
}

pub(crate) struct ScriptedFactory {
    script: SessionScript,
    counters: Arc<Counters>,
}

impl ScriptedFactory {
    pub fn new(script: SessionScript) -> Self {
        Self {
            script,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Every call to `create`, refused or not
    pub fn create_calls(&self) -> u32 {
        self.counters.create_calls.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> u32 {
        self.counters.creates.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> u32 {
        self.counters.resets.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> u32 {
        self.counters.opens.load(Ordering::SeqCst)
    }
}

impl SessionFactory for ScriptedFactory {
    type Session = ScriptedSession;

    fn create(&self) -> Result<ScriptedSession, FetchError> {
        self.counters.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.refuse_create {
            return Err(FetchError::fatal("scripted: no session available"));
        }
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            counters: Arc::clone(&self.counters),
            fail_first: self.script.fail_first,
            pass_reset: self.script.pass_reset,
            fail_reset: self.script.fail_reset,
        })
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedSession {
    counters: Arc<Counters>,
    fail_first: u32,
    pass_reset: u32,
    fail_reset: u32,
}

impl Session for ScriptedSession {
    fn open(&mut self, target: &str) -> Result<Page, FetchError> {
        let opened = self.counters.opens.fetch_add(1, Ordering::SeqCst) + 1;

        if target.contains("down") {
            return Err(FetchError::retryable("scripted: target down"));
        }
        if target.contains("missing") {
            return Err(FetchError::structural("scripted: content missing"));
        }
        if opened <= self.fail_first {
            return Err(FetchError::retryable("scripted: flaky open"));
        }

        Ok(Page {
            url: target.to_string(),
            status: 200,
            body: target.to_string(),
        })
    }

    fn reset_state(&mut self, _options: &SessionOptions) -> Result<(), FetchError> {
        let reset = self.counters.resets.fetch_add(1, Ordering::SeqCst) + 1;
        if reset > self.pass_reset && reset - self.pass_reset <= self.fail_reset {
            return Err(FetchError::retryable("scripted: warm-up failed"));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Extractor that echoes the page URL into one event and one entity
pub(crate) struct EchoExtractor {
    pub references: Vec<String>,
    pub events_path: PathBuf,
    pub entities_path: PathBuf,
    pub with_resource: bool,
}

impl EchoExtractor {
    pub fn new(dir: &Path, references: &[&str]) -> Self {
        Self {
            references: references.iter().map(|r| r.to_string()).collect(),
            events_path: dir.join("events.json"),
            entities_path: dir.join("entities.json"),
            with_resource: false,
        }
    }
}

fn last_segment(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

impl Extractor for EchoExtractor {
    fn discover(&self, _page: &Page) -> Result<Vec<String>, FetchError> {
        Ok(self.references.clone())
    }

    fn extract(&self, page: &Page) -> Result<Extraction, FetchError> {
        let slug = last_segment(&page.url);

        let mut event = Record::new();
        event.insert("EventName".to_string(), Value::String(page.url.clone()));

        let mut patch = Record::new();
        patch.insert("Name".to_string(), Value::String(slug.clone()));

        let resources = if self.with_resource {
            vec![ResourceRequest {
                remote: format!("https://cdn.test/thumbs/{}.png", slug),
                identity_hint: Some(slug.clone()),
                field: "Image".to_string(),
            }]
        } else {
            Vec::new()
        };

        Ok(Extraction {
            label: slug.clone(),
            appends: vec![AppendRecord {
                path: self.events_path.clone(),
                record: event,
                dedup_keys: vec!["EventName".to_string()],
            }],
            upsert: Some(UpsertRecord {
                path: self.entities_path.clone(),
                match_field: "Slug".to_string(),
                match_value: slug,
                patch,
            }),
            resources,
        })
    }
}

/// Store whose writes always fail
pub(crate) struct FailingStore;

impl FailingStore {
    fn failure(path: &Path) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        }
    }
}

impl DatasetStore for FailingStore {
    fn append(&self, path: &Path, _record: Record, _dedup_keys: &[String]) -> StoreResult<bool> {
        Err(Self::failure(path))
    }

    fn upsert(
        &self,
        path: &Path,
        _match_field: &str,
        _match_value: &str,
        _patch: Record,
    ) -> StoreResult<UpsertOutcome> {
        Err(Self::failure(path))
    }

    fn load(&self, _path: &Path) -> StoreResult<Vec<Value>> {
        Ok(Vec::new())
    }
}

/// Resource fetcher serving fixed bytes and counting calls
pub(crate) struct StaticFetcher {
    pub calls: Arc<AtomicU32>,
}

impl StaticFetcher {
    pub fn new() -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl ResourceFetcher for StaticFetcher {
    fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(b"\x89PNG scripted".to_vec())
    }
}
