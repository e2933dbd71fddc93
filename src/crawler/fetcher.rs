//! HTTP page sessions and resource fetching
//!
//! This module provides the concrete collaborators the binary runs with:
//! - `HttpSession`: a cookie-carrying client that fetches server-rendered pages
//! - `HttpSessionFactory`: builds a fresh session (and cookie jar) per call
//!
//! A fresh session visits its home page once before the first page it opens,
//! paced by the shared limiter. Opening the home page itself needs no separate
//! visit.
//! - `HttpFetcher`: plain downloads for the resource cache
//!
//! Transport failures and status codes are classified into [`FetchError`]
//! variants here so workers never inspect HTTP details.

use crate::crawler::limiter::RateLimiter;
use crate::crawler::session::{FetchError, Page, Session, SessionFactory, SessionOptions};
use crate::storage::ResourceFetcher;
use reqwest::blocking::Client;
use reqwest::cookie::Jar;
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Timeout for resource downloads
const RESOURCE_TIMEOUT: Duration = Duration::from_secs(20);

/// Builds a blocking HTTP client
///
/// # Arguments
///
/// * `user_agent` - Full User-Agent header value
/// * `timeout` - Per-request timeout
/// * `jar` - Cookie jar to attach, if the client keeps session state
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &str,
    timeout: Duration,
    jar: Option<Arc<Jar>>,
) -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    match jar {
        Some(jar) => builder.cookie_provider(jar).build(),
        None => builder.build(),
    }
}

/// Maps a response status to a fetch failure, if it is one
///
/// | Status | Outcome |
/// |--------|---------|
/// | 2xx | success |
/// | 404, 410 | structural |
/// | 408, 429, 5xx | retryable |
/// | anything else | structural |
pub fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    let reason = format!("HTTP {}", status.as_u16());
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Some(FetchError::structural(reason)),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Some(FetchError::retryable(reason))
        }
        s if s.is_server_error() => Some(FetchError::retryable(reason)),
        _ => Some(FetchError::structural(reason)),
    }
}

/// Transport errors are always worth another try on a fresh session
fn classify_transport(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::retryable("request timeout")
    } else if error.is_connect() {
        FetchError::retryable(format!("connection failed: {}", error))
    } else {
        FetchError::retryable(error.to_string())
    }
}

/// A page session backed by its own HTTP client and cookie jar
pub struct HttpSession<'a> {
    client: Client,
    jar: Arc<Jar>,
    options: SessionOptions,

    /// Home page still to visit before the first other page
    pending_visit: Option<String>,

    pacer: Option<&'a RateLimiter>,
}

impl HttpSession<'_> {
    fn get(&self, target: &str) -> Result<Page, FetchError> {
        let mut request = self.client.get(target);
        if !self.options.locale.is_empty() {
            request = request.header(ACCEPT_LANGUAGE, self.options.locale.as_str());
        }

        let response = request.send().map_err(|e| classify_transport(&e))?;
        let status = response.status();
        if let Some(failure) = classify_status(status) {
            return Err(failure);
        }

        let url = response.url().to_string();
        let body = response.text().map_err(|e| classify_transport(&e))?;
        if body.trim().is_empty() {
            return Err(FetchError::retryable("empty document"));
        }

        Ok(Page {
            url,
            status: status.as_u16(),
            body,
        })
    }

    /// Visits the home page once, unless `target` is the home page itself
    ///
    /// Cookies are already in the jar, so a failed visit is only logged.
    fn visit_home(&mut self, target: &str) {
        let Some(home) = self.pending_visit.take() else {
            return;
        };
        if home == target {
            return;
        }

        if let Some(pacer) = self.pacer {
            pacer.wait();
        }
        match self.get(&home) {
            Ok(_) => tracing::trace!("Session state picked up from {}", home),
            Err(e) => tracing::debug!("Home page visit to {} failed: {}", home, e),
        }
    }
}

impl Session for HttpSession<'_> {
    fn open(&mut self, target: &str) -> Result<Page, FetchError> {
        self.visit_home(target);
        tracing::debug!("GET {}", target);
        self.get(target)
    }

    fn reset_state(&mut self, options: &SessionOptions) -> Result<(), FetchError> {
        self.options = options.clone();
        self.pending_visit = None;

        let Some(home) = options.home_url.as_deref() else {
            return Ok(());
        };

        let home_url = Url::parse(home)
            .map_err(|e| FetchError::structural(format!("invalid home URL {}: {}", home, e)))?;
        if !options.server.is_empty() {
            self.jar
                .add_cookie_str(&format!("server={}; Path=/", options.server), &home_url);
        }
        if !options.locale.is_empty() {
            self.jar
                .add_cookie_str(&format!("locale={}; Path=/", options.locale), &home_url);
        }

        self.pending_visit = Some(home.to_string());
        Ok(())
    }

    fn close(&mut self) {
        tracing::trace!("Closing HTTP session");
    }
}

/// Builds [`HttpSession`]s, each with a fresh cookie jar
#[derive(Debug, Clone)]
pub struct HttpSessionFactory<'a> {
    user_agent: String,
    timeout: Duration,
    pacer: Option<&'a RateLimiter>,
}

impl<'a> HttpSessionFactory<'a> {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
            pacer: None,
        }
    }

    /// Paces each session's home page visit with `limiter`
    pub fn with_pacer(mut self, limiter: &'a RateLimiter) -> Self {
        self.pacer = Some(limiter);
        self
    }
}

impl<'a> SessionFactory for HttpSessionFactory<'a> {
    type Session = HttpSession<'a>;

    fn create(&self) -> Result<HttpSession<'a>, FetchError> {
        let jar = Arc::new(Jar::default());
        let client = build_http_client(&self.user_agent, self.timeout, Some(Arc::clone(&jar)))
            .map_err(|e| FetchError::fatal(format!("cannot build HTTP client: {}", e)))?;

        Ok(HttpSession {
            client,
            jar,
            options: SessionOptions::default(),
            pending_visit: None,
            pacer: self.pacer,
        })
    }
}

/// Downloads resources for the cache
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, RESOURCE_TIMEOUT, None)?,
        })
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| classify_transport(&e))?;

        if let Some(failure) = classify_status(response.status()) {
            return Err(failure);
        }

        let bytes = response.bytes().map_err(|e| classify_transport(&e))?;
        Ok(bytes.to_vec())
    }
}
