//! Review-count source abstraction layer.
//!
//! This module defines the [`ReviewSource`] trait, the [`FetchError`]
//! taxonomy, and the closed set of supported sites ([`SiteKind`]).  Each site
//! lives in its own sub-module with typed response structs and an async
//! `fetch` that does the HTTP work.
//!
//! ## For contributors: adding a new site
//!
//! 1. Create a new file in this directory (e.g. `jpdb.rs`) with a `fetch`
//!    function returning `Result<Count, FetchError>`.
//! 2. Add a variant to [`SiteKind`] and fill in its match arms (id, review
//!    URL, icon, credentials, delay, default base URL).
//! 3. Dispatch to your `fetch` in [`HttpSource::fetch_count`].
//!
//! The scheduler, registry, and bridge are all site-agnostic.

mod bunpro;
mod kitsun;
mod marumori;
mod registry;
mod wanikani;

pub use registry::{Registry, UnknownSite};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::settings::Credentials;

/// Number of reviews due.  Absence (`Option::None`) is tracked separately.
pub type Count = u32;

/// Why a remote fetch did not produce a count.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Credentials were rejected by the remote service.
    #[error("credentials rejected: {0}")]
    AuthInvalid(String),

    /// The remote service asked us to slow down.
    #[error("rate limited by remote service")]
    RateLimited,

    /// Connection, DNS, or timeout failure.
    #[error("network error: {0}")]
    Network(String),

    /// Any other failure: unexpected status, malformed body, missing field.
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Unexpected(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Trait that every review-count source must implement.
///
/// The scheduler awaits [`fetch_count()`](ReviewSource::fetch_count) from
/// spawned tasks, so implementations must be `Send + Sync`.  Multi-step
/// flows (log in, then query) stay inside `fetch_count`.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Registry key, e.g. `"wanikani"`.
    fn id(&self) -> &str;

    /// Page opened when the user presses the button.
    fn review_url(&self) -> &str;

    /// Icon file name, resolved against the plugin's icon directory.
    fn icon(&self) -> &str;

    /// Credential fields that must be present before any fetch is attempted.
    fn required_credentials(&self) -> &'static [&'static str];

    /// Fixed wait applied before every fetch.
    ///
    /// Sites that share one account-wide rate limit across several buttons
    /// use this to space their calls out.
    fn min_call_delay(&self) -> Duration {
        Duration::ZERO
    }

    async fn fetch_count(&self, credentials: &Credentials) -> Result<Count, FetchError>;
}

// ---------------------------------------------------------------------------
// Built-in sites
// ---------------------------------------------------------------------------

/// The closed set of sites this plugin knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKind {
    Bunpro,
    Kitsun,
    WaniKani,
    MaruMoriVocab,
    MaruMoriGrammar,
}

impl SiteKind {
    pub const ALL: [SiteKind; 5] = [
        SiteKind::Bunpro,
        SiteKind::Kitsun,
        SiteKind::WaniKani,
        SiteKind::MaruMoriVocab,
        SiteKind::MaruMoriGrammar,
    ];

    pub fn id(self) -> &'static str {
        match self {
            SiteKind::Bunpro => "bunpro",
            SiteKind::Kitsun => "kitsun",
            SiteKind::WaniKani => "wanikani",
            SiteKind::MaruMoriVocab => "marumori-vocab",
            SiteKind::MaruMoriGrammar => "marumori-grammar",
        }
    }

    pub fn review_url(self) -> &'static str {
        match self {
            SiteKind::Bunpro => "https://bunpro.jp/dashboard",
            SiteKind::Kitsun => "https://kitsun.io/decks",
            SiteKind::WaniKani => "https://www.wanikani.com/review",
            SiteKind::MaruMoriVocab | SiteKind::MaruMoriGrammar => {
                "https://marumori.io/study-lists"
            }
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            SiteKind::Bunpro => "bunpro.png",
            SiteKind::Kitsun => "kitsun.png",
            SiteKind::WaniKani => "wanikani.png",
            SiteKind::MaruMoriVocab | SiteKind::MaruMoriGrammar => "marumori.png",
        }
    }

    pub fn required_credentials(self) -> &'static [&'static str] {
        match self {
            SiteKind::Kitsun => &["username", "password"],
            _ => &["apiKey"],
        }
    }

    /// Both MaruMori buttons usually point at the same account, which has a
    /// single rate limit.
    pub fn min_call_delay(self) -> Duration {
        match self {
            SiteKind::MaruMoriVocab | SiteKind::MaruMoriGrammar => Duration::from_millis(1000),
            _ => Duration::ZERO,
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            SiteKind::Bunpro => "https://bunpro.jp",
            SiteKind::Kitsun => "https://api.kitsun.io",
            SiteKind::WaniKani => "https://api.wanikani.com",
            SiteKind::MaruMoriVocab | SiteKind::MaruMoriGrammar => "https://api.marumori.io",
        }
    }
}

/// A [`ReviewSource`] backed by one of the built-in [`SiteKind`]s over HTTP.
pub struct HttpSource {
    kind: SiteKind,
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    /// Create a source talking to the site's production API.
    pub fn new(kind: SiteKind, client: reqwest::Client) -> Self {
        Self::with_base_url(kind, client, kind.default_base_url())
    }

    /// Create a source talking to `base_url` instead (tests, proxies).
    pub fn with_base_url(kind: SiteKind, client: reqwest::Client, base_url: &str) -> Self {
        Self {
            kind,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ReviewSource for HttpSource {
    fn id(&self) -> &str {
        self.kind.id()
    }

    fn review_url(&self) -> &str {
        self.kind.review_url()
    }

    fn icon(&self) -> &str {
        self.kind.icon()
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        self.kind.required_credentials()
    }

    fn min_call_delay(&self) -> Duration {
        self.kind.min_call_delay()
    }

    async fn fetch_count(&self, credentials: &Credentials) -> Result<Count, FetchError> {
        match self.kind {
            SiteKind::Bunpro => bunpro::fetch(&self.client, &self.base_url, credentials).await,
            SiteKind::Kitsun => kitsun::fetch(&self.base_url, credentials).await,
            SiteKind::WaniKani => wanikani::fetch(&self.client, &self.base_url, credentials).await,
            SiteKind::MaruMoriVocab => {
                marumori::fetch(&self.client, &self.base_url, marumori::Deck::Vocab, credentials)
                    .await
            }
            SiteKind::MaruMoriGrammar => {
                marumori::fetch(&self.client, &self.base_url, marumori::Deck::Grammar, credentials)
                    .await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by the site modules
// ---------------------------------------------------------------------------

/// Headers that keep intermediaries from serving a cached count.
fn no_cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
}

/// Look up a credential the registry has already checked for.
fn credential<'a>(credentials: &'a Credentials, key: &str) -> Result<&'a str, FetchError> {
    credentials
        .get(key)
        .ok_or_else(|| FetchError::AuthInvalid(format!("missing {key}")))
}

/// Map the response status onto [`FetchError`] and decode the JSON body.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(FetchError::AuthInvalid(status.to_string()));
        }
        StatusCode::TOO_MANY_REQUESTS => return Err(FetchError::RateLimited),
        s if !s.is_success() => return Err(FetchError::Unexpected(format!("status {s}"))),
        _ => {}
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| FetchError::Unexpected(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_ids_are_unique() {
        let mut ids: Vec<_> = SiteKind::ALL.iter().map(|k| k.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), SiteKind::ALL.len());
    }

    #[test]
    fn only_marumori_family_is_delayed() {
        for kind in SiteKind::ALL {
            let delayed = kind.min_call_delay() > Duration::ZERO;
            let marumori = matches!(kind, SiteKind::MaruMoriVocab | SiteKind::MaruMoriGrammar);
            assert_eq!(delayed, marumori, "{}", kind.id());
        }
    }

    #[test]
    fn kitsun_needs_username_and_password() {
        assert_eq!(SiteKind::Kitsun.required_credentials(), &["username", "password"]);
        assert_eq!(SiteKind::WaniKani.required_credentials(), &["apiKey"]);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let src = HttpSource::with_base_url(
            SiteKind::Bunpro,
            reqwest::Client::new(),
            "http://localhost:1234/",
        );
        assert_eq!(src.base_url, "http://localhost:1234");
        assert_eq!(src.id(), "bunpro");
        assert_eq!(src.icon(), "bunpro.png");
    }
}
