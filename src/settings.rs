//! Per-instance settings as persisted by the host.
//!
//! The host stores one flat JSON object per button.  The settings form writes
//! `website` plus whatever credential fields the chosen site needs
//! (`apiKey`, or `username` + `password`); the scheduler adds `lastCount` and
//! `lastDateTime` after every successful sync so that a re-render (page
//! switch, profile change) can show the cached value without a network call.
//!
//! ```json
//! { "website": "wanikani", "apiKey": "…", "lastCount": 42,
//!   "lastDateTime": "2024-03-01T10:31:00.000Z" }
//! ```
//!
//! Credential fields are kept as an opaque map so that unknown keys written by
//! the settings form round-trip through `setSettings` untouched.

use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::source::Count;

/// The host's opaque "context" string identifying one button instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

#[cfg(test)]
impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The site the settings form pre-selects when nothing has been chosen yet.
pub const DEFAULT_WEBSITE: &str = "bunpro";

fn default_website() -> String {
    DEFAULT_WEBSITE.to_string()
}

/// Everything the host remembers about one instance of the reviews action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSettings {
    /// Site identifier, used as the registry lookup key.
    #[serde(default = "default_website")]
    pub website: String,

    /// Count from the most recent successful sync.
    ///
    /// `None` means "never synced", which is not the same as `Some(0)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_count: Option<Count>,

    /// ISO-8601 timestamp of the most recent successful sync.
    ///
    /// Kept as the raw string: an unparseable value is treated as stale
    /// rather than rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_date_time: Option<String>,

    /// Adapter-specific credential fields.
    #[serde(flatten)]
    pub credentials: Credentials,
}

impl InstanceSettings {
    pub fn new(website: impl Into<String>) -> Self {
        Self {
            website: website.into(),
            last_count: None,
            last_date_time: None,
            credentials: Credentials::default(),
        }
    }

    /// Builder-style helper for attaching a credential field.
    #[cfg(test)]
    pub fn with_credential(mut self, key: &str, value: impl Into<String>) -> Self {
        self.credentials.insert(key, value);
        self
    }

    /// Parsed sync timestamp, or `None` if missing or malformed.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_date_time
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Whether both settings would fetch from the same account: same site,
    /// same credential fields.  Sync bookkeeping is ignored.
    pub fn same_account(&self, other: &InstanceSettings) -> bool {
        self.website == other.website && self.credentials == other.credentials
    }

    /// Whether the cached count may be shown instead of fetching.
    ///
    /// Requires both a count and a parseable timestamp younger than `window`.
    /// A timestamp in the future counts as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        if self.last_count.is_none() {
            return false;
        }
        match self.last_synced_at() {
            Some(synced) => now.signed_duration_since(synced) < window,
            None => false,
        }
    }

    /// Copy of these settings with a fresh sync result recorded.
    pub fn with_sync_result(&self, count: Count, at: DateTime<Utc>) -> Self {
        let mut updated = self.clone();
        updated.last_count = Some(count);
        updated.last_date_time = Some(at.to_rfc3339_opts(SecondsFormat::Millis, true));
        updated
    }
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self::new(DEFAULT_WEBSITE)
    }
}

/// Opaque bag of credential fields, flattened into the settings object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(Map<String, Value>);

impl Credentials {
    /// Non-empty string value for `key`.
    ///
    /// The settings form writes `""` when a field is cleared, so empty
    /// strings are reported as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn has_all(&self, keys: &[&str]) -> bool {
        keys.iter().all(|k| self.get(k).is_some())
    }

    #[cfg(test)]
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), Value::String(value.into()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn parses_flat_host_payload() {
        let json = r#"{
            "website": "wanikani",
            "apiKey": "abc",
            "lastCount": 12,
            "lastDateTime": "2024-03-01T10:00:00.000Z"
        }"#;

        let settings: InstanceSettings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.website, "wanikani");
        assert_eq!(settings.credentials.get("apiKey"), Some("abc"));
        assert_eq!(settings.last_count, Some(12));
        assert_eq!(settings.last_synced_at(), Some(at(10, 0, 0)));
    }

    #[test]
    fn missing_website_defaults_to_bunpro() {
        let settings: InstanceSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.website, "bunpro");
        assert!(settings.last_count.is_none());
    }

    #[test]
    fn unknown_fields_round_trip() {
        let json = r#"{"website":"kitsun","username":"u","password":"p","theme":"dark"}"#;
        let settings: InstanceSettings = serde_json::from_str(json).unwrap();

        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["theme"], "dark");
        assert_eq!(value["username"], "u");
        assert!(value.get("lastCount").is_none());
    }

    #[test]
    fn empty_credential_counts_as_absent() {
        let settings = InstanceSettings::new("bunpro").with_credential("apiKey", "  ");
        assert_eq!(settings.credentials.get("apiKey"), None);
        assert!(!settings.credentials.has_all(&["apiKey"]));
    }

    #[test]
    fn same_account_ignores_sync_bookkeeping() {
        let base = InstanceSettings::new("wanikani").with_credential("apiKey", "k");
        let synced = base.with_sync_result(9, at(10, 0, 0));

        assert!(base.same_account(&synced));
        assert!(!base.same_account(&InstanceSettings::new("bunpro").with_credential("apiKey", "k")));
        assert!(!base.same_account(&InstanceSettings::new("wanikani").with_credential("apiKey", "k2")));
    }

    #[test]
    fn zero_count_is_distinct_from_absent() {
        let synced = InstanceSettings::new("bunpro").with_sync_result(0, at(10, 0, 0));
        assert_eq!(synced.last_count, Some(0));
        assert!(synced.is_fresh(at(10, 5, 0), Duration::minutes(10)));
    }

    #[test]
    fn freshness_window_boundaries() {
        let synced = InstanceSettings::new("bunpro").with_sync_result(3, at(10, 0, 0));
        let window = Duration::minutes(10);

        assert!(synced.is_fresh(at(10, 9, 59), window));
        assert!(!synced.is_fresh(at(10, 10, 0), window), "exactly ten minutes is stale");
        assert!(synced.is_fresh(at(9, 0, 0), window), "future timestamp is fresh");
    }

    #[test]
    fn malformed_timestamp_is_stale() {
        let mut settings = InstanceSettings::new("bunpro");
        settings.last_count = Some(4);
        settings.last_date_time = Some("yesterday-ish".into());

        assert!(settings.last_synced_at().is_none());
        assert!(!settings.is_fresh(at(10, 0, 0), Duration::minutes(10)));
    }

    #[test]
    fn timestamp_without_count_is_stale() {
        let mut settings = InstanceSettings::new("bunpro");
        settings.last_date_time = Some("2024-03-01T10:00:00.000Z".into());
        assert!(!settings.is_fresh(at(10, 1, 0), Duration::minutes(10)));
    }

    #[test]
    fn sync_result_uses_iso_millis() {
        let synced = InstanceSettings::new("bunpro").with_sync_result(7, at(10, 31, 0));
        assert_eq!(synced.last_date_time.as_deref(), Some("2024-03-01T10:31:00.000Z"));
    }
}
