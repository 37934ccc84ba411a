//! Launch configuration.
//!
//! The Stream Deck application starts the plugin as
//!
//! ```text
//! reviewdeck -port 28196 -pluginUUID <uuid> -registerEvent registerPlugin -info '{…}'
//! ```
//!
//! Flags use a single dash and always take a value.  Unknown flags are
//! ignored so newer hosts can add arguments without breaking us.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Environment variable overriding where site icons are read from.
pub const ICON_DIR_ENV: &str = "REVIEWDECK_ICON_DIR";

/// Icons ship in this directory next to the manifest; the host launches the
/// plugin with the plugin folder as working directory.
const DEFAULT_ICON_DIR: &str = "icons";

#[derive(Debug, Clone, PartialEq)]
pub struct PluginArgs {
    pub port: u16,
    pub plugin_uuid: String,
    pub register_event: String,
    /// Host/device description; logged but otherwise unused.
    pub info: Option<serde_json::Value>,
    pub icon_dir: PathBuf,
}

impl PluginArgs {
    /// Parse from the process arguments and environment.
    pub fn from_env() -> Result<Self> {
        Self::parse(
            std::env::args().skip(1),
            std::env::var(ICON_DIR_ENV).ok(),
        )
    }

    pub fn parse<I>(args: I, icon_dir: Option<String>) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut port = None;
        let mut plugin_uuid = None;
        let mut register_event = None;
        let mut info = None;

        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            let Some(value) = args.next() else {
                bail!("flag {flag} is missing its value");
            };
            match flag.as_str() {
                "-port" => {
                    port = Some(
                        value
                            .parse::<u16>()
                            .with_context(|| format!("invalid -port {value:?}"))?,
                    )
                }
                "-pluginUUID" => plugin_uuid = Some(value),
                "-registerEvent" => register_event = Some(value),
                "-info" => match serde_json::from_str(&value) {
                    Ok(parsed) => info = Some(parsed),
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed -info"),
                },
                other => tracing::debug!(flag = other, "ignoring unknown launch flag"),
            }
        }

        Ok(Self {
            port: port.context("missing -port")?,
            plugin_uuid: plugin_uuid.context("missing -pluginUUID")?,
            register_event: register_event.context("missing -registerEvent")?,
            info,
            icon_dir: icon_dir
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ICON_DIR)),
        })
    }

    pub fn websocket_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }
}
