//! Button image rendering.
//!
//! Turns a [`DisplayValue`] into an image the host can show on a key: the
//! site icon with a blurred dark box in the middle and the label on top.  The
//! image is an SVG data URI so no font rasterisation happens on our side.
//!
//! ## For contributors
//!
//! The scheduler only talks to the [`Render`] trait and never looks at the
//! result beyond handing it to the host.  Swap [`SvgRenderer`] out if the
//! host ever stops accepting SVG.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::source::Count;

/// Stream Deck keys are 72×72 at 1× scale.
const KEY_SIZE: f64 = 72.0;

/// What a button should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayValue {
    /// A confirmed count (possibly zero).
    Count(Count),
    /// Configured, waiting for the first sync.
    Pending,
    /// Required credentials are missing.
    MissingCredentials,
    /// The settings name a site we don't support.
    UnknownSite,
}

impl DisplayValue {
    pub fn label(self) -> String {
        match self {
            DisplayValue::Count(n) => n.to_string(),
            DisplayValue::Pending => "…".to_string(),
            DisplayValue::MissingCredentials => "key?".to_string(),
            DisplayValue::UnknownSite => "site?".to_string(),
        }
    }
}

/// Render sink: label (plus optional site icon) in, image payload out.
pub trait Render: Send + Sync {
    fn render(&self, icon: Option<&str>, label: &str) -> Result<String>;
}

/// Icon bytes by file name; `None` records an icon that does not exist.
type IconCache = HashMap<String, Option<Arc<[u8]>>>;

/// Renders SVG data URIs, embedding icons read from `icon_dir`.
///
/// Each icon is read from disk once, on first use.
pub struct SvgRenderer {
    icon_dir: PathBuf,
    icons: Mutex<IconCache>,
}

impl SvgRenderer {
    pub fn new(icon_dir: impl Into<PathBuf>) -> Self {
        Self {
            icon_dir: icon_dir.into(),
            icons: Mutex::new(HashMap::new()),
        }
    }

    /// PNG bytes for `icon`, or `None` if the file does not exist.
    ///
    /// Read errors other than "not found" are returned and not cached.
    fn load_icon(&self, icon: &str) -> Result<Option<Arc<[u8]>>> {
        let mut icons = self.icons.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = icons.get(icon) {
            return Ok(cached.clone());
        }

        let path = self.icon_dir.join(icon);
        let loaded: Option<Arc<[u8]>> = match std::fs::read(&path) {
            Ok(bytes) => Some(Arc::from(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "icon not found, rendering text only");
                None
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading icon {}", path.display()));
            }
        };
        icons.insert(icon.to_string(), loaded.clone());
        Ok(loaded)
    }
}

impl Render for SvgRenderer {
    fn render(&self, icon: Option<&str>, label: &str) -> Result<String> {
        let png = match icon {
            Some(name) => self.load_icon(name)?,
            None => None,
        };
        let svg = compose_svg(png.as_deref(), label);
        Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg)))
    }
}

/// Build the SVG document for one key.
///
/// The label box is `12 * len + 4` px wide, centred horizontally, 26 px tall
/// starting at y = 24; text baseline sits at y = 45.
fn compose_svg(icon_png: Option<&[u8]>, label: &str) -> String {
    let len = label.chars().count() as f64;
    let width = 12.0 * len + 4.0;
    let x = KEY_SIZE / 2.0 - width / 2.0;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{KEY_SIZE}" height="{KEY_SIZE}" viewBox="0 0 {KEY_SIZE} {KEY_SIZE}">"#
    );
    svg.push_str(r#"<defs><filter id="blur"><feGaussianBlur stdDeviation="4"/></filter></defs>"#);
    if let Some(png) = icon_png {
        svg.push_str(&format!(
            r#"<image href="data:image/png;base64,{}" x="0" y="0" width="{KEY_SIZE}" height="{KEY_SIZE}"/>"#,
            STANDARD.encode(png)
        ));
    }
    svg.push_str(&format!(
        r##"<rect x="{x}" y="24" width="{width}" height="26" fill="#000" fill-opacity="0.67" filter="url(#blur)"/>"##
    ));
    svg.push_str(&format!(
        r##"<text x="{}" y="45" font-family="Trebuchet MS" font-size="22" fill="#fff">{}</text>"##,
        x + 2.0,
        escape_xml(label)
    ));
    svg.push_str("</svg>");
    svg
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(uri: &str) -> String {
        let b64 = uri.strip_prefix("data:image/svg+xml;base64,").unwrap();
        String::from_utf8(STANDARD.decode(b64).unwrap()).unwrap()
    }

    #[test]
    fn labels_for_each_value() {
        assert_eq!(DisplayValue::Count(0).label(), "0");
        assert_eq!(DisplayValue::Count(128).label(), "128");
        assert_eq!(DisplayValue::Pending.label(), "…");
        assert_eq!(DisplayValue::MissingCredentials.label(), "key?");
        assert_eq!(DisplayValue::UnknownSite.label(), "site?");
    }

    #[test]
    fn box_width_tracks_label_length() {
        let svg = compose_svg(None, "42");
        // 12 * 2 + 4 = 28 wide, centred on 36.
        assert!(svg.contains(r#"<rect x="22" y="24" width="28""#), "{svg}");
        assert!(svg.contains(r#"<text x="24" y="45""#), "{svg}");
        assert!(svg.contains(">42</text>"));
    }

    #[test]
    fn icon_is_embedded_when_present() {
        let svg = compose_svg(Some(b"\x89PNG"), "1");
        assert!(svg.contains("data:image/png;base64,iVBORw=="), "{svg}");
    }

    #[test]
    fn label_is_escaped() {
        let svg = compose_svg(None, "<&>");
        assert!(svg.contains(">&lt;&amp;&gt;</text>"));
    }

    #[test]
    fn missing_icon_degrades_to_text_only() {
        let renderer = SvgRenderer::new("/definitely/not/a/real/dir");
        let uri = renderer.render(Some("bunpro.png"), "7").unwrap();
        let svg = decode(&uri);
        assert!(!svg.contains("<image"));
        assert!(svg.contains(">7</text>"));
    }

    #[test]
    fn reads_icon_from_directory() {
        let dir = std::env::temp_dir().join(format!("reviewdeck-icons-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("wanikani.png"), b"\x89PNG").unwrap();

        let uri = SvgRenderer::new(&dir).render(Some("wanikani.png"), "3").unwrap();
        assert!(decode(&uri).contains("<image"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn icon_is_read_once_and_cached() {
        let dir = std::env::temp_dir().join(format!("reviewdeck-cache-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("kitsun.png"), b"\x89PNG").unwrap();

        let renderer = SvgRenderer::new(&dir);
        renderer.render(Some("kitsun.png"), "1").unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        let uri = renderer.render(Some("kitsun.png"), "2").unwrap();
        let svg = decode(&uri);
        assert!(svg.contains("data:image/png;base64,iVBORw=="), "{svg}");
        assert!(svg.contains(">2</text>"));
    }
}
