//! reviewdeck: a Stream Deck plugin showing how many study reviews are due.
//!
//! ## Architecture overview
//!
//! ```text
//!             events  ┌───────────┐  activate/teardown  ┌──────────────┐
//!  host ────────────► │ bridge.rs │ ──────────────────► │  scheduler/  │
//!  (WebSocket)        └───────────┘                     │ (timers,     │
//!    ▲                                                  │  freshness)  │
//!    │ commands (mpsc)                                  └──────┬───────┘
//!    └──────────────────────────────────────────────────────  │ fetch_count
//!                                                   render.rs  ▼
//!                                                         ┌──────────┐
//!                                                         │ source/  │
//!                                                         └──────────┘
//! ```
//!
//! * **`source/`**: the `ReviewSource` trait, the per-site HTTP adapters, and
//!   the registry that maps a site id to its adapter.
//! * **`scheduler/`**: per-instance timers, cache freshness, and sync.
//! * **`render`**: turns a count or placeholder into a key image.
//! * **`settings`**: the per-instance settings object the host persists.
//! * **`bridge`**: maps host lifecycle events to scheduler calls.
//! * **`host/`**: wire format and the WebSocket connection.
//! * **`main`**: wires everything together: parse args, set up logging, and
//!   run the connection until the host goes away.

mod bridge;
mod config;
mod host;
mod render;
mod scheduler;
mod settings;
mod source;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use bridge::Bridge;
use config::PluginArgs;
use render::SvgRenderer;
use scheduler::{Scheduler, SystemClock};
use source::Registry;

/// Upper bound on any single remote call, login included.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stdout belongs to the host; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = PluginArgs::from_env()?;
    tracing::info!(
        port = args.port,
        icon_dir = %args.icon_dir.display(),
        host = ?args.info.as_ref().and_then(|info| info.get("application")),
        "reviewdeck starting"
    );

    // -- configure sources ---------------------------------------------------
    let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let registry = Arc::new(Registry::builtin(client));

    // -- scheduler and bridge ------------------------------------------------
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(
        registry,
        Arc::new(SvgRenderer::new(args.icon_dir.clone())),
        Arc::new(SystemClock),
        commands_tx,
    );
    let bridge = Bridge::new(scheduler);

    // -- run until the host disconnects --------------------------------------
    host::connection::run(&args, bridge, commands_rx).await?;

    tracing::info!("reviewdeck shut down");
    Ok(())
}
