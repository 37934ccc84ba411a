//! WebSocket session with the Stream Deck application.
//!
//! One connection per plugin process.  Outbound commands from every instance
//! funnel through a single channel so writes never interleave; inbound
//! events are decoded and handed to the [`Bridge`] on the same task.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::{parse_event, registration, HostCommand};
use crate::bridge::Bridge;
use crate::config::PluginArgs;

/// Connect, register, and pump messages until the host closes the socket.
pub async fn run(
    args: &PluginArgs,
    mut bridge: Bridge,
    mut commands: mpsc::UnboundedReceiver<HostCommand>,
) -> Result<()> {
    let url = args.websocket_url();
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .with_context(|| format!("connecting to host at {url}"))?;
    let (mut write, mut read) = stream.split();

    let hello = registration(&args.register_event, &args.plugin_uuid)?;
    write.send(Message::Text(hello)).await?;
    tracing::info!(%url, "registered with host");

    loop {
        tokio::select! {
            Some(command) = commands.recv() => {
                let text = command.to_json()?;
                write
                    .send(Message::Text(text))
                    .await
                    .context("sending command to host")?;
            }
            incoming = read.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("host closed the connection");
                        return Ok(());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e).context("reading from host"),
                };

                match parse_event(&text) {
                    Ok(Some(event)) => bridge.handle(event),
                    Ok(None) => tracing::trace!("ignoring host event"),
                    Err(e) => tracing::warn!(error = %e, "undecodable host message"),
                }
            }
        }
    }
}
