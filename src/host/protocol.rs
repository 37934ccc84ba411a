//! Stream Deck JSON messages.
//!
//! Inbound messages carry an `event` tag, the instance `context`, and a
//! `payload` holding the instance settings.  Only the handful of events the
//! plugin reacts to are decoded; everything else is reported as `None`.

use serde::{Deserialize, Serialize};

use crate::settings::{InstanceId, InstanceSettings};

/// Key image should be shown on both the hardware and the software display.
const TARGET_HARDWARE_AND_SOFTWARE: u8 = 0;

/// Something the host told us about an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    ControlBecameVisible {
        instance: InstanceId,
        settings: InstanceSettings,
    },
    SettingsChanged {
        instance: InstanceId,
        settings: InstanceSettings,
    },
    ControlActivated {
        instance: InstanceId,
        settings: InstanceSettings,
    },
    ControlRemoved {
        instance: InstanceId,
    },
}

/// Something we ask the host to do.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    OpenUrl {
        url: String,
    },
    SetImage {
        instance: InstanceId,
        image: String,
    },
    PersistSettings {
        instance: InstanceId,
        settings: InstanceSettings,
    },
}

impl HostCommand {
    pub fn to_json(&self) -> serde_json::Result<String> {
        let message = match self {
            HostCommand::OpenUrl { url } => Outbound::OpenUrl {
                payload: UrlPayload { url },
            },
            HostCommand::SetImage { instance, image } => Outbound::SetImage {
                context: instance,
                payload: ImagePayload {
                    image,
                    target: TARGET_HARDWARE_AND_SOFTWARE,
                },
            },
            HostCommand::PersistSettings { instance, settings } => Outbound::SetSettings {
                context: instance,
                payload: settings,
            },
        };
        serde_json::to_string(&message)
    }
}

/// First message on a fresh connection.
pub fn registration(register_event: &str, plugin_uuid: &str) -> serde_json::Result<String> {
    #[derive(Serialize)]
    struct Registration<'a> {
        event: &'a str,
        uuid: &'a str,
    }

    serde_json::to_string(&Registration {
        event: register_event,
        uuid: plugin_uuid,
    })
}

/// Decode one inbound message.  `Ok(None)` means "valid, but not for us".
pub fn parse_event(text: &str) -> serde_json::Result<Option<HostEvent>> {
    let event = match serde_json::from_str::<Inbound>(text)? {
        Inbound::WillAppear { context, payload } => HostEvent::ControlBecameVisible {
            instance: context,
            settings: payload.settings,
        },
        Inbound::DidReceiveSettings { context, payload } => HostEvent::SettingsChanged {
            instance: context,
            settings: payload.settings,
        },
        Inbound::KeyUp { context, payload } => HostEvent::ControlActivated {
            instance: context,
            settings: payload.settings,
        },
        Inbound::WillDisappear { context } => HostEvent::ControlRemoved { instance: context },
        Inbound::Other => return Ok(None),
    };
    Ok(Some(event))
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum Inbound {
    WillAppear {
        context: InstanceId,
        #[serde(default)]
        payload: ActionPayload,
    },
    DidReceiveSettings {
        context: InstanceId,
        #[serde(default)]
        payload: ActionPayload,
    },
    KeyUp {
        context: InstanceId,
        #[serde(default)]
        payload: ActionPayload,
    },
    WillDisappear {
        context: InstanceId,
    },
    #[serde(other)]
    Other,
}

#[derive(Default, Deserialize)]
struct ActionPayload {
    #[serde(default)]
    settings: InstanceSettings,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum Outbound<'a> {
    OpenUrl {
        payload: UrlPayload<'a>,
    },
    SetImage {
        context: &'a InstanceId,
        payload: ImagePayload<'a>,
    },
    SetSettings {
        context: &'a InstanceId,
        payload: &'a InstanceSettings,
    },
}

#[derive(Serialize)]
struct UrlPayload<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct ImagePayload<'a> {
    image: &'a str,
    target: u8,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
