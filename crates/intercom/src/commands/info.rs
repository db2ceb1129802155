//! Device identity and capabilities.

use serde::Serialize;

use intercom_core::{
    CapabilitySet, DEFAULT_EVENT_FILTER, DeviceInfo, DeviceSession, RelayCapability,
    SessionConfig,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct InfoView {
    #[serde(flatten)]
    device: DeviceInfo,
    unique_id: Option<String>,
    url: String,
    relays: Vec<RelaySummary>,
    /// Event types the device lists in its log capabilities.
    supported_events: Vec<String>,
    /// Event types a watching session subscribes to.
    subscribed_events: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RelaySummary {
    id: u32,
    #[serde(flatten)]
    capability: RelayCapability,
}

impl InfoView {
    fn new(info: &DeviceInfo, caps: &CapabilitySet, config: &SessionConfig) -> Self {
        let subscribed_events = match &config.events.filter {
            Some(wanted) => caps.event_filter(wanted.as_slice()),
            None => caps.event_filter(&DEFAULT_EVENT_FILTER),
        };
        Self {
            device: info.clone(),
            unique_id: info.unique_id().map(str::to_owned),
            url: config.url.to_string(),
            relays: caps
                .relays
                .iter()
                .map(|(id, capability)| RelaySummary {
                    id: *id,
                    capability: *capability,
                })
                .collect(),
            supported_events: caps.events.iter().cloned().collect(),
            subscribed_events,
        }
    }
}

fn detail(v: &InfoView) -> String {
    let field = |value: Option<&String>| value.map_or("-", String::as_str).to_owned();
    let relays = v
        .relays
        .iter()
        .map(|r| {
            let mode = if r.capability.monostable {
                "monostable"
            } else {
                "bistable"
            };
            let state = if r.capability.enabled { "" } else { ", disabled" };
            format!("{} ({mode}{state})", r.id)
        })
        .collect::<Vec<_>>();

    [
        format!("Name:       {}", field(v.device.name.as_ref())),
        format!("Model:      {}", field(v.device.model.as_ref())),
        format!("Serial:     {}", field(v.device.serial.as_ref())),
        format!("MAC:        {}", field(v.device.mac.as_ref())),
        format!("Firmware:   {}", field(v.device.firmware.as_ref())),
        format!("Hardware:   {}", field(v.device.hardware.as_ref())),
        format!("URL:        {}", v.url),
        format!("Relays:     {}", list_or_dash(&relays)),
        format!("Events:     {}", list_or_dash(&v.supported_events)),
        format!("Subscribed: {}", list_or_dash(&v.subscribed_events)),
    ]
    .join("\n")
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".into()
    } else {
        items.join(", ")
    }
}

pub async fn handle(config: SessionConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let wanted = config.clone();
    let view = DeviceSession::oneshot(config, |session| async move {
        Ok(InfoView::new(
            session.device_info(),
            session.capabilities(),
            &wanted,
        ))
    })
    .await?;

    let out = output::render_single(&global.output, &view, detail, |v| {
        v.unique_id.clone().unwrap_or_default()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
