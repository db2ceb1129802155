//! Entity descriptors a host would create for the device.

use tabled::Tabled;

use intercom_core::{DeviceSession, EntityDescriptor, EntitySource, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Unique ID")]
    unique_id: String,
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
}

impl From<&EntityDescriptor> for EntityRow {
    fn from(e: &EntityDescriptor) -> Self {
        Self {
            unique_id: e.unique_id.clone(),
            platform: e.platform.to_string(),
            name: e.name.clone(),
            source: source_label(e.source),
            enabled: if e.enabled_by_default { "yes" } else { "no" }.into(),
        }
    }
}

fn source_label(source: EntitySource) -> String {
    match source {
        EntitySource::Relay(id) => format!("relay {id}"),
        EntitySource::Pulse(kind) => format!("pulse {kind}"),
        EntitySource::Motion => "motion".into(),
        EntitySource::Noise => "noise".into(),
        EntitySource::Door => "door".into(),
        EntitySource::CallActivity => "call".into(),
        EntitySource::LastEvent => "last event".into(),
        EntitySource::DoorRelease => "door release".into(),
        EntitySource::Snapshot => "camera".into(),
    }
}

pub async fn handle(config: SessionConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let entities =
        DeviceSession::oneshot(config, |session| async move { Ok(session.entities()) }).await?;

    let out = output::render_list(&global.output, &entities, |e| EntityRow::from(e), |e| {
        e.unique_id.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
