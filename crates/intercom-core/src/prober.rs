// ── Capability prober ──
//
// One-shot setup calls. The three reads are independent, so they run
// concurrently; any failure aborts setup.

use tracing::{debug, info};

use intercom_api::DeviceClient;

use crate::error::CoreError;
use crate::model::{CapabilitySet, DeviceInfo};

/// Read device identity and capabilities.
///
/// Errors are reported as [`CoreError::Setup`], except rejected credentials
/// which stay [`CoreError::AuthenticationFailed`]. Nothing is retried.
pub async fn probe(client: &DeviceClient) -> Result<(DeviceInfo, CapabilitySet), CoreError> {
    debug!(url = %client.base_url(), "probing device");

    let (info, switches, events) = tokio::try_join!(
        async {
            client
                .get_system_info()
                .await
                .map_err(|e| CoreError::setup("system info", e))
        },
        async {
            client
                .get_switch_caps()
                .await
                .map_err(|e| CoreError::setup("switch capabilities", e))
        },
        async {
            client
                .get_log_caps()
                .await
                .map_err(|e| CoreError::setup("event capabilities", e))
        },
    )?;

    let info = DeviceInfo::from(info);
    let caps = CapabilitySet::new(&switches, events);
    info!(
        device = info.title(),
        serial = info.serial.as_deref().unwrap_or("-"),
        firmware = info.firmware.as_deref().unwrap_or("-"),
        relays = caps.relays.len(),
        events = caps.events.len(),
        "device probed"
    );
    Ok((info, caps))
}
