// Switch (relay) endpoints

use crate::client::DeviceClient;
use crate::error::Error;
use crate::models::{SwitchCapability, SwitchCapsResult, SwitchStatus, SwitchStatusResult};

impl DeviceClient {
    /// Relay inventory with configuration.
    ///
    /// `GET /api/switch/caps`
    pub async fn get_switch_caps(&self) -> Result<Vec<SwitchCapability>, Error> {
        let caps: SwitchCapsResult = self.get_json("/api/switch/caps", &[], None).await?;
        Ok(caps.switches)
    }

    /// Live relay states. One call returns every switch.
    ///
    /// `GET /api/switch/status`
    pub async fn get_switch_status(&self) -> Result<Vec<SwitchStatus>, Error> {
        let status: SwitchStatusResult = self.get_json("/api/switch/status", &[], None).await?;
        Ok(status.switches)
    }

    /// Fire a relay. Monostable relays release on their own.
    ///
    /// `GET /api/switch/ctrl?switch={id}&action=trigger`
    pub async fn trigger_switch(&self, switch: u32) -> Result<(), Error> {
        self.get_ack(
            "/api/switch/ctrl",
            &[("switch", switch.to_string()), ("action", "trigger".into())],
        )
        .await
    }
}
