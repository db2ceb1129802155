// System endpoints

use tracing::debug;

use crate::client::DeviceClient;
use crate::error::Error;
use crate::models::SystemInfo;

impl DeviceClient {
    /// Identity of the device: model, serial number, firmware.
    ///
    /// `GET /api/system/info`
    pub async fn get_system_info(&self) -> Result<SystemInfo, Error> {
        let info: SystemInfo = self.get_json("/api/system/info", &[], None).await?;
        debug!(
            variant = info.variant.as_deref().unwrap_or("?"),
            firmware = info.sw_version.as_deref().unwrap_or("?"),
            "system info"
        );
        Ok(info)
    }
}
