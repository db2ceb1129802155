use serde::Serialize;

use intercom_api::SystemInfo;

/// Identity of the physical device, read once at setup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: Option<String>,
    /// Product variant, e.g. "2N IP Verso".
    pub model: Option<String>,
    pub serial: Option<String>,
    pub mac: Option<String>,
    /// `swVersion`, suffixed with the build type for non-release builds.
    pub firmware: Option<String>,
    pub hardware: Option<String>,
}

impl DeviceInfo {
    /// Stable identifier: serial number, else MAC address.
    pub fn unique_id(&self) -> Option<&str> {
        self.serial.as_deref().or(self.mac.as_deref())
    }

    /// Human-readable title for the device.
    pub fn title(&self) -> &str {
        self.name
            .as_deref()
            .or(self.model.as_deref())
            .unwrap_or("2N Intercom")
    }
}

impl From<SystemInfo> for DeviceInfo {
    fn from(info: SystemInfo) -> Self {
        let firmware = match (info.sw_version, info.build_type.as_deref()) {
            (Some(sw), Some(build)) if !build.is_empty() && build != "release" => {
                Some(format!("{sw} ({build})"))
            }
            (sw, _) => sw,
        };
        Self {
            name: info.device_name.filter(|n| !n.is_empty()),
            model: info.variant,
            serial: info.serial_number.filter(|s| !s.is_empty()),
            mac: info.mac_addr.filter(|m| !m.is_empty()),
            firmware,
            hardware: info.hw_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_serial_then_mac() {
        let info = DeviceInfo::from(SystemInfo {
            serial_number: Some(String::new()),
            mac_addr: Some("7C:1E:B3:00:11:22".into()),
            sw_version: Some("2.40.0.54.2".into()),
            build_type: Some("beta".into()),
            ..SystemInfo::default()
        });
        assert_eq!(info.unique_id(), Some("7C:1E:B3:00:11:22"));
        assert_eq!(info.firmware.as_deref(), Some("2.40.0.54.2 (beta)"));
        assert_eq!(info.title(), "2N Intercom");
    }
}
