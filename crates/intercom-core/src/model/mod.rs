// ── Domain model ──
//
// Canonical types the session exposes to hosts. Wire types from
// `intercom-api` are converted here and never leak past the session.

pub mod capability;
pub mod device;
pub mod event;
pub mod relay;
pub mod sensor;

pub use capability::{CapabilitySet, RelayCapability};
pub use device::DeviceInfo;
pub use event::{DEFAULT_EVENT_FILTER, DeviceEvent, EventKind};
pub use relay::{RelayEntity, RelayState, RelayTable};
pub use sensor::{CallActivity, PulseKind, PulseSensorState, SensorSnapshot};
