// intercom-api: Async Rust client for the 2N IP intercom HTTP API

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod stream;
pub mod transport;

mod camera;
mod log;
mod switch;
mod system;

pub use auth::{AuthMethod, Credentials};
pub use client::{DeviceClient, RawResponse};
pub use error::Error;
pub use log::PULL_GRACE;
pub use models::{LogEvent, Resolution, SwitchCapability, SwitchStatus, SystemInfo};
pub use stream::{Frame, FrameStream, MultipartDecoder};
pub use transport::{TlsMode, TransportConfig};
