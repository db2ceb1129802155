//! Command handlers, one module per command group.

pub mod config_cmd;
mod entities;
mod info;
mod media;
mod relay;
mod watch;

use intercom_core::SessionConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a device command to its handler.
pub async fn dispatch(
    cmd: Command,
    config: SessionConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Info => info::handle(config, global).await,
        Command::Entities => entities::handle(config, global).await,
        Command::Relays => relay::list(config, global).await,
        Command::Watch(args) => watch::handle(config, &args, global).await,
        Command::Trigger(args) => relay::trigger(config, args.relay, global).await,
        Command::DoorRelease => relay::door_release(config, global).await,
        Command::Snapshot(args) => media::snapshot(config, &args, global).await,
        Command::Stream(args) => media::stream(config, &args, global).await,
        Command::RtspUrl(args) => media::rtsp_url(config, &args, global).await,
        Command::Config(_) => unreachable!("config commands run without a device"),
    }
}
