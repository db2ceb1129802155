//! Clap derive structures for the `intercom` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// intercom -- talk to a 2N IP intercom from the command line
#[derive(Debug, Parser)]
#[command(
    name = "intercom",
    version,
    about = "Control a 2N IP intercom from the command line",
    long_about = "Read identity and relay state, trigger the door, watch live events,\n\
        and grab camera images from a 2N IP intercom over its HTTP API.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "INTERCOM_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Device address (overrides profile)
    #[arg(long, short = 'H', env = "INTERCOM_HOST", global = true)]
    pub host: Option<String>,

    /// HTTP API user name (overrides profile)
    #[arg(long, short = 'u', env = "INTERCOM_USERNAME", global = true)]
    pub username: Option<String>,

    /// HTTP API password (overrides profile)
    #[arg(long, env = "INTERCOM_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "INTERCOM_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "INTERCOM_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "INTERCOM_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show device identity and capabilities
    Info,

    /// List the entities a host would create for this device
    #[command(alias = "ent")]
    Entities,

    /// Show relay state
    Relays,

    /// Stream live events and state changes until interrupted
    Watch(WatchArgs),

    /// Actuate a relay once
    Trigger(TriggerArgs),

    /// Fire the configured door release relay
    #[command(alias = "open")]
    DoorRelease,

    /// Save a JPEG snapshot from the camera
    Snapshot(SnapshotArgs),

    /// Save frames from the MJPEG live preview
    Stream(StreamArgs),

    /// Print the RTSP stream URL for a media player
    RtspUrl(RtspUrlArgs),

    /// Inspect the CLI configuration
    Config(ConfigArgs),
}

// ── Command arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this many seconds
    #[arg(long, short = 'd')]
    pub duration: Option<u64>,

    /// Only show events of these types (comma-separated)
    #[arg(long, short = 't', value_delimiter = ',')]
    pub types: Vec<String>,
}

#[derive(Debug, Args)]
pub struct TriggerArgs {
    /// Relay (switch) number
    pub relay: u32,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// File to write the JPEG to
    #[arg(long, short = 'f', default_value = "snapshot.jpg")]
    pub file: PathBuf,

    /// Wanted image width
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Wanted image height
    #[arg(long, requires = "width")]
    pub height: Option<u32>,
}

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Number of frames to save
    #[arg(long, short = 'n', default_value = "10")]
    pub frames: usize,

    /// Directory to write frames into
    #[arg(long, short = 'd', default_value = ".")]
    pub dir: PathBuf,

    /// Wanted image width
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Wanted image height
    #[arg(long, requires = "width")]
    pub height: Option<u32>,
}

#[derive(Debug, Args)]
pub struct RtspUrlArgs {
    /// Print the password instead of masking it
    #[arg(long)]
    pub reveal: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,
    /// Show the loaded configuration (passwords masked)
    Show,
}
