use clap::{Args, Parser, Subcommand};
use linedesk_sdk::LineId;
use std::path::PathBuf;

use crate::config::DEFAULT_SERVER;
use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "linedesk",
    about = "☎️  Watch and drive a multi-line telephony panel",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "LINEDESK_SERVER",
        default_value = DEFAULT_SERVER,
        help = "Base URL of the line server"
    )]
    pub server: String,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "LINEDESK_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        global = true,
        env = "LINEDESK_LOG_FILE",
        help = "Write logs to the specified file instead of stderr"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Follow every line live until interrupted
    Watch,
    /// Print the current state of every line
    Lines,
    /// Dial a number on an idle line
    Dial(DialArgs),
    /// Hang up a line
    Hangup(HangupArgs),
    /// Route a line to an audio channel (0 unroutes it)
    Channel(ChannelArgs),
    /// Play the diagnostic tone on a channel for a while
    Tone(ToneArgs),
    /// Show or clear recently dialed numbers
    Recents(RecentsArgs),
    /// Inspect or replace the SIP account configuration
    #[command(subcommand)]
    Sip(SipCommand),
    /// Inspect the network configuration
    #[command(subcommand)]
    Network(NetworkCommand),
    /// Show server health
    Status,
    /// Restart the telephony service
    Restart(ConfirmArgs),
    /// Reboot the server
    Reboot(ConfirmArgs),
}

#[derive(Args, Debug)]
pub struct DialArgs {
    #[arg(value_name = "LINE")]
    pub line: LineId,
    #[arg(value_name = "NUMBER")]
    pub number: String,
}

#[derive(Args, Debug)]
pub struct HangupArgs {
    #[arg(value_name = "LINE")]
    pub line: LineId,
    #[command(flatten)]
    pub confirm: ConfirmArgs,
}

#[derive(Args, Debug)]
pub struct ChannelArgs {
    #[arg(value_name = "LINE")]
    pub line: LineId,
    #[arg(value_name = "CHANNEL")]
    pub channel: u32,
}

#[derive(Args, Debug)]
pub struct ToneArgs {
    #[arg(value_name = "CHANNEL")]
    pub channel: u32,
    #[arg(
        long = "hold-ms",
        value_name = "MS",
        default_value_t = 1_000,
        help = "How long to hold the tone before stopping it"
    )]
    pub hold_ms: u64,
}

#[derive(Args, Debug)]
pub struct RecentsArgs {
    #[arg(
        long = "clear",
        action = clap::ArgAction::SetTrue,
        help = "Forget every recent number"
    )]
    pub clear: bool,
}

#[derive(Args, Debug, Default)]
pub struct ConfirmArgs {
    #[arg(
        long = "yes",
        short = 'y',
        action = clap::ArgAction::SetTrue,
        help = "Skip the confirmation prompt"
    )]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum SipCommand {
    /// Print the SIP configuration with a per-line summary
    Show,
    /// Save a SIP configuration read from a JSON file (restarts the server)
    Save(SipSaveArgs),
}

#[derive(Args, Debug)]
pub struct SipSaveArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    #[command(flatten)]
    pub confirm: ConfirmArgs,
}

#[derive(Subcommand, Debug)]
pub enum NetworkCommand {
    /// Print the network configuration
    Show,
}
