use basenbms_lib::protocol::StartOfFrame;
use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use serde::Deserialize;
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Show current, total voltage, temperatures, remaining capacity, state of charge and state/warning flags
    Status,
    /// Show nominal/real capacity, nominal voltage, serial number, manufacturing date and charging cycles
    GeneralInfo,
    /// Show the voltages of cells 1-24
    CellVoltages,
    /// Show the raw protect IC frame
    ProtectIc,
    /// Show all available BMS information by running every read command
    All,
    /// Send a raw request and show whatever frame the BMS answers with
    Request {
        /// Requested frame type (e.g. 0x2A or 42)
        #[arg(long, short, value_parser = maybe_hex::<u8>)]
        frame_type: u8,
        /// Data byte of the request
        #[arg(long, value_parser = maybe_hex::<u8>, default_value_t = 0)]
        value: u8,
    },
    /// Print the encoded request frame as hex without talking to a device
    Command {
        /// Requested frame type (e.g. 0x2A or 42)
        #[arg(long, short, value_parser = maybe_hex::<u8>)]
        frame_type: u8,
        /// Data byte of the request
        #[arg(long, value_parser = maybe_hex::<u8>, default_value_t = 0)]
        value: u8,
    },
    /// Decode captured hex chunks offline, each argument is one received chunk
    Decode {
        /// Hex encoded chunks (e.g. "3a162a18..." "...0d0a")
        #[arg(required = true)]
        chunks: Vec<String>,
    },
    /// Run in daemon mode, periodically polling the BMS and printing every received frame
    Daemon {
        /// Interval between two requests (e.g., "10s", "1m")
        #[clap(long, short, value_parser = humantime::parse_duration, default_value = "10s")]
        interval: Duration,
        /// Output format of the received frames
        #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
        format: OutputFormat,
        /// YAML configuration file; replaces the daemon options above
        #[arg(long)]
        config_file: Option<String>,
    },
}

#[derive(clap::ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Console,
    Json,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum StartMarker {
    /// 0x3A
    A,
    /// 0x3B
    B,
}

impl From<StartMarker> for StartOfFrame {
    fn from(marker: StartMarker) -> Self {
        match marker {
            StartMarker::A => StartOfFrame::A,
            StartMarker::B => StartOfFrame::B,
        }
    }
}

const fn about_text() -> &'static str {
    "basen bms command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Serial port device path (e.g., /dev/ttyUSB0 on Linux, COM1 on Windows)
    #[arg(short, long, default_value_t = default_device_name())]
    pub device: String,

    /// Baud rate of the serial port
    #[arg(long, default_value_t = 9600)]
    pub baud_rate: u32,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Timeout for serial I/O operations (e.g., "500ms", "1s", "2s 500ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "500ms")]
    pub timeout: Duration,

    /// Delay between sending multiple commands to the BMS (e.g., "50ms", "100ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "50ms")]
    pub delay: Duration,

    /// Start of frame marker used for requests
    #[arg(long, value_enum, default_value_t = StartMarker::A)]
    pub start_of_frame: StartMarker,
}
