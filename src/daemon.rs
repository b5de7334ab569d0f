use anyhow::{Context, Result};
use basenbms_lib::protocol::{Record, StartOfFrame};
use basenbms_lib::serialport::SerialTransport;
use basenbms_lib::session::{CommandCycle, RecordSink, Session};
use log::{error, info, warn};
use serde_json::json;
use std::io::{ErrorKind, Read};
use std::time::Instant;

use crate::commandline::OutputFormat;
use crate::config::DaemonConfig;

const READ_BUFFER_LENGTH: usize = 64;

/// Prints every record as soon as the assembler completes it.
struct OutputSink {
    format: OutputFormat,
}

impl RecordSink for OutputSink {
    fn on_record(&mut self, record: Record) {
        match self.format {
            OutputFormat::Console => {
                println!("--- Data at {} ---", chrono::Local::now().to_rfc3339());
                crate::print_record(&record);
            }
            OutputFormat::Json => {
                let line = json!({
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "record": record,
                });
                println!("{line}");
            }
        }
    }

    fn on_error(&mut self, error: basenbms_lib::Error) {
        warn!("Frame rejected: {error}");
    }
}

/// Polls the BMS forever: one request per interval, every received chunk is
/// fed to the session while waiting for the next tick.
pub fn run(
    serial: Box<dyn serialport::SerialPort>,
    start: StartOfFrame,
    config: DaemonConfig,
) -> Result<()> {
    info!("Starting daemon mode: {config:?}");
    let mut reader = serial
        .try_clone()
        .with_context(|| "Cannot clone serial port for reading")?;
    let mut cycle = CommandCycle::new(start, config.frame_types.clone())
        .with_context(|| "No frame types configured for polling")?;
    let mut session = Session::new(
        SerialTransport::new(serial),
        OutputSink {
            format: config.format,
        },
    );

    let mut buf = [0u8; READ_BUFFER_LENGTH];
    loop {
        if let Err(e) = session.poll(&mut cycle) {
            error!("Cannot send request: {e}");
        }

        let deadline = Instant::now() + config.interval;
        while Instant::now() < deadline {
            match reader.read(&mut buf) {
                Ok(received) => session.on_chunk(&buf[..received]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e).with_context(|| "Cannot read from serial port"),
            }
        }
    }
}
