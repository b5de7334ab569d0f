use anyhow::{Context, Result};
use basenbms_lib::assembler::FrameAssembler;
use basenbms_lib::protocol::{build_command, CellVoltage, GeneralInfo, Record, StartOfFrame, Status};
use basenbms_lib::serialport::BasenBMS;
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::{error, warn, LevelFilter};
use std::{ops::Deref, panic};

mod commandline;
mod config;
mod daemon;

use commandline::{CliArgs, CliCommands};
use config::DaemonConfig;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn print_status(status: &Status) {
    println!("Status: {status:?}");
    println!(
        "  Charging states: {}",
        status.charging_state_labels().join(";")
    );
    println!(
        "  Discharging states: {}",
        status.discharging_state_labels().join(";")
    );
    println!(
        "  Charging warnings: {}",
        status.charging_warning_labels().join(";")
    );
    println!(
        "  Discharging warnings: {}",
        status.discharging_warning_labels().join(";")
    );
}

fn print_general_info(info: &GeneralInfo) {
    println!("General info: {info:?}");
    println!("  Manufacturing date: {}", info.manufacturing_date);
}

fn print_cell_voltages(cells: &[CellVoltage]) {
    for cell in cells {
        println!("Cell voltage {}: {:.3} V", cell.cell, cell.voltage);
    }
}

pub(crate) fn print_record(record: &Record) {
    match record {
        Record::Status(status) => print_status(status),
        Record::GeneralInfo(info) => print_general_info(info),
        Record::CellVoltages(voltages) => print_cell_voltages(&voltages.cells),
        Record::ProtectIc(protect_ic) => println!("Protect IC: {}", hex::encode(&protect_ic.data)),
        Record::Unknown(unknown) => println!(
            "Unknown frame 0x{:02X}: {}",
            unknown.frame_type,
            hex::encode(&unknown.data)
        ),
    }
}

fn decode_chunks(chunks: &[String]) -> Result<()> {
    let mut assembler = FrameAssembler::new();
    for chunk in chunks {
        let digits: String = chunk
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        let bytes = hex::decode(&digits)
            .with_context(|| format!("Invalid hex chunk '{chunk}'"))?;
        match assembler.feed(&bytes) {
            Some(Ok(record)) => print_record(&record),
            Some(Err(err)) => println!("Rejected frame: {err}"),
            None => {}
        }
    }
    if !assembler.is_empty() {
        warn!("{} bytes of an incomplete frame left", assembler.len());
    }
    Ok(())
}

fn connect(args: &CliArgs) -> Result<BasenBMS> {
    let mut bms = BasenBMS::new(&args.device, args.baud_rate)
        .with_context(|| format!("Cannot open serial port '{}'", args.device))?;
    bms.set_timeout(args.timeout)?;
    bms.set_delay(args.delay);
    bms.set_start_of_frame(StartOfFrame::from(args.start_of_frame));
    Ok(bms)
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    let start = StartOfFrame::from(args.start_of_frame);

    match &args.command {
        CliCommands::Status => {
            let status = connect(&args)?
                .get_status()
                .with_context(|| "Cannot get status")?;
            print_status(&status);
        }
        CliCommands::GeneralInfo => {
            let info = connect(&args)?
                .get_general_info()
                .with_context(|| "Cannot get general info")?;
            print_general_info(&info);
        }
        CliCommands::CellVoltages => {
            let cells = connect(&args)?
                .get_cell_voltages()
                .with_context(|| "Cannot get cell voltages")?;
            print_cell_voltages(&cells);
        }
        CliCommands::ProtectIc => {
            let protect_ic = connect(&args)?
                .get_protect_ic()
                .with_context(|| "Cannot get protect IC")?;
            print_record(&Record::ProtectIc(protect_ic));
        }
        CliCommands::All => {
            let mut bms = connect(&args)?;
            let status = bms.get_status().with_context(|| "Cannot get status")?;
            print_status(&status);
            let info = bms
                .get_general_info()
                .with_context(|| "Cannot get general info")?;
            print_general_info(&info);
            let cells = bms
                .get_cell_voltages()
                .with_context(|| "Cannot get cell voltages")?;
            print_cell_voltages(&cells);
            let protect_ic = bms.get_protect_ic().with_context(|| "Cannot get protect IC")?;
            print_record(&Record::ProtectIc(protect_ic));
        }
        CliCommands::Request { frame_type, value } => {
            let record = connect(&args)?
                .request(*frame_type, *value)
                .with_context(|| format!("Cannot request frame type 0x{frame_type:02X}"))?;
            print_record(&record);
        }
        CliCommands::Command { frame_type, value } => {
            let command = build_command(start, *frame_type, *value);
            println!("{}", hex::encode(command));
        }
        CliCommands::Decode { chunks } => decode_chunks(chunks)?,
        CliCommands::Daemon {
            interval,
            format,
            config_file,
        } => {
            let config = match config_file {
                Some(path) => DaemonConfig::load(path)?,
                None => DaemonConfig::new(*interval, *format),
            };
            let mut serial = basenbms_lib::serialport::open(&args.device, args.baud_rate)
                .with_context(|| format!("Cannot open serial port '{}'", args.device))?;
            serial
                .set_timeout(args.timeout)
                .with_context(|| "Cannot set serial timeout")?;
            daemon::run(serial, start, config)?;
        }
    }

    Ok(())
}
