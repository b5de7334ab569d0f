//! Synchronous client and transport for a Basen BMS reachable through a serial port
//! (e.g. a UART bridge in front of the BLE module).
//!
//! # Example
//!
//! ```no_run
//! use basenbms_lib::serialport::{BasenBMS, Error};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Error> {
//!     let mut bms = BasenBMS::new("/dev/ttyUSB0", 9600)?;
//!     bms.set_timeout(Duration::from_millis(500))?;
//!
//!     let status = bms.get_status()?;
//!     println!("Current: {} A, SOC: {}%", status.current, status.state_of_charge);
//!     Ok(())
//! }
//! ```

use crate::assembler::FrameAssembler;
use crate::protocol::*;
use crate::session::Transport;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Minimum pause between two commands.
pub const MINIMUM_DELAY: Duration = Duration::from_millis(4);

const READ_BUFFER_LENGTH: usize = 64;

/// Errors of the serial port client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A frame was received but rejected by the protocol layer.
    #[error("Basen error: {0}")]
    BasenError(#[from] crate::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    /// The read timed out before a complete frame arrived.
    #[error("no reply received")]
    NoReply,
    /// The device answered with another frame type than requested.
    #[error("unexpected reply - expected=0x{expected:02X} received=0x{received:02X}")]
    UnexpectedFrame { expected: u8, received: u8 },
}

type Result<T> = std::result::Result<T, Error>;

/// Opens `port` with the line settings the device uses.
pub fn open(port: &str, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>> {
    Ok(serialport::new(port, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .open()?)
}

/// Write half of a serial link, for use with [`crate::session::Session`].
pub struct SerialTransport {
    serial: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    pub fn new(serial: Box<dyn serialport::SerialPort>) -> Self {
        Self { serial }
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, frame: &[u8]) -> std::result::Result<(), crate::Error> {
        log::trace!("write bytes: {frame:02X?}");
        self.serial.write_all(frame)?;
        Ok(())
    }
}

/// Reads chunks into `assembler` until a frame completes.
///
/// Fails with [`Error::NoReply`] when the reader times out, reaches end of
/// file, or keeps delivering bytes without completing a frame until
/// `deadline`.
fn read_record<R: Read + ?Sized>(
    reader: &mut R,
    assembler: &mut FrameAssembler,
    deadline: Instant,
) -> Result<Record> {
    let mut buf = [0u8; READ_BUFFER_LENGTH];
    loop {
        let received = match reader.read(&mut buf) {
            Ok(0) => return Err(Error::NoReply),
            Ok(received) => received,
            Err(err) if err.kind() == ErrorKind::TimedOut => return Err(Error::NoReply),
            Err(err) => return Err(err.into()),
        };
        log::trace!("receive bytes: {:02X?}", &buf[..received]);
        if let Some(result) = assembler.feed(&buf[..received]) {
            return Ok(result?);
        }
        if Instant::now() >= deadline {
            let buffered = assembler.len();
            log::debug!("no complete frame before deadline, {buffered} bytes buffered");
            return Err(Error::NoReply);
        }
    }
}

/// Request/response client: every getter sends one command and waits for the
/// matching reply.
#[derive(Debug)]
pub struct BasenBMS {
    serial: Box<dyn serialport::SerialPort>,
    assembler: FrameAssembler,
    start: StartOfFrame,
    last_execution: Instant,
    delay: Duration,
    timeout: Duration,
}

impl BasenBMS {
    pub fn new(port: &str, baud_rate: u32) -> Result<Self> {
        Ok(Self::from_port(open(port, baud_rate)?))
    }

    pub fn from_port(serial: Box<dyn serialport::SerialPort>) -> Self {
        let timeout = serial.timeout();
        Self {
            serial,
            assembler: FrameAssembler::new(),
            start: StartOfFrame::A,
            last_execution: Instant::now(),
            delay: MINIMUM_DELAY,
            timeout,
        }
    }

    /// Sets the reply timeout; a request fails with [`Error::NoReply`] once it
    /// elapses, even while the device keeps sending incomplete data.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        log::trace!("set timeout to {timeout:?}");
        self.serial.set_timeout(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    /// Sets the minimum delay between commands, never below [`MINIMUM_DELAY`].
    pub fn set_delay(&mut self, delay: Duration) {
        if delay < MINIMUM_DELAY {
            log::warn!("delay {delay:?} lower minimum {MINIMUM_DELAY:?}, use minimum");
            self.delay = MINIMUM_DELAY;
        } else {
            self.delay = delay;
        }
        log::trace!("set delay to {:?}", self.delay);
    }

    pub fn set_start_of_frame(&mut self, start: StartOfFrame) {
        self.start = start;
    }

    fn serial_await_delay(&self) {
        let last_exec_diff = Instant::now().duration_since(self.last_execution);
        if let Some(time_until_delay_reached) = self.delay.checked_sub(last_exec_diff) {
            std::thread::sleep(time_until_delay_reached);
        }
    }

    fn send_bytes(&mut self, tx_buffer: &[u8]) -> Result<()> {
        // drop stale replies so they are not taken for the answer to this command
        loop {
            let pending = self.serial.bytes_to_read()?;
            if pending == 0 {
                break;
            }
            log::trace!("Got {pending} pending bytes");
            let mut buf = [0u8; READ_BUFFER_LENGTH];
            let received = self.serial.read(&mut buf)?;
            log::trace!("Dropped {received} pending bytes");
        }
        self.assembler.clear();
        self.serial_await_delay();

        log::trace!("write bytes: {tx_buffer:02X?}");
        self.serial.write_all(tx_buffer)?;
        Ok(())
    }

    fn receive_record(&mut self) -> Result<Record> {
        let deadline = Instant::now() + self.timeout;
        let record = read_record(&mut self.serial, &mut self.assembler, deadline);
        self.last_execution = Instant::now();
        record
    }

    /// Sends a raw request and returns whatever record the device answers with.
    pub fn request(&mut self, frame_type: u8, value: u8) -> Result<Record> {
        self.send_bytes(&build_command(self.start, frame_type, value))?;
        self.receive_record()
    }

    fn unexpected(expected: FrameType, record: &Record) -> Error {
        Error::UnexpectedFrame {
            expected: expected as u8,
            received: record.frame_type(),
        }
    }

    pub fn get_status(&mut self) -> Result<Status> {
        self.send_bytes(&Status::request(self.start))?;
        match self.receive_record()? {
            Record::Status(status) => Ok(status),
            other => Err(Self::unexpected(FrameType::Status, &other)),
        }
    }

    pub fn get_general_info(&mut self) -> Result<GeneralInfo> {
        self.send_bytes(&GeneralInfo::request(self.start))?;
        match self.receive_record()? {
            Record::GeneralInfo(info) => Ok(info),
            other => Err(Self::unexpected(FrameType::GeneralInfo, &other)),
        }
    }

    /// Fetches one chunk of cell voltages; `frame_type` must be one of the
    /// cell voltage frame types.
    pub fn get_cell_voltage_chunk(&mut self, frame_type: FrameType) -> Result<CellVoltages> {
        let Some(chunk) = frame_type.cell_voltage_chunk() else {
            return Err(crate::Error::UnexpectedFrameType {
                frame_type: frame_type as u8,
            }
            .into());
        };
        self.send_bytes(&CellVoltages::request(self.start, frame_type))?;
        match self.receive_record()? {
            Record::CellVoltages(voltages) if voltages.chunk == chunk => Ok(voltages),
            other => Err(Self::unexpected(frame_type, &other)),
        }
    }

    /// Fetches cells 1 to 24, the chunks covered by the polling cycle.
    pub fn get_cell_voltages(&mut self) -> Result<Vec<CellVoltage>> {
        let mut cells = self
            .get_cell_voltage_chunk(FrameType::CellVoltages1To12)?
            .cells;
        cells.extend(
            self.get_cell_voltage_chunk(FrameType::CellVoltages13To24)?
                .cells,
        );
        Ok(cells)
    }

    pub fn get_protect_ic(&mut self) -> Result<ProtectIc> {
        self.send_bytes(&ProtectIc::request(self.start))?;
        match self.receive_record()? {
            Record::ProtectIc(protect_ic) => Ok(protect_ic),
            other => Err(Self::unexpected(FrameType::ProtectIc, &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const STATUS_FRAME: [u8; 32] = [
        0x3a, 0x16, 0x2a, 0x18, 0x03, 0xe5, 0xff, 0xff, 0x06, 0x64, 0x00, 0x00, 0x12, 0x14, 0x19,
        0x19, 0x35, 0x3d, 0x00, 0x00, 0x80, 0x80, 0x00, 0x00, 0x0e, 0x02, 0x00, 0x00, 0x82, 0x05,
        0x0d, 0x0a,
    ];

    /// Keeps starting a frame without ever finishing it.
    struct EndlessPartialFrame;

    impl Read for EndlessPartialFrame {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            buf[..3].copy_from_slice(&[0x3a, 0x16, 0x2a]);
            Ok(3)
        }
    }

    struct TimingOut;

    impl Read for TimingOut {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(ErrorKind::TimedOut.into())
        }
    }

    fn read_within<R: Read + ?Sized>(reader: &mut R, timeout: Duration) -> Result<Record> {
        read_record(reader, &mut FrameAssembler::new(), Instant::now() + timeout)
    }

    #[test]
    fn complete_frame_is_returned() {
        let mut reader = &STATUS_FRAME[..];
        let record = read_within(&mut reader, Duration::from_secs(1));
        assert_matches!(record, Ok(Record::Status(status)) => {
            assert_eq!(status.state_of_charge, 14);
        });
    }

    #[test]
    fn never_ending_partial_frame_stops_at_deadline() {
        let started = Instant::now();
        let record = read_within(&mut EndlessPartialFrame, Duration::from_millis(20));
        assert_matches!(record, Err(Error::NoReply));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn read_timeout_is_no_reply() {
        let record = read_within(&mut TimingOut, Duration::from_secs(1));
        assert_matches!(record, Err(Error::NoReply));
    }

    #[test]
    fn truncated_stream_is_no_reply() {
        let mut reader = &STATUS_FRAME[..20];
        let record = read_within(&mut reader, Duration::from_secs(1));
        assert_matches!(record, Err(Error::NoReply));
    }

    #[test]
    fn rejected_frame_is_reported() {
        let mut frame = STATUS_FRAME;
        frame[28] = 0x83;
        let mut reader = &frame[..];
        let record = read_within(&mut reader, Duration::from_secs(1));
        assert_matches!(
            record,
            Err(Error::BasenError(crate::Error::ChecksumMismatch { .. }))
        );
    }
}
