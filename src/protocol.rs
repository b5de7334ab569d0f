use crate::labels::{
    labels, CHARGING_STATES, CHARGING_WARNINGS, DISCHARGING_STATES, DISCHARGING_WARNINGS,
};
use crate::Error;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Start of frame marker.
///
/// The device accepts requests with either marker and answers with either one;
/// the distinction only matters for finding frame boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StartOfFrame {
    A = 0x3A,
    B = 0x3B,
}

impl StartOfFrame {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x3A => Some(Self::A),
            0x3B => Some(Self::B),
            _ => None,
        }
    }
}

pub const ADDRESS: u8 = 0x16;
pub const END_OF_FRAME_1: u8 = 0x0D;
pub const END_OF_FRAME_2: u8 = 0x0A;

/// Largest frame the device sends, checksum and terminator included.
pub const MAX_RESPONSE_SIZE: usize = 42 + 2;

const HEADER_LENGTH: usize = 4;
const TRAILER_LENGTH: usize = 4;
/// Size of a frame without any data bytes.
pub const MIN_FRAME_SIZE: usize = HEADER_LENGTH + TRAILER_LENGTH;

const COMMAND_LENGTH: usize = 9;
const COMMAND_DATA_LENGTH: u8 = 0x01;
const CELLS_PER_CHUNK: u8 = 12;

/// Frame types spoken by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    CellVoltages1To12 = 0x24,
    CellVoltages13To24 = 0x25,
    CellVoltages25To34 = 0x26,
    Status = 0x2A,
    GeneralInfo = 0x2B,
    Settings = 0xE8,
    SettingsAlternative = 0xEA,
    ProtectIc = 0xFE,
}

impl FrameType {
    /// Zero based chunk index of a cell voltage frame type.
    pub fn cell_voltage_chunk(self) -> Option<u8> {
        match self {
            FrameType::CellVoltages1To12
            | FrameType::CellVoltages13To24
            | FrameType::CellVoltages25To34 => {
                Some(self as u8 - FrameType::CellVoltages1To12 as u8)
            }
            _ => None,
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x24 => Ok(Self::CellVoltages1To12),
            0x25 => Ok(Self::CellVoltages13To24),
            0x26 => Ok(Self::CellVoltages25To34),
            0x2A => Ok(Self::Status),
            0x2B => Ok(Self::GeneralInfo),
            0xE8 => Ok(Self::Settings),
            0xEA => Ok(Self::SettingsAlternative),
            0xFE => Ok(Self::ProtectIc),
            other => Err(other),
        }
    }
}

/// Frame types requested by the default polling cycle, in order.
pub const POLL_SEQUENCE: [FrameType; 5] = [
    FrameType::Status,
    FrameType::GeneralInfo,
    FrameType::CellVoltages1To12,
    FrameType::CellVoltages13To24,
    FrameType::ProtectIc,
];

pub fn is_start_of_frame(byte: u8) -> bool {
    StartOfFrame::from_byte(byte).is_some()
}

/// 16 bit checksum used by the device: the wrapping sum of all bytes.
///
/// Inbound frames are summed from the address byte through the last data
/// byte; the start marker is not part of the sum. The result is transmitted
/// little endian right after the data.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, b| sum.wrapping_add(u16::from(*b)))
}

/// Builds a request frame asking the device for `frame_type`.
///
/// Layout: `[start][0x16][frame_type][0x01][value][crc_lo][crc_hi][0x0D][0x0A]`.
pub fn build_command(start: StartOfFrame, frame_type: u8, value: u8) -> Vec<u8> {
    let mut tx_buffer = vec![0; COMMAND_LENGTH];
    tx_buffer[0] = start as u8;
    tx_buffer[1] = ADDRESS;
    tx_buffer[2] = frame_type;
    tx_buffer[3] = COMMAND_DATA_LENGTH;
    tx_buffer[4] = value;
    let crc = checksum(&tx_buffer[1..5]).to_le_bytes();
    tx_buffer[5] = crc[0];
    tx_buffer[6] = crc[1];
    tx_buffer[7] = END_OF_FRAME_1;
    tx_buffer[8] = END_OF_FRAME_2;
    log::trace!("build command: {tx_buffer:02X?}");
    tx_buffer
}

/// A complete frame whose length and checksum have been verified.
///
/// Holds the bytes from the start marker through the last data byte; the
/// checksum and terminator are stripped.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    bytes: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Validates a terminated byte sequence.
    ///
    /// Only the declared length and the checksum are checked, the terminator
    /// bytes themselves are left to the caller.
    pub fn parse(buffer: &'a [u8]) -> Result<Self, Error> {
        if buffer.len() < HEADER_LENGTH {
            log::warn!(
                "Invalid frame length - expected>={} received={}",
                MIN_FRAME_SIZE,
                buffer.len()
            );
            return Err(Error::LengthMismatch {
                expected: MIN_FRAME_SIZE,
                actual: buffer.len(),
            });
        }

        let data_len = usize::from(buffer[3]);
        let frame_len = HEADER_LENGTH + data_len + TRAILER_LENGTH;
        if frame_len != buffer.len() {
            log::warn!(
                "Invalid frame length - expected={} received={}",
                frame_len,
                buffer.len()
            );
            return Err(Error::LengthMismatch {
                expected: frame_len,
                actual: buffer.len(),
            });
        }

        let computed = checksum(&buffer[1..HEADER_LENGTH + data_len]);
        let received = u16::from_le_bytes([buffer[frame_len - 4], buffer[frame_len - 3]]);
        if computed != received {
            log::warn!("Invalid checksum - calculated=0x{computed:04X} received=0x{received:04X}");
            return Err(Error::ChecksumMismatch { computed, received });
        }

        Ok(Self {
            bytes: &buffer[..frame_len - TRAILER_LENGTH],
        })
    }

    pub fn frame_type(&self) -> u8 {
        self.bytes[2]
    }

    /// Data bytes following the length byte.
    pub fn data(&self) -> &'a [u8] {
        &self.bytes[HEADER_LENGTH..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

fn get_u16(frame: &[u8], i: usize) -> u16 {
    u16::from_le_bytes([frame[i], frame[i + 1]])
}

fn get_u32(frame: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([frame[i], frame[i + 1], frame[i + 2], frame[i + 3]])
}

fn validate_len(frame: &[u8], required: usize) -> std::result::Result<(), Error> {
    if frame.len() < required {
        let frame_type = frame.get(2).copied().unwrap_or_default();
        log::warn!(
            "Payload too short - frame_type=0x{:02X} required={} received={}",
            frame_type,
            required,
            frame.len()
        );
        return Err(Error::PayloadTooShort {
            frame_type,
            required,
            actual: frame.len(),
        });
    }
    Ok(())
}

/// Checks that the frame holds at least the data it declares and returns it.
fn declared_data(frame: &[u8]) -> std::result::Result<&[u8], Error> {
    validate_len(frame, HEADER_LENGTH)?;
    let end = HEADER_LENGTH + usize::from(frame[3]);
    validate_len(frame, end)?;
    Ok(&frame[HEADER_LENGTH..end])
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Status {
    pub current: f32, // negative=discharging, positive=charging
    pub total_voltage: f32,
    pub temperatures: [u8; 4],
    pub capacity_remaining: f32,
    pub charging_states: u8,
    pub discharging_states: u8,
    pub charging_warnings: u8,
    pub discharging_warnings: u8,
    pub state_of_charge: u8,
}

impl Status {
    pub fn request(start: StartOfFrame) -> Vec<u8> {
        build_command(start, FrameType::Status as u8, 0)
    }

    pub fn decode(frame: &[u8]) -> std::result::Result<Self, Error> {
        validate_len(frame, 25)?;
        Ok(Self {
            // Raw current is a two's complement milliampere value
            current: get_u32(frame, 4) as i32 as f32 / 1000.0,
            total_voltage: get_u32(frame, 8) as f32 / 1000.0,
            temperatures: [frame[12], frame[13], frame[14], frame[15]],
            capacity_remaining: get_u32(frame, 16) as f32 / 1000.0,
            charging_states: frame[20],
            discharging_states: frame[21],
            charging_warnings: frame[22],
            discharging_warnings: frame[23],
            state_of_charge: frame[24],
        })
    }

    pub fn charging_state_labels(&self) -> Vec<&'static str> {
        labels(self.charging_states, &CHARGING_STATES)
    }

    pub fn charging_warning_labels(&self) -> Vec<&'static str> {
        labels(self.charging_warnings, &CHARGING_WARNINGS)
    }

    pub fn discharging_state_labels(&self) -> Vec<&'static str> {
        labels(self.discharging_states, &DISCHARGING_STATES)
    }

    pub fn discharging_warning_labels(&self) -> Vec<&'static str> {
        labels(self.discharging_warnings, &DISCHARGING_WARNINGS)
    }
}

/// Date packed into 16 bits: 7 bits years since 1980, 4 bits month, 5 bits day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManufacturingDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl From<u16> for ManufacturingDate {
    fn from(raw: u16) -> Self {
        Self {
            year: 1980 + ((raw >> 9) & 127),
            month: ((raw >> 5) & 15) as u8,
            day: (raw & 31) as u8,
        }
    }
}

impl fmt::Display for ManufacturingDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeneralInfo {
    pub nominal_capacity: f32,
    pub nominal_voltage: f32,
    pub real_capacity: f32,
    pub serial_number: u16,
    pub manufacturing_date: ManufacturingDate,
    pub charging_cycles: u16,
}

impl GeneralInfo {
    pub fn request(start: StartOfFrame) -> Vec<u8> {
        build_command(start, FrameType::GeneralInfo as u8, 0)
    }

    pub fn decode(frame: &[u8]) -> std::result::Result<Self, Error> {
        validate_len(frame, 28)?;
        // Bytes 16..22 are not used by the device
        Ok(Self {
            nominal_capacity: get_u32(frame, 4) as f32 / 1000.0,
            nominal_voltage: get_u32(frame, 8) as f32 / 1000.0,
            real_capacity: get_u32(frame, 12) as f32 / 1000.0,
            serial_number: get_u16(frame, 22),
            manufacturing_date: ManufacturingDate::from(get_u16(frame, 24)),
            charging_cycles: get_u16(frame, 26),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellVoltage {
    /// 1 based cell number across all chunks.
    pub cell: u8,
    pub voltage: f32,
}

/// One chunk of up to twelve cell voltages.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellVoltages {
    /// 0 for cells 1-12, 1 for cells 13-24, 2 for cells 25-34.
    pub chunk: u8,
    pub cells: Vec<CellVoltage>,
}

impl CellVoltages {
    pub fn request(start: StartOfFrame, frame_type: FrameType) -> Vec<u8> {
        build_command(start, frame_type as u8, 0)
    }

    pub fn decode(frame: &[u8]) -> std::result::Result<Self, Error> {
        validate_len(frame, HEADER_LENGTH)?;
        let chunk = FrameType::try_from(frame[2])
            .ok()
            .and_then(FrameType::cell_voltage_chunk)
            .ok_or(Error::UnexpectedFrameType {
                frame_type: frame[2],
            })?;
        let n_cells = frame[3] / 2;
        validate_len(frame, HEADER_LENGTH + 2 * usize::from(n_cells))?;

        let cells = (0..n_cells)
            .map(|i| {
                let cell = CellVoltage {
                    cell: i + 1 + CELLS_PER_CHUNK * chunk,
                    voltage: get_u16(frame, HEADER_LENGTH + 2 * usize::from(i)) as f32 / 1000.0,
                };
                log::trace!("Chunk #{} cell #{} volt={}", chunk, cell.cell, cell.voltage);
                cell
            })
            .collect();
        Ok(Self { chunk, cells })
    }
}

/// Protect IC frame; its layout is not known, so the data is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProtectIc {
    pub data: Vec<u8>,
}

impl ProtectIc {
    pub fn request(start: StartOfFrame) -> Vec<u8> {
        build_command(start, FrameType::ProtectIc as u8, 0)
    }

    pub fn decode(frame: &[u8]) -> std::result::Result<Self, Error> {
        Ok(Self {
            data: declared_data(frame)?.to_vec(),
        })
    }
}

/// A structurally valid frame without a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnknownFrame {
    pub frame_type: u8,
    pub data: Vec<u8>,
}

impl UnknownFrame {
    pub fn decode(frame: &[u8]) -> std::result::Result<Self, Error> {
        let data = declared_data(frame)?.to_vec();
        Ok(Self {
            frame_type: frame[2],
            data,
        })
    }
}

/// A decoded frame, one variant per frame type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "type", rename_all = "snake_case")
)]
pub enum Record {
    Status(Status),
    GeneralInfo(GeneralInfo),
    CellVoltages(CellVoltages),
    ProtectIc(ProtectIc),
    Unknown(UnknownFrame),
}

impl Record {
    /// Dispatches a validated frame to the decoder of its frame type.
    pub fn decode(frame: &Frame) -> std::result::Result<Self, Error> {
        let bytes = frame.as_bytes();
        match FrameType::try_from(frame.frame_type()) {
            Ok(FrameType::Status) => Status::decode(bytes).map(Record::Status),
            Ok(FrameType::GeneralInfo) => GeneralInfo::decode(bytes).map(Record::GeneralInfo),
            Ok(
                FrameType::CellVoltages1To12
                | FrameType::CellVoltages13To24
                | FrameType::CellVoltages25To34,
            ) => CellVoltages::decode(bytes).map(Record::CellVoltages),
            Ok(FrameType::ProtectIc) => ProtectIc::decode(bytes).map(Record::ProtectIc),
            Ok(FrameType::Settings | FrameType::SettingsAlternative) => {
                log::debug!("Settings frame not decoded: {bytes:02X?}");
                UnknownFrame::decode(bytes).map(Record::Unknown)
            }
            Err(frame_type) => {
                log::debug!("Unhandled frame type 0x{frame_type:02X}: {bytes:02X?}");
                UnknownFrame::decode(bytes).map(Record::Unknown)
            }
        }
    }

    pub fn frame_type(&self) -> u8 {
        match self {
            Record::Status(_) => FrameType::Status as u8,
            Record::GeneralInfo(_) => FrameType::GeneralInfo as u8,
            Record::CellVoltages(cells) => FrameType::CellVoltages1To12 as u8 + cells.chunk,
            Record::ProtectIc(_) => FrameType::ProtectIc as u8,
            Record::Unknown(unknown) => unknown.frame_type,
        }
    }
}
