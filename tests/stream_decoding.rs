use assert_matches::assert_matches;
use basenbms_lib::assembler::FrameAssembler;
use basenbms_lib::protocol::{build_command, Frame, Record, StartOfFrame};
use basenbms_lib::Error;
use rstest::rstest;

const STATUS_FRAME: [u8; 32] = [
    0x3a, 0x16, 0x2a, 0x18, 0x03, 0xe5, 0xff, 0xff, 0x06, 0x64, 0x00, 0x00, 0x12, 0x14, 0x19, 0x19,
    0x35, 0x3d, 0x00, 0x00, 0x80, 0x80, 0x00, 0x00, 0x0e, 0x02, 0x00, 0x00, 0x82, 0x05, 0x0d, 0x0a,
];

const GENERAL_INFO_FRAME: [u8; 32] = [
    0x3a, 0x16, 0x2b, 0x18, 0xa0, 0x86, 0x01, 0x00, 0x00, 0x64, 0x00, 0x00, 0x91, 0xa0, 0x01, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x30, 0x75, 0x00, 0x00, 0x71, 0x53, 0x07, 0x00, 0x86, 0x04, 0x0d, 0x0a,
];

const CELL_VOLTAGES_1_12_FRAME: [u8; 32] = [
    0x3a, 0x16, 0x24, 0x18, 0x96, 0x0c, 0x97, 0x0c, 0x98, 0x0c, 0x96, 0x0c, 0x96, 0x0c, 0x98, 0x0c,
    0x98, 0x0c, 0x97, 0x0c, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x6a, 0x05, 0x0d, 0x0a,
];

const CELL_VOLTAGES_13_24_FRAME: [u8; 32] = [
    0x3a, 0x16, 0x25, 0x18, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x53, 0x00, 0x0d, 0x0a,
];

const PROTECT_IC_FRAME: [u8; 27] = [
    0x3a, 0x16, 0xfe, 0x13, 0x00, 0xf9, 0x0f, 0x2c, 0x80, 0x80, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x02, 0x76, 0x53, 0x61, 0x07, 0x05, 0x0d, 0x0a,
];

/// Frame events reduced to something comparable.
#[derive(Debug, PartialEq)]
enum Event {
    Record(Record),
    Rejected(String),
}

fn stream() -> Vec<u8> {
    let mut corrupted = STATUS_FRAME;
    corrupted[28] ^= 0x10;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&STATUS_FRAME);
    bytes.extend_from_slice(&GENERAL_INFO_FRAME);
    bytes.extend_from_slice(&corrupted);
    bytes.extend_from_slice(&CELL_VOLTAGES_1_12_FRAME);
    bytes.extend_from_slice(&CELL_VOLTAGES_13_24_FRAME);
    bytes.extend_from_slice(&PROTECT_IC_FRAME);
    bytes
}

/// Delivers every frame of `bytes` in chunks of at most `chunk_size` bytes,
/// the way notifications never span two frames.
fn feed_frames(frames: &[&[u8]], chunk_size: usize) -> Vec<Event> {
    let mut assembler = FrameAssembler::new();
    let mut events = Vec::new();
    for frame in frames {
        for chunk in frame.chunks(chunk_size) {
            match assembler.feed(chunk) {
                Some(Ok(record)) => events.push(Event::Record(record)),
                Some(Err(err)) => events.push(Event::Rejected(err.to_string())),
                None => {}
            }
        }
    }
    events
}

fn frames(bytes: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let len = 8 + usize::from(rest[3]);
        let (frame, tail) = rest.split_at(len);
        frames.push(frame);
        rest = tail;
    }
    frames
}

#[rstest]
fn chunking_is_transparent(#[values(1, 2, 3, 7, 20, 32)] chunk_size: usize) {
    let bytes = stream();
    let frames = frames(&bytes);
    let reference = feed_frames(&frames, usize::MAX);
    assert_eq!(reference.len(), 6);
    assert_eq!(feed_frames(&frames, chunk_size), reference);
}

#[test]
fn stream_produces_records_and_one_rejection() {
    let bytes = stream();
    let events = feed_frames(&frames(&bytes), 20);

    assert_matches!(&events[0], Event::Record(Record::Status(status)) => {
        assert_eq!(status.current, -6.909);
        assert_eq!(status.total_voltage, 25.606);
        assert_eq!(status.temperatures[0], 18);
        assert_eq!(status.state_of_charge, 14);
    });
    assert_matches!(&events[1], Event::Record(Record::GeneralInfo(info)) => {
        assert_eq!(info.charging_cycles, 7);
    });
    assert_matches!(&events[2], Event::Rejected(reason) => {
        assert!(reason.contains("checksum mismatch"));
    });
    assert_matches!(&events[3], Event::Record(Record::CellVoltages(voltages)) => {
        let cells: Vec<u8> = voltages.cells.iter().map(|c| c.cell).collect();
        assert_eq!(cells, (1..=12).collect::<Vec<_>>());
    });
    assert_matches!(&events[4], Event::Record(Record::CellVoltages(voltages)) => {
        let cells: Vec<u8> = voltages.cells.iter().map(|c| c.cell).collect();
        assert_eq!(cells, (13..=24).collect::<Vec<_>>());
    });
    assert_matches!(&events[5], Event::Record(Record::ProtectIc(protect_ic)) => {
        assert_eq!(protect_ic.data.len(), 0x13);
    });
}

#[test]
fn flipped_checksum_yields_exactly_one_rejection() {
    let mut frame = STATUS_FRAME;
    frame[29] ^= 0x01;
    let events = feed_frames(&[&frame], 5);
    assert_eq!(events.len(), 1);
    assert_matches!(&events[0], Event::Rejected(reason) => {
        assert!(reason.contains("calculated=0x0582"));
        assert!(reason.contains("received=0x0482"));
    });
}

#[test]
fn interrupted_frame_is_dropped_silently() {
    let mut assembler = FrameAssembler::new();
    assert!(assembler.feed(&GENERAL_INFO_FRAME[..16]).is_none());
    assert!(assembler.feed(&STATUS_FRAME[..16]).is_none());
    assert_matches!(
        assembler.feed(&STATUS_FRAME[16..]),
        Some(Ok(Record::Status(_)))
    );
    assert_matches!(assembler.feed(&GENERAL_INFO_FRAME[16..]), Some(Err(_)));
}

#[test]
fn corrupt_frame_does_not_block_the_next_one() {
    let mut assembler = FrameAssembler::new();
    let mut frame = GENERAL_INFO_FRAME;
    frame[3] = 0x10;
    assert_matches!(
        assembler.feed(&frame),
        Some(Err(Error::LengthMismatch { .. }))
    );
    assert_matches!(
        assembler.feed(&GENERAL_INFO_FRAME),
        Some(Ok(Record::GeneralInfo(_)))
    );
}

#[rstest]
#[case(StartOfFrame::A, 0x2a)]
#[case(StartOfFrame::B, 0x2b)]
#[case(StartOfFrame::A, 0xfe)]
fn commands_are_valid_frames(#[case] start: StartOfFrame, #[case] frame_type: u8) {
    let command = build_command(start, frame_type, 0);
    assert_eq!(command.len(), 9);
    let frame = Frame::parse(&command).unwrap();
    assert_eq!(frame.as_bytes()[0], start as u8);
    assert_eq!(frame.frame_type(), frame_type);
}
