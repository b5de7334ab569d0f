//! Glue between the frame assembler and the collaborators of a connection.
//!
//! A [`Session`] owns the assembler of one link together with the transport
//! it writes commands to and the sink it hands decoded records to. Both are
//! injected by the host; nothing here blocks or performs I/O on its own
//! besides calling [`Transport::write`].

use crate::assembler::FrameAssembler;
use crate::protocol::{build_command, Record, StartOfFrame, POLL_SEQUENCE};
use crate::Error;

/// Outgoing side of the link, e.g. a serial port or a BLE characteristic.
pub trait Transport {
    fn write(&mut self, frame: &[u8]) -> Result<(), Error>;
}

/// Receiver of everything the assembler produces.
pub trait RecordSink {
    fn on_record(&mut self, record: Record);

    /// Called for every rejected frame. Errors are recoverable, the next
    /// frame is decoded normally.
    fn on_error(&mut self, error: Error) {
        log::debug!("Frame rejected: {error}");
    }
}

/// Round robin over the frame types to request.
#[derive(Debug, Clone)]
pub struct CommandCycle {
    start: StartOfFrame,
    frame_types: Vec<u8>,
    next: usize,
}

impl CommandCycle {
    /// Returns `None` if `frame_types` is empty.
    pub fn new(start: StartOfFrame, frame_types: Vec<u8>) -> Option<Self> {
        if frame_types.is_empty() {
            return None;
        }
        Some(Self {
            start,
            frame_types,
            next: 0,
        })
    }

    pub fn next_frame_type(&mut self) -> u8 {
        let frame_type = self.frame_types[self.next];
        self.next = (self.next + 1) % self.frame_types.len();
        frame_type
    }

    pub fn next_command(&mut self) -> Vec<u8> {
        let frame_type = self.next_frame_type();
        build_command(self.start, frame_type, 0)
    }
}

impl Default for CommandCycle {
    fn default() -> Self {
        Self {
            start: StartOfFrame::A,
            frame_types: POLL_SEQUENCE.iter().map(|t| *t as u8).collect(),
            next: 0,
        }
    }
}

pub struct Session<T, S> {
    transport: T,
    sink: S,
    assembler: FrameAssembler,
}

impl<T: Transport, S: RecordSink> Session<T, S> {
    pub fn new(transport: T, sink: S) -> Self {
        Self {
            transport,
            sink,
            assembler: FrameAssembler::new(),
        }
    }

    /// Hands one received chunk to the assembler and forwards its event.
    pub fn on_chunk(&mut self, chunk: &[u8]) {
        match self.assembler.feed(chunk) {
            Some(Ok(record)) => self.sink.on_record(record),
            Some(Err(error)) => self.sink.on_error(error),
            None => {}
        }
    }

    pub fn request(&mut self, start: StartOfFrame, frame_type: u8, value: u8) -> Result<(), Error> {
        let command = build_command(start, frame_type, value);
        self.transport.write(&command)
    }

    /// Writes the next command of `cycle`.
    pub fn poll(&mut self, cycle: &mut CommandCycle) -> Result<(), Error> {
        let command = cycle.next_command();
        log::trace!("poll command: {command:02X?}");
        self.transport.write(&command)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_parts(self) -> (T, S) {
        (self.transport, self.sink)
    }
}
