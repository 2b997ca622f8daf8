//! Incremental MIDI byte decoder
//!
//! [`MidiEventParser`] consumes one byte per call and hands back a
//! [`MidiEvent`] only when a message completes. All state lives in the parser,
//! so a stream can be fed in arbitrary pieces.

use super::event::{EventType, MidiEvent, META_END_OF_TRACK, META_SET_TEMPO};
use log::{debug, trace, warn};

/// Default size of the scratch buffer used for sysex and meta payloads
pub const DEFAULT_SCRATCH_CAPACITY: usize = 1024;

/// Variable-length quantities in MIDI files are at most four bytes long
const MAX_VLQ_BYTES: u8 = 4;

/// How the byte stream is framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Wire stream: `0xFF` is System Reset and sysex runs from `F0` to `F7`.
    Live,
    /// Standard MIDI File track data: `0xFF` starts a meta event and
    /// `F0`/`F7` are followed by a length and that many raw bytes.
    File,
}

/// What a length-prefixed payload will become once read (file mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Meta(u8),
    SysEx,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    CollectingData {
        event_type: EventType,
        channel: u8,
        data: [u8; 2],
        received: usize,
    },
    CollectingSysex,
    /// Sysex overflowed the scratch buffer; swallow bytes until it ends.
    Discarding,
    MetaType,
    Length {
        pending: Pending,
        value: u32,
        bytes: u8,
    },
    CollectingPayload {
        pending: Pending,
        remaining: usize,
    },
    /// Payload too large to buffer; skip it by length.
    Skipping {
        remaining: usize,
    },
}

/// Resumable byte-at-a-time MIDI decoder
#[derive(Debug)]
pub struct MidiEventParser {
    mode: ParseMode,
    capacity: usize,
    state: State,
    running_status: Option<(EventType, u8)>,
    scratch: Vec<u8>,
}

impl MidiEventParser {
    pub fn new(mode: ParseMode) -> Self {
        Self::with_capacity(mode, DEFAULT_SCRATCH_CAPACITY)
    }

    pub fn with_capacity(mode: ParseMode, capacity: usize) -> Self {
        Self {
            mode,
            capacity,
            state: State::Idle,
            running_status: None,
            scratch: Vec::with_capacity(capacity),
        }
    }

    /// True when no message is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Drops any partial message and forgets running status.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.running_status = None;
        self.scratch.clear();
    }

    /// Decodes every complete message found in `bytes`.
    pub fn feed_slice(&mut self, bytes: &[u8]) -> Vec<MidiEvent> {
        bytes.iter().filter_map(|&byte| self.feed(byte)).collect()
    }

    /// Consumes one byte, returning an event when it completes a message.
    pub fn feed(&mut self, byte: u8) -> Option<MidiEvent> {
        // Length-prefixed file data is raw: any byte value belongs to it.
        match self.state {
            State::MetaType => {
                self.state = State::Length {
                    pending: Pending::Meta(byte),
                    value: 0,
                    bytes: 0,
                };
                return None;
            }
            State::Length {
                pending,
                value,
                bytes,
            } => return self.length_byte(pending, value, bytes, byte),
            State::CollectingPayload { pending, remaining } => {
                self.scratch.push(byte);
                if remaining <= 1 {
                    return self.finish_payload(pending);
                }
                self.state = State::CollectingPayload {
                    pending,
                    remaining: remaining - 1,
                };
                return None;
            }
            State::Skipping { remaining } => {
                self.state = if remaining <= 1 {
                    State::Idle
                } else {
                    State::Skipping {
                        remaining: remaining - 1,
                    }
                };
                return None;
            }
            _ => {}
        }

        if byte & 0x80 != 0 {
            self.status_byte(byte)
        } else {
            self.data_byte(byte)
        }
    }

    fn status_byte(&mut self, status: u8) -> Option<MidiEvent> {
        match status {
            0xF8 | 0xFA | 0xFB | 0xFC | 0xFE => {
                EventType::from_status(status).map(MidiEvent::system)
            }
            0xFF if self.mode == ParseMode::Live => {
                self.running_status = None;
                Some(MidiEvent::system(EventType::SystemReset))
            }
            // Undefined real-time bytes
            0xF9 | 0xFD => {
                trace!("Ignoring undefined real-time byte 0x{:02X}", status);
                None
            }
            0xFF => {
                self.abort_partial();
                self.state = State::MetaType;
                None
            }
            0xF7 => self.end_of_exclusive(),
            0xF0 => {
                self.abort_partial();
                match self.mode {
                    ParseMode::Live => {
                        self.running_status = None;
                        self.scratch.clear();
                        self.state = State::CollectingSysex;
                    }
                    ParseMode::File => self.begin_length(Pending::SysEx),
                }
                None
            }
            0xF6 => {
                self.abort_partial();
                Some(MidiEvent::system(EventType::TuneRequest))
            }
            0xF4 | 0xF5 => {
                self.abort_partial();
                self.running_status = None;
                debug!("Dropping undefined system common byte 0x{:02X}", status);
                None
            }
            _ => {
                self.abort_partial();
                let event_type = EventType::from_status(status)?;
                let channel = if event_type.is_channel_message() {
                    self.running_status = Some((event_type, status & 0x0F));
                    status & 0x0F
                } else {
                    // System common messages cancel running status
                    self.running_status = None;
                    0
                };
                self.state = State::CollectingData {
                    event_type,
                    channel,
                    data: [0; 2],
                    received: 0,
                };
                None
            }
        }
    }

    fn data_byte(&mut self, byte: u8) -> Option<MidiEvent> {
        match self.state {
            State::Idle => match self.running_status {
                Some((event_type, channel)) => self.collect(event_type, channel, [0; 2], 0, byte),
                None => {
                    trace!("Dropping stray data byte 0x{:02X}", byte);
                    None
                }
            },
            State::CollectingData {
                event_type,
                channel,
                data,
                received,
            } => self.collect(event_type, channel, data, received, byte),
            State::CollectingSysex => {
                if self.scratch.len() >= self.capacity {
                    warn!(
                        "SysEx message exceeds {} bytes, discarding it",
                        self.capacity
                    );
                    self.scratch.clear();
                    self.state = State::Discarding;
                } else {
                    self.scratch.push(byte);
                }
                None
            }
            _ => None,
        }
    }

    fn collect(
        &mut self,
        event_type: EventType,
        channel: u8,
        mut data: [u8; 2],
        received: usize,
        byte: u8,
    ) -> Option<MidiEvent> {
        data[received] = byte;
        let received = received + 1;
        if received < event_type.data_len() {
            self.state = State::CollectingData {
                event_type,
                channel,
                data,
                received,
            };
            return None;
        }

        self.state = State::Idle;
        let event = match event_type {
            EventType::PitchBend | EventType::SongPosition => MidiEvent::new(
                event_type,
                channel,
                (u32::from(data[1]) << 7) | u32::from(data[0]),
                0,
            ),
            _ if event_type.data_len() == 1 => {
                MidiEvent::new(event_type, channel, data[0].into(), 0)
            }
            _ => MidiEvent::new(event_type, channel, data[0].into(), data[1].into()),
        };
        Some(event)
    }

    fn end_of_exclusive(&mut self) -> Option<MidiEvent> {
        match (self.mode, self.state) {
            (ParseMode::Live, State::CollectingSysex) => {
                self.state = State::Idle;
                let event = MidiEvent::sysex(&self.scratch);
                self.scratch.clear();
                Some(event)
            }
            (ParseMode::Live, State::Discarding) => {
                self.state = State::Idle;
                None
            }
            (ParseMode::File, _) => {
                self.abort_partial();
                self.begin_length(Pending::Escape);
                None
            }
            _ => {
                self.abort_partial();
                trace!("Dropping stray end-of-exclusive byte");
                None
            }
        }
    }

    /// A non-real-time status byte arrived: whatever was in progress is lost.
    fn abort_partial(&mut self) {
        match self.state {
            State::Idle => {}
            State::CollectingSysex => {
                debug!(
                    "Dropping unterminated SysEx message ({} bytes)",
                    self.scratch.len()
                );
                self.scratch.clear();
            }
            State::CollectingData { event_type, .. } => {
                debug!("Dropping incomplete {} message", event_type);
            }
            _ => {}
        }
        self.state = State::Idle;
    }

    fn begin_length(&mut self, pending: Pending) {
        self.state = State::Length {
            pending,
            value: 0,
            bytes: 0,
        };
    }

    fn length_byte(
        &mut self,
        pending: Pending,
        value: u32,
        bytes: u8,
        byte: u8,
    ) -> Option<MidiEvent> {
        let value = (value << 7) | u32::from(byte & 0x7F);
        let bytes = bytes + 1;
        if byte & 0x80 != 0 {
            if bytes >= MAX_VLQ_BYTES {
                warn!("Variable-length quantity longer than {} bytes", MAX_VLQ_BYTES);
                self.state = State::Idle;
            } else {
                self.state = State::Length {
                    pending,
                    value,
                    bytes,
                };
            }
            return None;
        }

        let length = value as usize;
        if length > self.capacity {
            debug!(
                "Skipping {} byte payload larger than {} byte buffer",
                length, self.capacity
            );
            self.state = State::Skipping { remaining: length };
            return None;
        }

        self.scratch.clear();
        if length == 0 {
            return self.finish_payload(pending);
        }
        self.state = State::CollectingPayload {
            pending,
            remaining: length,
        };
        None
    }

    fn finish_payload(&mut self, pending: Pending) -> Option<MidiEvent> {
        self.state = State::Idle;
        let event = match pending {
            Pending::Meta(META_SET_TEMPO) => match self.scratch[..] {
                [b0, b1, b2] => Some(MidiEvent::tempo(
                    (u32::from(b0) << 16) | (u32::from(b1) << 8) | u32::from(b2),
                )),
                _ => {
                    warn!("Set-Tempo meta with {} byte payload", self.scratch.len());
                    None
                }
            },
            Pending::Meta(META_END_OF_TRACK) => Some(MidiEvent::end_of_track()),
            Pending::Meta(meta_type) => Some(MidiEvent::meta(meta_type, &self.scratch)),
            Pending::SysEx => {
                let payload = match self.scratch.split_last() {
                    Some((&0xF7, rest)) => rest,
                    _ => &self.scratch[..],
                };
                Some(MidiEvent::sysex(payload))
            }
            Pending::Escape => None,
        };
        self.scratch.clear();
        event
    }
}
