//! Decoded MIDI events
//!
//! A [`MidiEvent`] is the unit that flows from the parser into tracks and from
//! the transport into the synthesizer. Channel and system messages carry their
//! data in `param1`/`param2`; system-exclusive and most meta events carry an
//! owned payload, with `param1` holding its length.

use std::fmt;

/// Number of MIDI channels tracked by the transport
pub const CHANNEL_COUNT: usize = 16;

pub const META_SEQUENCE_NUMBER: u8 = 0x00;
pub const META_TEXT: u8 = 0x01;
pub const META_COPYRIGHT: u8 = 0x02;
pub const META_TRACK_NAME: u8 = 0x03;
pub const META_INSTRUMENT_NAME: u8 = 0x04;
pub const META_LYRIC: u8 = 0x05;
pub const META_MARKER: u8 = 0x06;
pub const META_CUE_POINT: u8 = 0x07;
pub const META_CHANNEL_PREFIX: u8 = 0x20;
pub const META_END_OF_TRACK: u8 = 0x2F;
pub const META_SET_TEMPO: u8 = 0x51;
pub const META_SMPTE_OFFSET: u8 = 0x54;
pub const META_TIME_SIGNATURE: u8 = 0x58;
pub const META_KEY_SIGNATURE: u8 = 0x59;
pub const META_SEQUENCER_SPECIFIC: u8 = 0x7F;

/// Controller numbers the transport sends on its own
pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Kind of a decoded MIDI event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    NoteOff,
    NoteOn,
    KeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    SysEx,
    /// MIDI Time Code quarter frame
    TimeCode,
    SongPosition,
    SongSelect,
    TuneRequest,
    TimingClock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    SystemReset,
    /// Standard MIDI File meta event, tagged with its meta type
    Meta(u8),
}

impl EventType {
    /// Classifies a status byte. Returns `None` for data bytes and for the
    /// undefined system bytes.
    pub fn from_status(status: u8) -> Option<Self> {
        match status {
            0x80..=0x8F => Some(EventType::NoteOff),
            0x90..=0x9F => Some(EventType::NoteOn),
            0xA0..=0xAF => Some(EventType::KeyPressure),
            0xB0..=0xBF => Some(EventType::ControlChange),
            0xC0..=0xCF => Some(EventType::ProgramChange),
            0xD0..=0xDF => Some(EventType::ChannelPressure),
            0xE0..=0xEF => Some(EventType::PitchBend),
            0xF0 => Some(EventType::SysEx),
            0xF1 => Some(EventType::TimeCode),
            0xF2 => Some(EventType::SongPosition),
            0xF3 => Some(EventType::SongSelect),
            0xF6 => Some(EventType::TuneRequest),
            0xF8 => Some(EventType::TimingClock),
            0xFA => Some(EventType::Start),
            0xFB => Some(EventType::Continue),
            0xFC => Some(EventType::Stop),
            0xFE => Some(EventType::ActiveSensing),
            0xFF => Some(EventType::SystemReset),
            _ => None,
        }
    }

    /// Raw type code: the status byte (without channel) for channel and
    /// system messages, the meta type for meta events.
    pub fn as_u8(self) -> u8 {
        match self {
            EventType::NoteOff => 0x80,
            EventType::NoteOn => 0x90,
            EventType::KeyPressure => 0xA0,
            EventType::ControlChange => 0xB0,
            EventType::ProgramChange => 0xC0,
            EventType::ChannelPressure => 0xD0,
            EventType::PitchBend => 0xE0,
            EventType::SysEx => 0xF0,
            EventType::TimeCode => 0xF1,
            EventType::SongPosition => 0xF2,
            EventType::SongSelect => 0xF3,
            EventType::TuneRequest => 0xF6,
            EventType::TimingClock => 0xF8,
            EventType::Start => 0xFA,
            EventType::Continue => 0xFB,
            EventType::Stop => 0xFC,
            EventType::ActiveSensing => 0xFE,
            EventType::SystemReset => 0xFF,
            EventType::Meta(kind) => kind,
        }
    }

    /// Number of data bytes following the status byte for fixed-size
    /// messages. Variable-length messages report 0.
    pub fn data_len(self) -> usize {
        match self {
            EventType::NoteOff
            | EventType::NoteOn
            | EventType::KeyPressure
            | EventType::ControlChange
            | EventType::PitchBend
            | EventType::SongPosition => 2,
            EventType::ProgramChange
            | EventType::ChannelPressure
            | EventType::TimeCode
            | EventType::SongSelect => 1,
            _ => 0,
        }
    }

    pub fn is_channel_message(self) -> bool {
        matches!(
            self,
            EventType::NoteOff
                | EventType::NoteOn
                | EventType::KeyPressure
                | EventType::ControlChange
                | EventType::ProgramChange
                | EventType::ChannelPressure
                | EventType::PitchBend
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Meta(kind) => write!(f, "Meta(0x{:02X})", kind),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A single decoded MIDI event
///
/// Events are immutable once built; `with_delay` consumes the event and
/// returns a copy carrying the delta time it had in its track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiEvent {
    event_type: EventType,
    channel: u8,
    param1: u32,
    param2: u32,
    delay_ticks: u32,
    payload: Option<Box<[u8]>>,
}

impl MidiEvent {
    /// Builds a channel or system message from its type and data values.
    pub fn new(event_type: EventType, channel: u8, param1: u32, param2: u32) -> Self {
        Self {
            event_type,
            channel: channel & 0x0F,
            param1,
            param2,
            delay_ticks: 0,
            payload: None,
        }
    }

    pub fn note_on(channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(EventType::NoteOn, channel, key.into(), velocity.into())
    }

    pub fn note_off(channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(EventType::NoteOff, channel, key.into(), velocity.into())
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::new(
            EventType::ControlChange,
            channel,
            controller.into(),
            value.into(),
        )
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        Self::new(EventType::ProgramChange, channel, program.into(), 0)
    }

    /// Pitch bend with its 14-bit value (0x2000 is centre).
    pub fn pitch_bend(channel: u8, value: u16) -> Self {
        Self::new(EventType::PitchBend, channel, u32::from(value & 0x3FFF), 0)
    }

    /// A message without data bytes (real-time and Tune Request).
    pub fn system(event_type: EventType) -> Self {
        Self::new(event_type, 0, 0, 0)
    }

    /// System-exclusive message; `payload` excludes the framing `F0`/`F7`.
    pub fn sysex(payload: &[u8]) -> Self {
        Self {
            event_type: EventType::SysEx,
            channel: 0,
            param1: payload.len() as u32,
            param2: 0,
            delay_ticks: 0,
            payload: Some(payload.into()),
        }
    }

    /// Meta event carrying its raw payload.
    pub fn meta(meta_type: u8, payload: &[u8]) -> Self {
        Self {
            event_type: EventType::Meta(meta_type),
            channel: 0,
            param1: payload.len() as u32,
            param2: 0,
            delay_ticks: 0,
            payload: Some(payload.into()),
        }
    }

    /// Set-Tempo meta event, in microseconds per quarter note.
    pub fn tempo(micros_per_quarter: u32) -> Self {
        Self::new(EventType::Meta(META_SET_TEMPO), 0, micros_per_quarter, 0)
    }

    pub fn end_of_track() -> Self {
        Self::new(EventType::Meta(META_END_OF_TRACK), 0, 0, 0)
    }

    /// Returns the event with its delta time (ticks since the previous event
    /// of the same track).
    pub fn with_delay(mut self, delay_ticks: u32) -> Self {
        self.delay_ticks = delay_ticks;
        self
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn param1(&self) -> u32 {
        self.param1
    }

    pub fn param2(&self) -> u32 {
        self.param2
    }

    pub fn delay_ticks(&self) -> u32 {
        self.delay_ticks
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// A Note On that actually starts a note (velocity 0 means Note Off).
    pub fn is_sounding_note_on(&self) -> bool {
        self.event_type == EventType::NoteOn && self.param2 != 0
    }

    pub fn is_note(&self) -> bool {
        matches!(self.event_type, EventType::NoteOn | EventType::NoteOff)
    }

    pub fn is_end_of_track(&self) -> bool {
        self.event_type == EventType::Meta(META_END_OF_TRACK)
    }

    /// Tempo in microseconds per quarter note, for Set-Tempo events.
    pub fn tempo_value(&self) -> Option<u32> {
        match self.event_type {
            EventType::Meta(META_SET_TEMPO) => Some(self.param1),
            _ => None,
        }
    }

    /// Text of text-like meta events (track name, lyrics, markers...).
    pub fn text(&self) -> Option<String> {
        match self.event_type {
            EventType::Meta(META_TEXT..=META_CUE_POINT) => self
                .payload()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    /// Encodes the event as wire bytes. Meta events have no wire form.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let data1 = (self.param1 & 0x7F) as u8;
        let data2 = (self.param2 & 0x7F) as u8;
        let status = self.event_type.as_u8();
        match self.event_type {
            EventType::NoteOff
            | EventType::NoteOn
            | EventType::KeyPressure
            | EventType::ControlChange => Some(vec![status | self.channel, data1, data2]),
            EventType::ProgramChange | EventType::ChannelPressure => {
                Some(vec![status | self.channel, data1])
            }
            EventType::PitchBend => Some(vec![
                status | self.channel,
                (self.param1 & 0x7F) as u8,
                ((self.param1 >> 7) & 0x7F) as u8,
            ]),
            EventType::SongPosition => Some(vec![
                status,
                (self.param1 & 0x7F) as u8,
                ((self.param1 >> 7) & 0x7F) as u8,
            ]),
            EventType::TimeCode | EventType::SongSelect => Some(vec![status, data1]),
            EventType::SysEx => {
                let payload = self.payload().unwrap_or_default();
                let mut bytes = Vec::with_capacity(payload.len() + 2);
                bytes.push(0xF0);
                bytes.extend_from_slice(payload);
                bytes.push(0xF7);
                Some(bytes)
            }
            EventType::Meta(_) => None,
            _ => Some(vec![status]),
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.event_type.is_channel_message() {
            write!(
                f,
                "{} ch={} p1={} p2={}",
                self.event_type, self.channel, self.param1, self.param2
            )
        } else if let Some(payload) = self.payload() {
            write!(f, "{} len={}", self.event_type, payload.len())
        } else {
            write!(f, "{} p1={}", self.event_type, self.param1)
        }
    }
}
