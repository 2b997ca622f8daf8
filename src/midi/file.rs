//! Standard MIDI File loading
//!
//! Reads the `MThd` header and the `MTrk` chunks of format 0 and format 1
//! files. Each track chunk is decoded with a file-mode [`MidiEventParser`].

use super::event::{EventType, MidiEvent, META_TRACK_NAME};
use super::parser::{MidiEventParser, ParseMode, DEFAULT_SCRATCH_CAPACITY};
use crate::transport::Track;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Maximum number of tracks a song may carry
pub const MAX_TRACKS: usize = 128;

const HEADER_CHUNK: &[u8; 4] = b"MThd";
const TRACK_CHUNK: &[u8; 4] = b"MTrk";

/// Error type for MIDI file loading
#[derive(Debug)]
pub enum MidiFileError {
    /// The file could not be read
    Io(io::Error),
    /// The data does not start with an `MThd` header
    NotMidi,
    /// The data ended inside the named structure
    Truncated(&'static str),
    /// Only formats 0 and 1 are played
    UnsupportedFormat(u16),
    /// SMPTE time division is not supported
    SmpteTiming,
    /// A division of zero ticks per quarter note
    InvalidDivision,
    /// More tracks than the player can hold
    TooManyTracks(usize),
}

impl fmt::Display for MidiFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiFileError::Io(err) => write!(f, "MIDI file read error: {}", err),
            MidiFileError::NotMidi => write!(f, "Not a Standard MIDI File"),
            MidiFileError::Truncated(what) => write!(f, "MIDI file truncated in {}", what),
            MidiFileError::UnsupportedFormat(format) => {
                write!(f, "Unsupported MIDI file format {}", format)
            }
            MidiFileError::SmpteTiming => write!(f, "SMPTE time division is not supported"),
            MidiFileError::InvalidDivision => write!(f, "MIDI file division is zero"),
            MidiFileError::TooManyTracks(count) => write!(
                f,
                "MIDI file has {} tracks, at most {} are supported",
                count, MAX_TRACKS
            ),
        }
    }
}

impl Error for MidiFileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MidiFileError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for MidiFileError {
    fn from(err: io::Error) -> Self {
        MidiFileError::Io(err)
    }
}

/// A decoded Standard MIDI File
#[derive(Debug, Clone)]
pub struct MidiFile {
    format: u16,
    division: u16,
    tracks: Vec<Track>,
}

impl MidiFile {
    /// Reads and decodes the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MidiFileError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        info!("Loading MIDI file {} ({} bytes)", path.display(), bytes.len());
        Self::from_bytes(&bytes)
    }

    /// Decodes a complete file held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MidiFileError> {
        let mut reader = ChunkReader::new(bytes);

        let (id, header) = reader.chunk().ok_or(MidiFileError::NotMidi)?;
        if id != HEADER_CHUNK {
            return Err(MidiFileError::NotMidi);
        }
        if header.len() < 6 {
            return Err(MidiFileError::Truncated("header"));
        }

        let format = u16::from_be_bytes([header[0], header[1]]);
        let declared_tracks = usize::from(u16::from_be_bytes([header[2], header[3]]));
        let division = u16::from_be_bytes([header[4], header[5]]);

        if format > 1 {
            return Err(MidiFileError::UnsupportedFormat(format));
        }
        if division & 0x8000 != 0 {
            return Err(MidiFileError::SmpteTiming);
        }
        if division == 0 {
            return Err(MidiFileError::InvalidDivision);
        }
        if declared_tracks > MAX_TRACKS {
            return Err(MidiFileError::TooManyTracks(declared_tracks));
        }
        debug!(
            "MIDI header: format {}, {} tracks, division {}",
            format, declared_tracks, division
        );

        let mut tracks = Vec::with_capacity(declared_tracks);
        while tracks.len() < declared_tracks {
            let Some((id, data)) = reader.chunk() else {
                warn!(
                    "MIDI file declares {} tracks but only {} were found",
                    declared_tracks,
                    tracks.len()
                );
                break;
            };
            if id != TRACK_CHUNK {
                debug!("Skipping unknown chunk {:?}", String::from_utf8_lossy(id));
                continue;
            }
            tracks.push(decode_track(tracks.len(), data));
        }

        Ok(Self {
            format,
            division,
            tracks,
        })
    }

    pub fn format(&self) -> u16 {
        self.format
    }

    /// Ticks per quarter note.
    pub fn division(&self) -> u16 {
        self.division
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }

    /// Length of the longest track in ticks.
    pub fn duration_ticks(&self) -> u64 {
        self.tracks
            .iter()
            .map(Track::duration_ticks)
            .max()
            .unwrap_or(0)
    }
}

/// Checks whether the file at `path` starts with an `MThd` header.
pub fn is_midi_file<P: AsRef<Path>>(path: P) -> bool {
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .map(|_| &magic == HEADER_CHUNK)
        .unwrap_or(false)
}

/// Splits the file into `(id, data)` chunks.
struct ChunkReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn chunk(&mut self) -> Option<(&'a [u8], &'a [u8])> {
        let rest = &self.bytes[self.pos..];
        if rest.len() < 8 {
            return None;
        }
        let id = &rest[..4];
        let declared = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let available = rest.len() - 8;
        let len = if declared > available {
            warn!(
                "Chunk declares {} bytes but only {} remain, reading to end of data",
                declared, available
            );
            available
        } else {
            declared
        };
        self.pos += 8 + len;
        Some((id, &rest[8..8 + len]))
    }
}

/// Reads a variable-length quantity, returning it with the bytes consumed.
fn read_vlq(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut value = 0u32;
    for (i, &byte) in bytes.iter().take(4).enumerate() {
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

fn decode_track(index: usize, data: &[u8]) -> Track {
    let mut track = Track::new(index);
    let mut parser =
        MidiEventParser::with_capacity(ParseMode::File, data.len().max(DEFAULT_SCRATCH_CAPACITY));
    let mut pos = 0;
    let mut pending_delay = 0u32;

    'events: while pos < data.len() {
        let Some((delta, used)) = read_vlq(&data[pos..]) else {
            warn!("Track {}: malformed delta time at offset {}", index, pos);
            break;
        };
        pos += used;
        pending_delay = pending_delay.saturating_add(delta);

        let mut started = false;
        while pos < data.len() {
            let byte = data[pos];
            pos += 1;
            if let Some(event) = parser.feed(byte) {
                let event = event.with_delay(pending_delay);
                pending_delay = 0;
                let finished = event.is_end_of_track();
                record(&mut track, event);
                if finished {
                    break 'events;
                }
                continue 'events;
            }
            if parser.is_idle() {
                if started {
                    // Dropped message (escape packet, oversized meta...):
                    // its delay carries over to the next event.
                    continue 'events;
                }
            } else {
                started = true;
            }
        }
    }

    if !parser.is_idle() {
        debug!("Track {}: data ended inside a message", index);
    }
    debug!(
        "Track {}: {} events, {} ticks",
        index,
        track.len(),
        track.duration_ticks()
    );
    track
}

fn record(track: &mut Track, event: MidiEvent) {
    if track.name().is_none() && event.event_type() == EventType::Meta(META_TRACK_NAME) {
        if let Some(name) = event.text() {
            track.set_name(name);
        }
    }
    track.push(event);
}
