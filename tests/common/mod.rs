#![allow(dead_code)]

use midiseqrs::midi::MidiEvent;
use midiseqrs::synth::{Result, Synth};
use std::sync::Mutex;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Synth that remembers every call made to it
#[derive(Default)]
pub struct RecordingSynth {
    pub events: Mutex<Vec<MidiEvent>>,
    pub notes_off: Mutex<Vec<u8>>,
    pub sounds_off: Mutex<Vec<u8>>,
    pub resets: Mutex<usize>,
    pub rendered: Mutex<usize>,
}

impl RecordingSynth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MidiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn note_ons(&self) -> Vec<MidiEvent> {
        self.events()
            .into_iter()
            .filter(MidiEvent::is_sounding_note_on)
            .collect()
    }

    pub fn notes_off(&self) -> Vec<u8> {
        self.notes_off.lock().unwrap().clone()
    }

    pub fn sounds_off(&self) -> Vec<u8> {
        self.sounds_off.lock().unwrap().clone()
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock().unwrap()
    }

    pub fn rendered_frames(&self) -> usize {
        *self.rendered.lock().unwrap()
    }
}

impl Synth for RecordingSynth {
    fn handle_event(&self, event: &MidiEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn all_notes_off(&self, channel: u8) -> Result<()> {
        self.notes_off.lock().unwrap().push(channel);
        Ok(())
    }

    fn all_sounds_off(&self, channel: u8) -> Result<()> {
        self.sounds_off.lock().unwrap().push(channel);
        Ok(())
    }

    fn system_reset(&self) -> Result<()> {
        *self.resets.lock().unwrap() += 1;
        Ok(())
    }

    fn sample_rate(&self) -> f64 {
        44_100.0
    }

    fn process(&self, frames: usize, _fx: &mut [&mut [f32]], out: &mut [&mut [f32]]) -> Result<()> {
        for buffer in out.iter_mut() {
            buffer[..frames].fill(0.25);
        }
        *self.rendered.lock().unwrap() += frames;
        Ok(())
    }
}

pub fn vlq(mut value: u32) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        bytes.push(((value & 0x7F) as u8) | 0x80);
        value >>= 7;
    }
    bytes.reverse();
    bytes
}

/// Track chunk body: delta-time/message pairs
#[derive(Default)]
pub struct TrackBuilder {
    data: Vec<u8>,
}

impl TrackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw message bytes after a delta time.
    pub fn event(mut self, delta: u32, bytes: &[u8]) -> Self {
        self.data.extend(vlq(delta));
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn note_on(self, delta: u32, channel: u8, key: u8, velocity: u8) -> Self {
        self.event(delta, &[0x90 | channel, key, velocity])
    }

    pub fn note_off(self, delta: u32, channel: u8, key: u8) -> Self {
        self.event(delta, &[0x80 | channel, key, 0])
    }

    pub fn tempo(self, delta: u32, micros: u32) -> Self {
        let [_, b0, b1, b2] = micros.to_be_bytes();
        self.event(delta, &[0xFF, 0x51, 0x03, b0, b1, b2])
    }

    pub fn meta(self, delta: u32, meta_type: u8, payload: &[u8]) -> Self {
        let mut bytes = vec![0xFF, meta_type];
        bytes.extend(vlq(payload.len() as u32));
        bytes.extend_from_slice(payload);
        self.event(delta, &bytes)
    }

    pub fn end(self, delta: u32) -> Self {
        self.event(delta, &[0xFF, 0x2F, 0x00])
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Standard MIDI File image
pub struct SmfBuilder {
    format: u16,
    division: u16,
    chunks: Vec<([u8; 4], Vec<u8>)>,
}

impl SmfBuilder {
    pub fn new(format: u16, division: u16) -> Self {
        Self {
            format,
            division,
            chunks: Vec::new(),
        }
    }

    pub fn track(mut self, track: TrackBuilder) -> Self {
        self.chunks.push((*b"MTrk", track.data));
        self
    }

    /// A chunk the loader must skip.
    pub fn chunk(mut self, id: [u8; 4], data: &[u8]) -> Self {
        self.chunks.push((id, data.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let tracks = self.chunks.iter().filter(|(id, _)| id == b"MTrk").count() as u16;
        let mut bytes = b"MThd".to_vec();
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&self.format.to_be_bytes());
        bytes.extend_from_slice(&tracks.to_be_bytes());
        bytes.extend_from_slice(&self.division.to_be_bytes());
        for (id, data) in &self.chunks {
            bytes.extend_from_slice(id);
            bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
            bytes.extend_from_slice(data);
        }
        bytes
    }
}

/// One track: a note on channel 0 at tick 0, released at `length`.
pub fn single_note_song(division: u16, length: u32) -> Vec<u8> {
    SmfBuilder::new(0, division)
        .track(
            TrackBuilder::new()
                .note_on(0, 0, 60, 100)
                .note_off(length, 0, 60)
                .end(0),
        )
        .build()
}
