use super::{MidiEvent, CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF};
use crate::synth::{Result, Synth, SynthError};
use log::{debug, info};
use midir::{MidiOutput, MidiOutputConnection};
use std::sync::Mutex;

/// Synth that forwards events to an external MIDI output port
///
/// Rendering produces silence; the sound comes from the device on the
/// other end of the port.
pub struct MidiOutSynth {
    connection: Mutex<MidiOutputConnection>,
    sample_rate: f64,
}

impl MidiOutSynth {
    /// Connects to the first output port whose name contains `device_name`,
    /// or to the first port available.
    pub fn connect(device_name: Option<&str>, sample_rate: f64) -> Result<Self> {
        let midi_out =
            MidiOutput::new("midiseqrs-output").map_err(|e| SynthError::new(e.to_string()))?;

        let out_ports = midi_out.ports();
        let available_ports: Vec<String> = out_ports
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect();
        debug!("Available MIDI output ports: {:?}", available_ports);

        let port = match device_name {
            Some(name) => out_ports.iter().find(|p| {
                midi_out
                    .port_name(p)
                    .unwrap_or_default()
                    .contains(name)
            }),
            None => out_ports.first(),
        }
        .ok_or_else(|| SynthError::new("MIDI output device not found"))?;

        let port_name = midi_out.port_name(port).unwrap_or_default();
        info!("Connecting to MIDI output port: {}", port_name);
        let connection = midi_out
            .connect(port, "midiseqrs-output-conn")
            .map_err(|e| SynthError::new(e.to_string()))?;

        Ok(Self {
            connection: Mutex::new(connection),
            sample_rate,
        })
    }

    /// Names of the available output ports.
    pub fn list_ports() -> Result<Vec<String>> {
        let midi_out = MidiOutput::new("midiseqrs-port-lister")
            .map_err(|e| SynthError::new(e.to_string()))?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect())
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut connection = self
            .connection
            .lock()
            .map_err(|_| SynthError::new("MIDI output connection poisoned"))?;
        connection
            .send(bytes)
            .map_err(|e| SynthError::new(e.to_string()))
    }
}

impl Synth for MidiOutSynth {
    fn handle_event(&self, event: &MidiEvent) -> Result<()> {
        match event.to_bytes() {
            Some(bytes) => self.send(&bytes),
            None => Ok(()),
        }
    }

    fn all_notes_off(&self, channel: u8) -> Result<()> {
        debug!("Sending All Notes Off: ch={}", channel);
        self.send(&[0xB0 | (channel & 0x0F), CC_ALL_NOTES_OFF, 0])
    }

    fn all_sounds_off(&self, channel: u8) -> Result<()> {
        debug!("Sending All Sound Off: ch={}", channel);
        self.send(&[0xB0 | (channel & 0x0F), CC_ALL_SOUND_OFF, 0])
    }

    fn system_reset(&self) -> Result<()> {
        self.send(&[0xFF])
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn process(&self, frames: usize, _fx: &mut [&mut [f32]], out: &mut [&mut [f32]]) -> Result<()> {
        for buffer in out.iter_mut() {
            let len = frames.min(buffer.len());
            buffer[..len].fill(0.0);
        }
        Ok(())
    }
}
