//! Live MIDI input
//!
//! Raw bytes arrive in chunks (one per port callback, or from any other
//! producer) over a channel. A dispatcher thread runs them through a
//! live-mode parser, so messages split across chunks decode correctly.

use super::{MidiEvent, MidiEventParser, ParseMode};
use crate::synth::Synth;
use crossbeam::channel::Receiver;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[cfg(feature = "midir")]
use midir::{Ignore, MidiInput, MidiInputConnection};

/// Error type for live input
#[derive(Debug)]
pub enum LiveInputError {
    /// The dispatcher thread could not be started
    Io(io::Error),
    /// Error when connecting to a MIDI port
    Connection(String),
}

impl fmt::Display for LiveInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveInputError::Io(err) => write!(f, "MIDI input thread error: {}", err),
            LiveInputError::Connection(msg) => write!(f, "MIDI connection error: {}", msg),
        }
    }
}

impl Error for LiveInputError {}

impl From<io::Error> for LiveInputError {
    fn from(err: io::Error) -> Self {
        LiveInputError::Io(err)
    }
}

/// Running input: a dispatcher thread and, with a port, its connection
pub struct LiveInput {
    handle: Option<JoinHandle<()>>,
    #[cfg(feature = "midir")]
    connection: Option<MidiInputConnection<()>>,
}

impl LiveInput {
    /// Decodes byte chunks from `rx` and passes each event to `handler`.
    /// The thread ends once every sender is dropped.
    pub fn spawn_dispatcher<F>(rx: Receiver<Vec<u8>>, mut handler: F) -> Result<Self, LiveInputError>
    where
        F: FnMut(MidiEvent) + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("midiseqrs-input".into())
            .spawn(move || {
                let mut parser = MidiEventParser::new(ParseMode::Live);
                for chunk in rx.iter() {
                    for &byte in &chunk {
                        if let Some(event) = parser.feed(byte) {
                            handler(event);
                        }
                    }
                }
                debug!("MIDI input dispatcher finished");
            })?;

        Ok(Self {
            handle: Some(handle),
            #[cfg(feature = "midir")]
            connection: None,
        })
    }

    /// Connects to the first input port whose name contains `port_name`.
    #[cfg(feature = "midir")]
    pub fn connect<F>(port_name: &str, handler: F) -> Result<Self, LiveInputError>
    where
        F: FnMut(MidiEvent) + Send + 'static,
    {
        let mut midi_in = MidiInput::new("midiseqrs-in")
            .map_err(|e| LiveInputError::Connection(e.to_string()))?;
        midi_in.ignore(Ignore::None);

        let in_ports = midi_in.ports();
        let in_port = in_ports
            .iter()
            .find(|p| midi_in.port_name(p).unwrap_or_default().contains(port_name))
            .ok_or_else(|| {
                LiveInputError::Connection(format!("Input device '{}' not found", port_name))
            })?;
        let full_name = midi_in.port_name(in_port).unwrap_or_default();

        let (tx, rx) = crossbeam::channel::unbounded();
        let mut input = Self::spawn_dispatcher(rx, handler)?;
        let connection = midi_in
            .connect(
                in_port,
                "midiseqrs-input",
                move |_stamp, message, _| {
                    let _ = tx.send(message.to_vec());
                },
                (),
            )
            .map_err(|e| LiveInputError::Connection(e.to_string()))?;

        info!("Listening on MIDI input '{}'", full_name);
        input.connection = Some(connection);
        Ok(input)
    }

    /// Names of the available input ports.
    #[cfg(feature = "midir")]
    pub fn list_ports() -> Result<Vec<String>, LiveInputError> {
        let midi_in = MidiInput::new("midiseqrs-port-lister")
            .map_err(|e| LiveInputError::Connection(e.to_string()))?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect())
    }

    /// Without the `midir` feature there are no ports to list.
    #[cfg(not(feature = "midir"))]
    pub fn list_ports() -> Result<Vec<String>, LiveInputError> {
        Ok(Vec::new())
    }

    /// Waits for the dispatcher to drain its channel and finish.
    pub fn join(mut self) {
        self.close();
    }

    fn close(&mut self) {
        #[cfg(feature = "midir")]
        {
            if let Some(connection) = self.connection.take() {
                connection.close();
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("MIDI input dispatcher panicked");
            }
        }
    }
}

impl Drop for LiveInput {
    fn drop(&mut self) {
        // A dispatcher fed by a caller-owned channel is left running: its
        // senders decide when it ends.
        #[cfg(feature = "midir")]
        {
            if self.connection.is_some() {
                self.close();
            }
        }
    }
}

/// Handler forwarding live events to a synth.
pub fn synth_handler(synth: Arc<dyn Synth>) -> impl FnMut(MidiEvent) + Send + 'static {
    move |event| {
        if let Err(err) = synth.handle_event(&event) {
            warn!("Synth rejected live {}: {}", event, err);
        }
    }
}
