use crate::midi::MidiEvent;

/// An ordered list of events with a play cursor
///
/// Events are stored in playback order; each carries its delay relative to
/// the previous one. `ticks` accumulates the delays of every event the
/// cursor has moved past, so the next event plays at
/// `ticks + next.delay_ticks()`.
#[derive(Debug, Clone, Default)]
pub struct Track {
    name: Option<String>,
    index: usize,
    events: Vec<MidiEvent>,
    cursor: usize,
    ticks: u64,
}

impl Track {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    /// Appends an event at the end of the track.
    pub fn push(&mut self, event: MidiEvent) {
        self.events.push(event);
    }

    /// Sum of all event delays.
    pub fn duration_ticks(&self) -> u64 {
        self.events
            .iter()
            .map(|event| u64::from(event.delay_ticks()))
            .sum()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.events.len()
    }

    /// Tick of the last event the cursor moved past.
    pub fn current_tick(&self) -> u64 {
        self.ticks
    }

    /// Absolute tick of the next unplayed event.
    pub fn next_event_tick(&self) -> Option<u64> {
        self.peek()
            .map(|event| self.ticks + u64::from(event.delay_ticks()))
    }

    pub fn peek(&self) -> Option<&MidiEvent> {
        self.events.get(self.cursor)
    }

    /// Moves past the next event and returns it.
    pub fn advance(&mut self) -> Option<&MidiEvent> {
        let event = self.events.get(self.cursor)?;
        self.ticks += u64::from(event.delay_ticks());
        self.cursor += 1;
        Some(event)
    }

    /// Puts the cursor back at the first event.
    pub(crate) fn rewind(&mut self) {
        self.cursor = 0;
        self.ticks = 0;
    }
}
