//! Terminal transport display
//!
//! A position bar for the current song and a spinner with tempo and status,
//! drawn on stderr with indicatif.

mod progress;

pub use progress::{create_position_bar, create_transport_spinner};

use crate::transport::Player;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};

pub struct TransportDisplay {
    #[allow(dead_code)]
    multi_progress: MultiProgress,
    position_pb: ProgressBar,
    transport_pb: ProgressBar,
}

impl TransportDisplay {
    pub fn new() -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let position_pb = multi_progress.add(create_position_bar());
        let transport_pb = multi_progress.add(create_transport_spinner());

        Self {
            multi_progress,
            position_pb,
            transport_pb,
        }
    }

    /// Redraws from the player's current state.
    pub fn update(&self, player: &Player) {
        let total = player.total_ticks();
        if self.position_pb.length() != Some(total) {
            self.position_pb.set_length(total);
        }
        self.position_pb.set_position(player.current_tick().min(total));

        self.transport_pb.set_message(format!(
            "BPM: {:.1}, Division: {}, Loop: {}, Status: {}",
            player.bpm(),
            player.division(),
            player.loop_count(),
            player.status()
        ));
        self.transport_pb.tick();
    }

    pub fn finish(&self) {
        self.position_pb.finish();
        self.transport_pb.finish();
    }
}

impl Default for TransportDisplay {
    fn default() -> Self {
        Self::new()
    }
}
