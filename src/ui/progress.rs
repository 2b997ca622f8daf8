use indicatif::{ProgressBar, ProgressStyle};

const POSITION_TEMPLATE: &str = "{prefix:.bold} [{bar:40.cyan}] {pos}/{len} ticks";
const SPINNER_TEMPLATE: &str = "{prefix:.bold.dim} {spinner} {wide_msg}";

/// Song position in ticks. The length is set once the song is loaded.
pub fn create_position_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template(POSITION_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("⣀⣤⣦⣶⣷⣿ ");
    pb.set_style(style);
    pb.set_prefix("Song");
    pb
}

pub fn create_transport_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix("Transport");
    pb
}
