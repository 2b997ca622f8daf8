use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Play Standard MIDI Files through a synth", long_about = None)]
pub struct Args {
    /// MIDI files to queue, played in order
    pub files: Vec<PathBuf>,

    /// Settings file (TOML, YAML, JSON...)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Audio driver, overriding `audio.driver`
    #[arg(short, long)]
    pub driver: Option<String>,

    /// List compiled-in audio drivers
    #[arg(long)]
    pub list_drivers: bool,

    /// List available MIDI input devices
    #[arg(long)]
    pub device_list: bool,

    /// Play live input from a specific MIDI device
    #[arg(long)]
    pub bind_to_device: Option<String>,

    /// Extra iterations of each song, -1 to loop forever
    #[arg(short, long = "loop", default_value_t = 0, allow_negative_numbers = true)]
    pub loop_count: i32,

    /// Play at a fixed tempo instead of the file's
    #[arg(long)]
    pub bpm: Option<f64>,

    /// Tempo multiplier
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    /// Start at this tick
    #[arg(long)]
    pub seek: Option<u64>,

    /// Do not draw the transport display
    #[arg(long)]
    pub no_progress: bool,
}

pub fn validate_device(device_name: &str, devices: &[String]) -> Result<(), String> {
    if !devices.iter().any(|d| d.contains(device_name)) {
        let mut error_msg = format!(
            "Error: Device '{}' not found in available devices:\n",
            device_name
        );
        for device in devices {
            error_msg.push_str(&format!("  - {}\n", device));
        }
        return Err(error_msg);
    }
    Ok(())
}

pub fn validate_driver(driver_name: &str, drivers: &[&str]) -> Result<(), String> {
    if drivers.contains(&driver_name) {
        return Ok(());
    }
    Err(format!(
        "Error: Audio driver '{}' is not available, choose one of: {}",
        driver_name,
        drivers.join(", ")
    ))
}
