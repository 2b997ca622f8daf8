use clap::Parser;
use log::{error, info, warn};
use midiseqrs::{
    audio::{AudioDriver, AudioDriverRegistry, ClockedSynth},
    cli::{validate_device, validate_driver, Args},
    config::Settings,
    logging,
    midi::{self, LiveInput},
    synth::{NullSynth, Synth},
    transport::{Player, PlayerOptions, Tempo, TimingSource},
    ui::TransportDisplay,
};
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    initialize_logging();
    let args = Args::parse();

    if let Err(err) = run(args) {
        error!("{}", err);
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn initialize_logging() {
    if let Err(err) = logging::init_logger() {
        eprintln!("Logging disabled: {}", err);
    }
    info!("Application starting");
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let registry = AudioDriverRegistry::new();

    if args.list_drivers {
        list_drivers(&registry);
        return Ok(());
    }
    if args.device_list {
        list_input_devices(&LiveInput::list_ports()?);
        return Ok(());
    }

    let settings = load_settings(&registry, &args)?;
    let synth = create_synth(&settings)?;
    let player = Player::new(Arc::clone(&synth), PlayerOptions::from_settings(&settings)?)?;

    let queued = queue_files(&player, &args);
    player.set_loop(args.loop_count)?;
    let tempo = match args.bpm {
        Some(bpm) => Tempo::ExternalBpm(bpm),
        None => Tempo::Internal,
    };
    player.set_tempo(tempo, args.speed)?;

    let driver = start_audio(&registry, &settings, &player, &synth)?;
    let input = bind_input(&args, &synth)?;

    if queued > 0 {
        if let Some(tick) = args.seek {
            player.seek(tick)?;
        }
        player.play()?;
        wait_for_playback(&player, args.no_progress);
    } else if input.is_some() {
        run_live_loop();
    } else {
        warn!("Nothing to play");
        eprintln!("No MIDI files to play");
    }

    if let Some(input) = input {
        input.join();
    }
    driver.destroy();
    info!("Application finished");
    Ok(())
}

fn list_drivers(registry: &AudioDriverRegistry) {
    println!("Available audio drivers:");
    for name in registry.names() {
        println!("  - {}", name);
    }
}

fn list_input_devices(devices: &[String]) {
    println!("Available MIDI devices:");
    for device in devices {
        println!("  - {}", device);
    }
}

fn load_settings(registry: &AudioDriverRegistry, args: &Args) -> Result<Settings, Box<dyn Error>> {
    let mut builder = Settings::load(registry, args.config.as_deref())?;
    if let Some(driver) = &args.driver {
        validate_driver(driver, &registry.names())?;
        builder = builder.set_override("audio.driver", driver.as_str())?;
    }
    Ok(Settings::build(builder)?)
}

fn create_synth(settings: &Settings) -> Result<Arc<dyn Synth>, Box<dyn Error>> {
    let sample_rate = settings.get_float("synth.sample_rate")?;
    let midi_out = settings.get_string("synth.midi_out")?;

    if midi_out.is_empty() {
        return Ok(Arc::new(NullSynth::new(sample_rate)));
    }

    midi_out_synth(&midi_out, sample_rate)
}

#[cfg(feature = "midir")]
fn midi_out_synth(device_name: &str, sample_rate: f64) -> Result<Arc<dyn Synth>, Box<dyn Error>> {
    let synth = midi::MidiOutSynth::connect(Some(device_name), sample_rate)?;
    Ok(Arc::new(synth))
}

#[cfg(not(feature = "midir"))]
fn midi_out_synth(device_name: &str, _sample_rate: f64) -> Result<Arc<dyn Synth>, Box<dyn Error>> {
    Err(format!(
        "synth.midi_out is set to '{}' but MIDI output needs the `midir` feature",
        device_name
    )
    .into())
}

fn queue_files(player: &Player, args: &Args) -> usize {
    let mut queued = 0;
    for path in &args.files {
        if midi::is_midi_file(path) {
            player.add_file(path);
            queued += 1;
        } else {
            warn!("Parameter '{}' is not a MIDI file, skipped", path.display());
            eprintln!("Skipping {}: not a MIDI file", path.display());
        }
    }
    queued
}

/// With sample timing the audio thread drives the player, so the driver
/// renders through a synth wrapper that advances the player's clock.
fn start_audio(
    registry: &AudioDriverRegistry,
    settings: &Settings,
    player: &Player,
    synth: &Arc<dyn Synth>,
) -> Result<AudioDriver, Box<dyn Error>> {
    let render_synth: Arc<dyn Synth> = match player.options().timing_source {
        TimingSource::Sample => Arc::new(ClockedSynth::new(Arc::clone(synth), player.clock())),
        TimingSource::System => Arc::clone(synth),
    };
    Ok(registry.create(settings, render_synth)?)
}

fn bind_input(args: &Args, synth: &Arc<dyn Synth>) -> Result<Option<LiveInput>, Box<dyn Error>> {
    let Some(device_name) = &args.bind_to_device else {
        return Ok(None);
    };
    validate_device(device_name, &LiveInput::list_ports()?)?;

    let input = connect_input(device_name, synth)?;
    println!("Successfully connected to MIDI device: {}", device_name);
    Ok(Some(input))
}

#[cfg(feature = "midir")]
fn connect_input(device_name: &str, synth: &Arc<dyn Synth>) -> Result<LiveInput, Box<dyn Error>> {
    Ok(LiveInput::connect(
        device_name,
        midi::input::synth_handler(Arc::clone(synth)),
    )?)
}

#[cfg(not(feature = "midir"))]
fn connect_input(device_name: &str, _synth: &Arc<dyn Synth>) -> Result<LiveInput, Box<dyn Error>> {
    Err(format!(
        "Cannot bind to '{}': live MIDI input needs the `midir` feature",
        device_name
    )
    .into())
}

fn wait_for_playback(player: &Player, no_progress: bool) {
    if no_progress {
        player.join();
        return;
    }

    let display = TransportDisplay::new();
    while player.status().is_active() {
        display.update(player);
        thread::sleep(Duration::from_millis(100));
    }
    display.update(player);
    display.finish();
}

fn run_live_loop() {
    info!("Live input running. Press Ctrl+C to exit...");
    println!("\nPress Ctrl+C to exit...");
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
