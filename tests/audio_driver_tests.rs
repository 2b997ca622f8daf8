mod common;

use common::{single_note_song, RecordingSynth};
use midiseqrs::audio::{
    AudioCallback, AudioDriverRegistry, AudioError, ClockedSynth, PlayerRenderCallback,
};
use midiseqrs::config::Settings;
use midiseqrs::state::PlayerStatus;
use midiseqrs::synth::Synth;
use midiseqrs::transport::{Player, PlayerOptions};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn settings_with(registry: &AudioDriverRegistry, overrides: &[(&str, &str)]) -> Settings {
    common::init_logger();
    let mut builder = Settings::builder(registry).unwrap();
    for (key, value) in overrides {
        builder = builder.set_override(*key, *value).unwrap();
    }
    Settings::build(builder).unwrap()
}

struct FrameCounter {
    frames: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl AudioCallback for FrameCounter {
    fn render(
        &mut self,
        frames: usize,
        fx: &mut [&mut [f32]],
        out: &mut [&mut [f32]],
    ) -> Result<(), AudioError> {
        assert_eq!(fx.len(), 4);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|buffer| buffer.len() == frames));
        assert!(out.iter().all(|buffer| buffer.iter().all(|&sample| sample == 0.0)));
        self.frames.fetch_add(frames, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test]
fn test_registry_lists_builtin_drivers() {
    let registry = AudioDriverRegistry::new();
    let names = registry.names();
    assert!(names.contains(&"null"));
    assert!(names.contains(&"file"));
    assert!(registry.lookup("null").is_some());
    assert!(registry.lookup("jack").is_none());
}

#[test]
fn test_unknown_driver() {
    let registry = AudioDriverRegistry::new();
    let settings = settings_with(&registry, &[("audio.driver", "jack")]);
    let synth = Arc::new(RecordingSynth::new());

    match registry.create(&settings, synth) {
        Err(AudioError::UnknownDriver(name)) => assert_eq!(name, "jack"),
        Err(err) => panic!("Unexpected error: {}", err),
        Ok(_) => panic!("Driver should not exist"),
    }
}

#[test]
fn test_file_driver_refuses_callbacks() {
    let registry = AudioDriverRegistry::new();
    let settings = settings_with(&registry, &[("audio.driver", "file")]);
    let counter = FrameCounter {
        frames: Arc::new(AtomicUsize::new(0)),
        calls: Arc::new(AtomicUsize::new(0)),
    };

    let result = registry.create_with_callback(&settings, Box::new(counter));
    assert!(matches!(
        result,
        Err(AudioError::Unsupported { ref driver, .. }) if driver == "file"
    ));
}

#[test]
fn test_null_driver_calls_back_every_period() {
    let registry = AudioDriverRegistry::new();
    let settings = settings_with(&registry, &[("audio.period_size", "128")]);
    let frames = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = FrameCounter {
        frames: Arc::clone(&frames),
        calls: Arc::clone(&calls),
    };

    let driver = registry
        .create_with_callback(&settings, Box::new(counter))
        .unwrap();
    assert_eq!(driver.name(), "null");
    assert!(wait_until(|| calls.load(Ordering::SeqCst) >= 3));
    driver.destroy();

    let calls = calls.load(Ordering::SeqCst);
    assert_eq!(frames.load(Ordering::SeqCst), calls * 128);
}

#[test]
fn test_invalid_period_is_refused() {
    let registry = AudioDriverRegistry::new();
    let settings = settings_with(&registry, &[("audio.period_size", "0")]);
    let synth = Arc::new(RecordingSynth::new());
    assert!(matches!(
        registry.create(&settings, synth),
        Err(AudioError::Backend(_))
    ));
}

#[test]
fn test_file_driver_writes_pcm() {
    let path = std::env::temp_dir().join(format!("midiseqrs-out-{}.raw", std::process::id()));
    let registry = AudioDriverRegistry::new();
    let settings = settings_with(
        &registry,
        &[
            ("audio.driver", "file"),
            ("audio.file.name", path.to_str().unwrap()),
            ("audio.period_size", "32"),
        ],
    );
    let synth = Arc::new(RecordingSynth::new());

    let driver = registry.create(&settings, synth.clone()).unwrap();
    assert!(wait_until(|| synth.rendered_frames() >= 96));
    driver.destroy();

    let bytes = fs::read(&path).unwrap();
    fs::remove_file(&path).unwrap();
    // Interleaved stereo s16: 4 bytes per frame, 32 frames per period
    assert!(!bytes.is_empty());
    assert_eq!(bytes.len() % (4 * 32), 0);
    let first = i16::from_le_bytes([bytes[0], bytes[1]]);
    assert_eq!(first, (0.25 * f32::from(i16::MAX)) as i16);
}

#[test]
fn test_file_driver_rejects_unknown_format() {
    let registry = AudioDriverRegistry::new();
    let path = std::env::temp_dir().join(format!("midiseqrs-fmt-{}.raw", std::process::id()));
    let settings = settings_with(
        &registry,
        &[
            ("audio.driver", "file"),
            ("audio.file.name", path.to_str().unwrap()),
            ("audio.file.format", "mp3"),
        ],
    );
    let synth = Arc::new(RecordingSynth::new());
    assert!(matches!(
        registry.create(&settings, synth),
        Err(AudioError::Backend(_))
    ));
}

#[test]
fn test_render_callback_drives_player() {
    let registry = AudioDriverRegistry::new();
    let settings = settings_with(&registry, &[]);
    let synth = Arc::new(RecordingSynth::new());
    let player = Player::new(synth.clone(), PlayerOptions::default()).unwrap();
    player.add_mem(single_note_song(480, 48));
    player.play().unwrap();

    let render_synth: Arc<dyn Synth> = synth.clone();
    let callback = PlayerRenderCallback::new(player.clock(), render_synth);
    let driver = registry
        .create_with_callback(&settings, Box::new(callback))
        .unwrap();

    assert!(wait_until(|| player.status() == PlayerStatus::Done));
    driver.destroy();
    assert_eq!(synth.events().len(), 2);
    assert!(synth.rendered_frames() > 0);
}

#[test]
fn test_clocked_synth_drives_player() {
    let registry = AudioDriverRegistry::new();
    let settings = settings_with(&registry, &[]);
    let synth = Arc::new(RecordingSynth::new());
    let player = Player::new(synth.clone(), PlayerOptions::default()).unwrap();
    player.add_mem(single_note_song(480, 48));
    player.play().unwrap();

    let render_synth: Arc<dyn Synth> = synth.clone();
    let clocked = Arc::new(ClockedSynth::new(render_synth, player.clock()));
    let driver = registry.create(&settings, clocked).unwrap();

    assert!(wait_until(|| player.status() == PlayerStatus::Done));
    driver.destroy();
    assert_eq!(synth.note_ons().len(), 1);
}
