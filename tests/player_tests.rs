mod common;

use common::{single_note_song, RecordingSynth, SmfBuilder, TrackBuilder};
use midiseqrs::midi::{EventType, MidiEvent};
use midiseqrs::state::PlayerStatus;
use midiseqrs::transport::{
    Player, PlayerError, PlayerOptions, SyncMode, Tempo, TimingSource,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn new_player(synth: &Arc<RecordingSynth>) -> Player {
    common::init_logger();
    Player::new(synth.clone(), PlayerOptions::default()).unwrap()
}

fn keys(events: &[MidiEvent]) -> Vec<u32> {
    events.iter().map(MidiEvent::param1).collect()
}

/// Division 100: at the default tempo one tick lasts 5 ms.
fn seek_song() -> Vec<u8> {
    SmfBuilder::new(0, 100)
        .track(
            TrackBuilder::new()
                .note_on(0, 0, 60, 100)
                .event(100, &[0xB0, 7, 90])
                .note_on(400, 0, 64, 100)
                .end(500),
        )
        .build()
}

#[test]
fn test_play_requires_songs() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    assert!(matches!(player.play(), Err(PlayerError::EmptyPlaylist)));
    assert_eq!(player.status(), PlayerStatus::Ready);
}

#[test]
fn test_first_step_loads_and_plays_tick_zero() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(480, 480));
    player.play().unwrap();
    assert_eq!(player.status(), PlayerStatus::Playing);

    player.clock().advance(0.0);
    assert_eq!(synth.note_ons(), vec![MidiEvent::note_on(0, 60, 100)]);
    assert_eq!(player.division(), 480);
    assert_eq!(player.total_ticks(), 480);
    assert_eq!(player.current_tick(), 0);
}

#[test]
fn test_events_follow_tempo() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(480, 480));
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    // 480 ticks at 120 bpm last 500 ms
    clock.advance(499.0);
    assert_eq!(synth.events().len(), 1);
    assert_eq!(player.current_tick(), 479);

    clock.advance(501.0);
    let events = synth.events();
    assert_eq!(events[1], MidiEvent::note_off(0, 60, 0).with_delay(480));
    assert_eq!(player.status(), PlayerStatus::Done);
    assert_eq!(synth.resets(), 1);
}

#[test]
fn test_reset_synth_can_be_disabled() {
    let synth = Arc::new(RecordingSynth::new());
    let options = PlayerOptions {
        reset_synth: false,
        ..PlayerOptions::default()
    };
    let player = Player::new(synth.clone(), options).unwrap();
    player.add_mem(single_note_song(100, 10));
    player.play().unwrap();

    player.clock().advance(0.0);
    player.clock().advance(100.0);
    assert_eq!(player.status(), PlayerStatus::Done);
    assert_eq!(synth.resets(), 0);
}

#[test]
fn test_seek_during_playback() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    player.set_tick_callback(move |tick| sink.lock().unwrap().push(tick));
    player.add_mem(seek_song());
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    assert_eq!(*reported.lock().unwrap(), vec![0]);

    player.seek(600).unwrap();
    clock.advance(0.0);

    assert_eq!(player.current_tick(), 600);
    assert_eq!(*reported.lock().unwrap(), vec![0, 600]);
    assert_eq!(synth.sounds_off(), (0..16).collect::<Vec<u8>>());

    // The controller before the target is replayed, the skipped note is not.
    let events = synth.events();
    assert_eq!(
        events,
        vec![
            MidiEvent::note_on(0, 60, 100),
            MidiEvent::control_change(0, 7, 90).with_delay(100),
        ]
    );
}

#[test]
fn test_seek_backwards_rewinds() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(seek_song());
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    clock.advance(3000.0);
    assert_eq!(player.current_tick(), 600);
    assert_eq!(keys(&synth.note_ons()), vec![60, 64]);

    player.seek(50).unwrap();
    clock.advance(3000.0);
    assert_eq!(player.current_tick(), 50);

    clock.advance(3300.0);
    assert_eq!(player.current_tick(), 110);
    let controllers = synth
        .events()
        .iter()
        .filter(|event| event.event_type() == EventType::ControlChange)
        .count();
    assert_eq!(controllers, 2);
}

#[test]
fn test_seek_before_play() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(seek_song());

    // Nothing is loaded yet, so the target cannot be checked
    player.seek(600).unwrap();
    player.play().unwrap();
    player.clock().advance(0.0);

    assert_eq!(player.current_tick(), 600);
    assert!(synth.note_ons().is_empty());
}

#[test]
fn test_seek_between_play_and_first_step() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(100, 1000));
    player.play().unwrap();

    player.seek(500).unwrap();
    player.clock().advance(0.0);
    assert_eq!(player.current_tick(), 500);
    assert_eq!(player.total_ticks(), 1000);

    // Loaded now, so the length applies again
    player.stop();
    player.clock().advance(10.0);
    assert!(matches!(
        player.seek(1001),
        Err(PlayerError::SeekOutOfRange {
            tick: 1001,
            total: 1000
        })
    ));
}

#[test]
fn test_seek_after_finish_waits_for_reload() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(100, 1000));
    player.add_mem(single_note_song(100, 10));
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    clock.advance(5100.0);
    clock.advance(5200.0);
    assert_eq!(player.status(), PlayerStatus::Done);
    assert_eq!(player.total_ticks(), 10);

    // The first song comes back, not the one that just ended
    player.play().unwrap();
    player.seek(500).unwrap();
    clock.advance(6000.0);
    assert_eq!(player.total_ticks(), 1000);
    assert_eq!(player.current_tick(), 500);
}

#[test]
fn test_seek_errors() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(seek_song());
    player.play().unwrap();
    player.clock().advance(0.0);

    assert!(matches!(
        player.seek(1001),
        Err(PlayerError::SeekOutOfRange {
            tick: 1001,
            total: 1000
        })
    ));
    player.seek(10).unwrap();
    assert!(matches!(player.seek(20), Err(PlayerError::SeekPending)));

    player.clock().advance(0.0);
    assert_eq!(player.current_tick(), 10);
    player.seek(20).unwrap();
}

#[test]
fn test_infinite_loop() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(100, 10));
    player.set_loop(-1).unwrap();
    player.play().unwrap();

    let clock = player.clock();
    for step in 0..6 {
        clock.advance(f64::from(step) * 60.0);
        assert_eq!(player.status(), PlayerStatus::Playing);
    }
    assert_eq!(synth.note_ons().len(), 6);
    assert_eq!(player.current_tick(), 0);
    assert_eq!(player.loop_count(), -1);
}

#[test]
fn test_counted_loop() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(100, 10));
    player.set_loop(2).unwrap();
    player.play().unwrap();

    let clock = player.clock();
    for step in 0..5 {
        clock.advance(f64::from(step) * 60.0);
    }
    assert_eq!(synth.note_ons().len(), 3);
    assert_eq!(player.status(), PlayerStatus::Done);
    assert_eq!(player.loop_count(), 0);
}

#[test]
fn test_stop_silences_sounded_channels() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(
        SmfBuilder::new(0, 100)
            .track(
                TrackBuilder::new()
                    .note_on(0, 0, 60, 100)
                    .note_on(0, 2, 64, 100)
                    .note_on(0, 3, 67, 0)
                    .event(0, &[0xB5, 10, 64])
                    .end(1000),
            )
            .build(),
    );
    player.play().unwrap();

    let mut statuses = vec![player.status()];
    player.clock().advance(0.0);
    player.stop();
    statuses.push(player.status());
    player.clock().advance(5.0);
    statuses.push(player.status());

    assert_eq!(
        statuses,
        vec![PlayerStatus::Playing, PlayerStatus::Stopping, PlayerStatus::Done]
    );
    assert_eq!(synth.notes_off(), vec![0, 2]);
}

#[test]
fn test_play_while_stopping_is_refused() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(100, 1000));
    player.play().unwrap();
    player.stop();

    assert!(matches!(
        player.play(),
        Err(PlayerError::InvalidTransition(PlayerStatus::Stopping))
    ));
}

#[test]
fn test_play_after_stop_resumes() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(100, 1000));
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    clock.advance(100.0);
    player.stop();
    clock.advance(105.0);
    assert_eq!(player.status(), PlayerStatus::Done);
    assert_eq!(player.current_tick(), 20);

    player.play().unwrap();
    clock.advance(200.0);
    clock.advance(250.0);
    assert_eq!(player.current_tick(), 30);
    assert_eq!(synth.note_ons().len(), 1);
}

#[test]
fn test_play_after_finish_restarts_playlist() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(100, 10));
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    clock.advance(100.0);
    assert_eq!(player.status(), PlayerStatus::Done);

    player.play().unwrap();
    clock.advance(200.0);
    assert_eq!(synth.note_ons().len(), 2);
}

#[test]
fn test_playlist_order_and_bad_items() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(b"not a midi file".to_vec());
    player.add_mem(
        SmfBuilder::new(0, 100)
            .track(TrackBuilder::new().note_on(0, 0, 50, 100).end(10))
            .build(),
    );
    player.add_mem(
        SmfBuilder::new(0, 100)
            .track(TrackBuilder::new().note_on(0, 0, 70, 100).end(10))
            .build(),
    );
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    assert_eq!(keys(&synth.note_ons()), vec![50]);
    clock.advance(100.0);
    assert_eq!(keys(&synth.note_ons()), vec![50, 70]);
    assert_eq!(player.status(), PlayerStatus::Playing);
    clock.advance(200.0);
    assert_eq!(player.status(), PlayerStatus::Done);
}

#[test]
fn test_multi_track_merge_order() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(
        SmfBuilder::new(1, 100)
            .track(
                TrackBuilder::new()
                    .note_on(0, 0, 60, 100)
                    .note_on(5, 0, 62, 100)
                    .end(0),
            )
            .track(
                TrackBuilder::new()
                    .note_on(0, 1, 61, 100)
                    .note_on(5, 1, 63, 100)
                    .end(0),
            )
            .build(),
    );
    player.play().unwrap();

    player.clock().advance(0.0);
    player.clock().advance(100.0);
    assert_eq!(keys(&synth.note_ons()), vec![60, 61, 62, 63]);
}

#[test]
fn test_file_tempo_change_reanchors() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(
        SmfBuilder::new(0, 100)
            .track(
                TrackBuilder::new()
                    .tempo(100, 250_000)
                    .note_on(100, 0, 70, 100)
                    .end(100),
            )
            .build(),
    );
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    // 100 ticks at 5 ms, then 100 ticks at 2.5 ms
    clock.advance(740.0);
    assert!(synth.note_ons().is_empty());
    assert_eq!(player.midi_tempo(), 250_000);
    assert!((player.bpm() - 240.0).abs() < 1e-9);

    clock.advance(752.0);
    assert_eq!(keys(&synth.note_ons()), vec![70]);
}

#[test]
fn test_external_tempo_ignores_file_tempo() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(
        SmfBuilder::new(0, 100)
            .track(
                TrackBuilder::new()
                    .tempo(100, 250_000)
                    .note_on(100, 0, 70, 100)
                    .end(100),
            )
            .build(),
    );
    player.set_tempo(Tempo::ExternalBpm(60.0), 1.0).unwrap();
    assert_eq!(player.sync_mode(), SyncMode::External);
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    clock.advance(1990.0);
    assert!(synth.note_ons().is_empty());
    assert_eq!(player.midi_tempo(), 1_000_000);

    clock.advance(2010.0);
    assert_eq!(keys(&synth.note_ons()), vec![70]);
    assert!((player.bpm() - 60.0).abs() < 1e-9);
}

#[test]
fn test_tempo_change_during_playback() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(100, 1000));
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    clock.advance(500.0);
    assert_eq!(player.current_tick(), 100);

    player.set_tempo(Tempo::Internal, 2.0).unwrap();
    clock.advance(500.0);
    clock.advance(750.0);
    assert_eq!(player.current_tick(), 200);
    assert!((player.bpm() - 240.0).abs() < 1e-9);
}

#[test]
fn test_tempo_change_keeps_file_tempo_ticks() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(
        SmfBuilder::new(0, 100)
            .track(
                TrackBuilder::new()
                    .tempo(50, 500_000)
                    .note_on(150, 0, 72, 100)
                    .end(100),
            )
            .build(),
    );
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    clock.advance(240.0);
    assert_eq!(player.current_tick(), 48);

    // The file tempo at tick 50 and this request land in the same step
    player.set_tempo(Tempo::Internal, 1.0).unwrap();
    clock.advance(500.0);
    assert_eq!(player.current_tick(), 100);

    clock.advance(1000.0);
    assert_eq!(player.current_tick(), 200);
    assert_eq!(keys(&synth.note_ons()), vec![72]);
}

#[test]
fn test_invalid_settings_are_refused() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);

    assert!(matches!(
        player.set_tempo(Tempo::ExternalBpm(0.0), 1.0),
        Err(PlayerError::InvalidTempo(_))
    ));
    assert!(matches!(
        player.set_tempo(Tempo::ExternalMidi(70_000_000.0), 1.0),
        Err(PlayerError::InvalidTempo(_))
    ));
    assert!(matches!(
        player.set_tempo(Tempo::Internal, 0.0),
        Err(PlayerError::InvalidMultiplier(_))
    ));
    assert!(matches!(
        player.set_loop(-2),
        Err(PlayerError::InvalidLoopCount(-2))
    ));
    assert!((player.bpm() - 120.0).abs() < 1e-9);
}

#[test]
fn test_playback_callback_replaces_synth() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    player.set_playback_callback(move |event| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    player.add_mem(single_note_song(100, 10));
    player.play().unwrap();

    let clock = player.clock();
    clock.advance(0.0);
    assert!(synth.events().is_empty());
    assert_eq!(received.lock().unwrap().len(), 1);

    player.clear_playback_callback();
    clock.advance(100.0);
    assert_eq!(synth.events().len(), 1);
}

#[test]
fn test_sample_clock_drives_playback() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(single_note_song(480, 48));
    player.play().unwrap();

    // 441 frames at 44.1 kHz are 10 ms; the song lasts 50 ms
    let clock = player.clock();
    for _ in 0..8 {
        clock.process_samples(441);
    }
    assert_eq!(player.status(), PlayerStatus::Done);
    assert_eq!(synth.events().len(), 2);
}

#[test]
fn test_sample_clock_dispatches_at_period_start() {
    let synth = Arc::new(RecordingSynth::new());
    let player = new_player(&synth);
    player.add_mem(
        SmfBuilder::new(0, 100)
            .track(TrackBuilder::new().note_on(1, 0, 66, 100).end(10))
            .build(),
    );
    player.play().unwrap();

    // Tick 1 falls 5 ms into the first 10 ms period
    let clock = player.clock();
    clock.process_samples(441);
    assert!(synth.note_ons().is_empty());
    clock.process_samples(441);
    assert_eq!(keys(&synth.note_ons()), vec![66]);
}

#[test]
fn test_system_timer_drives_playback() {
    let synth = Arc::new(RecordingSynth::new());
    let options = PlayerOptions {
        timing_source: TimingSource::System,
        timer_interval: Duration::from_millis(2),
        ..PlayerOptions::default()
    };
    let player = Player::new(synth.clone(), options).unwrap();
    player.add_mem(single_note_song(480, 48));
    player.play().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while player.status().is_active() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(player.status(), PlayerStatus::Done);
    assert_eq!(synth.note_ons().len(), 1);
}
