//! End-to-end tests for the field pipeline.
//!
//! Two kinds of test live here:
//!   - deterministic replays: a simulator timeline applied to an engine
//!     with explicit timestamps, rendered at a fixed frame rate
//!   - threaded runs: Simulator → event channel → Coordinator → engine ←
//!     Sampler → snapshot channel → assertions, on real threads and a real
//!     clock, exercising the shared lock

use crossbeam_channel::{bounded, unbounded};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chromatics::config::DecayConfig;
use chromatics::coordinator::Coordinator;
use chromatics::engine::{lock, shared, Engine};
use chromatics::geometry::coords_for_pitch;
use chromatics::sampler::Sampler;
use chromatics::simulator::{demo_sequence, timeline, Gesture, Simulator};
use chromatics::types::*;

// ─── Helpers ───────────────────────────────────────────────────────────────

/// Apply a timeline to a fresh engine, rendering at `fps` until `until`
/// seconds. Events due at or before a frame are applied before it.
fn replay(events: &[(f64, MidiEvent)], fps: u32, until: f64) -> (Engine, Vec<FieldSnapshot>) {
    let mut engine = Engine::default();
    let mut frames = Vec::new();
    let mut next = 0;
    let frame_count = (until * fps as f64 + 1e-9).floor() as usize;

    for frame in 0..=frame_count {
        let t = frame as f64 / fps as f64;
        while next < events.len() && events[next].0 <= t {
            let (at, event) = events[next];
            engine.handle(&event, at);
            next += 1;
        }
        if engine.needs_render(t) {
            frames.push(engine.render(t));
        }
    }
    (engine, frames)
}

/// Identity of one struck note across snapshots: pitch + strike time.
fn strike_key(view: &NoteView, time: f64) -> (u8, i64) {
    (view.pitch, ((time - view.age) * 1e6).round() as i64)
}

// ─── Deterministic replays ─────────────────────────────────────────────────

#[test]
fn test_demo_replay_is_deterministic() {
    let events = timeline(&demo_sequence());
    let (_, a) = replay(&events, 60, 12.0);
    let (_, b) = replay(&events, 60, 12.0);
    assert_eq!(a.len(), b.len());
    for (fa, fb) in a.iter().zip(&b) {
        assert_eq!(fa.time, fb.time);
        assert_eq!(fa.center, fb.center, "diverged at t={}", fa.time);
        assert_eq!(fa.reverb, fb.reverb);
    }
}

#[test]
fn test_demo_replay_snapshot_invariants() {
    let events = timeline(&demo_sequence());
    let (_, frames) = replay(&events, 60, 12.0);
    assert!(!frames.is_empty());

    let mut last_amplitude: HashMap<(u8, i64), f64> = HashMap::new();
    for frame in &frames {
        assert!(frame.center.x.is_finite() && frame.center.y.is_finite());
        for note in &frame.notes {
            // Retirement happens inside the same update: nothing silent survives.
            assert!(note.audible, "silent note {} at t={}", note.pitch, frame.time);
            assert!(note.amplitude <= note.volume + 1e-12);
            assert!(note.spatial_weight >= 0.0);
            let key = strike_key(note, frame.time);
            if let Some(prev) = last_amplitude.insert(key, note.amplitude) {
                assert!(
                    note.amplitude <= prev,
                    "pitch {} grew from {} to {} at t={}",
                    note.pitch, prev, note.amplitude, frame.time
                );
            }
        }
    }
}

#[test]
fn test_demo_dies_away_into_reverb() {
    let events = timeline(&demo_sequence());
    let (mut engine, frames) = replay(&events, 30, 20.0);
    let peak = frames
        .iter()
        .map(|f| f.center.length())
        .fold(0.0_f64, f64::max);

    assert!(engine.is_empty(), "{} notes still live", engine.len());
    assert!(engine.retired_count() > 20);
    let end = engine.update(20.0);
    assert!(end.length() > 0.0);
    assert!(end.length() < peak * 0.1);
}

#[test]
fn test_octaves_pull_the_same_way() {
    assert_eq!(coords_for_pitch(60), coords_for_pitch(72));

    let mut engine = Engine::default();
    engine.note_on(60, 100, 0.0);
    engine.note_on(72, 100, 0.0);
    let center = engine.update(0.1);
    let dir = coords_for_pitch(60);
    let cross = center.x * dir.y - center.y * dir.x;
    assert!(cross.abs() < 1e-12);
    assert!(center.x * dir.x + center.y * dir.y > 0.0);
}

#[test]
fn test_restrike_keeps_one_note_and_conserves_energy() {
    let mut engine = Engine::default();
    engine.note_on(60, 80, 0.0);
    engine.update(0.25);
    let before = engine.note(60).unwrap().contribution();

    engine.note_on(60, 40, 0.25);
    assert_eq!(engine.len(), 1);
    let note = engine.note(60).unwrap();
    assert!((note.volume() - 40.0 / 127.0).abs() < 1e-12);
    let reverb = engine.reverb_center();
    assert!((reverb.x - before.x).abs() < 1e-12);
    assert!((reverb.y - before.y).abs() < 1e-12);
}

#[test]
fn test_scripted_release_retires_within_bound() {
    let config = DecayConfig::default();
    let bound = config.retirement_bound();
    let events = timeline(&[
        Gesture::Strike { pitch: 60, velocity: 127 },
        Gesture::Release { pitch: 60 },
    ]);

    let (engine, _) = replay(&events, 100, bound - 0.02);
    assert!(engine.note(60).is_some(), "retired before {:.3}s", bound - 0.02);

    let (engine, _) = replay(&events, 100, bound + 0.02);
    assert!(engine.note(60).is_none(), "still live after {:.3}s", bound + 0.02);
}

#[test]
fn test_half_pedal_slows_release() {
    let dry = timeline(&[
        Gesture::Strike { pitch: 55, velocity: 100 },
        Gesture::Release { pitch: 55 },
    ]);
    let half = timeline(&[
        Gesture::PedalRamp { from: 0, to: 64, ms: 100 },
        Gesture::Strike { pitch: 55, velocity: 100 },
        Gesture::Release { pitch: 55 },
    ]);
    let (dry_engine, _) = replay(&dry, 60, 1.0);
    let (half_engine, _) = replay(&half, 60, 1.1);
    assert!(dry_engine.note(55).is_none());
    assert!(half_engine.note(55).is_some());
}

// ─── Threaded pipeline ─────────────────────────────────────────────────────

#[test]
fn test_pipeline_strike_and_retire() {
    let config = DecayConfig::default();
    let clock = Arc::new(TickClock::new(SessionClock::new(), config.tick_resolution));
    let engine = shared(Engine::new(config));

    let (event_tx, event_rx) = bounded::<MidiEvent>(64);
    let (frame_tx, frame_rx) = unbounded::<FieldSnapshot>();

    let coord_engine = engine.clone();
    let coord_clock = clock.clone();
    let coord_handle = thread::Builder::new()
        .name("test-coordinator".into())
        .spawn(move || {
            Coordinator::new(event_rx, coord_engine, coord_clock).run();
        })
        .unwrap();

    let mut sampler = Sampler::new(engine.clone(), clock.clone(), vec![frame_tx], 100);
    let stop = sampler.stop_flag();
    let sampler_handle = thread::Builder::new()
        .name("test-sampler".into())
        .spawn(move || sampler.run())
        .unwrap();

    let gestures = vec![
        Gesture::Strike { pitch: 60, velocity: 110 },
        Gesture::Hold { ms: 50 },
        Gesture::Release { pitch: 60 },
    ];
    Simulator::new(event_tx).run(&gestures, 1);
    coord_handle.join().unwrap();

    // Dry release retires in well under a second.
    thread::sleep(Duration::from_millis(1500));
    stop.store(true, Ordering::Relaxed);
    sampler_handle.join().unwrap();

    let frames: Vec<FieldSnapshot> = frame_rx.try_iter().collect();
    assert!(!frames.is_empty());
    assert!(frames.iter().any(|f| f.notes.iter().any(|n| n.pitch == 60)));
    for pair in frames.windows(2) {
        assert!(pair[0].time <= pair[1].time, "clock went backward");
    }

    let state = lock(&engine);
    assert!(state.is_empty());
    assert_eq!(state.retired_count(), 1);
    assert!(state.reverb_center().x > 0.0);
}

#[test]
fn test_concurrent_event_and_render_paths() {
    let config = DecayConfig::default();
    let clock = Arc::new(TickClock::new(SessionClock::new(), config.tick_resolution));
    let engine = shared(Engine::new(config));

    let (event_tx, event_rx) = bounded::<MidiEvent>(1024);
    let (frame_tx, frame_rx) = unbounded::<FieldSnapshot>();

    let coord_engine = engine.clone();
    let coord_clock = clock.clone();
    let coord_handle = thread::spawn(move || {
        Coordinator::new(event_rx, coord_engine, coord_clock).run();
    });

    let mut sampler = Sampler::new(engine.clone(), clock.clone(), vec![frame_tx], 250);
    let stop = sampler.stop_flag();
    let sampler_handle = thread::spawn(move || sampler.run());

    // A burst of overlapping strikes, releases and pedal moves.
    for i in 0..3000u32 {
        let pitch = 36 + (i * 7 % 48) as u8;
        let event = match i % 5 {
            0 | 1 => MidiEvent::NoteOn { pitch, velocity: 30 + (i % 90) as u8 },
            2 | 3 => MidiEvent::NoteOff { pitch },
            _ => MidiEvent::ControlChange {
                controller: SUSTAIN_CONTROLLER,
                value: (i % 128) as u8,
            },
        };
        event_tx.send(event).unwrap();
        if i % 100 == 0 {
            thread::sleep(Duration::from_millis(2));
        }
    }
    drop(event_tx);
    coord_handle.join().unwrap();

    thread::sleep(Duration::from_millis(100));
    stop.store(true, Ordering::Relaxed);
    sampler_handle.join().unwrap();

    let frames: Vec<FieldSnapshot> = frame_rx.try_iter().collect();
    assert!(!frames.is_empty());
    for frame in &frames {
        assert!(frame.center.x.is_finite() && frame.center.y.is_finite());
        assert!(frame.notes.iter().all(|n| n.audible));
        let mut pitches: Vec<u8> = frame.notes.iter().map(|n| n.pitch).collect();
        pitches.dedup();
        assert_eq!(pitches.len(), frame.notes.len(), "duplicate pitch in snapshot");
    }
}
