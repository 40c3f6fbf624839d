use crate::types::*;
use crossbeam_channel::Sender;
use log::info;
use std::thread;
use std::time::{Duration, Instant};

/// Plays a scripted performance into the event channel in real time,
/// standing in for a keyboard so the whole pipeline can run without one.
pub struct Simulator {
    tx: Sender<MidiEvent>,
}

/// One step of a scripted performance.
#[derive(Debug, Clone)]
pub enum Gesture {
    Hold { ms: u32 },
    Strike { pitch: u8, velocity: u8 },
    Release { pitch: u8 },
    /// Rolled chord: one note every `spread_ms`, bottom up.
    Chord { pitches: Vec<u8>, velocity: u8, spread_ms: u32 },
    /// Release several notes at once.
    ReleaseAll { pitches: Vec<u8> },
    PedalDown,
    PedalUp,
    /// Move the pedal gradually (half-pedalling), one controller message
    /// every 20ms.
    PedalRamp { from: u8, to: u8, ms: u32 },
}

const RAMP_STEP_MS: u32 = 20;

impl Simulator {
    pub fn new(tx: Sender<MidiEvent>) -> Self {
        Self { tx }
    }

    /// Play the gestures `loops` times. Blocks the calling thread.
    /// Returns early if the receiving side has gone away.
    pub fn run(&self, gestures: &[Gesture], loops: u32) {
        let events = timeline(gestures);
        let length = events.last().map(|(t, _)| *t).unwrap_or(0.0);
        info!(
            "Simulator: {} events over {:.1}s, {} loop(s)",
            events.len(),
            length,
            loops
        );

        for pass in 0..loops {
            let start = Instant::now();
            for (at, event) in &events {
                let due = Duration::from_secs_f64(*at);
                let elapsed = start.elapsed();
                if due > elapsed {
                    thread::sleep(due - elapsed);
                }
                if self.tx.send(*event).is_err() {
                    info!("Simulator: event channel closed");
                    return;
                }
            }
            info!("Simulator: pass {} complete", pass + 1);
        }
    }
}

/// Flatten gestures into timestamped events, in seconds from the start.
pub fn timeline(gestures: &[Gesture]) -> Vec<(f64, MidiEvent)> {
    let mut events = Vec::new();
    let mut t_ms: u32 = 0;

    for gesture in gestures {
        match gesture {
            Gesture::Hold { ms } => t_ms += ms,

            Gesture::Strike { pitch, velocity } => {
                events.push((secs(t_ms), MidiEvent::NoteOn {
                    pitch: *pitch,
                    velocity: *velocity,
                }));
            }

            Gesture::Release { pitch } => {
                events.push((secs(t_ms), MidiEvent::NoteOff { pitch: *pitch }));
            }

            Gesture::Chord { pitches, velocity, spread_ms } => {
                for (i, &pitch) in pitches.iter().enumerate() {
                    if i > 0 {
                        t_ms += spread_ms;
                    }
                    events.push((secs(t_ms), MidiEvent::NoteOn {
                        pitch,
                        velocity: *velocity,
                    }));
                }
            }

            Gesture::ReleaseAll { pitches } => {
                for &pitch in pitches {
                    events.push((secs(t_ms), MidiEvent::NoteOff { pitch }));
                }
            }

            Gesture::PedalDown => events.push((secs(t_ms), pedal(MIDI_MAX))),

            Gesture::PedalUp => events.push((secs(t_ms), pedal(0))),

            Gesture::PedalRamp { from, to, ms } => {
                let steps = (ms / RAMP_STEP_MS).max(1);
                for i in 1..=steps {
                    let f = smoothstep(i as f32 / steps as f32);
                    let value = lerp(*from as f32, *to as f32, f).round() as u8;
                    let at = t_ms + ms * i / steps;
                    events.push((secs(at), pedal(value)));
                }
                t_ms += ms;
            }
        }
    }

    events
}

/// A short pedalled passage: rolled chords, a repeated note struck while
/// still sounding, half-pedalling over a released chord, and a dry staccato
/// run that retires quickly. Roughly nine seconds.
pub fn demo_sequence() -> Vec<Gesture> {
    let c_major = vec![48, 55, 60, 64, 67];
    let a_minor = vec![45, 52, 57, 60, 64];
    let f_major = vec![41, 48, 53, 57, 65];
    let g_major = vec![43, 50, 55, 59, 67];

    vec![
        Gesture::Hold { ms: 200 },

        // Pedalled C major, released into the pedal
        Gesture::PedalDown,
        Gesture::Chord { pitches: c_major.clone(), velocity: 90, spread_ms: 40 },
        Gesture::Hold { ms: 600 },
        Gesture::ReleaseAll { pitches: c_major },
        Gesture::Hold { ms: 400 },

        // Pedal change into A minor
        Gesture::PedalUp,
        Gesture::Hold { ms: 60 },
        Gesture::PedalDown,
        Gesture::Chord { pitches: a_minor.clone(), velocity: 75, spread_ms: 50 },
        Gesture::Hold { ms: 500 },
        Gesture::ReleaseAll { pitches: a_minor },

        // Melody note restruck while it still rings
        Gesture::Strike { pitch: 72, velocity: 100 },
        Gesture::Hold { ms: 250 },
        Gesture::Strike { pitch: 72, velocity: 70 },
        Gesture::Hold { ms: 250 },
        Gesture::Release { pitch: 72 },

        // F major, then half-pedal the tail away
        Gesture::Chord { pitches: f_major.clone(), velocity: 85, spread_ms: 30 },
        Gesture::Hold { ms: 500 },
        Gesture::ReleaseAll { pitches: f_major },
        Gesture::PedalRamp { from: 127, to: 50, ms: 600 },
        Gesture::Hold { ms: 400 },
        Gesture::PedalRamp { from: 50, to: 0, ms: 300 },

        // Dry staccato run on the dominant
        Gesture::Strike { pitch: 67, velocity: 80 },
        Gesture::Hold { ms: 120 },
        Gesture::Release { pitch: 67 },
        Gesture::Strike { pitch: 71, velocity: 80 },
        Gesture::Hold { ms: 120 },
        Gesture::Release { pitch: 71 },
        Gesture::Strike { pitch: 74, velocity: 85 },
        Gesture::Hold { ms: 120 },
        Gesture::Release { pitch: 74 },

        // Final pedalled G major, then let everything die away
        Gesture::PedalDown,
        Gesture::Chord { pitches: g_major.clone(), velocity: 95, spread_ms: 35 },
        Gesture::Hold { ms: 800 },
        Gesture::ReleaseAll { pitches: g_major },
        Gesture::Hold { ms: 1200 },
        Gesture::PedalUp,
        Gesture::Hold { ms: 2000 },
    ]
}

fn pedal(value: u8) -> MidiEvent {
    MidiEvent::ControlChange {
        controller: SUSTAIN_CONTROLLER,
        value,
    }
}

fn secs(ms: u32) -> f64 {
    ms as f64 / 1000.0
}

// ─── Math helpers ───────────────────────────────────────────────────────────

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Smooth interpolation (ease in/out)
fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
