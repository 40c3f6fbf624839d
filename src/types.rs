use crate::geometry::note_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

// ─── Performance events ─────────────────────────────────────────────────────

/// A single performance event, already decoded from whatever transport
/// delivered it. Only these three kinds ever reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiEvent {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
    ControlChange { controller: u8, value: u8 },
}

impl MidiEvent {
    /// Decode a raw channel-voice message. The channel nibble is ignored.
    /// Note-on with velocity 0 is a note-off. Anything other than note-on,
    /// note-off or control change yields `None`.
    pub fn from_bytes(status: u8, data1: u8, data2: u8) -> Option<Self> {
        let data1 = data1 & 0x7F;
        let data2 = data2 & 0x7F;
        match status & 0xF0 {
            NOTE_OFF => Some(MidiEvent::NoteOff { pitch: data1 }),
            NOTE_ON if data2 == 0 => Some(MidiEvent::NoteOff { pitch: data1 }),
            NOTE_ON => Some(MidiEvent::NoteOn {
                pitch: data1,
                velocity: data2,
            }),
            CONTROL_CHANGE => Some(MidiEvent::ControlChange {
                controller: data1,
                value: data2,
            }),
            _ => None,
        }
    }

    pub fn is_sustain(&self) -> bool {
        matches!(
            self,
            MidiEvent::ControlChange {
                controller: SUSTAIN_CONTROLLER,
                ..
            }
        )
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiEvent::NoteOn { pitch, velocity } => {
                write!(f, "NoteOn  {:<4} vel={}", note_name(pitch), velocity)
            }
            MidiEvent::NoteOff { pitch } => write!(f, "NoteOff {:<4}", note_name(pitch)),
            MidiEvent::ControlChange { controller, value } => {
                write!(f, "CC {:#04x} = {}", controller, value)
            }
        }
    }
}

// ─── Field geometry ─────────────────────────────────────────────────────────

/// A point (or weighted direction) in the pitch-class plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

// ─── Read surface ───────────────────────────────────────────────────────────

/// What a renderer may know about one live note.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NoteView {
    pub pitch: u8,
    /// Unit vector for the note's pitch class
    pub coords: Vec2,
    /// Strike strength, 0.0–1.0
    pub volume: f64,
    /// Current simulated amplitude (decay weight × volume)
    pub amplitude: f64,
    /// Running spatial contribution; outlives `amplitude`
    pub spatial_weight: f64,
    pub released: bool,
    pub audible: bool,
    pub pedal_coupling: f64,
    /// Seconds since the note was struck
    pub age: f64,
}

/// Complete field state at a moment in time.
/// Produced under the engine lock, consumed outside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub time: f64,
    /// Aggregate center: every live note plus the reverb accumulator
    pub center: Vec2,
    /// Reverb accumulator on its own
    pub reverb: Vec2,
    /// Sustain pedal, 0.0 (up) to 1.0 (down)
    pub pedal: f64,
    pub notes: Vec<NoteView>,
}

impl FieldSnapshot {
    /// Center with log-magnitude compression, so a dense chord does not fling
    /// the center far outside the unit circle.
    pub fn display_center(&self) -> Vec2 {
        let scale = self.center.length().ln_1p() * DISPLAY_GAIN;
        self.center * scale
    }

    pub fn sounding(&self) -> impl Iterator<Item = &NoteView> {
        self.notes.iter().filter(|n| n.audible)
    }
}

impl fmt::Display for FieldSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>8.3}s  center={}  reverb={}  pedal={:.2}  notes={}",
            self.time,
            self.center,
            self.reverb,
            self.pedal,
            self.notes.len(),
        )
    }
}

// ─── Clocks ─────────────────────────────────────────────────────────────────

/// Anything that can report monotonic seconds.
pub trait TimeSource: Send + Sync {
    fn now_secs(&self) -> f64;
}

/// Monotonic wall clock for the session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SessionClock {
    fn now_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Hand-driven time source for tests and offline replay.
#[derive(Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, secs: f64) {
        self.set(self.now_secs() + secs);
    }
}

impl TimeSource for ManualClock {
    fn now_secs(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// Shared, throttled "now".
///
/// Both the event path and the render path call `tick()`; the shared value
/// only moves when the source has advanced by more than `resolution`, so
/// every decay computation inside one pass sees the same timestamp.
/// The value never moves backward.
pub struct TickClock<S: TimeSource = SessionClock> {
    source: S,
    resolution: f64,
    now_bits: AtomicU64,
}

impl<S: TimeSource> TickClock<S> {
    pub fn new(source: S, resolution: f64) -> Self {
        let start = source.now_secs();
        Self {
            source,
            resolution,
            now_bits: AtomicU64::new(start.to_bits()),
        }
    }

    /// Current shared timestamp, without consulting the source.
    pub fn now(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::Acquire))
    }

    /// Refresh from the source if enough time has passed; returns the shared now.
    pub fn tick(&self) -> f64 {
        let reading = self.source.now_secs();
        let mut current = self.now_bits.load(Ordering::Acquire);
        loop {
            let now = f64::from_bits(current);
            if reading - now <= self.resolution {
                return now;
            }
            match self.now_bits.compare_exchange_weak(
                current,
                reading.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return reading,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const CONTROL_CHANGE: u8 = 0xB0;

/// Damper (sustain) pedal controller number.
pub const SUSTAIN_CONTROLLER: u8 = 0x40;

pub const MIDI_MAX: u8 = 127;

/// Gain applied by `FieldSnapshot::display_center`.
pub const DISPLAY_GAIN: f64 = 0.21;
