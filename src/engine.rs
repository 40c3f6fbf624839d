use crate::config::DecayConfig;
use crate::geometry::note_name;
use crate::note::Note;
use crate::reverb::ReverbCenter;
use crate::types::*;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The engine as shared between the event path and the render path.
/// One lock guards every note, the reverb center and the pedal.
pub type SharedEngine = Arc<Mutex<Engine>>;

pub fn shared(engine: Engine) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Lock the shared engine. A panic on another thread leaves the state
/// consistent between calls, so a poisoned lock is taken over as-is.
pub fn lock(engine: &SharedEngine) -> MutexGuard<'_, Engine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the live notes and the reverb center, applies performance events,
/// and aggregates everything into a single center vector.
///
/// # Note lifecycle
///
/// absent → sounding (held) → sustaining (released) → retired
///
/// A note is retired when it stops being audible during `update`, or when
/// its pitch is struck again. Retirement moves its final spatial
/// contribution into the reverb center, so no energy disappears abruptly.
///
/// Every time-dependent call takes `now` explicitly; the engine never reads
/// a clock of its own.
pub struct Engine {
    config: DecayConfig,
    /// Ordered so that aggregation sums in a fixed order
    notes: BTreeMap<u8, Note>,
    reverb: ReverbCenter,
    /// Sustain pedal, 0.0 (up) to 1.0 (down)
    pedal: f64,
    /// Aggregate center from the most recent update
    center: Vec2,
    /// A note was struck or released since the last update
    notes_changed: bool,
    last_render: f64,
    retired: u64,
}

impl Engine {
    pub fn new(config: DecayConfig) -> Self {
        let reverb = ReverbCenter::new(config.reverb_time_scale, 0.0);
        Self {
            config,
            notes: BTreeMap::new(),
            reverb,
            pedal: 0.0,
            center: Vec2::ZERO,
            notes_changed: false,
            last_render: f64::NEG_INFINITY,
            retired: 0,
        }
    }

    /// Apply one event.
    pub fn handle(&mut self, event: &MidiEvent, now: f64) {
        trace!("t={:.3} {}", now, event);
        match *event {
            MidiEvent::NoteOn { pitch, velocity } => self.note_on(pitch, velocity, now),
            MidiEvent::NoteOff { pitch } => self.note_off(pitch, now),
            MidiEvent::ControlChange { controller, value } => self.damper(controller, value, now),
        }
    }

    /// Strike a note. A note already at this pitch is retired first.
    /// Velocity 0 is treated as a note-off.
    pub fn note_on(&mut self, pitch: u8, velocity: u8, now: f64) {
        if velocity == 0 {
            self.note_off(pitch, now);
            return;
        }
        if let Some(old) = self.notes.remove(&pitch) {
            self.retire(old, now);
        }
        self.notes
            .insert(pitch, Note::new(pitch, normalize(velocity), now));
        self.notes_changed = true;
    }

    /// Release a note under the current pedal. Unknown or already-released
    /// pitches are ignored.
    pub fn note_off(&mut self, pitch: u8, now: f64) {
        let Some(note) = self.notes.get_mut(&pitch) else {
            return;
        };
        if note.is_released() {
            return;
        }
        // Decay accrued while held uses the held regime.
        note.advance_decay(now, &self.config);
        note.release_with_pedal(self.pedal);
        self.notes_changed = true;
    }

    /// Control change. Only the sustain pedal is acted on.
    pub fn damper(&mut self, controller: u8, value: u8, now: f64) {
        if controller != SUSTAIN_CONTROLLER {
            trace!("ignoring controller {:#04x}", controller);
            return;
        }
        let level = normalize(value);
        for note in self.notes.values_mut() {
            if note.is_released() {
                note.advance_decay(now, &self.config);
            }
            note.set_pedal(level);
        }
        self.pedal = level;
    }

    /// Decay everything to `now`, recompute the aggregate center, then
    /// retire every note that went silent in this pass. The retired notes
    /// are counted in this pass's center exactly once, as live notes.
    pub fn update(&mut self, now: f64) -> Vec2 {
        let mut center = Vec2::ZERO;
        let mut expired = Vec::new();
        for (&pitch, note) in self.notes.iter_mut() {
            center += note.advance_decay(now, &self.config);
            if !note.is_audible() {
                expired.push(pitch);
            }
        }
        center += self.reverb.read(now);

        for pitch in expired {
            if let Some(note) = self.notes.remove(&pitch) {
                self.retire(note, now);
            }
        }

        self.center = center;
        self.notes_changed = false;
        self.last_render = now;
        center
    }

    /// Whether a renderer has anything new to draw: a note was struck or
    /// released, or the render interval has elapsed.
    pub fn needs_render(&self, now: f64) -> bool {
        self.notes_changed || now - self.last_render >= self.config.render_interval
    }

    /// Copy out everything a renderer may read, as of the last update.
    pub fn snapshot(&self, now: f64) -> FieldSnapshot {
        FieldSnapshot {
            time: now,
            center: self.center,
            reverb: self.reverb.vector(),
            pedal: self.pedal,
            notes: self.notes.values().map(|n| n.view(now)).collect(),
        }
    }

    /// `update` followed by `snapshot`.
    pub fn render(&mut self, now: f64) -> FieldSnapshot {
        self.update(now);
        self.snapshot(now)
    }

    fn retire(&mut self, mut note: Note, now: f64) {
        let contribution = note.advance_decay(now, &self.config);
        self.reverb.absorb(contribution, now);
        self.retired += 1;
        debug!(
            "retired {} after {:.2}s (spatial {:.4})",
            note_name(note.pitch()),
            now - note.start_time(),
            note.spatial_weight(),
        );
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Aggregate center from the most recent update.
    pub fn center(&self) -> Vec2 {
        self.center
    }

    /// Reverb accumulator as of its last update.
    pub fn reverb_center(&self) -> Vec2 {
        self.reverb.vector()
    }

    pub fn pedal(&self) -> f64 {
        self.pedal
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn note(&self, pitch: u8) -> Option<&Note> {
        self.notes.get(&pitch)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn notes_changed(&self) -> bool {
        self.notes_changed
    }

    /// Notes retired since the engine was created.
    pub fn retired_count(&self) -> u64 {
        self.retired
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(DecayConfig::default())
    }
}

/// 0–127 → 0.0–1.0, clamping anything above 127.
fn normalize(value: u8) -> f64 {
    value.min(MIDI_MAX) as f64 / MIDI_MAX as f64
}
