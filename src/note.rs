use crate::config::DecayConfig;
use crate::geometry::coords_for_pitch;
use crate::types::{NoteView, Vec2};

/// One struck note, decaying from onset to inaudibility.
///
/// Two exponential processes run side by side:
///
/// - **Amplitude** (`amplitude_weight × volume`) decays with a pitch- and
///   pedal-dependent sustain constant. When it drops below the audibility
///   threshold the note stops being audible and the engine retires it.
/// - **Spatial weight** integrates amplitude over time and fades at the
///   slower reverb rate. It keeps fading after the note goes silent, which
///   is what lets the visual trail outlast the sound.
///
/// Decay is lazy: nothing changes until `advance_decay` is called, and one
/// call covering an interval is equivalent to several covering its parts
/// (up to the Euler step of the spatial integral).
#[derive(Debug, Clone)]
pub struct Note {
    pitch: u8,
    volume: f64,
    coords: Vec2,
    start_time: f64,
    released: bool,
    audible: bool,
    pedal_coupling: f64,
    amplitude_weight: f64,
    spatial_weight: f64,
    last_decay_time: f64,
}

impl Note {
    /// A held note sustains as if the pedal were fully down; only the pedal
    /// position at and after release matters.
    pub fn new(pitch: u8, volume: f64, now: f64) -> Self {
        Self {
            pitch,
            volume,
            coords: coords_for_pitch(pitch),
            start_time: now,
            released: false,
            audible: true,
            pedal_coupling: 1.0,
            amplitude_weight: 1.0,
            // onset as a unit impulse of area `volume`
            spatial_weight: volume,
            last_decay_time: now,
        }
    }

    /// Called once, on note-off. The caller guarantees it is not repeated.
    pub fn release_with_pedal(&mut self, pedal: f64) {
        self.released = true;
        self.pedal_coupling = pedal;
    }

    /// Released notes follow the live pedal (half-pedalling); held notes ignore it.
    pub fn set_pedal(&mut self, pedal: f64) {
        if self.released {
            self.pedal_coupling = pedal;
        }
    }

    /// Apply all decay between the last step and `now`; returns the note's
    /// spatial contribution. A `now` at or before the last step changes nothing.
    pub fn advance_decay(&mut self, now: f64, config: &DecayConfig) -> Vec2 {
        let elapsed = now - self.last_decay_time;
        if !(elapsed > 0.0) {
            return self.contribution();
        }

        if self.audible {
            let sustain = config.sustain_constant(self.pitch, self.pedal_coupling);
            self.amplitude_weight *= config.decay_floor.powf(elapsed / sustain);
            let amplitude = self.amplitude();
            self.spatial_weight += elapsed * amplitude;
            if amplitude < config.audibility_threshold {
                self.audible = false;
            }
        }

        self.spatial_weight *= (-elapsed * config.reverb_time_scale).exp();
        self.last_decay_time = now;
        self.contribution()
    }

    /// Spatial contribution as of the last decay step.
    pub fn contribution(&self) -> Vec2 {
        self.coords * self.spatial_weight
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude_weight * self.volume
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn coords(&self) -> Vec2 {
        self.coords
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn is_audible(&self) -> bool {
        self.audible
    }

    pub fn pedal_coupling(&self) -> f64 {
        self.pedal_coupling
    }

    pub fn amplitude_weight(&self) -> f64 {
        self.amplitude_weight
    }

    pub fn spatial_weight(&self) -> f64 {
        self.spatial_weight
    }

    pub fn last_decay_time(&self) -> f64 {
        self.last_decay_time
    }

    pub fn view(&self, now: f64) -> NoteView {
        NoteView {
            pitch: self.pitch,
            coords: self.coords,
            volume: self.volume,
            amplitude: self.amplitude(),
            spatial_weight: self.spatial_weight,
            released: self.released,
            audible: self.audible,
            pedal_coupling: self.pedal_coupling,
            age: (now - self.start_time).max(0.0),
        }
    }
}
