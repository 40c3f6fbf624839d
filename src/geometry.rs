//! Pitch geometry: where each pitch class sits on the unit circle.
//!
//! Pitch classes are laid out in circle-of-fifths order (C, G, D, A, ...)
//! rather than chromatically, so harmonically close notes land close
//! together and a consonant chord pulls the center decisively one way.

use crate::types::Vec2;
use std::f64::consts::PI;
use std::sync::OnceLock;

/// Angle between adjacent pitch classes.
pub const PC_RADS: f64 = 2.0 * PI / 12.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

fn base_vectors() -> &'static [Vec2; 12] {
    static TABLE: OnceLock<[Vec2; 12]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [Vec2::ZERO; 12];
        for (pc, v) in table.iter_mut().enumerate() {
            let angle = pc as f64 * PC_RADS;
            *v = Vec2::new(angle.cos(), angle.sin());
        }
        table
    })
}

/// Circle-of-fifths position (0–11) of a MIDI pitch.
pub fn fifths_class(pitch: u8) -> usize {
    (pitch as usize * 7) % 12
}

/// Fixed unit vector for a MIDI pitch. Octaves share a vector.
pub fn coords_for_pitch(pitch: u8) -> Vec2 {
    base_vectors()[fifths_class(pitch)]
}

/// Scientific pitch name, e.g. 60 → "C4".
pub fn note_name(pitch: u8) -> String {
    let name = NOTE_NAMES[pitch as usize % 12];
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", name, octave)
}
