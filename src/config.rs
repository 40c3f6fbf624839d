//! Decay constants — the tunable shape of the energy field.
//!
//! Loaded from (and saved to) a small JSON file. Every field has a default,
//! so a partial file only overrides what it names.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Sustain constant (s) with the pedal fully up
    #[serde(default = "DecayConfig::default_min_sustain")]
    pub min_sustain: f64,
    /// Sustain constant (s) at `reference_pitch` with the pedal fully down
    #[serde(default = "DecayConfig::default_base_sustain")]
    pub base_sustain: f64,
    /// Factor applied to the maximum sustain per octave above the reference
    #[serde(default = "DecayConfig::default_decay_ratio")]
    pub decay_ratio: f64,
    #[serde(default = "DecayConfig::default_reference_pitch")]
    pub reference_pitch: u8,
    /// Fraction of amplitude left after one sustain constant
    #[serde(default = "DecayConfig::default_decay_floor")]
    pub decay_floor: f64,
    /// Amplitude below which a note is retired
    #[serde(default = "DecayConfig::default_audibility_threshold")]
    pub audibility_threshold: f64,
    /// Rate (1/s) of the slow spatial and reverb decay
    #[serde(default = "DecayConfig::default_reverb_time_scale")]
    pub reverb_time_scale: f64,
    /// Minimum clock advance (s)
    #[serde(default = "DecayConfig::default_tick_resolution")]
    pub tick_resolution: f64,
    /// Longest gap (s) between renders when nothing was struck
    #[serde(default = "DecayConfig::default_render_interval")]
    pub render_interval: f64,
}

impl DecayConfig {
    fn default_min_sustain() -> f64 {
        0.75
    }
    fn default_base_sustain() -> f64 {
        20.0
    }
    fn default_decay_ratio() -> f64 {
        0.66
    }
    fn default_reference_pitch() -> u8 {
        21
    }
    fn default_decay_floor() -> f64 {
        0.002
    }
    fn default_audibility_threshold() -> f64 {
        0.001
    }
    fn default_reverb_time_scale() -> f64 {
        0.5
    }
    fn default_tick_resolution() -> f64 {
        0.01
    }
    fn default_render_interval() -> f64 {
        0.05
    }

    /// Sustain constant with the pedal fully down. Higher notes ring out faster.
    pub fn max_sustain(&self, pitch: u8) -> f64 {
        let octaves = (pitch as f64 - self.reference_pitch as f64) / 12.0;
        self.base_sustain * self.decay_ratio.powf(octaves)
    }

    /// Interpolates between the dry and fully-pedalled sustain constants.
    pub fn sustain_constant(&self, pitch: u8, coupling: f64) -> f64 {
        let coupling = coupling.clamp(0.0, 1.0);
        self.min_sustain + (self.max_sustain(pitch) - self.min_sustain) * coupling
    }

    /// Time for a full-volume, undamped note to fall below the audibility
    /// threshold.
    pub fn retirement_bound(&self) -> f64 {
        self.min_sustain * self.audibility_threshold.recip().ln() / self.decay_floor.recip().ln()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.min_sustain > 0.0) {
            return Err(format!("min_sustain must be positive, got {}", self.min_sustain));
        }
        if !(self.base_sustain > 0.0) {
            return Err(format!("base_sustain must be positive, got {}", self.base_sustain));
        }
        if !(self.decay_ratio > 0.0) {
            return Err(format!("decay_ratio must be positive, got {}", self.decay_ratio));
        }
        if !(self.decay_floor > 0.0 && self.decay_floor < 1.0) {
            return Err(format!("decay_floor must be in (0, 1), got {}", self.decay_floor));
        }
        if !(self.audibility_threshold > 0.0 && self.audibility_threshold < 1.0) {
            return Err(format!(
                "audibility_threshold must be in (0, 1), got {}",
                self.audibility_threshold
            ));
        }
        if !(self.reverb_time_scale >= 0.0) {
            return Err(format!(
                "reverb_time_scale must be non-negative, got {}",
                self.reverb_time_scale
            ));
        }
        if !(self.tick_resolution >= 0.0) || !(self.render_interval >= 0.0) {
            return Err("tick_resolution and render_interval must be non-negative".into());
        }
        Ok(())
    }

    /// Load from a JSON file. Returns None if the file is absent, malformed,
    /// or holds values the engine cannot use.
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        let config: Self = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to parse decay config {:?}: {}", path, e);
                return None;
            }
        };
        if let Err(e) = config.validate() {
            warn!("Rejected decay config {:?}: {}", path, e);
            return None;
        }
        info!("Loaded decay config from {:?}", path);
        Some(config)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Decay config saved to {:?}", path);
        Ok(())
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            min_sustain: Self::default_min_sustain(),
            base_sustain: Self::default_base_sustain(),
            decay_ratio: Self::default_decay_ratio(),
            reference_pitch: Self::default_reference_pitch(),
            decay_floor: Self::default_decay_floor(),
            audibility_threshold: Self::default_audibility_threshold(),
            reverb_time_scale: Self::default_reverb_time_scale(),
            tick_resolution: Self::default_tick_resolution(),
            render_interval: Self::default_render_interval(),
        }
    }
}
