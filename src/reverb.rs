use crate::types::Vec2;

/// Decaying accumulator for the spatial energy of retired notes.
///
/// Every read and every merge first brings the vector up to date, so the
/// result does not depend on the order in which callers touch it.
#[derive(Debug, Clone)]
pub struct ReverbCenter {
    vector: Vec2,
    last_update: f64,
    time_scale: f64,
}

impl ReverbCenter {
    pub fn new(time_scale: f64, now: f64) -> Self {
        Self {
            vector: Vec2::ZERO,
            last_update: now,
            time_scale,
        }
    }

    /// Fade the accumulator up to `now`. Earlier timestamps are ignored.
    pub fn decay(&mut self, now: f64) {
        let elapsed = now - self.last_update;
        if elapsed > 0.0 {
            self.vector = self.vector * (-elapsed * self.time_scale).exp();
            self.last_update = now;
        }
    }

    /// Merge a retired note's final contribution.
    pub fn absorb(&mut self, contribution: Vec2, now: f64) {
        self.decay(now);
        self.vector += contribution;
    }

    /// Current vector, decayed to `now`.
    pub fn read(&mut self, now: f64) -> Vec2 {
        self.decay(now);
        self.vector
    }

    /// Vector as of the last update, without decaying.
    pub fn vector(&self) -> Vec2 {
        self.vector
    }

    pub fn last_update(&self) -> f64 {
        self.last_update
    }
}
