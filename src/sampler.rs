use crate::engine::{lock, SharedEngine};
use crate::types::*;
use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// The render/consumption path.
///
/// At a fixed rate: tick the shared clock, lock the engine, run `update` if
/// anything is worth drawing, and copy a `FieldSnapshot` out. The lock is
/// released before the snapshot goes to consumers, so drawing never holds
/// up event ingestion.
pub struct Sampler<S: TimeSource = SessionClock> {
    engine: SharedEngine,
    clock: Arc<TickClock<S>>,
    frame_txs: Vec<Sender<FieldSnapshot>>,
    render_hz: u32,
    stop: Arc<AtomicBool>,
    frames: u64,
    dropped: u64,
}

impl<S: TimeSource> Sampler<S> {
    pub fn new(
        engine: SharedEngine,
        clock: Arc<TickClock<S>>,
        frame_txs: Vec<Sender<FieldSnapshot>>,
        render_hz: u32,
    ) -> Self {
        Self {
            engine,
            clock,
            frame_txs,
            render_hz: render_hz.max(1),
            stop: Arc::new(AtomicBool::new(false)),
            frames: 0,
            dropped: 0,
        }
    }

    /// Share an externally owned stop flag.
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// One pass: returns a snapshot if the engine had anything new.
    pub fn sample(&mut self) -> Option<FieldSnapshot> {
        let now = self.clock.tick();
        let mut engine = lock(&self.engine);
        if !engine.needs_render(now) {
            return None;
        }
        Some(engine.render(now))
    }

    /// Hand a snapshot to every consumer. Slow consumers miss the frame;
    /// disconnected ones are forgotten.
    pub fn publish(&mut self, snapshot: &FieldSnapshot) {
        let mut dropped = 0;
        self.frame_txs.retain(|tx| match tx.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        self.dropped += dropped;
        self.frames += 1;
    }

    /// Blocks until the stop flag is set or every consumer has gone.
    pub fn run(&mut self) {
        let period = Duration::from_secs_f64(1.0 / self.render_hz as f64);
        info!("Sampler running at {} Hz", self.render_hz);

        while !self.stop.load(Ordering::Relaxed) && !self.frame_txs.is_empty() {
            let started = Instant::now();
            if let Some(snapshot) = self.sample() {
                trace!("{}", snapshot);
                self.publish(&snapshot);
                if self.frames % 600 == 0 {
                    debug!(
                        "Sampler: {} frames published, {} dropped",
                        self.frames, self.dropped
                    );
                }
            }
            thread::sleep(period.saturating_sub(started.elapsed()));
        }

        info!(
            "Sampler shutting down after {} frames ({} dropped)",
            self.frames, self.dropped
        );
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn consumers(&self) -> usize {
        self.frame_txs.len()
    }
}
