use crate::engine::{lock, SharedEngine};
use crate::types::*;
use crossbeam_channel::Receiver;
use log::{debug, info};
use std::sync::Arc;

/// The event-ingestion path.
///
/// Receives decoded performance events, stamps each with the shared clock,
/// and applies it to the engine while holding the engine lock for exactly
/// that one call. Events are applied in the order they arrive on the
/// channel, so note-on/note-off pairs for a pitch never swap.
pub struct Coordinator<S: TimeSource = SessionClock> {
    event_rx: Receiver<MidiEvent>,
    engine: SharedEngine,
    clock: Arc<TickClock<S>>,
    handled: u64,
}

impl<S: TimeSource> Coordinator<S> {
    pub fn new(event_rx: Receiver<MidiEvent>, engine: SharedEngine, clock: Arc<TickClock<S>>) -> Self {
        Self {
            event_rx,
            engine,
            clock,
            handled: 0,
        }
    }

    /// Apply one event at the current shared time.
    pub fn apply(&mut self, event: &MidiEvent) {
        let now = self.clock.tick();
        {
            let mut engine = lock(&self.engine);
            engine.handle(event, now);
        }
        self.handled += 1;
    }

    /// Blocks until every sender is dropped.
    pub fn run(&mut self) {
        info!("Coordinator running");

        while let Ok(event) = self.event_rx.recv() {
            self.apply(&event);
            if self.handled % 1000 == 0 {
                debug!("Coordinator: {} events applied", self.handled);
            }
        }

        info!("Coordinator shutting down after {} events", self.handled);
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }
}
