//! Hooks through which the host receives raw events and per-hit statistics.

use crate::types::{Hit, RawEvent};

/// Host-side processing of unpacked data.
///
/// Both methods run synchronously on the caller's thread. A raw event is
/// lent for the duration of [`EventHandler::on_raw_event`] only and released
/// by the unpacker as soon as the call returns; clone what must outlive it.
pub trait EventHandler {
    /// Called exactly once per finalized raw event, in anchor order.
    fn on_raw_event(&mut self, event: &RawEvent);

    /// Called once per valid hit accepted into a queue, before grouping.
    fn on_hit(&mut self, _hit: &Hit) {}
}

/// Discards everything.
impl EventHandler for () {
    fn on_raw_event(&mut self, _event: &RawEvent) {}
}

/// Keeps a copy of every raw event it is handed.
#[derive(Debug, Default, Clone)]
pub struct EventCollector {
    events: Vec<RawEvent>,
    hits_seen: u64,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected events, in delivery order.
    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    /// Valid hits reported through `on_hit`.
    pub fn hits_seen(&self) -> u64 {
        self.hits_seen
    }

    /// Takes the collected events, leaving the collector empty.
    pub fn take(&mut self) -> Vec<RawEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventHandler for EventCollector {
    fn on_raw_event(&mut self, event: &RawEvent) {
        self.events.push(event.clone());
    }

    fn on_hit(&mut self, _hit: &Hit) {
        self.hits_seen += 1;
    }
}
