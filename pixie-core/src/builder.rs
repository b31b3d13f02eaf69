//! Raw event builder.
//!
//! Consumes the time-sorted hit sequence and groups hits lying within the
//! event width of the first hit of an event. The open event is finalized,
//! handed to the [`EventHandler`] and released as soon as a hit falls
//! outside its window or the sequence runs out.

use crate::handler::EventHandler;
use crate::types::{Hit, RawEvent};

/// Builder state between two hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    /// No raw event open
    Empty,
    /// A raw event holds at least one hit and still accepts hits
    Open,
}

/// Windowing state machine turning sorted hits into raw events.
#[derive(Debug, Default)]
pub struct EventBuilder {
    open: Option<RawEvent>,
}

impl EventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BuilderState {
        match self.open {
            Some(_) => BuilderState::Open,
            None => BuilderState::Empty,
        }
    }

    /// Feeds the next hit of the sorted sequence.
    ///
    /// `width` is only read when the hit opens a new event. Returns true if
    /// the previously open event was finalized.
    pub fn push<H: EventHandler>(&mut self, hit: Hit, width: u32, handler: &mut H) -> bool {
        if let Some(event) = self.open.as_mut() {
            if event.admits(hit.timestamp) {
                event.push(hit);
                return false;
            }
        }
        let finalized = self.finalize(handler);
        self.open = Some(RawEvent::open(hit, width));
        finalized
    }

    /// Finalizes the open event, if any. Returns true if one was handed off.
    pub fn finish<H: EventHandler>(&mut self, handler: &mut H) -> bool {
        self.finalize(handler)
    }

    /// Groups a whole sorted sequence and finalizes the last event.
    ///
    /// `sorted` must be timestamp-ascending. A hit earlier than the open
    /// event's anchor is not admitted; it opens a new event instead.
    ///
    /// Returns the number of raw events produced; zero means the sequence
    /// was empty.
    pub fn build<H, I>(&mut self, sorted: I, width: u32, handler: &mut H) -> usize
    where
        H: EventHandler,
        I: IntoIterator<Item = Hit>,
    {
        let mut produced = 0;
        for hit in sorted {
            if self.push(hit, width, handler) {
                produced += 1;
            }
        }
        if self.finish(handler) {
            produced += 1;
        }
        produced
    }

    /// Drops the open event without handing it off. Returns the number of
    /// hits lost.
    pub fn discard(&mut self) -> usize {
        self.open.take().map_or(0, |event| event.len())
    }

    fn finalize<H: EventHandler>(&mut self, handler: &mut H) -> bool {
        match self.open.take() {
            Some(event) => {
                handler.on_raw_event(&event);
                true
            }
            None => false,
        }
    }
}
