//! Spill-level controller.
//!
//! [`Unpacker`] owns the hit queues, the event builder and the channel
//! counters, and runs one decode → sort → build cycle per spill. Everything
//! is synchronous: when [`Unpacker::read_spill`] returns, every raw event of
//! that spill has been handed to the handler. Run one unpacker per stream;
//! nothing here is shared or locked.

use crate::builder::EventBuilder;
use crate::decoder::{SpillDecoder, DEFAULT_MAX_WORDS};
use crate::handler::EventHandler;
use crate::parser::{BUFFER_HEADER_WORDS, MIN_HEADER_WORDS};
use crate::queue::HitQueues;
use crate::stats::ChannelCounts;
use crate::types::Hit;
use log::{info, warn};
use thiserror::Error;

/// Default raw event width in clock ticks.
pub const DEFAULT_EVENT_WIDTH: u32 = 100;
/// Default highest module index.
pub const DEFAULT_MAX_MODULE: u16 = 12;
/// Default highest channel index.
pub const DEFAULT_MAX_CHANNEL: u16 = 15;
/// Default maximum spill size in words.
pub const DEFAULT_TOTAL_READ: usize = 1_000_000;

/// Errors reported by the unpacker.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UnpackError {
    #[error("Spill of {words} words exceeds the maximum of {max} words")]
    SpillTooLarge { words: usize, max: usize },

    #[error("Event width must be at least 1 tick")]
    InvalidEventWidth,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Unpacker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackerConfig {
    /// Raw event width in clock ticks (>= 1)
    pub event_width: u32,
    /// Highest accepted module index
    pub max_module: u16,
    /// Highest accepted channel index
    pub max_channel: u16,
    /// Maximum spill size in words
    pub total_read: usize,
    /// Maximum module buffer size in words
    pub max_words: usize,
    /// Report record faults as warnings
    pub debug: bool,
}

impl Default for UnpackerConfig {
    fn default() -> Self {
        Self {
            event_width: DEFAULT_EVENT_WIDTH,
            max_module: DEFAULT_MAX_MODULE,
            max_channel: DEFAULT_MAX_CHANNEL,
            total_read: DEFAULT_TOTAL_READ,
            max_words: DEFAULT_MAX_WORDS,
            debug: false,
        }
    }
}

impl UnpackerConfig {
    /// Checks the configuration for values the unpacker cannot run with.
    pub fn validate(&self) -> Result<(), UnpackError> {
        if self.event_width == 0 {
            return Err(UnpackError::InvalidEventWidth);
        }
        if self.total_read == 0 {
            return Err(UnpackError::InvalidConfig(
                "total_read must be at least 1 word".to_string(),
            ));
        }
        if self.max_words < BUFFER_HEADER_WORDS + MIN_HEADER_WORDS {
            return Err(UnpackError::InvalidConfig(format!(
                "max_words must hold at least one record ({} words), got {}",
                BUFFER_HEADER_WORDS + MIN_HEADER_WORDS,
                self.max_words
            )));
        }
        Ok(())
    }
}

/// Outcome of one [`Unpacker::read_spill`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpillSummary {
    /// Words handed in
    pub words_read: usize,
    /// Words the decoder consumed; less than `words_read` on framing faults
    pub words_consumed: usize,
    /// Hits decoded
    pub hits: usize,
    /// Hits accepted into the queues
    pub accepted: usize,
    /// Hits rejected for out-of-range module or channel
    pub rejected: usize,
    /// Hits flagged invalid by the decoder
    pub invalid: usize,
    /// Record and buffer faults recovered from
    pub faults: usize,
    /// Raw events handed to the handler
    pub raw_events: usize,
}

impl SpillSummary {
    /// True if the spill produced at least one raw event.
    pub fn produced_events(&self) -> bool {
        self.raw_events > 0
    }

    /// True if the decoder stopped before the end of the spill.
    pub fn misaligned(&self) -> bool {
        self.words_consumed < self.words_read
    }
}

/// Totals accumulated since creation or the last [`Unpacker::close`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub spills: u64,
    pub hits: u64,
    pub rejected: u64,
    pub invalid: u64,
    pub faults: u64,
    pub raw_events: u64,
}

/// Decodes spills and delivers time-windowed raw events to a handler.
#[derive(Debug)]
pub struct Unpacker<H: EventHandler = ()> {
    config: UnpackerConfig,
    decoder: SpillDecoder,
    queues: HitQueues,
    builder: EventBuilder,
    counts: ChannelCounts,
    handler: H,
    totals: RunTotals,
    scratch: Vec<Hit>,
}

impl<H: EventHandler> Unpacker<H> {
    /// Creates an unpacker after validating `config`.
    pub fn new(config: UnpackerConfig, handler: H) -> Result<Self, UnpackError> {
        config.validate()?;
        Ok(Self::from_parts(config, handler))
    }

    /// Creates an unpacker with the default configuration.
    pub fn with_handler(handler: H) -> Self {
        Self::from_parts(UnpackerConfig::default(), handler)
    }

    fn from_parts(config: UnpackerConfig, handler: H) -> Self {
        let mut decoder = SpillDecoder::new(config.max_words);
        decoder.set_debug(config.debug);

        Self {
            decoder,
            queues: HitQueues::new(config.max_module, config.max_channel),
            builder: EventBuilder::new(),
            counts: ChannelCounts::new(config.max_module, config.max_channel),
            handler,
            totals: RunTotals::default(),
            scratch: Vec::new(),
            config,
        }
    }

    /// Decodes one spill, time-sorts its hits and hands every raw event to
    /// the handler.
    ///
    /// A spill longer than the configured `total_read` is refused as a
    /// whole, before anything is decoded. Malformed records are skipped and
    /// counted in the summary; they never fail the call.
    pub fn read_spill(
        &mut self,
        words: &[u32],
        verbose: bool,
    ) -> Result<SpillSummary, UnpackError> {
        if words.len() > self.config.total_read {
            warn!(
                "Refusing spill of {} words (maximum {})",
                words.len(),
                self.config.total_read
            );
            return Err(UnpackError::SpillTooLarge {
                words: words.len(),
                max: self.config.total_read,
            });
        }

        let mut hits = std::mem::take(&mut self.scratch);
        let decoded = self.decoder.decode_spill(words, &mut self.counts, &mut hits);
        if decoded.words_consumed < words.len() {
            warn!(
                "Decoder stopped after {} of {} spill words",
                decoded.words_consumed,
                words.len()
            );
        }

        let mut summary = SpillSummary {
            words_read: words.len(),
            words_consumed: decoded.words_consumed,
            hits: decoded.hits,
            invalid: decoded.invalid,
            faults: decoded.faults,
            ..SpillSummary::default()
        };

        for hit in hits.drain(..) {
            if self.add_hit(hit) {
                summary.accepted += 1;
            } else {
                summary.rejected += 1;
            }
        }
        self.scratch = hits;

        summary.raw_events = self.build_raw_events();

        self.totals.spills += 1;
        self.totals.hits += summary.hits as u64;
        self.totals.invalid += summary.invalid as u64;
        self.totals.faults += summary.faults as u64;

        if verbose {
            info!(
                "Spill {}: {} words, {} hits ({} rejected, {} invalid), {} raw events",
                self.totals.spills,
                summary.words_read,
                summary.hits,
                summary.rejected,
                summary.invalid,
                summary.raw_events
            );
        }

        Ok(summary)
    }

    /// Queues a single hit.
    ///
    /// Returns false and drops the hit if its module or channel is outside
    /// the configured bounds. Valid accepted hits are reported to the
    /// handler's `on_hit`.
    pub fn add_hit(&mut self, hit: Hit) -> bool {
        if !self.queues.accepts(hit.module, hit.channel) {
            self.totals.rejected += 1;
        } else if hit.valid {
            self.handler.on_hit(&hit);
        }
        self.queues.add(hit)
    }

    /// Time-sorts every queued hit and hands the resulting raw events to
    /// the handler. Returns the number of raw events produced.
    pub fn build_raw_events(&mut self) -> usize {
        let sorted = self.queues.time_sort();
        let produced = self
            .builder
            .build(sorted, self.config.event_width, &mut self.handler);
        self.totals.raw_events += produced as u64;
        produced
    }

    /// Discards queued hits and any open raw event, then clears the channel
    /// counts and run totals.
    ///
    /// With `emit_counts`, returns the counts as they were before clearing.
    /// Calling it again on a closed unpacker only re-clears empty state.
    pub fn close(&mut self, emit_counts: bool) -> Option<ChannelCounts> {
        let dropped = self.queues.len() + self.builder.discard();
        if dropped > 0 {
            warn!("Discarding {} unprocessed hits on close", dropped);
        }
        self.queues.clear();

        let snapshot = if emit_counts {
            info!(
                "Emitting channel counts: {} hits over {} spills",
                self.counts.total(),
                self.totals.spills
            );
            Some(self.counts.clone())
        } else {
            None
        };

        self.counts.reset();
        self.totals = RunTotals::default();
        snapshot
    }

    /// Number of module rows in use (highest module seen + 1).
    pub fn max_module(&self) -> usize {
        self.queues.module_count()
    }

    /// Raw event width in clock ticks.
    pub fn event_width(&self) -> u32 {
        self.config.event_width
    }

    /// Sets the raw event width; applies from the next raw event opened.
    pub fn set_event_width(&mut self, width: u32) -> Result<u32, UnpackError> {
        if width == 0 {
            return Err(UnpackError::InvalidEventWidth);
        }
        self.config.event_width = width;
        Ok(width)
    }

    pub fn debug_mode(&self) -> bool {
        self.config.debug
    }

    /// Toggles debug mode. Returns the new state.
    pub fn set_debug_mode(&mut self, state: bool) -> bool {
        self.config.debug = state;
        self.decoder.set_debug(state);
        state
    }

    pub fn config(&self) -> &UnpackerConfig {
        &self.config
    }

    /// Hits decoded per channel since the last close.
    pub fn channel_counts(&self) -> &ChannelCounts {
        &self.counts
    }

    pub fn totals(&self) -> RunTotals {
        self.totals
    }

    /// Hits waiting in the queues.
    pub fn pending(&self) -> usize {
        self.queues.len()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}
