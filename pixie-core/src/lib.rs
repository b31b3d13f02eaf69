//! Pixie-16 list-mode unpacker.
//!
//! This crate turns raw list-mode spills from a Pixie-16 digitizer crate into
//! time-ordered raw events. Each spill is decoded into per-channel hit
//! queues, merged into one timestamp-ordered sequence, and grouped into raw
//! events whose hits lie within a configurable window of the first hit.
//!
//! # Example
//!
//! ```
//! use pixie_core::{EventCollector, Hit, SpillBuilder, Unpacker, UnpackerConfig};
//!
//! let config = UnpackerConfig {
//!     event_width: 10,
//!     ..UnpackerConfig::default()
//! };
//! let mut unpacker = Unpacker::new(config, EventCollector::new()).unwrap();
//!
//! let spill = SpillBuilder::new()
//!     .module(0, &[Hit::new(0, 0, 100, 1200), Hit::new(0, 1, 105, 800)])
//!     .module(1, &[Hit::new(1, 0, 140, 950)])
//!     .end_marker()
//!     .build();
//!
//! let summary = unpacker.read_spill(&spill, false).unwrap();
//! assert_eq!(summary.raw_events, 2);
//! assert_eq!(unpacker.handler().events()[0].len(), 2);
//! ```
//!
//! # Features
//!
//! - Record recovery: a corrupt record is flagged and skipped, never fatal
//! - k-way merge time sort with deterministic tie-breaking
//! - Host hooks through the [`EventHandler`] trait
//! - Spill file input and counts / CSV output for host tools

pub mod builder;
pub mod decoder;
pub mod handler;
pub mod input;
pub mod output;
pub mod parser;
pub mod queue;
pub mod spill;
pub mod stats;
pub mod types;
pub mod unpacker;

// Re-export commonly used types
pub use builder::{BuilderState, EventBuilder};
pub use decoder::{DecodeSummary, SpillDecoder};
pub use handler::{EventCollector, EventHandler};
pub use input::{InputError, SpillReader};
pub use output::{CountsWriter, EventCsvWriter, OutputError};
pub use queue::HitQueues;
pub use spill::SpillBuilder;
pub use stats::ChannelCounts;
pub use types::{HeaderLayout, Hit, RawEvent, RecordFault};
pub use unpacker::{RunTotals, SpillSummary, UnpackError, Unpacker, UnpackerConfig};
