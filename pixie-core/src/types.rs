//! Core types for Pixie-16 list-mode data.
//!
//! This module defines the decoded hit, the raw event aggregate built from
//! time-correlated hits, and the record-level descriptors used while decoding.

/// A decoded channel firing.
///
/// Hits are produced by the decoder and then moved, never shared: into one
/// per-channel queue, then into at most one [`RawEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hit {
    /// Module number (VSN of the module buffer the record came from)
    pub module: u16,
    /// Channel within the module (0-15)
    pub channel: u16,
    /// Crate slot reported in the record header
    pub slot: u8,
    /// Crate number reported in the record header
    pub crate_id: u8,
    /// Event time in clock ticks (48 significant bits)
    pub timestamp: u64,
    /// CFD fractional time
    pub cfd_time: u16,
    /// On-board energy
    pub energy: u16,
    /// Trace samples, empty when no trace was recorded or it was corrupt
    pub trace: Vec<u16>,
    /// Pile-up / finish code flag
    pub pileup: bool,
    /// Trace out-of-range flag
    pub trace_out_of_range: bool,
    /// Raw energy sums (header length 8 or 16)
    pub energy_sums: Option<[u32; 4]>,
    /// QDC sums (header length 12 or 16)
    pub qdc_sums: Option<[u32; 8]>,
    /// False when the decoder detected a corrupt record
    pub valid: bool,
}

impl Hit {
    /// Creates a valid hit with no trace and no optional header words.
    #[inline]
    pub fn new(module: u16, channel: u16, timestamp: u64, energy: u16) -> Self {
        Self {
            module,
            channel,
            timestamp,
            energy,
            valid: true,
            ..Self::default()
        }
    }

    /// Attaches a trace to the hit.
    pub fn with_trace(mut self, trace: Vec<u16>) -> Self {
        self.trace = trace;
        self
    }

    /// Returns true if a trace is attached.
    #[inline]
    pub fn has_trace(&self) -> bool {
        !self.trace.is_empty()
    }
}

/// A group of hits whose timestamps lie within the event width of the
/// first hit admitted.
///
/// Hits are ordered by timestamp. A finalized raw event is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    hits: Vec<Hit>,
    anchor: u64,
    width: u32,
}

impl RawEvent {
    /// Opens a new event anchored at `first`.
    pub(crate) fn open(first: Hit, width: u32) -> Self {
        Self {
            anchor: first.timestamp,
            hits: vec![first],
            width,
        }
    }

    /// Returns true if a hit at `timestamp` falls inside this event's window.
    ///
    /// A hit earlier than the anchor never does, so every hit of an event
    /// is at or after its anchor.
    #[inline]
    pub(crate) fn admits(&self, timestamp: u64) -> bool {
        timestamp >= self.anchor && timestamp - self.anchor <= self.width as u64
    }

    #[inline]
    pub(crate) fn push(&mut self, hit: Hit) {
        debug_assert!(hit.timestamp >= self.anchor);
        self.hits.push(hit);
    }

    /// Hits in timestamp order.
    #[inline]
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Iterates over the hits in timestamp order.
    pub fn iter(&self) -> std::slice::Iter<'_, Hit> {
        self.hits.iter()
    }

    /// Number of hits in the event.
    #[inline]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Always false for an event handed to a handler.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Timestamp of the first hit admitted.
    #[inline]
    pub fn anchor(&self) -> u64 {
        self.anchor
    }

    /// Event width (ticks) this event was opened with.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Timestamp of the latest hit.
    pub fn last_timestamp(&self) -> u64 {
        self.hits.last().map_or(self.anchor, |h| h.timestamp)
    }

    /// Spread between the latest and the earliest hit.
    pub fn span(&self) -> u64 {
        self.last_timestamp() - self.anchor
    }
}

impl<'a> IntoIterator for &'a RawEvent {
    type Item = &'a Hit;
    type IntoIter = std::slice::Iter<'a, Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

/// Record header layouts.
///
/// The header length field selects which optional word groups follow the
/// four mandatory header words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeaderLayout {
    /// Four mandatory words only
    Plain = 4,
    /// Followed by 4 raw energy sums
    EnergySums = 8,
    /// Followed by 8 QDC sums
    QdcSums = 12,
    /// Followed by energy sums, then QDC sums
    EnergyAndQdcSums = 16,
}

impl HeaderLayout {
    /// Attempts to parse a layout from a header length in words.
    #[inline]
    pub fn from_length(length: u32) -> Option<Self> {
        match length {
            4 => Some(Self::Plain),
            8 => Some(Self::EnergySums),
            12 => Some(Self::QdcSums),
            16 => Some(Self::EnergyAndQdcSums),
            _ => None,
        }
    }

    /// Header length in words.
    #[inline]
    pub fn words(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn has_energy_sums(self) -> bool {
        matches!(self, Self::EnergySums | Self::EnergyAndQdcSums)
    }

    #[inline]
    pub fn has_qdc_sums(self) -> bool {
        matches!(self, Self::QdcSums | Self::EnergyAndQdcSums)
    }
}

/// A malformed record or buffer detected while decoding.
///
/// Faults are recovered locally and never abort a spill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFault {
    /// Fewer words left than a minimal record header
    TruncatedHeader { remaining: usize },
    /// Header length field does not name a known layout
    UnknownHeaderLength { length: u32 },
    /// Declared event length disagrees with header and trace lengths
    EventLengthMismatch { declared: u32, expected: u32 },
    /// Declared trace does not fit in the remaining buffer
    TraceOverrun { declared_words: usize, available: usize },
    /// Module buffer length is shorter than its own header or too long
    BadBufferLength { length: u32 },
    /// Module buffer runs past the end of the spill
    BufferOverrun { length: u32, available: usize },
}

impl std::fmt::Display for RecordFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TruncatedHeader { remaining } => {
                write!(f, "truncated record header ({} words left)", remaining)
            }
            Self::UnknownHeaderLength { length } => {
                write!(f, "unknown header length {}", length)
            }
            Self::EventLengthMismatch { declared, expected } => write!(
                f,
                "event length {} does not match expected {}",
                declared, expected
            ),
            Self::TraceOverrun {
                declared_words,
                available,
            } => write!(
                f,
                "trace of {} words overruns buffer ({} words left)",
                declared_words, available
            ),
            Self::BadBufferLength { length } => write!(f, "bad module buffer length {}", length),
            Self::BufferOverrun { length, available } => write!(
                f,
                "module buffer of {} words overruns spill ({} words left)",
                length, available
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_parsing() {
        assert_eq!(HeaderLayout::from_length(4), Some(HeaderLayout::Plain));
        assert_eq!(HeaderLayout::from_length(8), Some(HeaderLayout::EnergySums));
        assert_eq!(HeaderLayout::from_length(12), Some(HeaderLayout::QdcSums));
        assert_eq!(
            HeaderLayout::from_length(16),
            Some(HeaderLayout::EnergyAndQdcSums)
        );
        assert_eq!(HeaderLayout::from_length(0), None);
        assert_eq!(HeaderLayout::from_length(6), None);
        assert!(HeaderLayout::EnergyAndQdcSums.has_energy_sums());
        assert!(!HeaderLayout::QdcSums.has_energy_sums());
    }

    #[test]
    fn test_hit_creation() {
        let hit = Hit::new(3, 7, 12345, 900);
        assert_eq!(hit.module, 3);
        assert_eq!(hit.channel, 7);
        assert_eq!(hit.timestamp, 12345);
        assert_eq!(hit.energy, 900);
        assert!(hit.valid);
        assert!(!hit.has_trace());
    }

    #[test]
    fn test_raw_event_window() {
        let mut event = RawEvent::open(Hit::new(0, 0, 100, 1), 10);
        assert!(event.admits(100));
        assert!(event.admits(110));
        assert!(!event.admits(111));
        assert!(!event.admits(99));

        event.push(Hit::new(0, 1, 105, 1));
        assert_eq!(event.len(), 2);
        assert_eq!(event.anchor(), 100);
        assert_eq!(event.last_timestamp(), 105);
        assert_eq!(event.span(), 5);
    }
}
