//! Spill synthesis.
//!
//! [`SpillBuilder`] writes hits back into the list-mode wire format, which
//! is what the decoder reads. Useful for tests, benchmarks and replay tools.

use crate::parser::{self, BUFFER_HEADER_WORDS, END_OF_SPILL_VSN, FILL_WORD};
use crate::types::{HeaderLayout, Hit};

/// Builder for list-mode spills.
///
/// ```
/// use pixie_core::{Hit, SpillBuilder};
///
/// let spill = SpillBuilder::new()
///     .module(0, &[Hit::new(0, 1, 100, 250)])
///     .end_marker()
///     .build();
/// assert_eq!(spill.len(), 2 + 4 + 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SpillBuilder {
    words: Vec<u32>,
}

impl SpillBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a module buffer holding `hits`.
    ///
    /// The module number comes from `module`, not from the hits.
    pub fn module(self, module: u16, hits: &[Hit]) -> Self {
        self.module_with(module, |words| {
            for hit in hits {
                Self::encode_hit(hit, words);
            }
        })
    }

    /// Appends a module buffer whose body is written by `fill_body`.
    ///
    /// The length word is set from what the closure writes.
    pub fn module_with<F>(mut self, module: u16, fill_body: F) -> Self
    where
        F: FnOnce(&mut Vec<u32>),
    {
        let start = self.words.len();
        self.words.extend_from_slice(&[0, module as u32]);
        fill_body(&mut self.words);
        self.words[start] = (self.words.len() - start) as u32;
        self
    }

    /// Appends `count` fill words.
    pub fn fill(mut self, count: usize) -> Self {
        self.words.extend(std::iter::repeat(FILL_WORD).take(count));
        self
    }

    /// Appends the end-of-spill marker.
    pub fn end_marker(mut self) -> Self {
        self.words
            .extend_from_slice(&[BUFFER_HEADER_WORDS as u32, END_OF_SPILL_VSN]);
        self
    }

    /// Appends raw words verbatim.
    pub fn raw(mut self, words: &[u32]) -> Self {
        self.words.extend_from_slice(words);
        self
    }

    pub fn build(self) -> Vec<u32> {
        self.words
    }

    /// Encodes one hit as a record.
    ///
    /// The header layout follows which optional sums are present. The event
    /// length field is 14 bits wide, so a record holds at most
    /// [`parser::MAX_EVENT_LENGTH`] words; traces beyond that (roughly 32k
    /// samples) cannot be represented and would decode as invalid.
    pub fn encode_hit(hit: &Hit, out: &mut Vec<u32>) {
        let layout = match (hit.energy_sums.is_some(), hit.qdc_sums.is_some()) {
            (false, false) => HeaderLayout::Plain,
            (true, false) => HeaderLayout::EnergySums,
            (false, true) => HeaderLayout::QdcSums,
            (true, true) => HeaderLayout::EnergyAndQdcSums,
        };
        let samples = hit.trace.len() as u32;
        let header_words = layout.words() as u32;
        let event_length = header_words + parser::trace_words(samples) as u32;
        debug_assert!(
            samples <= parser::MAX_TRACE_LENGTH && event_length <= parser::MAX_EVENT_LENGTH,
            "trace of {} samples does not fit a record",
            samples
        );

        out.push(parser::pack_word0(
            hit.channel,
            hit.slot,
            hit.crate_id,
            header_words,
            event_length,
            hit.pileup,
        ));
        let (low, high) = parser::pack_time(hit.timestamp, hit.cfd_time);
        out.push(low);
        out.push(high);
        out.push(parser::pack_word3(
            hit.energy,
            samples,
            hit.trace_out_of_range,
        ));
        if let Some(sums) = &hit.energy_sums {
            out.extend_from_slice(sums);
        }
        if let Some(sums) = &hit.qdc_sums {
            out.extend_from_slice(sums);
        }
        parser::pack_trace(&hit.trace, out);
    }
}
