//! Pixie-16 list-mode spill decoder.
//!
//! This module walks the module buffers of a spill and turns each record
//! into a [`Hit`]. Corrupt records are recovered locally: the decoder skips
//! the smallest unit it can trust and keeps going, so one bad record never
//! costs the rest of the spill.

use crate::parser::{self, BUFFER_HEADER_WORDS, END_OF_SPILL_VSN, FILL_WORD, MIN_HEADER_WORDS};
use crate::stats::ChannelCounts;
use crate::types::{Hit, RecordFault};
use log::{log, warn, Level};

/// Maximum number of words in one module buffer (revision D firmware).
pub const DEFAULT_MAX_WORDS: usize = 131_072;

/// Outcome of decoding one spill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Hits emitted, valid or not
    pub hits: usize,
    /// Hits emitted with `valid == false`
    pub invalid: usize,
    /// Record and buffer faults recovered from
    pub faults: usize,
    /// Module buffers visited
    pub buffers: usize,
    /// Words consumed, including fill words and the end marker
    pub words_consumed: usize,
    /// True if the end-of-spill marker was reached
    pub end_marker: bool,
}

/// What the decoder makes of the record at the current position.
enum Record {
    /// A hit and the number of words to step over
    Hit { hit: Hit, step: usize },
    /// The rest of the module buffer cannot be trusted
    Abandon(RecordFault),
}

/// Stateless decoder for list-mode spills.
#[derive(Debug, Clone)]
pub struct SpillDecoder {
    max_words: usize,
    debug: bool,
}

impl Default for SpillDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORDS)
    }
}

impl SpillDecoder {
    /// Creates a decoder accepting module buffers up to `max_words` long.
    pub fn new(max_words: usize) -> Self {
        Self {
            max_words,
            debug: false,
        }
    }

    /// Raises per-record fault logging from `debug` to `warn`.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Decodes a full spill into `hits`.
    ///
    /// Every hit whose module and channel fall inside `counts` is counted
    /// there, regardless of trace validity. Hits with out-of-range indices
    /// are still emitted so the caller can reject them.
    pub fn decode_spill(
        &self,
        words: &[u32],
        counts: &mut ChannelCounts,
        hits: &mut Vec<Hit>,
    ) -> DecodeSummary {
        let mut summary = DecodeSummary::default();
        let mut pos = 0;

        while pos < words.len() {
            if words[pos] == FILL_WORD {
                pos += 1;
                continue;
            }

            let available = words.len() - pos;
            if available < BUFFER_HEADER_WORDS {
                warn!(
                    "Word {}: {}",
                    pos,
                    RecordFault::TruncatedHeader {
                        remaining: available,
                    }
                );
                summary.faults += 1;
                break;
            }

            let length = words[pos];
            let vsn = words[pos + 1];

            if vsn == END_OF_SPILL_VSN {
                pos += BUFFER_HEADER_WORDS;
                summary.end_marker = true;
                break;
            }

            let len = length as usize;
            if len < BUFFER_HEADER_WORDS || len > self.max_words {
                warn!(
                    "Word {}: {}",
                    pos,
                    RecordFault::BadBufferLength { length }
                );
                summary.faults += 1;
                break;
            }
            if len > available {
                warn!(
                    "Word {}: {}",
                    pos,
                    RecordFault::BufferOverrun { length, available }
                );
                summary.faults += 1;
                break;
            }

            summary.buffers += 1;
            match u16::try_from(vsn) {
                Ok(module) => {
                    let body = &words[pos + BUFFER_HEADER_WORDS..pos + len];
                    self.decode_buffer(module, body, counts, hits, &mut summary);
                }
                Err(_) => {
                    warn!("Skipping module buffer with bad module number {}", vsn);
                    summary.faults += 1;
                }
            }
            pos += len;
        }

        summary.words_consumed = pos;
        summary
    }

    /// Decodes the records of one module buffer (header words stripped).
    pub fn decode_buffer(
        &self,
        module: u16,
        body: &[u32],
        counts: &mut ChannelCounts,
        hits: &mut Vec<Hit>,
        summary: &mut DecodeSummary,
    ) {
        let mut pos = 0;

        while pos < body.len() {
            match self.decode_record(module, &body[pos..]) {
                Record::Hit { hit, step } => {
                    if !hit.valid {
                        summary.invalid += 1;
                        summary.faults += 1;
                    }
                    counts.increment(hit.module, hit.channel);
                    hits.push(hit);
                    summary.hits += 1;
                    pos += step;
                }
                Record::Abandon(fault) => {
                    self.fault(module, fault);
                    summary.faults += 1;
                    break;
                }
            }
        }
    }

    /// Decodes the record starting at `words[0]`.
    fn decode_record(&self, module: u16, words: &[u32]) -> Record {
        let remaining = words.len();
        if remaining < MIN_HEADER_WORDS {
            return Record::Abandon(RecordFault::TruncatedHeader { remaining });
        }

        let word0 = words[0];
        let layout = match parser::parse_layout(word0) {
            Some(layout) => layout,
            None => {
                return Record::Abandon(RecordFault::UnknownHeaderLength {
                    length: parser::header_length(word0),
                })
            }
        };
        let header_words = layout.words();
        if header_words > remaining {
            return Record::Abandon(RecordFault::TruncatedHeader { remaining });
        }

        let (word1, word2, word3) = (words[1], words[2], words[3]);
        let mut hit = Hit {
            module,
            channel: parser::channel(word0),
            slot: parser::slot(word0),
            crate_id: parser::crate_id(word0),
            timestamp: parser::timestamp(word1, word2),
            cfd_time: parser::cfd_time(word2),
            energy: parser::energy(word3),
            trace: Vec::new(),
            pileup: parser::pileup(word0),
            trace_out_of_range: parser::trace_out_of_range(word3),
            energy_sums: None,
            qdc_sums: None,
            valid: true,
        };

        let mut offset = MIN_HEADER_WORDS;
        if layout.has_energy_sums() {
            let mut sums = [0u32; 4];
            sums.copy_from_slice(&words[offset..offset + 4]);
            hit.energy_sums = Some(sums);
            offset += 4;
        }
        if layout.has_qdc_sums() {
            let mut sums = [0u32; 8];
            sums.copy_from_slice(&words[offset..offset + 8]);
            hit.qdc_sums = Some(sums);
        }

        let samples = parser::trace_length(word3);
        let trace_words = parser::trace_words(samples);
        let declared = parser::event_length(word0) as usize;
        let expected = header_words + trace_words;

        let fault = if expected > remaining {
            Some(RecordFault::TraceOverrun {
                declared_words: trace_words,
                available: remaining - header_words,
            })
        } else if declared != expected {
            Some(RecordFault::EventLengthMismatch {
                declared: declared as u32,
                expected: expected as u32,
            })
        } else {
            None
        };

        let step = match fault {
            None => {
                hit.trace = parser::unpack_trace(&words[header_words..expected], samples as usize);
                expected
            }
            Some(fault) => {
                self.fault(module, fault);
                hit.valid = false;
                // Trust the event length only if it stays inside the buffer.
                if declared >= header_words && declared <= remaining {
                    declared
                } else {
                    header_words
                }
            }
        };

        Record::Hit { hit, step }
    }

    fn fault(&self, module: u16, fault: RecordFault) {
        let level = if self.debug { Level::Warn } else { Level::Debug };
        log!(level, "Module {}: {}", module, fault);
    }
}
