//! Integration tests for the unpacker using synthesized spills.
//!
//! Run with: cargo test --test integration_tests

use pixie_core::input::write_spill;
use pixie_core::parser;
use pixie_core::{
    output, ChannelCounts, EventCollector, EventHandler, Hit, RawEvent, SpillBuilder, SpillReader,
    Unpacker, UnpackerConfig,
};
use std::io::Write;

fn config(width: u32) -> UnpackerConfig {
    UnpackerConfig {
        event_width: width,
        ..UnpackerConfig::default()
    }
}

/// Builds a spill where every module fires on a shared coincidence clock
/// plus some module-specific noise hits.
fn coincidence_spill(modules: u16, coincidences: u64, period: u64) -> Vec<u32> {
    let mut builder = SpillBuilder::new();
    for module in 0..modules {
        let mut hits = Vec::new();
        for n in 0..coincidences {
            let t = 1_000 + n * period;
            hits.push(Hit::new(module, module % 16, t + module as u64, 100 + n as u16));
            // A noise hit well outside any coincidence window
            hits.push(Hit::new(module, 15, t + period / 2, 1));
        }
        builder = builder.module(module, &hits).fill(1);
    }
    builder.end_marker().build()
}

/// Test the spill stream through a spill file on disk.
#[test]
fn test_spill_file_round_trip() {
    let spills: Vec<Vec<u32>> = (0..3).map(|_| coincidence_spill(4, 10, 1_000)).collect();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    for spill in &spills {
        write_spill(&mut file, spill).unwrap();
    }
    file.flush().unwrap();

    let mut unpacker = Unpacker::new(config(20), EventCollector::new()).unwrap();
    for spill in SpillReader::open(file.path()).unwrap() {
        let spill = spill.unwrap();
        let summary = unpacker.read_spill(&spill, true).unwrap();
        assert_eq!(summary.words_consumed, spill.len());
        assert_eq!(summary.rejected, 0);
    }

    let totals = unpacker.totals();
    assert_eq!(totals.spills, 3);
    assert_eq!(totals.hits, 3 * 4 * 20);

    // Each coincidence yields one 4-hit event and each noise slot one 4-hit
    // event (the noise hits share their timestamp across modules).
    let events = unpacker.handler().events();
    assert_eq!(events.len(), 3 * 20);
    assert!(events.iter().all(|e| e.len() == 4));
}

/// Test that timestamps come out non-decreasing and windows hold.
#[test]
fn test_sort_and_window_invariants() {
    // Interleave channels whose hits are ascending within each channel
    // but arrive in an arbitrary order across channels and modules.
    let mut builder = SpillBuilder::new();
    for module in (0..6u16).rev() {
        let hits: Vec<_> = (0..200u64)
            .map(|i| {
                let channel = (i % 16) as u16;
                Hit::new(module, channel, i * 13 + (module as u64 * 7) % 13, 1)
            })
            .collect();
        builder = builder.module(module, &hits);
    }
    let spill = builder.build();

    let width = 9;
    let mut unpacker = Unpacker::new(config(width), EventCollector::new()).unwrap();
    let summary = unpacker.read_spill(&spill, false).unwrap();

    let events = unpacker.handler().events();
    let flat: Vec<&Hit> = events.iter().flat_map(|e| e.iter()).collect();
    assert_eq!(flat.len(), summary.accepted);
    assert!(flat.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    for pair in events.windows(2) {
        assert!(pair[0].span() <= width as u64);
        assert!(pair[1].anchor() - pair[0].anchor() > width as u64);
    }

    // Equal timestamps resolve to the lower (module, channel) pair
    for w in flat.windows(2) {
        if w[0].timestamp == w[1].timestamp {
            assert!((w[0].module, w[0].channel) < (w[1].module, w[1].channel));
        }
    }
}

/// Test that a corrupt trace length is skipped without losing later records.
#[test]
fn test_corrupt_trace_in_full_spill() {
    let good_trace: Vec<u16> = (0..64).collect();
    let spill = SpillBuilder::new()
        .module_with(0, |words| {
            let first = Hit::new(0, 0, 100, 10).with_trace(good_trace.clone());
            SpillBuilder::encode_hit(&first, words);
            // Declares 30000 samples, far beyond the buffer
            words.extend_from_slice(&[
                parser::pack_word0(1, 2, 0, 4, 4, false),
                104,
                0,
                parser::pack_word3(20, 30_000, false),
            ]);
            SpillBuilder::encode_hit(&Hit::new(0, 2, 108, 30), words);
            // Pad the buffer to about 200 words
            for n in 0..40u64 {
                SpillBuilder::encode_hit(&Hit::new(0, 3, 1_000 + n * 100, 40), words);
            }
        })
        .end_marker()
        .build();
    assert!(spill.len() < 250);

    let mut unpacker = Unpacker::new(config(10), EventCollector::new()).unwrap();
    let summary = unpacker.read_spill(&spill, false).unwrap();

    assert_eq!(summary.hits, 43);
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.accepted, 43);
    assert_eq!(summary.words_consumed, spill.len());
    // The invalid hit still counts for its channel but skips on_hit
    assert_eq!(unpacker.channel_counts().get(0, 1), Some(1));
    assert_eq!(unpacker.handler().hits_seen(), 42);

    let first = &unpacker.handler().events()[0];
    assert_eq!(first.len(), 3);
    assert_eq!(first.hits()[0].trace, good_trace);
    assert!(!first.hits()[1].valid);
    assert!(first.hits()[2].valid);
}

/// Test the end-of-run flow and the counts table.
#[test]
fn test_close_emits_counts() {
    let mut unpacker = Unpacker::new(config(50), EventCollector::new()).unwrap();
    unpacker
        .read_spill(&coincidence_spill(3, 5, 500), false)
        .unwrap();

    let counts = unpacker.close(true).unwrap();
    assert_eq!(counts.total(), 30);
    assert_eq!(counts.get(1, 1), Some(5));
    assert_eq!(counts.get(2, 15), Some(5));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raw_counts.dat");
    output::write_counts(&path, &counts).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 13 * 16);
    assert!(text.contains("1\t1\t5\n"));

    // Second close leaves the same empty state
    let again = unpacker.close(true).unwrap();
    assert_eq!(again, ChannelCounts::new(12, 15));
    assert_eq!(unpacker.pending(), 0);
}

/// Records the anchor of every event and checks it is handed over in order.
#[derive(Default)]
struct AnchorCheck {
    anchors: Vec<u64>,
    hits: usize,
}

impl EventHandler for AnchorCheck {
    fn on_raw_event(&mut self, event: &RawEvent) {
        assert!(!event.is_empty());
        if let Some(&last) = self.anchors.last() {
            assert!(event.anchor() >= last);
        }
        self.anchors.push(event.anchor());
        self.hits += event.len();
    }
}

/// Test a custom handler across several spills with a width change.
#[test]
fn test_custom_handler_across_spills() {
    let mut unpacker = Unpacker::new(config(5), AnchorCheck::default()).unwrap();

    let first = SpillBuilder::new()
        .module(0, &[Hit::new(0, 0, 10, 1), Hit::new(0, 0, 20, 1)])
        .build();
    assert_eq!(unpacker.read_spill(&first, false).unwrap().raw_events, 2);

    unpacker.set_event_width(100).unwrap();
    let second = SpillBuilder::new()
        .module(0, &[Hit::new(0, 0, 30, 1), Hit::new(0, 0, 120, 1)])
        .raw(&[parser::FILL_WORD])
        .build();
    assert_eq!(unpacker.read_spill(&second, false).unwrap().raw_events, 1);

    let handler = unpacker.into_handler();
    assert_eq!(handler.anchors, vec![10, 20, 30]);
    assert_eq!(handler.hits, 4);
}
