//! Text writers for unpacked data.
//!
//! The unpacker itself never writes anything; these are for hosts that want
//! the channel counts table or a flat CSV of raw events.

use crate::stats::ChannelCounts;
use crate::types::RawEvent;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output writing.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writer for the per-channel counts table.
///
/// One `module channel count` line per channel, module-major, matching the
/// raw counts files of the older scan codes.
pub struct CountsWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> CountsWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Writes every channel, zero counts included.
    pub fn write_counts(&mut self, counts: &ChannelCounts) -> Result<(), OutputError> {
        for (module, channel, count) in counts.iter() {
            writeln!(self.writer, "{}\t{}\t{}", module, channel, count)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// CSV writer for raw events, one row per hit.
pub struct EventCsvWriter<W: Write> {
    writer: BufWriter<W>,
    events_written: u64,
}

impl<W: Write> EventCsvWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            events_written: 0,
        }
    }

    /// Writes the column header.
    pub fn write_header(&mut self) -> Result<(), OutputError> {
        writeln!(
            self.writer,
            "event,module,channel,timestamp,energy,trace_len,valid"
        )?;
        Ok(())
    }

    /// Writes one raw event; rows share the running event index.
    pub fn write_event(&mut self, event: &RawEvent) -> Result<(), OutputError> {
        for hit in event {
            writeln!(
                self.writer,
                "{},{},{},{},{},{},{}",
                self.events_written,
                hit.module,
                hit.channel,
                hit.timestamp,
                hit.energy,
                hit.trace.len(),
                hit.valid as u8
            )?;
        }
        self.events_written += 1;
        Ok(())
    }

    /// Raw events written so far.
    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes the channel counts table to a file.
pub fn write_counts<P: AsRef<Path>>(path: P, counts: &ChannelCounts) -> Result<(), OutputError> {
    let file = File::create(path)?;
    let mut writer = CountsWriter::new(file);
    writer.write_counts(counts)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EventBuilder;
    use crate::handler::EventCollector;
    use crate::types::Hit;

    #[test]
    fn test_counts_writer() {
        let mut counts = ChannelCounts::new(1, 1);
        counts.increment(1, 0);
        counts.increment(1, 0);

        let mut output = Vec::new();
        {
            let mut writer = CountsWriter::new(&mut output);
            writer.write_counts(&counts).unwrap();
            writer.flush().unwrap();
        }

        let output_str = String::from_utf8(output).unwrap();
        assert_eq!(output_str, "0\t0\t0\n0\t1\t0\n1\t0\t2\n1\t1\t0\n");
    }

    #[test]
    fn test_event_csv_writer() {
        let mut collector = EventCollector::new();
        let mut invalid = Hit::new(2, 3, 500, 7);
        invalid.valid = false;
        EventBuilder::new().build(
            vec![
                Hit::new(0, 1, 100, 10).with_trace(vec![1, 2, 3]),
                Hit::new(0, 2, 104, 20),
                invalid,
            ],
            10,
            &mut collector,
        );

        let mut output = Vec::new();
        {
            let mut writer = EventCsvWriter::new(&mut output);
            writer.write_header().unwrap();
            for event in collector.events() {
                writer.write_event(event).unwrap();
            }
            assert_eq!(writer.events_written(), 2);
            writer.flush().unwrap();
        }

        let output_str = String::from_utf8(output).unwrap();
        let lines: Vec<_> = output_str.lines().collect();
        assert_eq!(lines[0], "event,module,channel,timestamp,energy,trace_len,valid");
        assert_eq!(lines[1], "0,0,1,100,10,3,1");
        assert_eq!(lines[2], "0,0,2,104,20,0,1");
        assert_eq!(lines[3], "1,2,3,500,7,0,0");
    }
}
