//! Pixie-16 list-mode unpacker CLI application.
//!
//! Reads a spill file, builds time-ordered raw events and writes them out as
//! CSV together with the per-channel counts table.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use pixie_core::{
    output, EventCsvWriter, EventHandler, OutputError, RawEvent, SpillReader, UnpackError,
    Unpacker, UnpackerConfig,
};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

/// Pixie-16 list-mode spill unpacker.
///
/// Decodes every spill of a spill file, time-sorts the hits and groups them
/// into raw events of a fixed coincidence width.
#[derive(Parser, Debug)]
#[command(name = "pixie-unpack")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input spill file path
    ///
    /// A sequence of frames, each a little-endian u32 word count followed
    /// by that many spill words.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output CSV file for raw events (one row per hit)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Output file for the per-channel counts table
    #[arg(short, long, value_name = "PATH")]
    counts: Option<PathBuf>,

    /// Raw event width in clock ticks
    #[arg(short, long, default_value_t = pixie_core::unpacker::DEFAULT_EVENT_WIDTH)]
    width: u32,

    /// Highest module number to accept
    #[arg(long, default_value_t = pixie_core::unpacker::DEFAULT_MAX_MODULE)]
    max_module: u16,

    /// Largest spill, in words, that will be processed
    #[arg(long, default_value_t = pixie_core::unpacker::DEFAULT_TOTAL_READ)]
    total_read: usize,

    /// Log every decoding fault as a warning
    #[arg(long)]
    debug: bool,

    /// Log a summary line for every spill
    #[arg(short, long)]
    verbose: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

/// Writes raw events to CSV as they are built.
///
/// The first write failure is kept and stops further writes; it is
/// reported once the run ends.
struct CsvSink {
    writer: Option<EventCsvWriter<File>>,
    error: Option<OutputError>,
}

impl CsvSink {
    fn new(writer: Option<EventCsvWriter<File>>) -> Self {
        Self {
            writer,
            error: None,
        }
    }

    fn finish(self) -> Result<u64, OutputError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        match self.writer {
            Some(mut writer) => {
                writer.flush()?;
                Ok(writer.events_written())
            }
            None => Ok(0),
        }
    }
}

impl EventHandler for CsvSink {
    fn on_raw_event(&mut self, event: &RawEvent) {
        if self.error.is_some() {
            return;
        }
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write_event(event) {
                self.error = Some(e);
            }
        }
    }
}

fn init_logger(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{level}][{module_path}:{line}] {args}",
                level = record.level(),
                module_path = record.module_path().unwrap_or("<unknown>"),
                line = record.line().unwrap_or(0),
                args = record.args()
            )
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.debug);

    let config = UnpackerConfig {
        event_width: args.width,
        max_module: args.max_module,
        total_read: args.total_read,
        debug: args.debug,
        ..UnpackerConfig::default()
    };

    let writer = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {:?}", path))?;
            let mut writer = EventCsvWriter::new(file);
            writer
                .write_header()
                .context("Failed to write CSV header")?;
            Some(writer)
        }
        None => None,
    };

    let mut unpacker =
        Unpacker::new(config, CsvSink::new(writer)).context("Invalid unpacker settings")?;

    // Setup progress bar
    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid progress template")?,
        );
        pb.set_message("Unpacking...");
        pb
    };

    let start_time = Instant::now();

    let mut reader = SpillReader::open(&args.input)
        .with_context(|| format!("Failed to open spill file {:?}", args.input))?;
    let mut spill = Vec::new();
    let mut refused = 0u64;

    while reader
        .read_into(&mut spill)
        .with_context(|| format!("Failed to read spill file {:?}", args.input))?
    {
        match unpacker.read_spill(&spill, args.verbose) {
            Ok(_) => {}
            Err(UnpackError::SpillTooLarge { .. }) => refused += 1,
            Err(e) => return Err(e).context("Failed to unpack spill"),
        }

        let totals = unpacker.totals();
        progress.set_message(format!(
            "Spill {}: {} hits, {} raw events",
            reader.spills_read(),
            totals.hits,
            totals.raw_events
        ));
    }

    let totals = unpacker.totals();
    let counts = unpacker.close(true);
    let events_written = unpacker
        .into_handler()
        .finish()
        .context("Failed to write raw events")?;

    if let (Some(path), Some(counts)) = (&args.counts, &counts) {
        output::write_counts(path, counts).context("Failed to write channel counts")?;
    }

    let total_duration = start_time.elapsed();

    progress.finish_with_message(format!(
        "Done! Built {} raw events from {} spills in {:.2}s",
        totals.raw_events,
        totals.spills,
        total_duration.as_secs_f64()
    ));

    if !args.quiet {
        let hits_per_sec = totals.hits as f64 / total_duration.as_secs_f64();
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", args.input);
        if let Some(path) = &args.output {
            eprintln!("  Output:       {:?} ({} events)", path, events_written);
        }
        eprintln!("  Spills:       {} ({} refused)", totals.spills, refused);
        eprintln!("  Hits:         {}", totals.hits);
        eprintln!("  Rejected:     {}", totals.rejected);
        eprintln!("  Invalid:      {}", totals.invalid);
        eprintln!("  Faults:       {}", totals.faults);
        eprintln!("  Raw events:   {}", totals.raw_events);
        eprintln!("  Width:        {} ticks", args.width);
        eprintln!("  Duration:     {:.3}s", total_duration.as_secs_f64());
        eprintln!("  Throughput:   {:.0} hits/s", hits_per_sec);
    }

    Ok(())
}
