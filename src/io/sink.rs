//! Outcome file: a zlib stream of newline-delimited JSON records.
//!
//! Each record is flushed through the compressor as soon as it is written, so
//! a crash loses at most the record being written.

use crate::config::OutputConfig;
use crate::pipeline::Outcome;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("outcome sink I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode outcome: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only destination for outcomes. Records are never reordered.
pub trait OutcomeSink: Send {
    fn write(&mut self, outcome: &Outcome) -> Result<(), SinkError>;

    /// Flush and close. Called once, after the last write.
    fn finish(self: Box<Self>) -> Result<(), SinkError>;
}

/// Zlib-compressed JSON lines over any writer.
pub struct ZlibJsonSink<W: Write + Send> {
    encoder: ZlibEncoder<W>,
    records: u64,
}

impl<W: Write + Send> ZlibJsonSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            encoder: ZlibEncoder::new(inner, Compression::default()),
            records: 0,
        }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Finish the zlib stream and hand back the inner writer.
    pub fn into_inner(self) -> Result<W, SinkError> {
        Ok(self.encoder.finish()?)
    }
}

impl<W: Write + Send> OutcomeSink for ZlibJsonSink<W> {
    fn write(&mut self, outcome: &Outcome) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.encoder, outcome)?;
        self.encoder.write_all(b"\n")?;
        self.encoder.flush()?;
        self.records += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), SinkError> {
        let records = self.records;
        let mut inner = (*self).into_inner()?;
        inner.flush()?;
        tracing::debug!("Outcome sink closed after {} records", records);
        Ok(())
    }
}

/// Open the configured sink: a file when `sct_file` is set, otherwise
/// outcomes are still encoded but discarded.
pub fn open_sink(config: &OutputConfig) -> Result<Box<dyn OutcomeSink>, SinkError> {
    match &config.sct_file {
        Some(path) => {
            let file = File::create(path)?;
            tracing::info!("Recording outcomes to {}", path.display());
            Ok(Box::new(ZlibJsonSink::new(file)))
        }
        None => {
            tracing::info!("No SCT file configured, outcomes will not be saved");
            Ok(Box::new(ZlibJsonSink::new(io::sink())))
        }
    }
}

/// Decode every record from an outcome stream.
pub fn read_outcomes<R: Read>(reader: R) -> Result<Vec<Outcome>, SinkError> {
    let mut outcomes = Vec::new();
    for line in BufReader::new(ZlibDecoder::new(reader)).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        outcomes.push(serde_json::from_str(&line)?);
    }
    Ok(outcomes)
}

/// Decode an outcome file from disk.
pub fn read_outcome_file(path: &Path) -> Result<Vec<Outcome>, SinkError> {
    read_outcomes(File::open(path)?)
}
