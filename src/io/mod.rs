//! Outcome recording I/O.

mod sink;

pub use sink::{open_sink, read_outcome_file, read_outcomes, OutcomeSink, SinkError, ZlibJsonSink};
