use serde::{Deserialize, Serialize};
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// Structured data produced by a scenario, keyed by measurement name.
pub type RecordData = serde_json::Map<String, serde_json::Value>;

/// One iteration's worth of output from a runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRecord {
    /// The id of the runner that produced this record
    pub runner_id: u32,
    /// Monotonic per-runner counter, starting at 1
    ///
    /// Sequences from one runner have no gaps, including iterations where the scenario failed
    /// and the failure was recorded in [ResultRecord::errors].
    pub sequence: u64,
    /// When the record was created
    ///
    /// This is a Unix timestamp in seconds, with microsecond precision.
    pub timestamp: f64,
    /// The data the scenario produced for this iteration
    pub data: RecordData,
    /// Error text captured for this iteration, empty when the iteration succeeded
    pub errors: String,
}

impl ResultRecord {
    /// Create a new record stamped with the current time
    pub fn new(runner_id: u32, sequence: u64, data: RecordData, errors: String) -> Self {
        Self {
            runner_id,
            sequence,
            timestamp: chrono::Utc::now().timestamp_micros() as f64 / 1e6,
            data,
            errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Serialize a record as a single line of JSON, including the trailing newline
pub fn store_record<W: Write>(record: &ResultRecord, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Load a single record from a reader
pub fn load_record<R: Read>(reader: R) -> anyhow::Result<ResultRecord> {
    let reader = std::io::BufReader::new(reader);
    let record: ResultRecord = serde_json::from_reader(reader)?;
    Ok(record)
}

/// Load records from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [store_record]. Blank lines are skipped.
pub fn load_records(path: impl AsRef<Path>) -> anyhow::Result<Vec<ResultRecord>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ResultRecord = serde_json::from_str(&line)?;
        records.push(record);
    }
    Ok(records)
}
