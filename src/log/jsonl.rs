//! JSONL (JSON Lines) logging of poll history
//!
//! Provides append-only logging of delivered tick envelopes to
//! `.pulse/log.jsonl`

use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cycle::event::Envelope;
use crate::error::Result;

/// One delivered tick, as recorded in the log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeRecord {
    /// Name of the poll that produced the tick
    pub poll: String,
    /// The tick counter value at delivery
    pub tick: u64,
    /// Epoch milliseconds at which the envelope was created
    pub timestamp: i64,
    /// The tick payload (counter value or fetched JSON body)
    pub response: serde_json::Value,
}

impl EnvelopeRecord {
    /// Build a record from a delivered envelope.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn from_envelope(poll: impl Into<String>, tick: u64, envelope: &Envelope) -> Result<Self> {
        Ok(Self {
            poll: poll.into(),
            tick,
            timestamp: envelope.timestamp,
            response: serde_json::to_value(&envelope.response)?,
        })
    }
}

/// JSONL logger for poll history
///
/// Provides append-only logging to `.pulse/log.jsonl`.
/// Each line is a JSON object representing one delivered tick.
pub struct EnvelopeLog {
    log_path: PathBuf,
}

impl EnvelopeLog {
    /// Create a new envelope log
    ///
    /// # Arguments
    /// * `log_dir` - Directory where log.jsonl will be stored (typically `.pulse`)
    ///
    /// # Errors
    /// Returns an error if the log directory cannot be created
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Result<Self> {
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;

        Ok(Self {
            log_path: log_dir.join("log.jsonl"),
        })
    }

    /// Append one record to the log
    ///
    /// # Errors
    /// Returns an error if:
    /// - The log file cannot be opened or created
    /// - The record cannot be serialized to JSON
    /// - Writing to the file fails
    pub fn append(&self, record: &EnvelopeRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        let json = serde_json::to_string(record)?;
        writeln!(file, "{json}")?;

        Ok(())
    }

    /// Read all records from the log, in delivery order
    ///
    /// # Errors
    /// Returns an error if:
    /// - The log file cannot be read
    /// - Any line cannot be parsed as valid JSON
    pub fn read_all(&self) -> Result<Vec<EnvelopeRecord>> {
        // No log file yet means no history.
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.log_path)?;

        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(line)?);
        }

        Ok(records)
    }

    /// Get the path to the log file
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}
