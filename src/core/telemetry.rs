//! Outbound telemetry sink

use crate::core::types::TelemetryRecord;
use crate::error::Result;
use std::sync::{Arc, Mutex};

/// Destination for per-tick telemetry records
pub trait TelemetrySink: Send {
    /// Deliver one record. Failures are reported as [`crate::Error::Telemetry`].
    fn publish(&mut self, record: &TelemetryRecord) -> Result<()>;
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Box<S> {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<()> {
        (**self).publish(record)
    }
}

/// In-memory sink that keeps every published record
///
/// Clones share the same storage, so a test can hand one clone to the
/// control loop and inspect the other.
#[derive(Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records published so far
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of records published so far
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent record, if any
    pub fn last(&self) -> Option<TelemetryRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl TelemetrySink for RecordingSink {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}
