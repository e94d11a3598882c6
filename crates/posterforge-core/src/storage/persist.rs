//! Records handed to the persistence collaborator on every history commit.

use crate::thumbnail::Thumbnail;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// A committed scene plus what the backend needs to list it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistRecord {
    pub json: String,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
}

/// Receives commit records. Fire-and-forget: failures stay inside the sink.
pub trait PersistenceSink {
    fn persist(&self, record: PersistRecord);
}

/// Sink that keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordLog {
    records: Rc<RefCell<Vec<PersistRecord>>>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn last(&self) -> Option<PersistRecord> {
        self.records.borrow().last().cloned()
    }

    pub fn records(&self) -> Vec<PersistRecord> {
        self.records.borrow().clone()
    }
}

impl PersistenceSink for RecordLog {
    fn persist(&self, record: PersistRecord) {
        log::debug!(
            "Persisting {}x{} scene ({} bytes, thumbnail: {})",
            record.width,
            record.height,
            record.json.len(),
            record.thumbnail.is_some()
        );
        self.records.borrow_mut().push(record);
    }
}
