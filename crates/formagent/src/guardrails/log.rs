//! Capped violation log for guardrail monitoring
//!
//! Keeps the most recent violations in a bounded ring and exposes
//! aggregate counts per violation type. The log is a monitoring aid,
//! not a source of truth.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::VecDeque;

/// Default capacity for the violation log
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Severity of a recorded violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A single recorded guardrail violation
#[derive(Debug, Clone, Serialize)]
pub struct ViolationRecord {
    /// Violation type (content category or design issue kind)
    pub violation_type: String,
    /// Severity assigned by the caller
    pub severity: Severity,
    /// When the violation was recorded
    pub timestamp: DateTime<Utc>,
    /// Free-form details for operators
    pub details: String,
}

impl ViolationRecord {
    /// Create a record stamped with the current time
    pub fn new(violation_type: impl Into<String>, severity: Severity, details: impl Into<String>) -> Self {
        Self {
            violation_type: violation_type.into(),
            severity,
            timestamp: Utc::now(),
            details: details.into(),
        }
    }
}

/// Bounded ring of violation records, oldest dropped beyond capacity
#[derive(Debug)]
pub struct ViolationLog {
    entries: VecDeque<ViolationRecord>,
    capacity: usize,
}

impl ViolationLog {
    /// Create a log with the given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the oldest entry when at capacity
    pub fn push(&mut self, record: ViolationRecord) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Aggregate counts grouped by violation type
    pub fn stats(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.entries {
            *counts.entry(record.violation_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no records are retained
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum records retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ViolationLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
