//! Bounded, categorized append log of raw broker messages.
//!
//! Each category is an independent ring buffer behind its own lock, so appenders to one category never contend with
//! readers of another. Within a category, sequence numbers and timestamps are both strictly increasing. When two
//! messages arrive in the same millisecond, the later one is stamped one millisecond after the earlier one.
use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use log::*;

use crate::vm_types::{LogCategory, LogEntry};

#[derive(Debug, Default)]
struct CategoryLog {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
    last_timestamp: Option<i64>,
}

#[derive(Debug)]
pub struct LogStore {
    capacity: usize,
    categories: [RwLock<CategoryLog>; LogCategory::ALL.len()],
}

impl LogStore {
    /// Creates a store retaining at most `capacity` entries per category. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, categories: Default::default() }
    }

    /// Appends a message to the category's log and returns the stored entry.
    pub fn append(&self, category: LogCategory, topic: &str, payload: &str, arrived_at: DateTime<Utc>) -> LogEntry {
        let mut log = self.categories[category.index()].write().unwrap_or_else(PoisonError::into_inner);
        let arrival = arrived_at.timestamp_millis();
        let timestamp = match log.last_timestamp {
            Some(last) if arrival <= last => last + 1,
            _ => arrival,
        };
        let entry = LogEntry {
            category,
            seq: log.next_seq,
            topic: topic.to_string(),
            payload: payload.to_string(),
            timestamp,
        };
        log.next_seq += 1;
        log.last_timestamp = Some(timestamp);
        if log.entries.len() == self.capacity {
            log.entries.pop_front();
        }
        log.entries.push_back(entry.clone());
        trace!("🗂️ [{category}] #{} appended from {topic}", entry.seq);
        entry
    }

    /// Returns the retained entries in the category with a timestamp strictly after `since`, oldest first. If a
    /// `limit` is given, only the most recent `limit` of those are returned.
    pub fn query(&self, category: LogCategory, since: i64, limit: Option<usize>) -> Vec<LogEntry> {
        let log = self.categories[category.index()].read().unwrap_or_else(PoisonError::into_inner);
        let start = log.entries.partition_point(|e| e.timestamp <= since);
        let count = log.entries.len() - start;
        let skip = match limit {
            Some(n) if n < count => count - n,
            _ => 0,
        };
        log.entries.range(start + skip..).cloned().collect()
    }

    /// The number of entries currently retained in the category.
    pub fn len(&self, category: LogCategory) -> usize {
        self.categories[category.index()].read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self, category: LogCategory) -> bool {
        self.len(category) == 0
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(crate::pipeline::config::DEFAULT_LOG_CAPACITY)
    }
}
