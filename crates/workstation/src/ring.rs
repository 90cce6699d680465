// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded, sequence-addressed ring of PTY [`OutputRecord`]s. A record-level
//! ring rather than a byte-level circular buffer, since replay is addressed
//! by `sequence`, not byte offset.

use std::collections::VecDeque;
use tiflis_protocol::messages::{OutputRecord, SessionReplayData};

pub struct OutputRing {
    records: VecDeque<OutputRecord>,
    capacity: usize,
    next_sequence: u64,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self { records: VecDeque::with_capacity(capacity.min(4096)), capacity: capacity.max(1), next_sequence: 1 }
    }

    /// Append a chunk, assigning it the next monotonic sequence. Sequence
    /// numbers are never reused, even once old records are evicted.
    pub fn push(&mut self, content: String, timestamp: u64) -> OutputRecord {
        let record = OutputRecord { sequence: self.next_sequence, timestamp, content };
        self.next_sequence += 1;
        self.records.push_back(record.clone());
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
        record
    }

    pub fn current_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    pub fn first_sequence(&self) -> u64 {
        self.records.front().map(|r| r.sequence).unwrap_or(self.next_sequence)
    }

    pub fn last_sequence(&self) -> u64 {
        self.records.back().map(|r| r.sequence).unwrap_or(0)
    }

    /// `session.replay`: records strictly after the cursor (`since_sequence`
    /// or the record whose timestamp exceeds `since_timestamp`), capped at
    /// `limit`.
    pub fn replay(&self, since_sequence: Option<u64>, since_timestamp: Option<u64>, limit: usize) -> SessionReplayData {
        let cursor = since_sequence.unwrap_or(0);
        let matches: Vec<OutputRecord> = self
            .records
            .iter()
            .filter(|r| r.sequence > cursor)
            .filter(|r| since_timestamp.map(|ts| r.timestamp > ts).unwrap_or(true))
            .cloned()
            .collect();
        let has_more = matches.len() > limit;
        let records: Vec<OutputRecord> = matches.into_iter().take(limit).collect();
        SessionReplayData {
            records,
            first_sequence: self.first_sequence(),
            last_sequence: self.last_sequence(),
            current_sequence: self.current_sequence(),
            has_more,
        }
    }
}
