//! Per-run entry store.
//!
//! Holds the bounded entry buffer plus the small amount of state that log
//! operations depend on: group depth, named timers and named counters.
//!
//! `clear()` empties the buffer and resets the group depth but deliberately
//! leaves timers and counters alone; only [`EntryStore::reset_state`] (run
//! teardown) drops those.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use chrono::Utc;

use crate::entry::{EntryKind, LogEntry, LogLevel, LogSource};
use crate::value::Value;

/// Label used by timers and counters when none is given.
pub const DEFAULT_LABEL: &str = "default";

/// Bounded, insertion-ordered entry buffer with timer/counter state.
#[derive(Debug)]
pub struct EntryStore {
    buffer: VecDeque<LogEntry>,
    group_depth: usize,
    timers: HashMap<String, Instant>,
    counters: HashMap<String, u64>,
    max_buffer_size: usize,
    next_seq: u64,
}

impl EntryStore {
    /// Create a store that keeps at most `max_buffer_size` entries.
    ///
    /// A size of zero is treated as one; configuration validation rejects
    /// zero before it gets here.
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            buffer: VecDeque::new(),
            group_depth: 0,
            timers: HashMap::new(),
            counters: HashMap::new(),
            max_buffer_size: max_buffer_size.max(1),
            next_seq: 0,
        }
    }

    /// Append an entry at the current group depth, evicting the oldest
    /// entries once the buffer exceeds its limit. Returns the entry's
    /// sequence number.
    pub fn append(
        &mut self,
        level: LogLevel,
        args: Vec<Value>,
        source: LogSource,
        kind: EntryKind,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.buffer.push_back(LogEntry {
            level,
            args,
            timestamp: Utc::now(),
            source,
            group_level: self.group_depth,
            kind,
            seq,
        });

        while self.buffer.len() > self.max_buffer_size {
            self.buffer.pop_front();
        }
        seq
    }

    fn local(&mut self, level: LogLevel, args: Vec<Value>) {
        self.append(level, args, LogSource::Local, EntryKind::Plain);
    }

    /// Record the group header at the current depth, then nest.
    pub fn begin_group(&mut self, args: Vec<Value>) {
        let args = if args.is_empty() {
            vec![Value::from("")]
        } else {
            args
        };
        self.local(LogLevel::Log, args);
        self.group_depth += 1;
    }

    /// Leave the current group. Unbalanced calls are ignored.
    pub fn end_group(&mut self) {
        self.group_depth = self.group_depth.saturating_sub(1);
    }

    pub fn start_timer(&mut self, label: &str) {
        if self.timers.contains_key(label) {
            self.local(
                LogLevel::Warn,
                vec![format!("Timer \"{}\" already exists", label).into()],
            );
            return;
        }
        self.timers.insert(label.to_string(), Instant::now());
    }

    pub fn stop_timer(&mut self, label: &str) {
        match self.timers.remove(label) {
            Some(start) => {
                let elapsed = start.elapsed().as_millis();
                self.local(LogLevel::Log, vec![format!("{}: {}ms", label, elapsed).into()]);
            }
            None => self.warn_missing_timer(label),
        }
    }

    /// Log the elapsed time of a running timer without stopping it.
    pub fn peek_timer(&mut self, label: &str, extra: Vec<Value>) {
        let Some(start) = self.timers.get(label) else {
            self.warn_missing_timer(label);
            return;
        };
        let elapsed = start.elapsed().as_millis();
        let mut args = Vec::with_capacity(extra.len() + 1);
        args.push(Value::from(format!("{}: {}ms", label, elapsed)));
        args.extend(extra);
        self.local(LogLevel::Log, args);
    }

    fn warn_missing_timer(&mut self, label: &str) {
        self.local(
            LogLevel::Warn,
            vec![format!("Timer \"{}\" does not exist", label).into()],
        );
    }

    /// Increment a counter and log its new value.
    pub fn increment(&mut self, label: &str) -> u64 {
        let count = self.counters.entry(label.to_string()).or_insert(0);
        *count += 1;
        let count = *count;
        self.local(LogLevel::Log, vec![format!("{}: {}", label, count).into()]);
        count
    }

    pub fn reset_counter(&mut self, label: &str) {
        if self.counters.remove(label).is_none() {
            self.local(
                LogLevel::Warn,
                vec![format!("Count for \"{}\" does not exist", label).into()],
            );
        }
    }

    /// Independent copy of the buffer.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.buffer.iter().cloned().collect()
    }

    /// Empty the buffer and reset group depth. Timers and counters survive.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.group_depth = 0;
    }

    /// Remove every entry up to and including `seq`, then reset group depth
    /// as `clear()` does. Entries appended after `seq` are kept.
    pub fn clear_through(&mut self, seq: u64) {
        while self.buffer.front().is_some_and(|e| e.seq <= seq) {
            self.buffer.pop_front();
        }
        self.group_depth = 0;
    }

    /// Drop all timers and counters (run teardown).
    pub fn reset_state(&mut self) {
        self.timers.clear();
        self.counters.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn group_depth(&self) -> usize {
        self.group_depth
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    pub fn has_timer(&self, label: &str) -> bool {
        self.timers.contains_key(label)
    }

    #[cfg(test)]
    pub(crate) fn timer_started_at(&self, label: &str) -> Option<Instant> {
        self.timers.get(label).copied()
    }

    pub fn counter(&self, label: &str) -> Option<u64> {
        self.counters.get(label).copied()
    }
}
