//! Trace journal for a configuration
//!
//! The journal records what the scheduler did, in order:
//! - actor creations
//! - immediate and delayed sends
//! - deliveries
//!
//! Payloads are not recorded, so the journal works for any message type.
//! Recording is off by default and is switched on through
//! [`JournalConfig::recording_enabled`] or [`Journal::start_recording`].

use crate::{ActorId, Millis};
use serde::{Deserialize, Serialize};

/// A journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEntry {
    /// An actor was registered
    Created {
        seq: u64,
        at: Millis,
        id: ActorId,
        name: String,
    },
    /// A message was enqueued
    Sent { seq: u64, at: Millis, target: ActorId },
    /// A message was scheduled for later delivery
    Scheduled {
        seq: u64,
        at: Millis,
        due: Millis,
        target: ActorId,
    },
    /// A message was handed to its target's behavior
    Delivered { seq: u64, at: Millis, target: ActorId },
}

impl JournalEntry {
    /// Sequence number of this entry
    pub fn seq(&self) -> u64 {
        match self {
            JournalEntry::Created { seq, .. }
            | JournalEntry::Sent { seq, .. }
            | JournalEntry::Scheduled { seq, .. }
            | JournalEntry::Delivered { seq, .. } => *seq,
        }
    }

    /// Logical time this entry was recorded at
    pub fn at(&self) -> Millis {
        match self {
            JournalEntry::Created { at, .. }
            | JournalEntry::Sent { at, .. }
            | JournalEntry::Scheduled { at, .. }
            | JournalEntry::Delivered { at, .. } => *at,
        }
    }
}

/// Configuration for the journal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Whether recording is enabled
    pub recording_enabled: bool,
    /// Maximum number of entries to keep (0 = unlimited)
    pub max_entries: usize,
}

/// Counts per entry kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JournalStats {
    pub created: usize,
    pub sent: usize,
    pub scheduled: usize,
    pub delivered: usize,
}

/// The scheduler trace
#[derive(Debug, Clone, Default)]
pub struct Journal {
    config: JournalConfig,
    entries: Vec<JournalEntry>,
    next_seq: u64,
}

impl Journal {
    /// Create a journal that is not recording
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration
    pub fn with_config(config: JournalConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// Start recording
    pub fn start_recording(&mut self) {
        self.config.recording_enabled = true;
    }

    /// Stop recording
    pub fn stop_recording(&mut self) {
        self.config.recording_enabled = false;
    }

    /// Check if recording is enabled
    pub fn is_recording(&self) -> bool {
        self.config.recording_enabled
    }

    /// Record an actor creation
    pub fn record_created(&mut self, at: Millis, id: ActorId, name: &str) {
        self.push(|seq| JournalEntry::Created {
            seq,
            at,
            id,
            name: name.to_string(),
        });
    }

    /// Record an immediate send
    pub fn record_sent(&mut self, at: Millis, target: ActorId) {
        self.push(|seq| JournalEntry::Sent { seq, at, target });
    }

    /// Record a delayed send
    pub fn record_scheduled(&mut self, at: Millis, due: Millis, target: ActorId) {
        self.push(|seq| JournalEntry::Scheduled {
            seq,
            at,
            due,
            target,
        });
    }

    /// Record a delivery
    pub fn record_delivered(&mut self, at: Millis, target: ActorId) {
        self.push(|seq| JournalEntry::Delivered { seq, at, target });
    }

    fn push(&mut self, entry: impl FnOnce(u64) -> JournalEntry) {
        if !self.config.recording_enabled {
            return;
        }
        self.entries.push(entry(self.next_seq));
        self.next_seq += 1;
        self.enforce_limits();
    }

    /// Get all entries
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Get entries recorded at or after a point in logical time
    pub fn entries_since(&self, at: Millis) -> Vec<&JournalEntry> {
        self.entries.iter().filter(|e| e.at() >= at).collect()
    }

    /// Delivery targets, in delivery order
    pub fn deliveries(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.entries.iter().filter_map(|e| match e {
            JournalEntry::Delivered { target, .. } => Some(*target),
            _ => None,
        })
    }

    /// Count entries by kind
    pub fn stats(&self) -> JournalStats {
        let mut stats = JournalStats::default();
        for entry in &self.entries {
            match entry {
                JournalEntry::Created { .. } => stats.created += 1,
                JournalEntry::Sent { .. } => stats.sent += 1,
                JournalEntry::Scheduled { .. } => stats.scheduled += 1,
                JournalEntry::Delivered { .. } => stats.delivered += 1,
            }
        }
        stats
    }

    /// Number of entries kept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are kept
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn enforce_limits(&mut self) {
        let max = self.config.max_entries;
        if max > 0 && self.entries.len() > max {
            let excess = self.entries.len() - max;
            self.entries.drain(0..excess);
        }
    }
}
