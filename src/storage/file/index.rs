//! In-memory UID location index and per-day ID allocator.

use chrono::NaiveDate;
use dashmap::DashMap;

use crate::uid::Uid;

/// Where a record lives: its day file and 1-based line number.
///
/// Line numbers count non-empty lines only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub day: NaiveDate,
    pub line: usize,
}

impl Location {
    pub fn new(day: NaiveDate, line: usize) -> Self {
        Self { day, line }
    }

    /// Whether this location should win over `other` for the same UID.
    ///
    /// A newer day wins. Within one file a later line wins, since a record
    /// appended after a stale rewrite supersedes its earlier copy.
    fn supersedes(&self, other: &Location) -> bool {
        self.day > other.day || (self.day == other.day && self.line > other.line)
    }
}

/// UID → location map plus the highest ID seen per day.
///
/// Lookups are lock-free; callers serialize mutations that must be atomic
/// with file writes.
#[derive(Debug, Default)]
pub struct LocationIndex {
    locations: DashMap<Uid, Location>,
    max_ids: DashMap<NaiveDate, i64>,
}

impl LocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uid: Uid) -> Option<Location> {
        self.locations.get(&uid).map(|entry| *entry)
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.locations.contains_key(&uid)
    }

    /// Record a location found while scanning. Keeps the existing entry
    /// unless the new one supersedes it.
    pub fn observe(&self, uid: Uid, location: Location) {
        self.locations
            .entry(uid)
            .and_modify(|existing| {
                if location.supersedes(existing) {
                    *existing = location;
                }
            })
            .or_insert(location);
    }

    /// Point `uid` at `location` unconditionally, after a write.
    pub fn set(&self, uid: Uid, location: Location) {
        self.locations.insert(uid, location);
    }

    /// Seed the allocator for `day` with an ID found on disk.
    pub fn observe_id(&self, day: NaiveDate, id: i64) {
        self.max_ids
            .entry(day)
            .and_modify(|max| *max = (*max).max(id))
            .or_insert(id);
    }

    /// Allocate the next ID for `day`.
    pub fn next_id(&self, day: NaiveDate) -> i64 {
        let mut max = self.max_ids.entry(day).or_insert(0);
        *max += 1;
        *max
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
