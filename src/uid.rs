//! Time-ordered 64-bit identifiers.
//!
//! Layout (most significant bit first):
//! ```text
//! | 1 bit unused | 41 bits ms since EPOCH | 10 bits node | 12 bits sequence |
//! ```
//!
//! The embedded timestamp is what lets a lookup by UID find the shard a record
//! was written to without knowing anything else about the record.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::storage::{Result, StorageError};

/// Custom epoch in Unix milliseconds (2010-11-04T01:42:54.657Z).
pub const EPOCH_MS: i64 = 1_288_834_974_657;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_NODE: u16 = (1 << NODE_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;
const TIME_SHIFT: u32 = NODE_BITS + SEQUENCE_BITS;

/// Unique, time-ordered message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(i64);

impl Uid {
    /// Wrap a raw value read back from storage.
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Build a UID for an arbitrary instant.
    ///
    /// Used when importing records or in tests that need records placed in a
    /// specific shard. Node and sequence are masked to their bit widths.
    pub fn compose(at: DateTime<Utc>, node: u16, sequence: u16) -> Self {
        let elapsed = (at.timestamp_millis() - EPOCH_MS).max(0);
        Self(
            (elapsed << TIME_SHIFT)
                | (i64::from(node & MAX_NODE) << SEQUENCE_BITS)
                | i64::from(sequence & MAX_SEQUENCE),
        )
    }

    /// Creation instant embedded in the UID (millisecond precision).
    pub fn timestamp(self) -> DateTime<Utc> {
        let ms = (self.0 >> TIME_SHIFT) + EPOCH_MS;
        DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn node(self) -> u16 {
        ((self.0 >> SEQUENCE_BITS) as u16) & MAX_NODE
    }

    pub fn sequence(self) -> u16 {
        (self.0 as u16) & MAX_SEQUENCE
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Uid {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

// JSON carries UIDs as decimal strings so that consumers limited to 53-bit
// numbers do not lose precision.
impl Serialize for Uid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(i64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Number(n) => Ok(Self(n)),
        }
    }
}

struct GeneratorState {
    last_ms: i64,
    sequence: u16,
}

/// Snowflake-style UID generator.
///
/// One generator per process (or per node id). UIDs from a single generator
/// are strictly increasing even if the wall clock steps backwards.
pub struct SnowflakeGenerator {
    node: u16,
    state: Mutex<GeneratorState>,
}

impl SnowflakeGenerator {
    /// Create a generator for the given node id (0..=1023).
    pub fn new(node: u16) -> Result<Self> {
        if node > MAX_NODE {
            return Err(StorageError::InvalidNodeId(node));
        }
        Ok(Self {
            node,
            state: Mutex::new(GeneratorState {
                last_ms: 0,
                sequence: 0,
            }),
        })
    }

    pub fn node(&self) -> u16 {
        self.node
    }

    /// Allocate the next UID.
    pub fn next_uid(&self) -> Uid {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut now = Utc::now().timestamp_millis().max(state.last_ms);
        if now == state.last_ms {
            if state.sequence == MAX_SEQUENCE {
                // Sequence space for this millisecond is exhausted.
                while now <= state.last_ms {
                    std::hint::spin_loop();
                    now = Utc::now().timestamp_millis();
                }
                state.sequence = 0;
            } else {
                state.sequence += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        let at = DateTime::from_timestamp_millis(now).unwrap_or_else(Utc::now);
        Uid::compose(at, self.node, state.sequence)
    }
}
