//! Typed Values
//!
//! Every key in the keyspace maps to an [`Entry`]: a tagged payload plus an
//! optional absolute expiry instant. The payload is a [`Value`] — a sum type
//! over the five supported encodings. Operations match on the variant, so a
//! type mismatch is caught before any payload is touched.
//!
//! ## Why a sum type?
//!
//! Keeping every encoding behind one discriminated union means the keyspace
//! is a single logical map: one lock, one lookup path, one expiry check.
//! `TYPE`, `DEL`, `EXPIRE` and friends work uniformly across encodings.
//!
//! Expiry uses wall-clock time (`SystemTime`, not `Instant`) so that a TTL
//! written into a snapshot still means the same thing after a restart.

use crate::storage::stream::Stream;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// The data-type tag of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    List,
    Set,
    Hash,
    Stream,
}

impl DataType {
    /// The name reported by the `TYPE` command.
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::List => "list",
            DataType::Set => "set",
            DataType::Hash => "hash",
            DataType::Stream => "stream",
        }
    }
}

/// The payload of a stored key.
///
/// Strings are arbitrary byte sequences (integer and float parsing happens
/// at use time, not store time). Aggregates hold byte strings as members.
/// Streams live behind an `Arc` so handlers can release the keyspace lock
/// and keep working against the stream's own lock.
#[derive(Debug, Clone)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Stream(Arc<Stream>),
}

impl Value {
    /// Returns the tag matching this payload.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::String(_) => DataType::String,
            Value::List(_) => DataType::List,
            Value::Set(_) => DataType::Set,
            Value::Hash(_) => DataType::Hash,
            Value::Stream(_) => DataType::Stream,
        }
    }
}

/// A stored key: payload plus optional expiry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The typed payload.
    pub value: Value,
    /// Absolute expiry instant; `None` means the key never expires.
    pub expires_at: Option<SystemTime>,
}

impl Entry {
    /// Creates an entry without expiry.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry that expires `ttl` from now.
    pub fn with_ttl(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Some(SystemTime::now() + ttl),
        }
    }

    /// True if the expiry instant has passed.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| SystemTime::now() >= exp)
            .unwrap_or(false)
    }

    /// Remaining lifetime, or `None` if the key has no expiry.
    /// An already-expired entry reports a zero remainder.
    pub fn time_to_live(&self) -> Option<Duration> {
        self.expires_at.map(|exp| {
            exp.duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO)
        })
    }
}
