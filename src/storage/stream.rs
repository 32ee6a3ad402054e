//! Stream Engine
//!
//! An append-only, ID-ordered log with range and tail reads plus consumer
//! groups: per-group delivery cursors, per-consumer pending-entries lists,
//! and acknowledgement.
//!
//! ## IDs
//!
//! A stream ID is the pair `(milliseconds, sequence)`, rendered as
//! `"<ms>-<seq>"` and compared component-wise — never as a string. The
//! stream tracks `last_id`; auto-generated IDs (`XADD key *`) take the
//! current wall-clock millisecond, falling back to `(last.ms, last.seq+1)`
//! when the clock has not advanced (or ran backwards). Explicit IDs must be
//! strictly greater than `last_id`; `0-0` is never accepted from a client.
//!
//! ## Locking
//!
//! The whole stream state sits behind one readers-writer lock, held across
//! validation, ID generation, and mutation in a single critical section, so
//! two concurrent `XADD *` calls can never race to the same ID. The
//! keyspace lock is already released by the time these methods run (the
//! keyspace hands out `Arc<Stream>` clones), which keeps long scans and
//! blocked readers from stalling unrelated keys.

use crate::storage::StoreError;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stream entry identifier: millisecond timestamp plus sequence number.
///
/// Ordering is lexicographic on the `(ms, seq)` pair, which the derived
/// `Ord` provides thanks to field order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    /// The smallest possible ID, also the initial `last_id` of an empty
    /// stream.
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };

    /// The largest possible ID; used as the open end of ranges.
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = StoreError;

    /// Parses `"ms-seq"`. A bare `"ms"` is accepted with sequence zero;
    /// range parsing fills in the open end itself.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (
                ms.parse::<u64>().map_err(|_| StoreError::NotAnInteger)?,
                seq.parse::<u64>().map_err(|_| StoreError::NotAnInteger)?,
            ),
            None => (s.parse::<u64>().map_err(|_| StoreError::NotAnInteger)?, 0),
        };
        Ok(StreamId { ms, seq })
    }
}

/// How `XADD` picks the new entry's ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpec {
    /// `*`: generate from the wall clock / last ID.
    Auto,
    /// A fully specified `ms-seq`, which must exceed `last_id`.
    Explicit(StreamId),
}

/// One entry in the stream: ID, the field/value pairs in the order the
/// client supplied them, and the insertion instant.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
    pub added: SystemTime,
}

/// A consumer inside a group: identity plus its share of the pending
/// entries list (ID → delivery instant).
#[derive(Debug, Clone)]
pub struct Consumer {
    pub name: String,
    pub last_seen: SystemTime,
    pub pending: HashMap<StreamId, SystemTime>,
}

impl Consumer {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_seen: SystemTime::now(),
            pending: HashMap::new(),
        }
    }
}

/// A consumer group: delivery cursor, consumers, and the group-level
/// pending map (ID → owning consumer name).
#[derive(Debug, Clone)]
pub struct ConsumerGroup {
    pub name: String,
    pub last_delivered: StreamId,
    pub consumers: HashMap<String, Consumer>,
    pub pending: HashMap<StreamId, String>,
    pub created_at: SystemTime,
}

#[derive(Debug, Default)]
struct StreamInner {
    entries: Vec<StreamEntry>,
    groups: HashMap<String, ConsumerGroup>,
    last_id: StreamId,
}

/// The stream value type. Lives behind an `Arc` in the keyspace; all state
/// is interior-mutable behind the stream's own lock.
#[derive(Debug, Default)]
pub struct Stream {
    inner: RwLock<StreamInner>,
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Stream {
    /// Creates an empty stream with `last_id = 0-0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// `XADD`: resolves the ID, validates monotonicity, and appends — all
    /// in one critical section. Returns the ID actually used.
    pub fn add(&self, spec: IdSpec, fields: Vec<(Bytes, Bytes)>) -> Result<StreamId, StoreError> {
        let mut inner = self.inner.write().unwrap();

        let id = match spec {
            IdSpec::Auto => {
                let now = now_unix_ms();
                if now > inner.last_id.ms {
                    StreamId::new(now, 0)
                } else {
                    StreamId::new(inner.last_id.ms, inner.last_id.seq + 1)
                }
            }
            IdSpec::Explicit(id) => {
                // 0-0 is reserved; explicit IDs must move the stream forward.
                if id == StreamId::ZERO || id <= inner.last_id {
                    return Err(StoreError::IdNotIncreasing);
                }
                id
            }
        };

        inner.entries.push(StreamEntry {
            id,
            fields,
            added: SystemTime::now(),
        });
        inner.last_id = id;
        Ok(id)
    }

    /// Number of entries currently in the stream.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The highest ID ever generated (deletions do not move it back).
    pub fn last_id(&self) -> StreamId {
        self.inner.read().unwrap().last_id
    }

    /// `XRANGE`: entries with `start <= id <= end`, in order, optionally
    /// capped at `count` (zero means unlimited).
    pub fn range(&self, start: StreamId, end: StreamId, count: usize) -> Vec<StreamEntry> {
        let inner = self.inner.read().unwrap();
        let mut out = Vec::new();
        for entry in &inner.entries {
            if entry.id < start {
                continue;
            }
            if entry.id > end {
                continue;
            }
            out.push(entry.clone());
            if count > 0 && out.len() >= count {
                break;
            }
        }
        out
    }

    /// `XREAD` helper: entries with `id > after`, in order, optionally
    /// capped at `count`.
    pub fn entries_after(&self, after: StreamId, count: usize) -> Vec<StreamEntry> {
        let inner = self.inner.read().unwrap();
        let mut out = Vec::new();
        for entry in &inner.entries {
            if entry.id > after {
                out.push(entry.clone());
                if count > 0 && out.len() >= count {
                    break;
                }
            }
        }
        out
    }

    /// `XDEL`: removes entries by exact ID, returning how many existed.
    /// `last_id` is deliberately left alone so deleted IDs are never reused.
    pub fn delete(&self, ids: &[StreamId]) -> usize {
        let mut inner = self.inner.write().unwrap();
        let before = inner.entries.len();
        inner.entries.retain(|entry| !ids.contains(&entry.id));
        before - inner.entries.len()
    }

    // ========================================================================
    // Consumer groups
    // ========================================================================

    /// `XGROUP CREATE`: registers a group with its delivery cursor at
    /// `start` (`$` is resolved to `last_id` by the caller). Fails if the
    /// group name is taken.
    pub fn create_group(&self, name: &str, start: StreamId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if inner.groups.contains_key(name) {
            return Err(StoreError::GroupAlreadyExists(name.to_string()));
        }
        inner.groups.insert(
            name.to_string(),
            ConsumerGroup {
                name: name.to_string(),
                last_delivered: start,
                consumers: HashMap::new(),
                pending: HashMap::new(),
                created_at: SystemTime::now(),
            },
        );
        Ok(())
    }

    /// `XGROUP DESTROY`: drops the group and all its pending state.
    /// Returns `true` if the group existed.
    pub fn destroy_group(&self, name: &str) -> bool {
        self.inner.write().unwrap().groups.remove(name).is_some()
    }

    /// `XREADGROUP ... >`: delivers entries above the group's cursor to
    /// `consumer`, advancing the cursor and recording every delivered ID in
    /// both pending maps.
    pub fn read_group(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let StreamInner {
            entries, groups, ..
        } = &mut *inner;

        let group = groups
            .get_mut(group)
            .ok_or_else(|| StoreError::NoSuchGroup(group.to_string()))?;

        let consumer = group
            .consumers
            .entry(consumer.to_string())
            .or_insert_with(|| Consumer::new(consumer));
        consumer.last_seen = SystemTime::now();

        let now = SystemTime::now();
        let mut delivered = Vec::new();
        for entry in entries.iter() {
            if entry.id > group.last_delivered {
                group.pending.insert(entry.id, consumer.name.clone());
                consumer.pending.insert(entry.id, now);
                group.last_delivered = entry.id;
                delivered.push(entry.clone());
                if count > 0 && delivered.len() >= count {
                    break;
                }
            }
        }
        Ok(delivered)
    }

    /// `XREADGROUP` with a concrete ID: re-delivers entries already pending
    /// for `consumer` with `id >= from`, without touching the cursor or the
    /// pending maps.
    pub fn read_pending(
        &self,
        group: &str,
        consumer: &str,
        from: StreamId,
        count: usize,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let inner = self.inner.read().unwrap();
        let group = inner
            .groups
            .get(group)
            .ok_or_else(|| StoreError::NoSuchGroup(group.to_string()))?;

        let mut ids: Vec<StreamId> = match group.consumers.get(consumer) {
            Some(consumer) => consumer
                .pending
                .keys()
                .copied()
                .filter(|id| *id >= from)
                .collect(),
            None => Vec::new(),
        };
        ids.sort();
        if count > 0 {
            ids.truncate(count);
        }

        // Entries may have been XDELed since delivery; those IDs are skipped.
        let out = inner
            .entries
            .iter()
            .filter(|entry| ids.binary_search(&entry.id).is_ok())
            .cloned()
            .collect();
        Ok(out)
    }

    /// `XACK`: acknowledges IDs, removing them from the group-level and
    /// consumer-level pending maps. Unknown or already-acked IDs count
    /// zero; the call is idempotent.
    pub fn ack(&self, group: &str, ids: &[StreamId]) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let group = inner
            .groups
            .get_mut(group)
            .ok_or_else(|| StoreError::NoSuchGroup(group.to_string()))?;

        let mut acked = 0usize;
        for id in ids {
            if let Some(owner) = group.pending.remove(id) {
                if let Some(consumer) = group.consumers.get_mut(&owner) {
                    consumer.pending.remove(id);
                }
                acked += 1;
            }
        }
        Ok(acked)
    }

    /// `XPENDING`: the sorted pending IDs of the whole group, or of one
    /// consumer when a name is given.
    pub fn pending(&self, group: &str, consumer: Option<&str>) -> Result<Vec<StreamId>, StoreError> {
        let inner = self.inner.read().unwrap();
        let group = inner
            .groups
            .get(group)
            .ok_or_else(|| StoreError::NoSuchGroup(group.to_string()))?;

        let mut ids: Vec<StreamId> = match consumer {
            None => group.pending.keys().copied().collect(),
            Some(name) => match group.consumers.get(name) {
                Some(consumer) => consumer.pending.keys().copied().collect(),
                None => Vec::new(),
            },
        };
        ids.sort();
        Ok(ids)
    }

    // ========================================================================
    // Snapshot support
    // ========================================================================

    /// Deep-copies the whole stream state for snapshot capture.
    pub fn export(&self) -> (StreamId, Vec<StreamEntry>, Vec<ConsumerGroup>) {
        let inner = self.inner.read().unwrap();
        let mut groups: Vec<ConsumerGroup> = inner.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        (inner.last_id, inner.entries.clone(), groups)
    }

    /// Rebuilds a stream from snapshot state.
    pub fn restore(last_id: StreamId, entries: Vec<StreamEntry>, groups: Vec<ConsumerGroup>) -> Self {
        Self {
            inner: RwLock::new(StreamInner {
                entries,
                last_id,
                groups: groups
                    .into_iter()
                    .map(|group| (group.name.clone(), group))
                    .collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(Bytes, Bytes)> {
        pairs
            .iter()
            .map(|(f, v)| (Bytes::from(f.to_string()), Bytes::from(v.to_string())))
            .collect()
    }

    #[test]
    fn id_parse_and_render() {
        let id: StreamId = "1609459200000-3".parse().unwrap();
        assert_eq!(id, StreamId::new(1_609_459_200_000, 3));
        assert_eq!(id.to_string(), "1609459200000-3");

        // A bare millisecond part defaults the sequence to zero.
        assert_eq!("42".parse::<StreamId>().unwrap(), StreamId::new(42, 0));
        assert!("abc".parse::<StreamId>().is_err());
        assert!("1-x".parse::<StreamId>().is_err());
    }

    #[test]
    fn id_ordering_is_pairwise() {
        assert!(StreamId::new(2, 0) > StreamId::new(1, 999));
        assert!(StreamId::new(1, 1) > StreamId::new(1, 0));
        assert!(StreamId::new(1, 0) < StreamId::new(1, 1));
        // Not string comparison: "10-0" > "9-0".
        assert!(StreamId::new(10, 0) > StreamId::new(9, 0));
    }

    #[test]
    fn auto_ids_are_strictly_increasing() {
        let stream = Stream::new();
        let a = stream.add(IdSpec::Auto, fields(&[("f", "1")])).unwrap();
        let b = stream.add(IdSpec::Auto, fields(&[("f", "2")])).unwrap();
        let c = stream.add(IdSpec::Auto, fields(&[("f", "3")])).unwrap();
        assert!(a < b && b < c);
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.last_id(), c);
    }

    #[test]
    fn explicit_ids_must_move_forward() {
        let stream = Stream::new();
        stream
            .add(IdSpec::Explicit(StreamId::new(5, 0)), fields(&[("f", "1")]))
            .unwrap();

        assert_eq!(
            stream.add(IdSpec::Explicit(StreamId::new(5, 0)), fields(&[("f", "2")])),
            Err(StoreError::IdNotIncreasing)
        );
        assert_eq!(
            stream.add(IdSpec::Explicit(StreamId::new(4, 9)), fields(&[("f", "2")])),
            Err(StoreError::IdNotIncreasing)
        );
        // 0-0 is never a valid explicit ID, even on a fresh stream.
        let fresh = Stream::new();
        assert_eq!(
            fresh.add(IdSpec::Explicit(StreamId::ZERO), fields(&[("f", "1")])),
            Err(StoreError::IdNotIncreasing)
        );
    }

    #[test]
    fn field_order_is_preserved() {
        let stream = Stream::new();
        stream
            .add(
                IdSpec::Auto,
                fields(&[("zeta", "1"), ("alpha", "2"), ("mid", "3")]),
            )
            .unwrap();

        let all = stream.range(StreamId::ZERO, StreamId::MAX, 0);
        let names: Vec<&[u8]> = all[0].fields.iter().map(|(f, _)| f.as_ref()).collect();
        assert_eq!(names, vec![&b"zeta"[..], &b"alpha"[..], &b"mid"[..]]);
    }

    #[test]
    fn range_and_count() {
        let stream = Stream::new();
        for i in 1..=5u64 {
            stream
                .add(
                    IdSpec::Explicit(StreamId::new(i, 0)),
                    fields(&[("n", &i.to_string())]),
                )
                .unwrap();
        }

        let all = stream.range(StreamId::ZERO, StreamId::MAX, 0);
        assert_eq!(all.len(), 5);

        let middle = stream.range(StreamId::new(2, 0), StreamId::new(4, 0), 0);
        assert_eq!(middle.len(), 3);
        assert_eq!(middle[0].id, StreamId::new(2, 0));

        let capped = stream.range(StreamId::ZERO, StreamId::MAX, 2);
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn entries_after_is_strict() {
        let stream = Stream::new();
        for i in 1..=3u64 {
            stream
                .add(IdSpec::Explicit(StreamId::new(i, 0)), fields(&[("f", "v")]))
                .unwrap();
        }

        let after = stream.entries_after(StreamId::new(1, 0), 0);
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].id, StreamId::new(2, 0));

        assert!(stream.entries_after(StreamId::new(3, 0), 0).is_empty());
    }

    #[test]
    fn delete_keeps_last_id() {
        let stream = Stream::new();
        let id1 = stream.add(IdSpec::Auto, fields(&[("f", "1")])).unwrap();
        let id2 = stream.add(IdSpec::Auto, fields(&[("f", "2")])).unwrap();

        assert_eq!(stream.delete(&[id2, StreamId::new(999, 999)]), 1);
        assert_eq!(stream.len(), 1);
        // The high-water mark does not move backwards.
        assert_eq!(stream.last_id(), id2);
        assert_eq!(stream.delete(&[id1]), 1);
        assert_eq!(stream.last_id(), id2);
    }

    #[test]
    fn group_lifecycle() {
        let stream = Stream::new();
        stream.create_group("workers", StreamId::ZERO).unwrap();
        assert_eq!(
            stream.create_group("workers", StreamId::ZERO),
            Err(StoreError::GroupAlreadyExists("workers".into()))
        );

        assert!(stream.destroy_group("workers"));
        assert!(!stream.destroy_group("workers"));
    }

    #[test]
    fn group_delivery_and_ack() {
        let stream = Stream::new();
        let id1 = stream.add(IdSpec::Auto, fields(&[("f", "1")])).unwrap();
        let id2 = stream.add(IdSpec::Auto, fields(&[("f", "2")])).unwrap();
        stream.create_group("g", StreamId::ZERO).unwrap();

        let delivered = stream.read_group("g", "c1", 10).unwrap();
        assert_eq!(delivered.len(), 2);
        assert_eq!(stream.pending("g", None).unwrap(), vec![id1, id2]);
        assert_eq!(stream.pending("g", Some("c1")).unwrap(), vec![id1, id2]);

        // Nothing new to deliver.
        assert!(stream.read_group("g", "c1", 10).unwrap().is_empty());

        assert_eq!(stream.ack("g", &[id1]).unwrap(), 1);
        assert_eq!(stream.pending("g", None).unwrap(), vec![id2]);

        // Acking again (or acking unknown IDs) is a no-op.
        assert_eq!(stream.ack("g", &[id1, StreamId::new(9, 9)]).unwrap(), 0);
        assert_eq!(stream.pending("g", Some("c1")).unwrap(), vec![id2]);
    }

    #[test]
    fn group_redelivery() {
        let stream = Stream::new();
        let id1 = stream.add(IdSpec::Auto, fields(&[("f", "1")])).unwrap();
        let id2 = stream.add(IdSpec::Auto, fields(&[("f", "2")])).unwrap();
        stream.create_group("g", StreamId::ZERO).unwrap();
        stream.read_group("g", "c1", 10).unwrap();

        // Redelivery from 0-0 returns everything still pending for c1.
        let again = stream.read_pending("g", "c1", StreamId::ZERO, 0).unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].id, id1);

        // From a later ID, only the tail.
        let tail = stream.read_pending("g", "c1", id2, 0).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].id, id2);

        // Redelivery does not advance the cursor or add pending state.
        assert_eq!(stream.pending("g", None).unwrap().len(), 2);

        // Unknown consumer has nothing pending.
        assert!(stream
            .read_pending("g", "ghost", StreamId::ZERO, 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn split_delivery_between_consumers() {
        let stream = Stream::new();
        let id1 = stream.add(IdSpec::Auto, fields(&[("f", "1")])).unwrap();
        let id2 = stream.add(IdSpec::Auto, fields(&[("f", "2")])).unwrap();
        stream.create_group("g", StreamId::ZERO).unwrap();

        let first = stream.read_group("g", "c1", 1).unwrap();
        let second = stream.read_group("g", "c2", 1).unwrap();
        assert_eq!(first[0].id, id1);
        assert_eq!(second[0].id, id2);

        assert_eq!(stream.pending("g", Some("c1")).unwrap(), vec![id1]);
        assert_eq!(stream.pending("g", Some("c2")).unwrap(), vec![id2]);
        assert_eq!(stream.pending("g", None).unwrap(), vec![id1, id2]);
    }

    #[test]
    fn missing_group_errors() {
        let stream = Stream::new();
        assert!(matches!(
            stream.read_group("nope", "c", 0),
            Err(StoreError::NoSuchGroup(_))
        ));
        assert!(matches!(
            stream.ack("nope", &[]),
            Err(StoreError::NoSuchGroup(_))
        ));
        assert!(matches!(
            stream.pending("nope", None),
            Err(StoreError::NoSuchGroup(_))
        ));
    }

    #[test]
    fn export_restore_roundtrip() {
        let stream = Stream::new();
        let id1 = stream.add(IdSpec::Auto, fields(&[("a", "1")])).unwrap();
        stream.add(IdSpec::Auto, fields(&[("b", "2")])).unwrap();
        stream.create_group("g", StreamId::ZERO).unwrap();
        stream.read_group("g", "c1", 1).unwrap();

        let (last_id, entries, groups) = stream.export();
        let rebuilt = Stream::restore(last_id, entries, groups);

        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt.last_id(), stream.last_id());
        assert_eq!(rebuilt.pending("g", None).unwrap(), vec![id1]);
        // The cursor survived, so delivery resumes at the second entry.
        let next = rebuilt.read_group("g", "c1", 10).unwrap();
        assert_eq!(next.len(), 1);
    }
}
