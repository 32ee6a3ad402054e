//! Snapshot Capture and Restore
//!
//! Converts the live keyspace to and from a plain, serializable form. The
//! capture runs under the keyspace read lock and deep-copies every live
//! value, so the resulting records are immune to concurrent mutation; the
//! snapshot reflects a prefix of the keyspace's total operation order.
//!
//! The records use owned `Vec<u8>`/`u64` shapes (no `Bytes`, no
//! `SystemTime`) so they serialize with plain serde derives and stay
//! readable by later processes of the same build. File framing (magic,
//! version, atomic rename) belongs to the persistence engine in
//! `crate::snapshot`.

use crate::storage::stream::{Consumer, ConsumerGroup, Stream, StreamEntry, StreamId};
use crate::storage::value::{Entry, Value};
use crate::storage::Keyspace;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bumped whenever the record layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A captured keyspace: every live key at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyspaceSnapshot {
    /// Wall-clock capture time, unix milliseconds.
    pub saved_at_ms: u64,
    pub records: Vec<KeyRecord>,
}

/// One key: its bytes, optional absolute expiry, and typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key: Vec<u8>,
    pub expires_at_ms: Option<u64>,
    pub payload: PayloadRecord,
}

/// The payload of a key record, mirroring the five value encodings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PayloadRecord {
    String(Vec<u8>),
    List(Vec<Vec<u8>>),
    Set(Vec<Vec<u8>>),
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
    Stream(StreamRecord),
}

/// Serialized stream state: high-water mark, entries, consumer groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    pub last_id: (u64, u64),
    pub entries: Vec<StreamEntryRecord>,
    pub groups: Vec<GroupRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntryRecord {
    pub id: (u64, u64),
    /// Field order as the client supplied it.
    pub fields: Vec<(Vec<u8>, Vec<u8>)>,
    pub added_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    pub last_delivered: (u64, u64),
    pub created_at_ms: u64,
    /// Group-level pending entries list: ID → owning consumer.
    pub pending: Vec<((u64, u64), String)>,
    pub consumers: Vec<ConsumerRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerRecord {
    pub name: String,
    pub last_seen_ms: u64,
    /// Consumer-level pending entries list: ID → delivery instant.
    pub pending: Vec<((u64, u64), u64)>,
}

fn to_unix_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn from_unix_ms(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

fn id_pair(id: StreamId) -> (u64, u64) {
    (id.ms, id.seq)
}

fn pair_id(pair: (u64, u64)) -> StreamId {
    StreamId::new(pair.0, pair.1)
}

impl Keyspace {
    /// Captures every live key under the read lock. Expired keys are
    /// skipped (not evicted — the sweeper owns that). The change counter is
    /// untouched here; the persistence engine resets it only once the
    /// snapshot has actually reached disk.
    pub fn create_snapshot(&self) -> KeyspaceSnapshot {
        let map = self.map_read();
        let records = map
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, entry)| KeyRecord {
                key: key.to_vec(),
                expires_at_ms: entry.expires_at.map(to_unix_ms),
                payload: payload_record(&entry.value),
            })
            .collect();
        KeyspaceSnapshot {
            saved_at_ms: to_unix_ms(SystemTime::now()),
            records,
        }
    }

    /// Replaces the entire keyspace with the snapshot contents. Records
    /// whose expiry already passed are dropped on the way in. Resets the
    /// change counter: a freshly restored keyspace matches its file.
    pub fn restore_snapshot(&self, snapshot: KeyspaceSnapshot) -> usize {
        let now = SystemTime::now();
        let mut fresh: HashMap<Bytes, Entry> = HashMap::with_capacity(snapshot.records.len());

        for record in snapshot.records {
            let expires_at = record.expires_at_ms.map(from_unix_ms);
            if matches!(expires_at, Some(exp) if exp <= now) {
                continue;
            }
            fresh.insert(
                Bytes::from(record.key),
                Entry {
                    value: restore_value(record.payload),
                    expires_at,
                },
            );
        }

        let restored = fresh.len();
        *self.map_write() = fresh;
        self.reset_changes();
        restored
    }
}

fn payload_record(value: &Value) -> PayloadRecord {
    match value {
        Value::String(bytes) => PayloadRecord::String(bytes.to_vec()),
        Value::List(list) => PayloadRecord::List(list.iter().map(|v| v.to_vec()).collect()),
        Value::Set(set) => PayloadRecord::Set(set.iter().map(|v| v.to_vec()).collect()),
        Value::Hash(hash) => PayloadRecord::Hash(
            hash.iter()
                .map(|(f, v)| (f.to_vec(), v.to_vec()))
                .collect(),
        ),
        Value::Stream(stream) => {
            let (last_id, entries, groups) = stream.export();
            PayloadRecord::Stream(StreamRecord {
                last_id: id_pair(last_id),
                entries: entries
                    .iter()
                    .map(|entry| StreamEntryRecord {
                        id: id_pair(entry.id),
                        fields: entry
                            .fields
                            .iter()
                            .map(|(f, v)| (f.to_vec(), v.to_vec()))
                            .collect(),
                        added_ms: to_unix_ms(entry.added),
                    })
                    .collect(),
                groups: groups
                    .iter()
                    .map(|group| GroupRecord {
                        name: group.name.clone(),
                        last_delivered: id_pair(group.last_delivered),
                        created_at_ms: to_unix_ms(group.created_at),
                        pending: group
                            .pending
                            .iter()
                            .map(|(id, owner)| (id_pair(*id), owner.clone()))
                            .collect(),
                        consumers: group
                            .consumers
                            .values()
                            .map(|consumer| ConsumerRecord {
                                name: consumer.name.clone(),
                                last_seen_ms: to_unix_ms(consumer.last_seen),
                                pending: consumer
                                    .pending
                                    .iter()
                                    .map(|(id, at)| (id_pair(*id), to_unix_ms(*at)))
                                    .collect(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
        }
    }
}

fn restore_value(payload: PayloadRecord) -> Value {
    match payload {
        PayloadRecord::String(bytes) => Value::String(Bytes::from(bytes)),
        PayloadRecord::List(items) => Value::List(items.into_iter().map(Bytes::from).collect()),
        PayloadRecord::Set(members) => Value::Set(members.into_iter().map(Bytes::from).collect()),
        PayloadRecord::Hash(pairs) => Value::Hash(
            pairs
                .into_iter()
                .map(|(f, v)| (Bytes::from(f), Bytes::from(v)))
                .collect(),
        ),
        PayloadRecord::Stream(record) => {
            let entries = record
                .entries
                .into_iter()
                .map(|entry| StreamEntry {
                    id: pair_id(entry.id),
                    fields: entry
                        .fields
                        .into_iter()
                        .map(|(f, v)| (Bytes::from(f), Bytes::from(v)))
                        .collect(),
                    added: from_unix_ms(entry.added_ms),
                })
                .collect();
            let groups = record
                .groups
                .into_iter()
                .map(|group| ConsumerGroup {
                    name: group.name,
                    last_delivered: pair_id(group.last_delivered),
                    created_at: from_unix_ms(group.created_at_ms),
                    pending: group
                        .pending
                        .into_iter()
                        .map(|(id, owner)| (pair_id(id), owner))
                        .collect(),
                    consumers: group
                        .consumers
                        .into_iter()
                        .map(|consumer| {
                            (
                                consumer.name.clone(),
                                Consumer {
                                    name: consumer.name,
                                    last_seen: from_unix_ms(consumer.last_seen_ms),
                                    pending: consumer
                                        .pending
                                        .into_iter()
                                        .map(|(id, at)| (pair_id(id), from_unix_ms(at)))
                                        .collect(),
                                },
                            )
                        })
                        .collect(),
                })
                .collect();
            Value::Stream(Arc::new(Stream::restore(
                pair_id(record.last_id),
                entries,
                groups,
            )))
        }
    }
}
