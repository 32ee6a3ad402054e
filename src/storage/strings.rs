//! String Operations
//!
//! Byte-string values: plain reads and writes, atomic read-modify-write
//! combinations (`GETSET`, `GETDEL`), integer arithmetic (`INCR` family),
//! byte-level editing (`APPEND`, `GETRANGE`, `SETRANGE`), and the multi-key
//! forms (`MSET`, `MGET`, `MSETNX`).
//!
//! Stored bytes are not validated at write time; `INCR` and friends attempt
//! to parse the payload when they run and fail with `NotAnInteger` if it
//! does not hold a decimal i64.

use crate::storage::value::{Entry, Value};
use crate::storage::{Keyspace, StoreError};
use bytes::Bytes;
use std::time::Duration;

impl Keyspace {
    /// Unconditional write. A plain `SET` discards any previous value and
    /// TTL; the TTL-bearing form installs the given expiry.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let entry = match ttl {
            Some(ttl) => Entry::with_ttl(Value::String(value), ttl),
            None => Entry::new(Value::String(value)),
        };
        let mut map = self.map_write();
        map.insert(key, entry);
        self.bump_changes(1);
    }

    /// `SETNX`: writes only when the key is absent. Returns `true` if the
    /// key was created.
    pub fn set_if_absent(&self, key: Bytes, value: Bytes) -> bool {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, &key);
        if map.contains_key(&key[..]) {
            return false;
        }
        map.insert(key, Entry::new(Value::String(value)));
        self.bump_changes(1);
        true
    }

    /// Reads a string value. Absent keys yield `Ok(None)`; a key of another
    /// type is a `WrongType` error rather than a raw payload reinterpretation.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match map.get(key) {
            Some(entry) => match &entry.value {
                Value::String(bytes) => Ok(Some(bytes.clone())),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(None),
        }
    }

    /// `GETSET`: atomically installs a new value (without expiry) and
    /// returns the previous string, if any.
    pub fn get_set(&self, key: Bytes, value: Bytes) -> Result<Option<Bytes>, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, &key);
        let previous = match map.get(&key[..]) {
            Some(entry) => match &entry.value {
                Value::String(bytes) => Some(bytes.clone()),
                _ => return Err(StoreError::WrongType),
            },
            None => None,
        };
        map.insert(key, Entry::new(Value::String(value)));
        self.bump_changes(1);
        Ok(previous)
    }

    /// `GETDEL`: atomically removes the key and returns its string value.
    pub fn get_del(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);
        let taken = match map.get(key) {
            Some(entry) => match &entry.value {
                Value::String(bytes) => Some(bytes.clone()),
                _ => return Err(StoreError::WrongType),
            },
            None => None,
        };
        if taken.is_some() {
            map.remove(key);
            self.bump_changes(1);
        }
        Ok(taken)
    }

    /// Adds `delta` to the integer stored at `key` (absent counts as zero)
    /// and stores the re-rendered decimal. The existing TTL is preserved.
    pub fn incr_by(&self, key: &Bytes, delta: i64) -> Result<i64, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let (current, expires_at) = match map.get(&key[..]) {
            Some(entry) => match &entry.value {
                Value::String(bytes) => (parse_i64(bytes)?, entry.expires_at),
                _ => return Err(StoreError::WrongType),
            },
            None => (0, None),
        };

        let next = current.checked_add(delta).ok_or(StoreError::Overflow)?;
        map.insert(
            key.clone(),
            Entry {
                value: Value::String(Bytes::from(next.to_string())),
                expires_at,
            },
        );
        self.bump_changes(1);
        Ok(next)
    }

    /// Appends bytes to the string at `key`, creating it when absent.
    /// Returns the resulting length.
    pub fn append(&self, key: &Bytes, suffix: &[u8]) -> Result<usize, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);
        let len = match map.get_mut(&key[..]) {
            Some(entry) => match &mut entry.value {
                Value::String(bytes) => {
                    let mut combined = Vec::with_capacity(bytes.len() + suffix.len());
                    combined.extend_from_slice(bytes);
                    combined.extend_from_slice(suffix);
                    let len = combined.len();
                    *bytes = Bytes::from(combined);
                    len
                }
                _ => return Err(StoreError::WrongType),
            },
            None => {
                map.insert(
                    key.clone(),
                    Entry::new(Value::String(Bytes::copy_from_slice(suffix))),
                );
                suffix.len()
            }
        };
        self.bump_changes(1);
        Ok(len)
    }

    /// Length of the string at `key`; absent keys report zero.
    pub fn strlen(&self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.get(key)?.map(|bytes| bytes.len()).unwrap_or(0))
    }

    /// `GETRANGE`: the inclusive byte range `[start, end]`, with negative
    /// indices counting from the end and both bounds clamped.
    pub fn get_range(&self, key: &[u8], start: i64, end: i64) -> Result<Bytes, StoreError> {
        let Some(bytes) = self.get(key)? else {
            return Ok(Bytes::new());
        };
        let len = bytes.len() as i64;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut start = if start < 0 { len + start } else { start };
        let mut end = if end < 0 { len + end } else { end };
        start = start.max(0);
        end = end.min(len - 1);
        if start > end {
            return Ok(Bytes::new());
        }
        Ok(bytes.slice(start as usize..=end as usize))
    }

    /// `SETRANGE`: overwrites bytes starting at `offset`, zero-padding when
    /// the offset lies beyond the current length. Returns the new length.
    /// Negative offsets are rejected by the command layer.
    pub fn set_range(&self, key: &Bytes, offset: usize, patch: &[u8]) -> Result<usize, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let mut buffer = match map.get(&key[..]) {
            Some(entry) => match &entry.value {
                Value::String(bytes) => bytes.to_vec(),
                _ => return Err(StoreError::WrongType),
            },
            None => Vec::new(),
        };

        let needed = offset + patch.len();
        if buffer.len() < needed {
            buffer.resize(needed, 0);
        }
        buffer[offset..offset + patch.len()].copy_from_slice(patch);
        let len = buffer.len();

        let expires_at = map.get(&key[..]).and_then(|entry| entry.expires_at);
        map.insert(
            key.clone(),
            Entry {
                value: Value::String(Bytes::from(buffer)),
                expires_at,
            },
        );
        self.bump_changes(1);
        Ok(len)
    }

    /// `MSET`: writes every pair under one lock acquisition.
    pub fn mset(&self, pairs: Vec<(Bytes, Bytes)>) {
        let mut map = self.map_write();
        let count = pairs.len() as u64;
        for (key, value) in pairs {
            map.insert(key, Entry::new(Value::String(value)));
        }
        self.bump_changes(count);
    }

    /// `MGET`: values for each key; absent or non-string keys yield `None`.
    pub fn mget(&self, keys: &[Bytes]) -> Vec<Option<Bytes>> {
        keys.iter()
            .map(|key| {
                self.drop_if_expired(key);
                let map = self.map_read();
                map.get(&key[..]).and_then(|entry| match &entry.value {
                    Value::String(bytes) => Some(bytes.clone()),
                    _ => None,
                })
            })
            .collect()
    }

    /// `MSETNX`: writes all pairs, or none if any key already exists.
    /// Returns `true` when the write happened.
    pub fn mset_nx(&self, pairs: Vec<(Bytes, Bytes)>) -> bool {
        let mut map = self.map_write();
        for (key, _) in &pairs {
            self.evict_if_expired(&mut map, key);
            if map.contains_key(&key[..]) {
                return false;
            }
        }
        let count = pairs.len() as u64;
        for (key, value) in pairs {
            map.insert(key, Entry::new(Value::String(value)));
        }
        self.bump_changes(count);
        true
    }
}

fn parse_i64(bytes: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(bytes)
        .map_err(|_| StoreError::NotAnInteger)?
        .trim()
        .parse::<i64>()
        .map_err(|_| StoreError::NotAnInteger)
}
