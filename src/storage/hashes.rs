//! Hash Operations
//!
//! Field/value maps. Field names are unique within a hash; a hash that
//! loses its last field loses its key. Field-level increments parse the
//! stored text at use time: a missing field counts as zero, an unparsable
//! one fails.

use crate::storage::value::{Entry, Value};
use crate::storage::{Keyspace, StoreError};
use bytes::Bytes;
use std::collections::HashMap;

impl Keyspace {
    /// `HSET`: writes field/value pairs, creating the hash when absent.
    /// Returns the number of fields that did not exist before.
    pub fn hash_set(&self, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> Result<usize, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, &key);

        let entry = map
            .entry(key)
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        let Value::Hash(hash) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        let mut created = 0usize;
        for (field, value) in pairs {
            if hash.insert(field, value).is_none() {
                created += 1;
            }
        }
        self.bump_changes(1);
        Ok(created)
    }

    /// `HGET`.
    pub fn hash_get(&self, key: &[u8], field: &[u8]) -> Result<Option<Bytes>, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match map.get(key) {
            Some(entry) => match &entry.value {
                Value::Hash(hash) => Ok(hash.get(field).cloned()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(None),
        }
    }

    /// `HGETALL`: every field/value pair, in no particular order.
    pub fn hash_get_all(&self, key: &[u8]) -> Result<Vec<(Bytes, Bytes)>, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match map.get(key) {
            Some(entry) => match &entry.value {
                Value::Hash(hash) => Ok(hash
                    .iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(Vec::new()),
        }
    }

    /// `HEXISTS`.
    pub fn hash_exists(&self, key: &[u8], field: &[u8]) -> Result<bool, StoreError> {
        Ok(self.hash_get(key, field)?.is_some())
    }

    /// `HDEL`: removes fields; removes the key when the hash drains.
    pub fn hash_del(&self, key: &[u8], fields: &[Bytes]) -> Result<usize, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let (deleted, drained) = {
            let Some(entry) = map.get_mut(key) else {
                return Ok(0);
            };
            let Value::Hash(hash) = &mut entry.value else {
                return Err(StoreError::WrongType);
            };
            let mut deleted = 0usize;
            for field in fields {
                if hash.remove(&field[..]).is_some() {
                    deleted += 1;
                }
            }
            (deleted, hash.is_empty())
        };

        if drained {
            map.remove(key);
        }
        if deleted > 0 {
            self.bump_changes(1);
        }
        Ok(deleted)
    }

    /// `HLEN`: field count; absent keys report zero.
    pub fn hash_len(&self, key: &[u8]) -> Result<usize, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match map.get(key) {
            Some(entry) => match &entry.value {
                Value::Hash(hash) => Ok(hash.len()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(0),
        }
    }

    /// `HKEYS`: all field names.
    pub fn hash_keys(&self, key: &[u8]) -> Result<Vec<Bytes>, StoreError> {
        Ok(self
            .hash_get_all(key)?
            .into_iter()
            .map(|(field, _)| field)
            .collect())
    }

    /// `HVALS`: all field values.
    pub fn hash_vals(&self, key: &[u8]) -> Result<Vec<Bytes>, StoreError> {
        Ok(self
            .hash_get_all(key)?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    /// `HINCRBY`: integer increment of a field (missing field counts as
    /// zero). The new value is stored re-rendered as decimal text.
    pub fn hash_incr_by(
        &self,
        key: &Bytes,
        field: &Bytes,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let entry = map
            .entry(key.clone())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        let Value::Hash(hash) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        let current = match hash.get(&field[..]) {
            Some(text) => std::str::from_utf8(text)
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .ok_or(StoreError::NotAnInteger)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(StoreError::Overflow)?;
        hash.insert(field.clone(), Bytes::from(next.to_string()));
        self.bump_changes(1);
        Ok(next)
    }

    /// `HINCRBYFLOAT`: float increment of a field. The result must stay
    /// finite; NaN and infinities are rejected.
    pub fn hash_incr_by_float(
        &self,
        key: &Bytes,
        field: &Bytes,
        delta: f64,
    ) -> Result<f64, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let entry = map
            .entry(key.clone())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        let Value::Hash(hash) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        let current = match hash.get(&field[..]) {
            Some(text) => std::str::from_utf8(text)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or(StoreError::NotAFloat)?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(StoreError::NotAFloat);
        }
        hash.insert(field.clone(), Bytes::from(format_float(next)));
        self.bump_changes(1);
        Ok(next)
    }
}

/// Renders a float the way clients expect: no exponent, no trailing `.0`
/// for whole numbers.
pub(crate) fn format_float(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e17 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
