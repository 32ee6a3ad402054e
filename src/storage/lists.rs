//! List Operations
//!
//! Ordered sequences backed by a `VecDeque` for O(1) push/pop at both ends.
//! Index semantics follow the usual convention: zero-based, negative counts
//! from the tail, range operations clamp, and `LSET` treats an out-of-range
//! index as an error. A list that loses its last element takes its key with
//! it.

use crate::storage::value::{Entry, Value};
use crate::storage::{Keyspace, StoreError};
use bytes::Bytes;
use std::collections::VecDeque;

/// Resolves a possibly-negative index against a length without clamping.
fn resolve_index(index: i64, len: usize) -> i64 {
    if index < 0 {
        len as i64 + index
    } else {
        index
    }
}

/// Resolves and clamps an inclusive `[start, stop]` range. Returns `None`
/// when the range is empty after clamping.
fn resolve_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let start = resolve_index(start, len).max(0);
    let stop = resolve_index(stop, len).min(len as i64 - 1);
    if start > stop {
        return None;
    }
    Some((start as usize, stop as usize))
}

impl Keyspace {
    /// `LPUSH` / `RPUSH`: appends values one at a time (so `LPUSH k a b c`
    /// leaves `[c, b, a]`), creating the list when absent. Returns the new
    /// length.
    pub fn list_push(
        &self,
        key: Bytes,
        values: Vec<Bytes>,
        left: bool,
    ) -> Result<usize, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, &key);

        let entry = map
            .entry(key)
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        let Value::List(list) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        for value in values {
            if left {
                list.push_front(value);
            } else {
                list.push_back(value);
            }
        }
        let len = list.len();
        self.bump_changes(1);
        Ok(len)
    }

    /// `LPOP` / `RPOP`: removes and returns one end of the list; removes
    /// the key once the list drains.
    pub fn list_pop(&self, key: &[u8], left: bool) -> Result<Option<Bytes>, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let (popped, drained) = {
            let Some(entry) = map.get_mut(key) else {
                return Ok(None);
            };
            let Value::List(list) = &mut entry.value else {
                return Err(StoreError::WrongType);
            };
            let popped = if left {
                list.pop_front()
            } else {
                list.pop_back()
            };
            (popped, list.is_empty())
        };

        if drained {
            map.remove(key);
        }
        if popped.is_some() {
            self.bump_changes(1);
        }
        Ok(popped)
    }

    /// Length of the list; absent keys report zero.
    pub fn list_len(&self, key: &[u8]) -> Result<usize, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match map.get(key) {
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list.len()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(0),
        }
    }

    /// Element at `index` (negative from the tail), or `None` out of range.
    pub fn list_index(&self, key: &[u8], index: i64) -> Result<Option<Bytes>, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match map.get(key) {
            Some(entry) => match &entry.value {
                Value::List(list) => {
                    let at = resolve_index(index, list.len());
                    if at < 0 || at >= list.len() as i64 {
                        Ok(None)
                    } else {
                        Ok(list.get(at as usize).cloned())
                    }
                }
                _ => Err(StoreError::WrongType),
            },
            None => Ok(None),
        }
    }

    /// `LRANGE`: inclusive slice, clamped; empty when start exceeds stop.
    pub fn list_range(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match map.get(key) {
            Some(entry) => match &entry.value {
                Value::List(list) => match resolve_range(start, stop, list.len()) {
                    Some((from, to)) => Ok(list
                        .iter()
                        .skip(from)
                        .take(to - from + 1)
                        .cloned()
                        .collect()),
                    None => Ok(Vec::new()),
                },
                _ => Err(StoreError::WrongType),
            },
            None => Ok(Vec::new()),
        }
    }

    /// `LSET`: overwrites the element at `index`. Missing keys and
    /// out-of-bounds indices are errors.
    pub fn list_set(&self, key: &[u8], index: i64, value: Bytes) -> Result<(), StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let Some(entry) = map.get_mut(key) else {
            return Err(StoreError::NoSuchKey);
        };
        let Value::List(list) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        let at = resolve_index(index, list.len());
        if at < 0 || at >= list.len() as i64 {
            return Err(StoreError::IndexOutOfRange);
        }
        list[at as usize] = value;
        self.bump_changes(1);
        Ok(())
    }

    /// `LREM`: removes occurrences of `needle`. Positive counts scan from
    /// the head, negative from the tail, zero removes all. Returns how many
    /// were removed; drains remove the key.
    pub fn list_remove(&self, key: &[u8], count: i64, needle: &[u8]) -> Result<usize, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let (removed, drained) = {
            let Some(entry) = map.get_mut(key) else {
                return Ok(0);
            };
            let Value::List(list) = &mut entry.value else {
                return Err(StoreError::WrongType);
            };

            let limit = if count == 0 {
                usize::MAX
            } else {
                count.unsigned_abs() as usize
            };
            let mut removed = 0usize;

            if count >= 0 {
                let mut i = 0;
                while i < list.len() && removed < limit {
                    if list[i] == needle {
                        list.remove(i);
                        removed += 1;
                    } else {
                        i += 1;
                    }
                }
            } else {
                let mut i = list.len();
                while i > 0 && removed < limit {
                    i -= 1;
                    if list[i] == needle {
                        list.remove(i);
                        removed += 1;
                    }
                }
            }
            (removed, list.is_empty())
        };

        if drained {
            map.remove(key);
        }
        if removed > 0 {
            self.bump_changes(1);
        }
        Ok(removed)
    }

    /// `LINSERT`: places `element` before or after the first occurrence of
    /// `pivot`. Returns the new length, `-1` if the pivot is absent, or `0`
    /// if the key does not exist.
    pub fn list_insert(
        &self,
        key: &[u8],
        before: bool,
        pivot: &[u8],
        element: Bytes,
    ) -> Result<i64, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let Some(entry) = map.get_mut(key) else {
            return Ok(0);
        };
        let Value::List(list) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        let Some(pos) = list.iter().position(|item| item == pivot) else {
            return Ok(-1);
        };
        let at = if before { pos } else { pos + 1 };
        list.insert(at, element);
        self.bump_changes(1);
        Ok(list.len() as i64)
    }

    /// `LTRIM`: keeps only the inclusive `[start, stop]` range; a range that
    /// selects nothing removes the key.
    pub fn list_trim(&self, key: &[u8], start: i64, stop: i64) -> Result<(), StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let keep = {
            let Some(entry) = map.get_mut(key) else {
                return Ok(());
            };
            let Value::List(list) = &mut entry.value else {
                return Err(StoreError::WrongType);
            };

            match resolve_range(start, stop, list.len()) {
                Some((from, to)) => {
                    list.drain(to + 1..);
                    list.drain(..from);
                    !list.is_empty()
                }
                None => false,
            }
        };

        if !keep {
            map.remove(key);
        }
        self.bump_changes(1);
        Ok(())
    }
}
