//! Set Operations
//!
//! Unordered collections of distinct byte strings, plus the three algebraic
//! operations. The algebra runs under a single read-lock acquisition so the
//! result reflects one consistent keyspace state. Missing operand keys are
//! treated as empty sets (except `SINTER`, where any missing operand makes
//! the whole intersection empty); an operand that exists with a different
//! tag fails the operation with `WrongType`.

use crate::storage::value::{Entry, Value};
use crate::storage::{Keyspace, StoreError};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};

/// Resolves a live set operand under an already-held lock. `Ok(None)` means
/// the key is absent (or expired and not yet evicted — callers ran lazy
/// expiry beforehand).
fn operand<'a>(
    map: &'a HashMap<Bytes, Entry>,
    key: &[u8],
) -> Result<Option<&'a HashSet<Bytes>>, StoreError> {
    match map.get(key) {
        Some(entry) if entry.is_expired() => Ok(None),
        Some(entry) => match &entry.value {
            Value::Set(set) => Ok(Some(set)),
            _ => Err(StoreError::WrongType),
        },
        None => Ok(None),
    }
}

impl Keyspace {
    /// `SADD`: inserts members, creating the set when absent. Returns the
    /// number of members that were actually new.
    pub fn set_add(&self, key: Bytes, members: Vec<Bytes>) -> Result<usize, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, &key);

        let entry = map
            .entry(key)
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        let Value::Set(set) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        let mut added = 0usize;
        for member in members {
            if set.insert(member) {
                added += 1;
            }
        }
        if added > 0 {
            self.bump_changes(1);
        }
        Ok(added)
    }

    /// `SREM`: removes members; removes the key when the set drains.
    pub fn set_remove(&self, key: &[u8], members: &[Bytes]) -> Result<usize, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);

        let (removed, drained) = {
            let Some(entry) = map.get_mut(key) else {
                return Ok(0);
            };
            let Value::Set(set) = &mut entry.value else {
                return Err(StoreError::WrongType);
            };
            let mut removed = 0usize;
            for member in members {
                if set.remove(member) {
                    removed += 1;
                }
            }
            (removed, set.is_empty())
        };

        if drained {
            map.remove(key);
        }
        if removed > 0 {
            self.bump_changes(1);
        }
        Ok(removed)
    }

    /// `SISMEMBER`.
    pub fn set_is_member(&self, key: &[u8], member: &[u8]) -> Result<bool, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match operand(&map, key)? {
            Some(set) => Ok(set.contains(member)),
            None => Ok(false),
        }
    }

    /// `SMEMBERS`: every member, in no particular order.
    pub fn set_members(&self, key: &[u8]) -> Result<Vec<Bytes>, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match operand(&map, key)? {
            Some(set) => Ok(set.iter().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    /// `SCARD`: member count; absent keys report zero.
    pub fn set_card(&self, key: &[u8]) -> Result<usize, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match operand(&map, key)? {
            Some(set) => Ok(set.len()),
            None => Ok(0),
        }
    }

    /// `SDIFF`: the first set minus all the rest.
    pub fn set_diff(&self, keys: &[Bytes]) -> Result<Vec<Bytes>, StoreError> {
        for key in keys {
            self.drop_if_expired(key);
        }
        let map = self.map_read();

        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let Some(base) = operand(&map, first)? else {
            return Ok(Vec::new());
        };

        let mut result: HashSet<Bytes> = base.clone();
        for key in rest {
            if let Some(other) = operand(&map, key)? {
                for member in other {
                    result.remove(member);
                }
            }
        }
        Ok(result.into_iter().collect())
    }

    /// `SINTER`: members common to every operand; a missing operand makes
    /// the result empty.
    pub fn set_inter(&self, keys: &[Bytes]) -> Result<Vec<Bytes>, StoreError> {
        for key in keys {
            self.drop_if_expired(key);
        }
        let map = self.map_read();

        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let Some(base) = operand(&map, first)? else {
            return Ok(Vec::new());
        };

        let mut result: HashSet<Bytes> = base.clone();
        for key in rest {
            match operand(&map, key)? {
                Some(other) => result.retain(|member| other.contains(member)),
                None => return Ok(Vec::new()),
            }
        }
        Ok(result.into_iter().collect())
    }

    /// `SUNION`: members present in any operand.
    pub fn set_union(&self, keys: &[Bytes]) -> Result<Vec<Bytes>, StoreError> {
        for key in keys {
            self.drop_if_expired(key);
        }
        let map = self.map_read();

        let mut result: HashSet<Bytes> = HashSet::new();
        for key in keys {
            if let Some(set) = operand(&map, key)? {
                result.extend(set.iter().cloned());
            }
        }
        Ok(result.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn sorted(mut v: Vec<Bytes>) -> Vec<Bytes> {
        v.sort();
        v
    }

    #[test]
    fn add_counts_new_members() {
        let ks = Keyspace::new();
        assert_eq!(ks.set_add(b("A"), vec![b("1"), b("2")]).unwrap(), 2);
        assert_eq!(ks.set_add(b("A"), vec![b("2"), b("3")]).unwrap(), 1);
        assert_eq!(ks.set_card(b"A").unwrap(), 3);
    }

    #[test]
    fn membership_and_removal() {
        let ks = Keyspace::new();
        ks.set_add(b("A"), vec![b("x"), b("y")]).unwrap();

        assert!(ks.set_is_member(b"A", b"x").unwrap());
        assert!(!ks.set_is_member(b"A", b"z").unwrap());

        assert_eq!(ks.set_remove(b"A", &[b("x"), b("z")]).unwrap(), 1);
        assert_eq!(ks.set_card(b"A").unwrap(), 1);

        // Removing the last member removes the key.
        assert_eq!(ks.set_remove(b"A", &[b("y")]).unwrap(), 1);
        assert!(!ks.contains(b"A"));
    }

    #[test]
    fn algebra() {
        let ks = Keyspace::new();
        ks.set_add(b("A"), vec![b("1"), b("2"), b("3")]).unwrap();
        ks.set_add(b("B"), vec![b("2"), b("3"), b("4")]).unwrap();

        assert_eq!(
            sorted(ks.set_inter(&[b("A"), b("B")]).unwrap()),
            vec![b("2"), b("3")]
        );
        assert_eq!(sorted(ks.set_diff(&[b("A"), b("B")]).unwrap()), vec![b("1")]);
        assert_eq!(
            sorted(ks.set_union(&[b("A"), b("B")]).unwrap()),
            vec![b("1"), b("2"), b("3"), b("4")]
        );
    }

    #[test]
    fn algebra_with_missing_operands() {
        let ks = Keyspace::new();
        ks.set_add(b("A"), vec![b("1"), b("2")]).unwrap();

        // Missing first operand: empty difference.
        assert!(ks.set_diff(&[b("none"), b("A")]).unwrap().is_empty());
        // Missing later operand subtracts nothing.
        assert_eq!(ks.set_diff(&[b("A"), b("none")]).unwrap().len(), 2);
        // Any missing operand empties the intersection.
        assert!(ks.set_inter(&[b("A"), b("none")]).unwrap().is_empty());
        // Union ignores missing operands.
        assert_eq!(ks.set_union(&[b("A"), b("none")]).unwrap().len(), 2);
    }

    #[test]
    fn algebra_rejects_wrong_type() {
        let ks = Keyspace::new();
        ks.set_add(b("A"), vec![b("1")]).unwrap();
        ks.set(b("s"), b("v"), None);

        assert_eq!(ks.set_diff(&[b("A"), b("s")]), Err(StoreError::WrongType));
        assert_eq!(ks.set_inter(&[b("A"), b("s")]), Err(StoreError::WrongType));
        assert_eq!(ks.set_union(&[b("A"), b("s")]), Err(StoreError::WrongType));
        assert_eq!(
            ks.set_add(b("s"), vec![b("x")]),
            Err(StoreError::WrongType)
        );
    }
}
