//! The Typed Keyspace
//!
//! A single logical map from key to [`Entry`], shared by every client
//! worker, the expiry sweeper, and the snapshot engine. This file holds the
//! core plumbing (lock discipline, lazy expiry, change accounting) plus the
//! generic operations: delete, exists, type, key count, pattern scan, TTL
//! management, flush, and the stream passthrough. The per-type operation
//! families live in sibling files (`strings.rs`, `lists.rs`, `sets.rs`,
//! `hashes.rs`) as further `impl Keyspace` blocks.
//!
//! ## Lazy expiry discipline
//!
//! Read paths use a two-phase check: peek under the read lock, and only if
//! the entry turned out to be expired, retake the write lock, re-verify, and
//! remove. Write paths already hold the write lock and evict inline before
//! acting. Either way, an expired key behaves exactly like an absent one,
//! and its removal counts as a change for snapshot accounting.

use crate::storage::stream::Stream;
use crate::storage::value::{DataType, Entry, Value};
use crate::storage::StoreError;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;

/// The process-wide typed keyspace.
///
/// Designed to be wrapped in an `Arc` and shared across all connection
/// tasks and background workers. All operations are thread-safe; mutating
/// operations are atomic with respect to each other.
pub struct Keyspace {
    /// The single map of live entries.
    pub(in crate::storage) entries: RwLock<HashMap<Bytes, Entry>>,

    /// Mutations since the last successful snapshot.
    changes_since_save: AtomicU64,

    /// Signalled on every successful stream append; blocked `XREAD` callers
    /// wait on this and re-poll.
    stream_activity: Notify,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("keys", &self.entries.read().unwrap().len())
            .field(
                "changes_since_save",
                &self.changes_since_save.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    /// Creates an empty keyspace.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            changes_since_save: AtomicU64::new(0),
            stream_activity: Notify::new(),
        }
    }

    // ========================================================================
    // Lock plumbing and expiry helpers
    // ========================================================================

    #[inline]
    pub(in crate::storage) fn map_read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.entries.read().unwrap()
    }

    #[inline]
    pub(in crate::storage) fn map_write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.entries.write().unwrap()
    }

    /// Removes `key` under an already-held write lock if it has expired.
    /// Returns `true` if an eviction happened.
    pub(in crate::storage) fn evict_if_expired(
        &self,
        map: &mut HashMap<Bytes, Entry>,
        key: &[u8],
    ) -> bool {
        if matches!(map.get(key), Some(entry) if entry.is_expired()) {
            map.remove(key);
            self.bump_changes(1);
            true
        } else {
            false
        }
    }

    /// Two-phase lazy expiry for read paths: only takes the write lock when
    /// a peek under the read lock saw an expired entry.
    pub(in crate::storage) fn drop_if_expired(&self, key: &[u8]) {
        let expired = {
            let map = self.map_read();
            matches!(map.get(key), Some(entry) if entry.is_expired())
        };
        if expired {
            let mut map = self.map_write();
            self.evict_if_expired(&mut map, key);
        }
    }

    // ========================================================================
    // Change accounting (snapshot bookkeeping)
    // ========================================================================

    /// Records `n` mutations since the last snapshot.
    #[inline]
    pub fn bump_changes(&self, n: u64) {
        self.changes_since_save.fetch_add(n, Ordering::Relaxed);
    }

    /// Number of mutations since the last successful snapshot.
    pub fn changes_since_save(&self) -> u64 {
        self.changes_since_save.load(Ordering::Relaxed)
    }

    /// Resets the change counter; called after a snapshot completes or a
    /// restore replaces the keyspace.
    pub fn reset_changes(&self) {
        self.changes_since_save.store(0, Ordering::Relaxed);
    }

    // ========================================================================
    // Stream append signalling
    // ========================================================================

    /// The notifier blocked stream readers wait on.
    pub fn stream_activity(&self) -> &Notify {
        &self.stream_activity
    }

    /// Wakes every blocked stream reader; called after a successful append.
    pub fn notify_stream_activity(&self) {
        self.stream_activity.notify_waiters();
    }

    // ========================================================================
    // Generic operations
    // ========================================================================

    /// Deletes keys, returning how many actually existed.
    pub fn delete(&self, keys: &[Bytes]) -> u64 {
        let mut map = self.map_write();
        let mut removed = 0u64;
        for key in keys {
            self.evict_if_expired(&mut map, key);
            if map.remove(&key[..]).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.bump_changes(removed);
        }
        removed
    }

    /// Counts how many of the given keys exist (live, non-expired).
    pub fn exists_count(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|key| self.contains(key)).count() as u64
    }

    /// True if the key exists and has not expired.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.drop_if_expired(key);
        self.map_read().contains_key(key)
    }

    /// The data-type tag of a key, or `None` if the key is absent.
    pub fn key_type(&self, key: &[u8]) -> Option<DataType> {
        self.drop_if_expired(key);
        self.map_read().get(key).map(|entry| entry.value.data_type())
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        self.map_read()
            .values()
            .filter(|entry| !entry.is_expired())
            .count()
    }

    /// True if no live keys exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key. The wipe counts one change per removed key.
    pub fn flush_all(&self) {
        let mut map = self.map_write();
        let count = map.len() as u64;
        map.clear();
        if count > 0 {
            self.bump_changes(count);
        }
    }

    /// Returns all live keys matching a glob pattern (`*`, `?`, `[a-c]`,
    /// `[^x]`, `\` escape). Scans the whole keyspace under the read lock.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let map = self.map_read();
        map.iter()
            .filter(|(_, entry)| !entry.is_expired())
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    // ========================================================================
    // TTL operations
    // ========================================================================

    /// Remaining lifetime of a key: `-2` if absent, `-1` if no expiry set,
    /// otherwise the remainder in seconds (or milliseconds).
    pub fn ttl(&self, key: &[u8], in_millis: bool) -> i64 {
        self.drop_if_expired(key);
        let map = self.map_read();
        let Some(entry) = map.get(key) else {
            return -2;
        };
        match entry.time_to_live() {
            None => -1,
            Some(remaining) => {
                if in_millis {
                    remaining.as_millis() as i64
                } else {
                    remaining.as_secs() as i64
                }
            }
        }
    }

    /// Sets an expiry on an existing key. Returns `false` if the key is
    /// absent. Never changes the payload.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> bool {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);
        match map.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(SystemTime::now() + ttl);
                true
            }
            None => false,
        }
    }

    /// Clears the expiry of a key. Returns `true` only if the key exists
    /// and actually had an expiry.
    pub fn persist(&self, key: &[u8]) -> bool {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);
        match map.get_mut(key) {
            Some(entry) => entry.expires_at.take().is_some(),
            None => false,
        }
    }

    // ========================================================================
    // Active expiry (used by the sweeper)
    // ========================================================================

    /// Evicts expired keys in bounded batches so the write lock is never
    /// held for an unbounded scan. Returns the number of evicted keys.
    pub fn sweep_expired(&self, batch_size: usize) -> usize {
        // Collect candidates under the read lock; re-verify under the write
        // lock per batch, since a writer may have refreshed an entry since.
        let candidates: Vec<Bytes> = {
            let map = self.map_read();
            map.iter()
                .filter(|(_, entry)| entry.is_expired())
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut removed = 0usize;
        for chunk in candidates.chunks(batch_size.max(1)) {
            let mut map = self.map_write();
            for key in chunk {
                if matches!(map.get(&key[..]), Some(entry) if entry.is_expired()) {
                    map.remove(&key[..]);
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            self.bump_changes(removed as u64);
        }
        removed
    }

    // ========================================================================
    // Stream passthrough
    // ========================================================================

    /// Looks up a stream key. Returns `Ok(None)` when the key is absent and
    /// `WrongType` when it holds a different encoding. The returned `Arc`
    /// lets the caller release the keyspace lock before touching the stream.
    pub fn open_stream(&self, key: &[u8]) -> Result<Option<Arc<Stream>>, StoreError> {
        self.drop_if_expired(key);
        let map = self.map_read();
        match map.get(key) {
            Some(entry) => match &entry.value {
                Value::Stream(stream) => Ok(Some(Arc::clone(stream))),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(None),
        }
    }

    /// Looks up a stream key, creating an empty stream when absent (the
    /// `XADD` path). Creation counts as a change.
    pub fn open_or_create_stream(&self, key: &Bytes) -> Result<Arc<Stream>, StoreError> {
        let mut map = self.map_write();
        self.evict_if_expired(&mut map, key);
        match map.get(&key[..]) {
            Some(entry) => match &entry.value {
                Value::Stream(stream) => Ok(Arc::clone(stream)),
                _ => Err(StoreError::WrongType),
            },
            None => {
                let stream = Arc::new(Stream::new());
                map.insert(
                    key.clone(),
                    Entry::new(Value::Stream(Arc::clone(&stream))),
                );
                self.bump_changes(1);
                Ok(stream)
            }
        }
    }
}

/// Byte-wise glob matcher for the `KEYS` command.
///
/// Supports `*` (any run), `?` (any single byte), `[abc]` / `[a-c]` /
/// `[^x]` character classes, and `\` escapes. Operates on raw bytes so
/// binary keys match correctly.
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(b'*') => {
            // Zero or more bytes.
            (0..=text.len()).any(|i| glob_match(&pattern[1..], &text[i..]))
        }
        Some(b'?') => !text.is_empty() && glob_match(&pattern[1..], &text[1..]),
        Some(b'[') => {
            let Some(&probe) = text.first() else {
                return false;
            };
            let mut i = 1;
            let negate = pattern.get(1) == Some(&b'^');
            if negate {
                i += 1;
            }
            let mut matched = false;
            while i < pattern.len() && pattern[i] != b']' {
                if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
                    if probe >= pattern[i] && probe <= pattern[i + 2] {
                        matched = true;
                    }
                    i += 3;
                } else {
                    if pattern[i] == probe {
                        matched = true;
                    }
                    i += 1;
                }
            }
            if i >= pattern.len() {
                // Unterminated class never matches.
                return false;
            }
            if negate {
                matched = !matched;
            }
            matched && glob_match(&pattern[i + 1..], &text[1..])
        }
        Some(b'\\') if pattern.len() > 1 => {
            !text.is_empty() && pattern[1] == text[0] && glob_match(&pattern[2..], &text[1..])
        }
        Some(&c) => !text.is_empty() && c == text[0] && glob_match(&pattern[1..], &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn delete_and_exists() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("1"), None);
        ks.set(b("b"), b("2"), None);

        assert_eq!(ks.exists_count(&[b("a"), b("b"), b("c")]), 2);
        assert_eq!(ks.delete(&[b("a"), b("c")]), 1);
        assert!(!ks.contains(b"a"));
        assert!(ks.contains(b"b"));
    }

    #[test]
    fn key_type_reflects_encoding() {
        let ks = Keyspace::new();
        ks.set(b("s"), b("v"), None);
        ks.list_push(b("l"), vec![b("x")], true).unwrap();
        ks.set_add(b("st"), vec![b("m")]).unwrap();
        ks.hash_set(b("h"), vec![(b("f"), b("v"))]).unwrap();

        assert_eq!(ks.key_type(b"s"), Some(DataType::String));
        assert_eq!(ks.key_type(b"l"), Some(DataType::List));
        assert_eq!(ks.key_type(b"st"), Some(DataType::Set));
        assert_eq!(ks.key_type(b"h"), Some(DataType::Hash));
        assert_eq!(ks.key_type(b"missing"), None);
    }

    #[test]
    fn lazy_expiry_hides_key() {
        let ks = Keyspace::new();
        ks.set(b("k"), b("v"), Some(Duration::from_millis(30)));
        assert!(ks.contains(b"k"));

        std::thread::sleep(Duration::from_millis(60));

        let before = ks.changes_since_save();
        assert!(!ks.contains(b"k"));
        assert_eq!(ks.ttl(b"k", false), -2);
        // Lazy removal counted as a change.
        assert!(ks.changes_since_save() > before);
    }

    #[test]
    fn ttl_reporting() {
        let ks = Keyspace::new();
        assert_eq!(ks.ttl(b"missing", false), -2);

        ks.set(b("forever"), b("v"), None);
        assert_eq!(ks.ttl(b"forever", false), -1);

        ks.set(b("leased"), b("v"), Some(Duration::from_secs(100)));
        let secs = ks.ttl(b"leased", false);
        assert!(secs > 90 && secs <= 100);
        let millis = ks.ttl(b"leased", true);
        assert!(millis > 90_000 && millis <= 100_000);
    }

    #[test]
    fn expire_and_persist() {
        let ks = Keyspace::new();
        assert!(!ks.expire(b"missing", Duration::from_secs(5)));

        ks.set(b("k"), b("v"), None);
        assert!(ks.expire(b"k", Duration::from_secs(100)));
        assert!(ks.ttl(b"k", false) > 0);

        assert!(ks.persist(b"k"));
        assert_eq!(ks.ttl(b"k", false), -1);
        // No expiry left to clear.
        assert!(!ks.persist(b"k"));
    }

    #[test]
    fn flush_all_clears_and_counts() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("1"), None);
        ks.set(b("b"), b("2"), None);
        ks.reset_changes();

        ks.flush_all();
        assert_eq!(ks.len(), 0);
        assert_eq!(ks.changes_since_save(), 2);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let ks = Keyspace::new();
        ks.set(b("gone1"), b("v"), Some(Duration::from_millis(10)));
        ks.set(b("gone2"), b("v"), Some(Duration::from_millis(10)));
        ks.set(b("stays"), b("v"), None);

        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(ks.sweep_expired(1), 2);
        assert_eq!(ks.len(), 1);
        assert!(ks.contains(b"stays"));
    }

    #[test]
    fn keys_pattern_scan() {
        let ks = Keyspace::new();
        ks.set(b("hello"), b("1"), None);
        ks.set(b("hallo"), b("2"), None);
        ks.set(b("hillo"), b("3"), None);
        ks.set(b("world"), b("4"), None);

        assert_eq!(ks.keys(b"*").len(), 4);
        assert_eq!(ks.keys(b"h?llo").len(), 3);
        assert_eq!(ks.keys(b"h[ae]llo").len(), 2);
        assert_eq!(ks.keys(b"w*").len(), 1);
    }

    #[test]
    fn glob_matcher() {
        assert!(glob_match(b"*", b""));
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"h*llo", b"hello"));
        assert!(glob_match(b"h*llo", b"hllo"));
        assert!(!glob_match(b"h*llo", b"world"));
        assert!(glob_match(b"h?llo", b"hallo"));
        assert!(!glob_match(b"h?llo", b"hllo"));
        assert!(glob_match(b"h[a-e]llo", b"hbllo"));
        assert!(!glob_match(b"h[a-e]llo", b"hzllo"));
        assert!(glob_match(b"h[^x]llo", b"hallo"));
        assert!(!glob_match(b"h[^a]llo", b"hallo"));
        assert!(glob_match(b"a\\*b", b"a*b"));
        assert!(!glob_match(b"a\\*b", b"axb"));
        assert!(!glob_match(b"h[ae", b"ha"));
    }

    #[test]
    fn open_stream_type_check() {
        let ks = Keyspace::new();
        ks.set(b("plain"), b("v"), None);

        assert!(matches!(
            ks.open_stream(b"plain"),
            Err(StoreError::WrongType)
        ));
        assert!(matches!(ks.open_stream(b"missing"), Ok(None)));

        let created = ks.open_or_create_stream(&b("events")).unwrap();
        let reopened = ks.open_stream(b"events").unwrap().unwrap();
        assert!(Arc::ptr_eq(&created, &reopened));
        assert_eq!(ks.key_type(b"events"), Some(DataType::Stream));
    }
}
