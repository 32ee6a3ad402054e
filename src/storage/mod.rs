//! Storage Engine Module
//!
//! The heart of FlareKV: a process-wide typed keyspace with TTL support,
//! a stream engine, snapshot capture/restore, and a background expiry
//! sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Keyspace                             │
//! │              RwLock<HashMap<Bytes, Entry>>                   │
//! │                                                              │
//! │   Entry = { Value, expires_at }                              │
//! │   Value = String | List | Set | Hash | Stream(Arc)           │
//! └──────────────────────────────────────────────────────────────┘
//!        ▲                  ▲                     ▲
//!        │                  │                     │
//!  ┌───────────┐    ┌───────────────┐    ┌────────────────┐
//!  │ Commands  │    │ ExpirySweeper │    │ Snapshot hooks │
//!  │ (clients) │    │ (background)  │    │ (capture/load) │
//!  └───────────┘    └───────────────┘    └────────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! A single readers-writer lock guards the map. Reads take the read lock;
//! anything that creates, removes, or mutates a value in place takes the
//! write lock for the duration of the check-and-act, so a type check and
//! the action it gates can never be split by another writer.
//!
//! Streams are the exception: the keyspace hands out `Arc<Stream>` clones
//! and stream work proceeds under the stream's own lock, so a long range
//! scan or a blocked read never starves unrelated keys. Lock order is
//! always keyspace, then stream.
//!
//! ## Expiry
//!
//! Keys expire two ways:
//! 1. **Lazy**: every access path checks the expiry instant and removes the
//!    entry before acting, so an expired key is indistinguishable from an
//!    absent one.
//! 2. **Active**: the [`ExpirySweeper`] wakes on a fixed interval and evicts
//!    expired keys that nobody touched.

pub mod expiry;
pub mod hashes;
pub mod keyspace;
pub mod lists;
pub mod sets;
pub mod snapshot;
pub mod stream;
pub mod strings;
pub mod value;

pub use expiry::{start_expiry_sweeper, ExpirySweeper};
pub use keyspace::Keyspace;
pub use snapshot::{KeyRecord, KeyspaceSnapshot, PayloadRecord, SNAPSHOT_VERSION};
pub use stream::{IdSpec, Stream, StreamEntry, StreamId};
pub use value::{DataType, Entry, Value};

use thiserror::Error;

/// Errors produced by keyspace and stream operations.
///
/// These are the domain-level failures a command handler translates into
/// protocol error replies; they never carry IO state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key exists but holds a different data type than the operation expects.
    #[error("operation against a key holding the wrong kind of value")]
    WrongType,

    /// A value or increment could not be parsed as a signed 64-bit integer.
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// A value or increment could not be parsed as a finite float.
    #[error("value is not a valid float")]
    NotAFloat,

    /// An integer increment would overflow the 64-bit signed range.
    #[error("increment or decrement would overflow")]
    Overflow,

    /// An index argument points outside the target collection.
    #[error("index out of range")]
    IndexOutOfRange,

    /// The target key does not exist where the operation requires one.
    #[error("no such key")]
    NoSuchKey,

    /// The named consumer group does not exist on the stream.
    #[error("no such consumer group '{0}'")]
    NoSuchGroup(String),

    /// A consumer group with that name already exists on the stream.
    #[error("consumer group '{0}' already exists")]
    GroupAlreadyExists(String),

    /// A user-supplied stream ID is not strictly greater than the last one.
    #[error("the ID specified in XADD is equal or smaller than the target stream top item")]
    IdNotIncreasing,
}
