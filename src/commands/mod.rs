//! Command Handler Module
//!
//! Turns parsed RESP arrays into keyspace calls and formats the results as
//! reply frames. The handler itself holds no data: it borrows the shared
//! [`Keyspace`](crate::storage::Keyspace) and, when snapshots are enabled,
//! the [`Snapshotter`](crate::snapshot::Snapshotter).
//!
//! ```text
//! Client bytes ──> RESP parser ──> CommandHandler::execute
//!                                        │
//!                            ┌───────────┼──────────────┐
//!                            ▼           ▼              ▼
//!                        Keyspace   Stream engine   Snapshotter
//! ```
//!
//! Dispatch lives in `handler.rs`; the per-family handlers are spread over
//! sibling files (`strings.rs`, `keys.rs`, `lists.rs`, `sets.rs`,
//! `hashes.rs`, `streams.rs`, `server.rs`) as further impl blocks on
//! [`CommandHandler`].

pub mod handler;
pub mod hashes;
pub mod keys;
pub mod lists;
pub mod server;
pub mod sets;
pub mod streams;
pub mod strings;

pub use handler::CommandHandler;
