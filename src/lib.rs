//! # FlareKV — An In-Memory Key-Value Datastore
//!
//! FlareKV is a Redis-compatible, single-node, in-memory datastore written
//! in Rust. It speaks the RESP protocol over TCP and keeps a typed
//! keyspace of strings, lists, sets, hashes, and streams.
//!
//! ## Features
//!
//! - **Typed keyspace**: one logical map, five value encodings behind a
//!   tagged sum type, strict type checks on every operation
//! - **TTL**: per-key expiry with lazy eviction on access plus a
//!   background sweeper
//! - **Streams**: append-only logs with monotonic IDs, range and blocking
//!   tail reads, and consumer groups with pending-entry tracking
//! - **Snapshots**: periodic and on-demand point-in-time saves, written
//!   atomically and restored at startup
//! - **Async I/O**: built on Tokio; one task per client connection
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          FlareKV                              │
//! │                                                               │
//! │  ┌──────────┐   ┌─────────────┐   ┌────────────────┐          │
//! │  │ TCP      │──>│ Connection  │──>│ CommandHandler │          │
//! │  │ listener │   │ handler     │   └───────┬────────┘          │
//! │  └──────────┘   └─────────────┘           │                   │
//! │                                           ▼                   │
//! │  ┌─────────────┐   ┌───────────────────────────────────────┐  │
//! │  │ RESP parser │   │              Keyspace                 │  │
//! │  └─────────────┘   │  strings · lists · sets · hashes ·    │  │
//! │                    │  streams (consumer groups)            │  │
//! │                    └───────▲──────────────────▲────────────┘  │
//! │                            │                  │               │
//! │                 ┌──────────┴─────┐   ┌────────┴──────────┐    │
//! │                 │ ExpirySweeper  │   │ Snapshotter       │    │
//! │                 │ (background)   │   │ (ticker + SAVE)   │    │
//! │                 └────────────────┘   └───────────────────┘    │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP framing — reply values and the incremental parser
//! - [`storage`]: the typed keyspace, stream engine, and expiry sweeper
//! - [`snapshot`]: snapshot persistence — file format, scheduling,
//!   single-flight saves
//! - [`commands`]: command dispatch and per-family handlers
//! - [`connection`]: per-client read/execute/reply loops
//! - [`config`]: environment-variable configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod snapshot;
pub mod storage;

pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::RespValue;
pub use snapshot::Snapshotter;
pub use storage::{ExpirySweeper, Keyspace};

/// Crate version, reported by `INFO server`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
