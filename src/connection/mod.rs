//! Connection Handling Module
//!
//! One task per client: accumulate bytes, parse frames, execute commands,
//! write replies. The accept loop in `main.rs` spawns
//! [`handle_connection`] for every accepted socket, bounded by a
//! semaphore that enforces the configured connection cap.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
