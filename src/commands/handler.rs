//! Command dispatch, argument helpers, and the did-you-mean registry.

use crate::protocol::RespValue;
use crate::snapshot::Snapshotter;
use crate::storage::{Keyspace, StoreError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

/// Every command the server understands, sorted alphabetically. The sort
/// order doubles as the deterministic tie-break for suggestions.
pub const COMMAND_NAMES: &[&str] = &[
    "APPEND",
    "BGSAVE",
    "DBSIZE",
    "DECR",
    "DECRBY",
    "DEL",
    "ECHO",
    "EXISTS",
    "EXPIRE",
    "FLUSHALL",
    "GET",
    "GETDEL",
    "GETRANGE",
    "GETSET",
    "HDEL",
    "HEXISTS",
    "HGET",
    "HGETALL",
    "HINCRBY",
    "HINCRBYFLOAT",
    "HKEYS",
    "HLEN",
    "HSET",
    "HVALS",
    "INCR",
    "INCRBY",
    "INFO",
    "KEYS",
    "LASTSAVE",
    "LINDEX",
    "LINSERT",
    "LLEN",
    "LPOP",
    "LPUSH",
    "LRANGE",
    "LREM",
    "LSET",
    "LTRIM",
    "MGET",
    "MSET",
    "MSETNX",
    "PERSIST",
    "PEXPIRE",
    "PING",
    "PSETEX",
    "PTTL",
    "RPOP",
    "RPUSH",
    "SADD",
    "SAVE",
    "SCARD",
    "SDIFF",
    "SET",
    "SETEX",
    "SETNX",
    "SETRANGE",
    "SINTER",
    "SISMEMBER",
    "SMEMBERS",
    "SREM",
    "STRLEN",
    "SUBSTR",
    "SUNION",
    "TTL",
    "TYPE",
    "XACK",
    "XADD",
    "XDEL",
    "XGROUP",
    "XLEN",
    "XPENDING",
    "XRANGE",
    "XREAD",
    "XREADGROUP",
];

/// Executes commands against the shared keyspace and snapshot engine.
///
/// Cheap to clone: one handler is created per connection.
#[derive(Clone)]
pub struct CommandHandler {
    pub(crate) keyspace: Arc<Keyspace>,
    /// Present when snapshots are enabled; SAVE/BGSAVE/LASTSAVE error
    /// otherwise.
    pub(crate) snapshotter: Option<Arc<Snapshotter>>,
    pub(crate) started_at: Instant,
}

impl CommandHandler {
    pub fn new(keyspace: Arc<Keyspace>, snapshotter: Option<Arc<Snapshotter>>) -> Self {
        Self {
            keyspace,
            snapshotter,
            started_at: Instant::now(),
        }
    }

    /// Executes one parsed request and returns the reply frame.
    ///
    /// Requests must be arrays of strings (the RESP request shape); anything
    /// else is answered with an error reply, never a dropped connection.
    pub async fn execute(&self, request: RespValue) -> RespValue {
        let args = match request {
            RespValue::Array(args) if !args.is_empty() => args,
            RespValue::Array(_) => return RespValue::error("ERR empty command"),
            _ => return RespValue::error("ERR invalid request format"),
        };

        let Some(name) = args[0].as_str().map(|s| s.to_uppercase()) else {
            return RespValue::error("ERR invalid command name");
        };

        self.dispatch(&name, &args[1..]).await
    }

    async fn dispatch(&self, command: &str, args: &[RespValue]) -> RespValue {
        match command {
            // Strings
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "GETSET" => self.cmd_getset(args),
            "GETDEL" => self.cmd_getdel(args),
            "SETNX" => self.cmd_setnx(args),
            "SETEX" => self.cmd_setex(args, false),
            "PSETEX" => self.cmd_setex(args, true),
            "INCR" => self.cmd_incr_by(args, "INCR", 1),
            "DECR" => self.cmd_incr_by(args, "DECR", -1),
            "INCRBY" => self.cmd_incr_decr_by(args, "INCRBY", false),
            "DECRBY" => self.cmd_incr_decr_by(args, "DECRBY", true),
            "APPEND" => self.cmd_append(args),
            "STRLEN" => self.cmd_strlen(args),
            "GETRANGE" | "SUBSTR" => self.cmd_getrange(args),
            "SETRANGE" => self.cmd_setrange(args),
            "MSET" => self.cmd_mset(args),
            "MGET" => self.cmd_mget(args),
            "MSETNX" => self.cmd_msetnx(args),

            // Generic / TTL
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "TYPE" => self.cmd_type(args),
            "KEYS" => self.cmd_keys(args),
            "TTL" => self.cmd_ttl(args, false),
            "PTTL" => self.cmd_ttl(args, true),
            "EXPIRE" => self.cmd_expire(args, false),
            "PEXPIRE" => self.cmd_expire(args, true),
            "PERSIST" => self.cmd_persist(args),

            // Lists
            "LPUSH" => self.cmd_push(args, true),
            "RPUSH" => self.cmd_push(args, false),
            "LPOP" => self.cmd_pop(args, true),
            "RPOP" => self.cmd_pop(args, false),
            "LLEN" => self.cmd_llen(args),
            "LINDEX" => self.cmd_lindex(args),
            "LRANGE" => self.cmd_lrange(args),
            "LSET" => self.cmd_lset(args),
            "LREM" => self.cmd_lrem(args),
            "LINSERT" => self.cmd_linsert(args),
            "LTRIM" => self.cmd_ltrim(args),

            // Sets
            "SADD" => self.cmd_sadd(args),
            "SREM" => self.cmd_srem(args),
            "SISMEMBER" => self.cmd_sismember(args),
            "SMEMBERS" => self.cmd_smembers(args),
            "SCARD" => self.cmd_scard(args),
            "SDIFF" => self.cmd_set_algebra(args, "SDIFF"),
            "SINTER" => self.cmd_set_algebra(args, "SINTER"),
            "SUNION" => self.cmd_set_algebra(args, "SUNION"),

            // Hashes
            "HSET" => self.cmd_hset(args),
            "HGET" => self.cmd_hget(args),
            "HGETALL" => self.cmd_hgetall(args),
            "HEXISTS" => self.cmd_hexists(args),
            "HDEL" => self.cmd_hdel(args),
            "HLEN" => self.cmd_hlen(args),
            "HKEYS" => self.cmd_hkeys(args),
            "HVALS" => self.cmd_hvals(args),
            "HINCRBY" => self.cmd_hincrby(args),
            "HINCRBYFLOAT" => self.cmd_hincrbyfloat(args),

            // Streams
            "XADD" => self.cmd_xadd(args),
            "XLEN" => self.cmd_xlen(args),
            "XRANGE" => self.cmd_xrange(args),
            "XREAD" => self.cmd_xread(args).await,
            "XDEL" => self.cmd_xdel(args),
            "XGROUP" => self.cmd_xgroup(args),
            "XREADGROUP" => self.cmd_xreadgroup(args),
            "XACK" => self.cmd_xack(args),
            "XPENDING" => self.cmd_xpending(args),

            // Server
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "DBSIZE" => self.cmd_dbsize(args),
            "FLUSHALL" => self.cmd_flushall(args),
            "INFO" => self.cmd_info(args),
            "SAVE" => self.cmd_save(args).await,
            "BGSAVE" => self.cmd_bgsave(args),
            "LASTSAVE" => self.cmd_lastsave(args),

            _ => unknown_command_reply(command),
        }
    }

    // ========================================================================
    // Argument helpers
    // ========================================================================

    pub(crate) fn arg_bytes(&self, value: &RespValue) -> Option<Bytes> {
        match value {
            RespValue::BulkString(b) => Some(b.clone()),
            RespValue::SimpleString(s) => Some(Bytes::from(s.clone())),
            _ => None,
        }
    }

    pub(crate) fn arg_string(&self, value: &RespValue) -> Option<String> {
        value.as_str().map(|s| s.to_string())
    }

    pub(crate) fn arg_i64(&self, value: &RespValue) -> Option<i64> {
        match value {
            RespValue::Integer(n) => Some(*n),
            other => other.as_str().and_then(|s| s.parse().ok()),
        }
    }

    pub(crate) fn arg_f64(&self, value: &RespValue) -> Option<f64> {
        match value {
            RespValue::Integer(n) => Some(*n as f64),
            other => other.as_str().and_then(|s| s.parse().ok()),
        }
    }

    /// Collects every argument as bytes, or reports which one was not a
    /// string.
    pub(crate) fn all_bytes(&self, args: &[RespValue]) -> Result<Vec<Bytes>, RespValue> {
        args.iter()
            .map(|arg| {
                self.arg_bytes(arg)
                    .ok_or_else(|| RespValue::error("ERR arguments must be strings"))
            })
            .collect()
    }
}

/// The standard wrong-arity reply.
pub(crate) fn wrong_args(command: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        command
    ))
}

/// Maps a keyspace failure onto its wire error reply.
pub(crate) fn store_error_reply(err: StoreError) -> RespValue {
    match err {
        StoreError::WrongType => RespValue::error(
            "WRONGTYPE Operation against a key holding the wrong kind of value",
        ),
        StoreError::NotAnInteger => {
            RespValue::error("ERR value is not an integer or out of range")
        }
        StoreError::NotAFloat => RespValue::error("ERR value is not a valid float"),
        StoreError::Overflow => RespValue::error("ERR increment or decrement would overflow"),
        StoreError::IndexOutOfRange => RespValue::error("ERR index out of range"),
        StoreError::NoSuchKey => RespValue::error("ERR no such key"),
        StoreError::NoSuchGroup(group) => {
            RespValue::error(format!("NOGROUP No such consumer group '{}'", group))
        }
        StoreError::GroupAlreadyExists(_) => {
            RespValue::error("BUSYGROUP Consumer Group name already exists")
        }
        StoreError::IdNotIncreasing => RespValue::error(
            "ERR The ID specified in XADD is equal or smaller than the target stream top item",
        ),
    }
}

/// Builds the unknown-command reply, suggesting the closest registered
/// name when one is within edit distance two.
fn unknown_command_reply(command: &str) -> RespValue {
    match suggest_command(command) {
        Some(suggestion) => RespValue::error(format!(
            "ERR unknown command '{}', did you mean '{}'?",
            command, suggestion
        )),
        None => RespValue::error(format!("ERR unknown command '{}'", command)),
    }
}

/// Finds the registered command with the smallest Levenshtein distance to
/// `input`, if that distance is at most two. Ties resolve to the first
/// name in alphabetical order because the registry is sorted and only a
/// strictly smaller distance replaces the current best.
pub fn suggest_command(input: &str) -> Option<&'static str> {
    let mut best: Option<(&'static str, usize)> = None;
    for candidate in COMMAND_NAMES {
        let distance = levenshtein(input.as_bytes(), candidate.as_bytes());
        if distance <= 2 && best.map(|(_, d)| distance < d).unwrap_or(true) {
            best = Some((candidate, distance));
        }
    }
    best.map(|(name, _)| name)
}

/// Classic dynamic-programming edit distance, one row at a time.
fn levenshtein(a: &[u8], b: &[u8]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> CommandHandler {
        CommandHandler::new(Arc::new(Keyspace::new()), None)
    }

    fn request(parts: &[&str]) -> RespValue {
        RespValue::Array(
            parts
                .iter()
                .map(|p| RespValue::BulkString(Bytes::from(p.to_string())))
                .collect(),
        )
    }

    #[test]
    fn registry_is_sorted() {
        let mut sorted = COMMAND_NAMES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, COMMAND_NAMES);
    }

    #[test]
    fn levenshtein_distance() {
        assert_eq!(levenshtein(b"", b"GET"), 3);
        assert_eq!(levenshtein(b"GET", b"GET"), 0);
        assert_eq!(levenshtein(b"GTE", b"GET"), 2);
        assert_eq!(levenshtein(b"kitten", b"sitting"), 3);
    }

    #[test]
    fn suggestions() {
        assert_eq!(suggest_command("GTE"), Some("GET"));
        assert_eq!(suggest_command("SETT"), Some("SET"));
        assert_eq!(suggest_command("XAD"), Some("XADD"));
        // Too far from anything.
        assert_eq!(suggest_command("COMPLETELYWRONG"), None);
    }

    #[tokio::test]
    async fn unknown_command_includes_suggestion() {
        let reply = handler().execute(request(&["GTE", "key"])).await;
        match reply {
            RespValue::Error(msg) => {
                assert!(msg.contains("unknown command 'GTE'"));
                assert!(msg.contains("did you mean 'GET'"));
            }
            other => panic!("expected error reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_requests_get_error_replies() {
        let h = handler();
        assert!(h.execute(RespValue::Integer(5)).await.is_error());
        assert!(h.execute(RespValue::Array(vec![])).await.is_error());
        assert!(h
            .execute(RespValue::Array(vec![RespValue::Integer(1)]))
            .await
            .is_error());
    }

    #[tokio::test]
    async fn command_names_are_case_insensitive() {
        let h = handler();
        let reply = h.execute(request(&["set", "k", "v"])).await;
        assert_eq!(reply, RespValue::ok());
        let reply = h.execute(request(&["GeT", "k"])).await;
        assert_eq!(reply, RespValue::bulk(Bytes::from("v")));
    }
}
