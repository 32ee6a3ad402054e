//! Generic key and TTL command handlers.

use crate::commands::handler::{wrong_args, CommandHandler};
use crate::protocol::RespValue;
use std::time::Duration;

impl CommandHandler {
    /// `DEL key [key ...]`
    pub(crate) fn cmd_del(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() {
            return wrong_args("DEL");
        }
        let keys = match self.all_bytes(args) {
            Ok(keys) => keys,
            Err(reply) => return reply,
        };
        RespValue::integer(self.keyspace.delete(&keys) as i64)
    }

    /// `EXISTS key [key ...]` — counts the keys that exist.
    pub(crate) fn cmd_exists(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() {
            return wrong_args("EXISTS");
        }
        let keys = match self.all_bytes(args) {
            Ok(keys) => keys,
            Err(reply) => return reply,
        };
        RespValue::integer(self.keyspace.exists_count(&keys) as i64)
    }

    /// `TYPE key`
    pub(crate) fn cmd_type(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("TYPE");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.key_type(&key) {
            Some(tag) => RespValue::simple(tag.as_str()),
            None => RespValue::simple("none"),
        }
    }

    /// `KEYS pattern`
    pub(crate) fn cmd_keys(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("KEYS");
        }
        let Some(pattern) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid pattern");
        };
        let mut keys = self.keyspace.keys(&pattern);
        keys.sort();
        RespValue::array(keys.into_iter().map(RespValue::bulk).collect())
    }

    /// `TTL key` / `PTTL key` — remaining lifetime, -1 without expiry,
    /// -2 for a missing key.
    pub(crate) fn cmd_ttl(&self, args: &[RespValue], millis: bool) -> RespValue {
        if args.len() != 1 {
            return wrong_args(if millis { "PTTL" } else { "TTL" });
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        RespValue::integer(self.keyspace.ttl(&key, millis))
    }

    /// `EXPIRE key seconds` / `PEXPIRE key milliseconds` — 1 if the timer
    /// was set, 0 if the key does not exist. Non-positive lifetimes are
    /// rejected.
    pub(crate) fn cmd_expire(&self, args: &[RespValue], millis: bool) -> RespValue {
        let name = if millis { "PEXPIRE" } else { "EXPIRE" };
        if args.len() != 2 {
            return wrong_args(name);
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let amount = match self.arg_i64(&args[1]) {
            Some(n) if n > 0 => n as u64,
            Some(_) => {
                return RespValue::error(format!(
                    "ERR invalid expire time in '{}' command",
                    name.to_lowercase()
                ))
            }
            None => return RespValue::error("ERR value is not an integer or out of range"),
        };

        let ttl = if millis {
            Duration::from_millis(amount)
        } else {
            Duration::from_secs(amount)
        };
        RespValue::integer(i64::from(self.keyspace.expire(&key, ttl)))
    }

    /// `PERSIST key` — 1 if an expiry was removed.
    pub(crate) fn cmd_persist(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("PERSIST");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        RespValue::integer(i64::from(self.keyspace.persist(&key)))
    }
}
