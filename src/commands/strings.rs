//! String command handlers.

use crate::commands::handler::{store_error_reply, wrong_args, CommandHandler};
use crate::protocol::RespValue;
use std::time::Duration;

impl CommandHandler {
    /// `SET key value [EX seconds | PX milliseconds]`
    pub(crate) fn cmd_set(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return wrong_args("SET");
        }
        let (Some(key), Some(value)) = (self.arg_bytes(&args[0]), self.arg_bytes(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };

        let mut ttl: Option<Duration> = None;
        let mut i = 2;
        while i < args.len() {
            let Some(option) = self.arg_string(&args[i]).map(|s| s.to_uppercase()) else {
                return RespValue::error("ERR syntax error");
            };
            match option.as_str() {
                "EX" | "PX" => {
                    i += 1;
                    let amount = match args.get(i).and_then(|a| self.arg_i64(a)) {
                        Some(n) if n > 0 => n as u64,
                        _ => return RespValue::error("ERR invalid expire time in 'set' command"),
                    };
                    ttl = Some(if option == "EX" {
                        Duration::from_secs(amount)
                    } else {
                        Duration::from_millis(amount)
                    });
                }
                _ => return RespValue::error("ERR syntax error"),
            }
            i += 1;
        }

        self.keyspace.set(key, value, ttl);
        RespValue::ok()
    }

    /// `GET key`
    pub(crate) fn cmd_get(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("GET");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.get(&key) {
            Ok(value) => RespValue::bulk_or_null(value),
            Err(e) => store_error_reply(e),
        }
    }

    /// `GETSET key value`
    pub(crate) fn cmd_getset(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_args("GETSET");
        }
        let (Some(key), Some(value)) = (self.arg_bytes(&args[0]), self.arg_bytes(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        match self.keyspace.get_set(key, value) {
            Ok(previous) => RespValue::bulk_or_null(previous),
            Err(e) => store_error_reply(e),
        }
    }

    /// `GETDEL key`
    pub(crate) fn cmd_getdel(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("GETDEL");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.get_del(&key) {
            Ok(taken) => RespValue::bulk_or_null(taken),
            Err(e) => store_error_reply(e),
        }
    }

    /// `SETNX key value` — 1 if the key was created, 0 otherwise.
    pub(crate) fn cmd_setnx(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_args("SETNX");
        }
        let (Some(key), Some(value)) = (self.arg_bytes(&args[0]), self.arg_bytes(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        RespValue::integer(i64::from(self.keyspace.set_if_absent(key, value)))
    }

    /// `SETEX key seconds value` / `PSETEX key milliseconds value`
    pub(crate) fn cmd_setex(&self, args: &[RespValue], millis: bool) -> RespValue {
        let name = if millis { "PSETEX" } else { "SETEX" };
        if args.len() != 3 {
            return wrong_args(name);
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let amount = match self.arg_i64(&args[1]) {
            Some(n) if n > 0 => n as u64,
            _ => {
                return RespValue::error(format!(
                    "ERR invalid expire time in '{}' command",
                    name.to_lowercase()
                ))
            }
        };
        let Some(value) = self.arg_bytes(&args[2]) else {
            return RespValue::error("ERR invalid value");
        };

        let ttl = if millis {
            Duration::from_millis(amount)
        } else {
            Duration::from_secs(amount)
        };
        self.keyspace.set(key, value, Some(ttl));
        RespValue::ok()
    }

    /// `INCR key` / `DECR key`
    pub(crate) fn cmd_incr_by(&self, args: &[RespValue], name: &str, delta: i64) -> RespValue {
        if args.len() != 1 {
            return wrong_args(name);
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.incr_by(&key, delta) {
            Ok(next) => RespValue::integer(next),
            Err(e) => store_error_reply(e),
        }
    }

    /// `INCRBY key amount` / `DECRBY key amount`
    pub(crate) fn cmd_incr_decr_by(
        &self,
        args: &[RespValue],
        name: &str,
        negate: bool,
    ) -> RespValue {
        if args.len() != 2 {
            return wrong_args(name);
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let Some(amount) = self.arg_i64(&args[1]) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };
        let delta = if negate {
            match amount.checked_neg() {
                Some(delta) => delta,
                None => return store_error_reply(crate::storage::StoreError::Overflow),
            }
        } else {
            amount
        };
        match self.keyspace.incr_by(&key, delta) {
            Ok(next) => RespValue::integer(next),
            Err(e) => store_error_reply(e),
        }
    }

    /// `APPEND key value` — replies with the new length.
    pub(crate) fn cmd_append(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_args("APPEND");
        }
        let (Some(key), Some(value)) = (self.arg_bytes(&args[0]), self.arg_bytes(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        match self.keyspace.append(&key, &value) {
            Ok(len) => RespValue::integer(len as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `STRLEN key`
    pub(crate) fn cmd_strlen(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("STRLEN");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.strlen(&key) {
            Ok(len) => RespValue::integer(len as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `GETRANGE key start end` (also `SUBSTR`)
    pub(crate) fn cmd_getrange(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return wrong_args("GETRANGE");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let (Some(start), Some(end)) = (self.arg_i64(&args[1]), self.arg_i64(&args[2])) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };
        match self.keyspace.get_range(&key, start, end) {
            Ok(slice) => RespValue::bulk(slice),
            Err(e) => store_error_reply(e),
        }
    }

    /// `SETRANGE key offset value` — negative offsets are rejected.
    pub(crate) fn cmd_setrange(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return wrong_args("SETRANGE");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let offset = match self.arg_i64(&args[1]) {
            Some(n) if n >= 0 => n as usize,
            Some(_) => return RespValue::error("ERR offset is out of range"),
            None => return RespValue::error("ERR value is not an integer or out of range"),
        };
        let Some(value) = self.arg_bytes(&args[2]) else {
            return RespValue::error("ERR invalid value");
        };
        match self.keyspace.set_range(&key, offset, &value) {
            Ok(len) => RespValue::integer(len as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `MSET key value [key value ...]`
    pub(crate) fn cmd_mset(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() || args.len() % 2 != 0 {
            return wrong_args("MSET");
        }
        let pairs = match self.collect_pairs(args) {
            Ok(pairs) => pairs,
            Err(reply) => return reply,
        };
        self.keyspace.mset(pairs);
        RespValue::ok()
    }

    /// `MGET key [key ...]`
    pub(crate) fn cmd_mget(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() {
            return wrong_args("MGET");
        }
        let keys = match self.all_bytes(args) {
            Ok(keys) => keys,
            Err(reply) => return reply,
        };
        let values = self
            .keyspace
            .mget(&keys)
            .into_iter()
            .map(RespValue::bulk_or_null)
            .collect();
        RespValue::array(values)
    }

    /// `MSETNX key value [key value ...]` — all keys written, or none.
    pub(crate) fn cmd_msetnx(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() || args.len() % 2 != 0 {
            return wrong_args("MSETNX");
        }
        let pairs = match self.collect_pairs(args) {
            Ok(pairs) => pairs,
            Err(reply) => return reply,
        };
        RespValue::integer(i64::from(self.keyspace.mset_nx(pairs)))
    }

    fn collect_pairs(
        &self,
        args: &[RespValue],
    ) -> Result<Vec<(bytes::Bytes, bytes::Bytes)>, RespValue> {
        args.chunks(2)
            .map(|chunk| {
                match (self.arg_bytes(&chunk[0]), self.arg_bytes(&chunk[1])) {
                    (Some(key), Some(value)) => Ok((key, value)),
                    _ => Err(RespValue::error("ERR arguments must be strings")),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::CommandHandler;
    use crate::protocol::RespValue;
    use crate::storage::Keyspace;
    use bytes::Bytes;
    use std::sync::Arc;

    fn handler() -> CommandHandler {
        CommandHandler::new(Arc::new(Keyspace::new()), None)
    }

    async fn run(h: &CommandHandler, parts: &[&str]) -> RespValue {
        h.execute(RespValue::Array(
            parts
                .iter()
                .map(|p| RespValue::BulkString(Bytes::from(p.to_string())))
                .collect(),
        ))
        .await
    }

    fn bulk(s: &str) -> RespValue {
        RespValue::bulk(Bytes::from(s.to_string()))
    }

    #[tokio::test]
    async fn set_get_incr_append_scenario() {
        let h = handler();

        assert_eq!(run(&h, &["SET", "x", "1"]).await, RespValue::ok());
        assert_eq!(run(&h, &["INCRBY", "x", "5"]).await, RespValue::integer(6));
        assert_eq!(run(&h, &["GET", "x"]).await, bulk("6"));
        assert_eq!(run(&h, &["APPEND", "x", "!"]).await, RespValue::integer(2));
        assert_eq!(run(&h, &["STRLEN", "x"]).await, RespValue::integer(2));
        assert_eq!(run(&h, &["GET", "x"]).await, bulk("6!"));
    }

    #[tokio::test]
    async fn set_with_ttl_options() {
        let h = handler();
        assert_eq!(
            run(&h, &["SET", "k", "v", "EX", "100"]).await,
            RespValue::ok()
        );
        match run(&h, &["TTL", "k"]).await {
            RespValue::Integer(n) => assert!(n > 0 && n <= 100),
            other => panic!("unexpected reply {:?}", other),
        }

        assert!(run(&h, &["SET", "k", "v", "EX", "0"]).await.is_error());
        assert!(run(&h, &["SET", "k", "v", "BOGUS"]).await.is_error());
    }

    #[tokio::test]
    async fn getset_getdel() {
        let h = handler();
        assert_eq!(run(&h, &["GETSET", "k", "a"]).await, RespValue::Null);
        assert_eq!(run(&h, &["GETSET", "k", "b"]).await, bulk("a"));
        assert_eq!(run(&h, &["GETDEL", "k"]).await, bulk("b"));
        assert_eq!(run(&h, &["GET", "k"]).await, RespValue::Null);
    }

    #[tokio::test]
    async fn setnx_setex() {
        let h = handler();
        assert_eq!(run(&h, &["SETNX", "k", "1"]).await, RespValue::integer(1));
        assert_eq!(run(&h, &["SETNX", "k", "2"]).await, RespValue::integer(0));

        assert_eq!(run(&h, &["SETEX", "e", "50", "v"]).await, RespValue::ok());
        match run(&h, &["TTL", "e"]).await {
            RespValue::Integer(n) => assert!(n > 0 && n <= 50),
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(run(&h, &["SETEX", "e", "-1", "v"]).await.is_error());
    }

    #[tokio::test]
    async fn incr_errors() {
        let h = handler();
        run(&h, &["SET", "t", "hello"]).await;
        assert!(run(&h, &["INCR", "t"]).await.is_error());
        assert!(run(&h, &["INCRBY", "n", "nope"]).await.is_error());
        assert_eq!(run(&h, &["DECRBY", "n", "3"]).await, RespValue::integer(-3));
    }

    #[tokio::test]
    async fn getrange_setrange() {
        let h = handler();
        run(&h, &["SET", "k", "Hello World"]).await;
        assert_eq!(run(&h, &["GETRANGE", "k", "0", "4"]).await, bulk("Hello"));
        assert_eq!(run(&h, &["SUBSTR", "k", "-5", "-1"]).await, bulk("World"));
        assert_eq!(
            run(&h, &["SETRANGE", "k", "6", "Redis"]).await,
            RespValue::integer(11)
        );
        assert_eq!(run(&h, &["GET", "k"]).await, bulk("Hello Redis"));
        assert!(run(&h, &["SETRANGE", "k", "-1", "x"]).await.is_error());
    }

    #[tokio::test]
    async fn multi_key_commands() {
        let h = handler();
        assert_eq!(
            run(&h, &["MSET", "a", "1", "b", "2"]).await,
            RespValue::ok()
        );
        assert_eq!(
            run(&h, &["MGET", "a", "missing", "b"]).await,
            RespValue::array(vec![bulk("1"), RespValue::Null, bulk("2")])
        );

        assert_eq!(
            run(&h, &["MSETNX", "b", "X", "c", "3"]).await,
            RespValue::integer(0)
        );
        assert_eq!(run(&h, &["GET", "b"]).await, bulk("2"));
        assert_eq!(run(&h, &["EXISTS", "c"]).await, RespValue::integer(0));

        assert!(run(&h, &["MSET", "a"]).await.is_error());
    }
}
