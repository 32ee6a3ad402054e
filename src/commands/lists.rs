//! List command handlers.

use crate::commands::handler::{store_error_reply, wrong_args, CommandHandler};
use crate::protocol::RespValue;

impl CommandHandler {
    /// `LPUSH key value [value ...]` / `RPUSH key value [value ...]`
    pub(crate) fn cmd_push(&self, args: &[RespValue], left: bool) -> RespValue {
        if args.len() < 2 {
            return wrong_args(if left { "LPUSH" } else { "RPUSH" });
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let values = match self.all_bytes(&args[1..]) {
            Ok(values) => values,
            Err(reply) => return reply,
        };
        match self.keyspace.list_push(key, values, left) {
            Ok(len) => RespValue::integer(len as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `LPOP key` / `RPOP key`
    pub(crate) fn cmd_pop(&self, args: &[RespValue], left: bool) -> RespValue {
        if args.len() != 1 {
            return wrong_args(if left { "LPOP" } else { "RPOP" });
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.list_pop(&key, left) {
            Ok(popped) => RespValue::bulk_or_null(popped),
            Err(e) => store_error_reply(e),
        }
    }

    /// `LLEN key`
    pub(crate) fn cmd_llen(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("LLEN");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.list_len(&key) {
            Ok(len) => RespValue::integer(len as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `LINDEX key index`
    pub(crate) fn cmd_lindex(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_args("LINDEX");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let Some(index) = self.arg_i64(&args[1]) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };
        match self.keyspace.list_index(&key, index) {
            Ok(element) => RespValue::bulk_or_null(element),
            Err(e) => store_error_reply(e),
        }
    }

    /// `LRANGE key start stop`
    pub(crate) fn cmd_lrange(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return wrong_args("LRANGE");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let (Some(start), Some(stop)) = (self.arg_i64(&args[1]), self.arg_i64(&args[2])) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };
        match self.keyspace.list_range(&key, start, stop) {
            Ok(elements) => {
                RespValue::array(elements.into_iter().map(RespValue::bulk).collect())
            }
            Err(e) => store_error_reply(e),
        }
    }

    /// `LSET key index element`
    pub(crate) fn cmd_lset(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return wrong_args("LSET");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let Some(index) = self.arg_i64(&args[1]) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };
        let Some(element) = self.arg_bytes(&args[2]) else {
            return RespValue::error("ERR invalid value");
        };
        match self.keyspace.list_set(&key, index, element) {
            Ok(()) => RespValue::ok(),
            Err(e) => store_error_reply(e),
        }
    }

    /// `LREM key count element`
    pub(crate) fn cmd_lrem(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return wrong_args("LREM");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let Some(count) = self.arg_i64(&args[1]) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };
        let Some(element) = self.arg_bytes(&args[2]) else {
            return RespValue::error("ERR invalid value");
        };
        match self.keyspace.list_remove(&key, count, &element) {
            Ok(removed) => RespValue::integer(removed as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `LINSERT key BEFORE|AFTER pivot element`
    pub(crate) fn cmd_linsert(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 4 {
            return wrong_args("LINSERT");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let before = match self.arg_string(&args[1]).map(|s| s.to_uppercase()) {
            Some(direction) if direction == "BEFORE" => true,
            Some(direction) if direction == "AFTER" => false,
            _ => return RespValue::error("ERR syntax error"),
        };
        let (Some(pivot), Some(element)) = (self.arg_bytes(&args[2]), self.arg_bytes(&args[3]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        match self.keyspace.list_insert(&key, before, &pivot, element) {
            Ok(outcome) => RespValue::integer(outcome),
            Err(e) => store_error_reply(e),
        }
    }

    /// `LTRIM key start stop`
    pub(crate) fn cmd_ltrim(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return wrong_args("LTRIM");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let (Some(start), Some(stop)) = (self.arg_i64(&args[1]), self.arg_i64(&args[2])) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };
        match self.keyspace.list_trim(&key, start, stop) {
            Ok(()) => RespValue::ok(),
            Err(e) => store_error_reply(e),
        }
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

    fn bulks(parts: &[&str]) -> RespValue {
        RespValue::array(
            parts
                .iter()
                .map(|p| RespValue::bulk(Bytes::from(p.to_string())))
                .collect(),
        )
    }

    #[tokio::test]
    async fn push_insert_remove_scenario() {
        let h = handler();

        assert_eq!(
            run(&h, &["LPUSH", "L", "a", "b", "c"]).await,
            RespValue::integer(3)
        );
        assert_eq!(
            run(&h, &["LRANGE", "L", "0", "-1"]).await,
            bulks(&["c", "b", "a"])
        );

        assert_eq!(
            run(&h, &["LINSERT", "L", "BEFORE", "b", "X"]).await,
            RespValue::integer(4)
        );
        assert_eq!(
            run(&h, &["LRANGE", "L", "0", "-1"]).await,
            bulks(&["c", "X", "b", "a"])
        );

        assert_eq!(
            run(&h, &["LREM", "L", "-1", "X"]).await,
            RespValue::integer(1)
        );
        assert_eq!(
            run(&h, &["LRANGE", "L", "0", "-1"]).await,
            bulks(&["c", "b", "a"])
        );
    }

    #[tokio::test]
    async fn pop_and_llen() {
        let h = handler();
        run(&h, &["RPUSH", "L", "a", "b", "c"]).await;

        assert_eq!(run(&h, &["LLEN", "L"]).await, RespValue::integer(3));
        assert_eq!(
            run(&h, &["LPOP", "L"]).await,
            RespValue::bulk(Bytes::from("a"))
        );
        assert_eq!(
            run(&h, &["RPOP", "L"]).await,
            RespValue::bulk(Bytes::from("c"))
        );
        assert_eq!(run(&h, &["LPOP", "L"]).await, RespValue::bulk(Bytes::from("b")));
        // Drained list is gone.
        assert_eq!(run(&h, &["EXISTS", "L"]).await, RespValue::integer(0));
        assert_eq!(run(&h, &["LPOP", "L"]).await, RespValue::Null);
    }

    #[tokio::test]
    async fn lset_lindex() {
        let h = handler();
        run(&h, &["RPUSH", "L", "a", "b"]).await;

        assert_eq!(run(&h, &["LSET", "L", "0", "A"]).await, RespValue::ok());
        assert_eq!(
            run(&h, &["LINDEX", "L", "0"]).await,
            RespValue::bulk(Bytes::from("A"))
        );
        assert_eq!(run(&h, &["LINDEX", "L", "9"]).await, RespValue::Null);
        assert!(run(&h, &["LSET", "L", "9", "x"]).await.is_error());
        assert!(run(&h, &["LSET", "missing", "0", "x"]).await.is_error());
    }

    #[tokio::test]
    async fn ltrim_window() {
        let h = handler();
        run(&h, &["RPUSH", "L", "a", "b", "c", "d"]).await;

        assert_eq!(run(&h, &["LTRIM", "L", "1", "2"]).await, RespValue::ok());
        assert_eq!(run(&h, &["LRANGE", "L", "0", "-1"]).await, bulks(&["b", "c"]));

        assert_eq!(run(&h, &["LTRIM", "L", "10", "20"]).await, RespValue::ok());
        assert_eq!(run(&h, &["EXISTS", "L"]).await, RespValue::integer(0));
    }

    #[tokio::test]
    async fn linsert_edge_replies() {
        let h = handler();
        assert_eq!(
            run(&h, &["LINSERT", "missing", "BEFORE", "p", "x"]).await,
            RespValue::integer(0)
        );
        run(&h, &["RPUSH", "L", "a"]).await;
        assert_eq!(
            run(&h, &["LINSERT", "L", "AFTER", "nope", "x"]).await,
            RespValue::integer(-1)
        );
        assert!(run(&h, &["LINSERT", "L", "SIDEWAYS", "a", "x"])
            .await
            .is_error());
    }

    #[tokio::test]
    async fn wrongtype_reply() {
        let h = handler();
        run(&h, &["SET", "s", "v"]).await;
        match run(&h, &["LPUSH", "s", "x"]).await {
            RespValue::Error(msg) => assert!(msg.starts_with("WRONGTYPE")),
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
