//! Hash command handlers.

use crate::commands::handler::{store_error_reply, wrong_args, CommandHandler};
use crate::protocol::RespValue;
use crate::storage::hashes::format_float;
use bytes::Bytes;

impl CommandHandler {
    /// `HSET key field value [field value ...]` — replies with the number
    /// of newly created fields.
    pub(crate) fn cmd_hset(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 3 || (args.len() - 1) % 2 != 0 {
            return wrong_args("HSET");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let mut pairs = Vec::with_capacity((args.len() - 1) / 2);
        for chunk in args[1..].chunks(2) {
            match (self.arg_bytes(&chunk[0]), self.arg_bytes(&chunk[1])) {
                (Some(field), Some(value)) => pairs.push((field, value)),
                _ => return RespValue::error("ERR arguments must be strings"),
            }
        }
        match self.keyspace.hash_set(key, pairs) {
            Ok(created) => RespValue::integer(created as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `HGET key field`
    pub(crate) fn cmd_hget(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_args("HGET");
        }
        let (Some(key), Some(field)) = (self.arg_bytes(&args[0]), self.arg_bytes(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        match self.keyspace.hash_get(&key, &field) {
            Ok(value) => RespValue::bulk_or_null(value),
            Err(e) => store_error_reply(e),
        }
    }

    /// `HGETALL key` — alternating field, value; fields sorted for stable
    /// output.
    pub(crate) fn cmd_hgetall(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("HGETALL");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.hash_get_all(&key) {
            Ok(mut pairs) => {
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                let mut out = Vec::with_capacity(pairs.len() * 2);
                for (field, value) in pairs {
                    out.push(RespValue::bulk(field));
                    out.push(RespValue::bulk(value));
                }
                RespValue::array(out)
            }
            Err(e) => store_error_reply(e),
        }
    }

    /// `HEXISTS key field`
    pub(crate) fn cmd_hexists(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_args("HEXISTS");
        }
        let (Some(key), Some(field)) = (self.arg_bytes(&args[0]), self.arg_bytes(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        match self.keyspace.hash_exists(&key, &field) {
            Ok(present) => RespValue::integer(i64::from(present)),
            Err(e) => store_error_reply(e),
        }
    }

    /// `HDEL key field [field ...]`
    pub(crate) fn cmd_hdel(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return wrong_args("HDEL");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let fields = match self.all_bytes(&args[1..]) {
            Ok(fields) => fields,
            Err(reply) => return reply,
        };
        match self.keyspace.hash_del(&key, &fields) {
            Ok(deleted) => RespValue::integer(deleted as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `HLEN key`
    pub(crate) fn cmd_hlen(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("HLEN");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.hash_len(&key) {
            Ok(len) => RespValue::integer(len as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `HKEYS key`
    pub(crate) fn cmd_hkeys(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("HKEYS");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.hash_keys(&key) {
            Ok(fields) => sorted_bulks(fields),
            Err(e) => store_error_reply(e),
        }
    }

    /// `HVALS key`
    pub(crate) fn cmd_hvals(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("HVALS");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.hash_vals(&key) {
            Ok(values) => sorted_bulks(values),
            Err(e) => store_error_reply(e),
        }
    }

    /// `HINCRBY key field increment`
    pub(crate) fn cmd_hincrby(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return wrong_args("HINCRBY");
        }
        let (Some(key), Some(field)) = (self.arg_bytes(&args[0]), self.arg_bytes(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        let Some(delta) = self.arg_i64(&args[2]) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };
        match self.keyspace.hash_incr_by(&key, &field, delta) {
            Ok(next) => RespValue::integer(next),
            Err(e) => store_error_reply(e),
        }
    }

    /// `HINCRBYFLOAT key field increment` — the increment must be a finite
    /// float; the reply is the rendered new value.
    pub(crate) fn cmd_hincrbyfloat(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return wrong_args("HINCRBYFLOAT");
        }
        let (Some(key), Some(field)) = (self.arg_bytes(&args[0]), self.arg_bytes(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        let delta = match self.arg_f64(&args[2]) {
            Some(delta) if delta.is_finite() => delta,
            _ => return RespValue::error("ERR value is not a valid float"),
        };
        match self.keyspace.hash_incr_by_float(&key, &field, delta) {
            Ok(next) => RespValue::bulk(Bytes::from(format_float(next))),
            Err(e) => store_error_reply(e),
        }
    }
}

fn sorted_bulks(mut items: Vec<Bytes>) -> RespValue {
    items.sort();
    RespValue::array(items.into_iter().map(RespValue::bulk).collect())
}
