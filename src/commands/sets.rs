//! Set command handlers.

use crate::commands::handler::{store_error_reply, wrong_args, CommandHandler};
use crate::protocol::RespValue;
use bytes::Bytes;

impl CommandHandler {
    /// `SADD key member [member ...]`
    pub(crate) fn cmd_sadd(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return wrong_args("SADD");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let members = match self.all_bytes(&args[1..]) {
            Ok(members) => members,
            Err(reply) => return reply,
        };
        match self.keyspace.set_add(key, members) {
            Ok(added) => RespValue::integer(added as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `SREM key member [member ...]`
    pub(crate) fn cmd_srem(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return wrong_args("SREM");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let members = match self.all_bytes(&args[1..]) {
            Ok(members) => members,
            Err(reply) => return reply,
        };
        match self.keyspace.set_remove(&key, &members) {
            Ok(removed) => RespValue::integer(removed as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `SISMEMBER key member`
    pub(crate) fn cmd_sismember(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_args("SISMEMBER");
        }
        let (Some(key), Some(member)) = (self.arg_bytes(&args[0]), self.arg_bytes(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        match self.keyspace.set_is_member(&key, &member) {
            Ok(present) => RespValue::integer(i64::from(present)),
            Err(e) => store_error_reply(e),
        }
    }

    /// `SMEMBERS key`
    pub(crate) fn cmd_smembers(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("SMEMBERS");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.set_members(&key) {
            Ok(members) => sorted_reply(members),
            Err(e) => store_error_reply(e),
        }
    }

    /// `SCARD key`
    pub(crate) fn cmd_scard(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("SCARD");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.set_card(&key) {
            Ok(count) => RespValue::integer(count as i64),
            Err(e) => store_error_reply(e),
        }
    }

    /// `SDIFF` / `SINTER` / `SUNION`, all `name key [key ...]`.
    pub(crate) fn cmd_set_algebra(&self, args: &[RespValue], name: &str) -> RespValue {
        if args.is_empty() {
            return wrong_args(name);
        }
        let keys = match self.all_bytes(args) {
            Ok(keys) => keys,
            Err(reply) => return reply,
        };
        let result = match name {
            "SDIFF" => self.keyspace.set_diff(&keys),
            "SINTER" => self.keyspace.set_inter(&keys),
            _ => self.keyspace.set_union(&keys),
        };
        match result {
            Ok(members) => sorted_reply(members),
            Err(e) => store_error_reply(e),
        }
    }
}

/// Sets are unordered internally; replies sort members so output is stable
/// for clients and tests.
fn sorted_reply(mut members: Vec<Bytes>) -> RespValue {
    members.sort();
    RespValue::array(members.into_iter().map(RespValue::bulk).collect())
}
