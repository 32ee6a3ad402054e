//! Stream command handlers.
//!
//! Entry lists reply in the flat shape `[id, field, value, field, value,
//! id, ...]`; `XREAD`/`XREADGROUP` prefix each stream's run with the stream
//! name. A blocking `XREAD` waits on the keyspace-wide append signal: every
//! successful `XADD` wakes all blocked readers, each of which re-polls its
//! own streams and either replies or goes back to waiting until the
//! deadline.

use crate::commands::handler::{store_error_reply, wrong_args, CommandHandler};
use crate::protocol::RespValue;
use crate::storage::{IdSpec, StreamEntry, StreamId};
use bytes::Bytes;
use std::time::{Duration, Instant};

/// Parses a range bound: `-`/`+` are the open ends, a bare millisecond
/// part gets the smallest (start) or largest (end) sequence.
fn parse_range_bound(text: &str, is_start: bool) -> Result<StreamId, RespValue> {
    match text {
        "-" => Ok(StreamId::ZERO),
        "+" => Ok(StreamId::MAX),
        _ => {
            if text.contains('-') {
                text.parse()
                    .map_err(|_| RespValue::error("ERR Invalid stream ID specified as stream command argument"))
            } else {
                let ms: u64 = text.parse().map_err(|_| {
                    RespValue::error("ERR Invalid stream ID specified as stream command argument")
                })?;
                Ok(if is_start {
                    StreamId::new(ms, 0)
                } else {
                    StreamId::new(ms, u64::MAX)
                })
            }
        }
    }
}

fn parse_exact_id(text: &str) -> Result<StreamId, RespValue> {
    text.parse()
        .map_err(|_| RespValue::error("ERR Invalid stream ID specified as stream command argument"))
}

/// Appends one entry as `id, field, value, ...` to a flat reply.
fn push_entry(out: &mut Vec<RespValue>, entry: &StreamEntry) {
    out.push(RespValue::bulk(Bytes::from(entry.id.to_string())));
    for (field, value) in &entry.fields {
        out.push(RespValue::bulk(field.clone()));
        out.push(RespValue::bulk(value.clone()));
    }
}

fn entries_reply(entries: &[StreamEntry]) -> RespValue {
    let mut out = Vec::new();
    for entry in entries {
        push_entry(&mut out, entry);
    }
    RespValue::array(out)
}

/// Options common to `XREAD` and `XREADGROUP`: COUNT, BLOCK, and the
/// STREAMS tail split into names and raw IDs.
struct ReadSpec {
    count: usize,
    block_ms: Option<u64>,
    names: Vec<Bytes>,
    raw_ids: Vec<String>,
}

impl CommandHandler {
    /// `XADD key id field value [field value ...]`
    pub(crate) fn cmd_xadd(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 4 || (args.len() - 2) % 2 != 0 {
            return wrong_args("XADD");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let Some(id_text) = self.arg_string(&args[1]) else {
            return RespValue::error("ERR invalid stream ID");
        };
        let spec = if id_text == "*" {
            IdSpec::Auto
        } else {
            match parse_exact_id(&id_text) {
                Ok(id) => IdSpec::Explicit(id),
                Err(reply) => return reply,
            }
        };

        let mut fields = Vec::with_capacity((args.len() - 2) / 2);
        for chunk in args[2..].chunks(2) {
            match (self.arg_bytes(&chunk[0]), self.arg_bytes(&chunk[1])) {
                (Some(field), Some(value)) => fields.push((field, value)),
                _ => return RespValue::error("ERR arguments must be strings"),
            }
        }

        let stream = match self.keyspace.open_or_create_stream(&key) {
            Ok(stream) => stream,
            Err(e) => return store_error_reply(e),
        };
        match stream.add(spec, fields) {
            Ok(id) => {
                self.keyspace.bump_changes(1);
                self.keyspace.notify_stream_activity();
                RespValue::bulk(Bytes::from(id.to_string()))
            }
            Err(e) => store_error_reply(e),
        }
    }

    /// `XLEN key`
    pub(crate) fn cmd_xlen(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("XLEN");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        match self.keyspace.open_stream(&key) {
            Ok(Some(stream)) => RespValue::integer(stream.len() as i64),
            Ok(None) => RespValue::integer(0),
            Err(e) => store_error_reply(e),
        }
    }

    /// `XRANGE key start end [COUNT n]`
    pub(crate) fn cmd_xrange(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 && args.len() != 5 {
            return wrong_args("XRANGE");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let (Some(start_text), Some(end_text)) =
            (self.arg_string(&args[1]), self.arg_string(&args[2]))
        else {
            return RespValue::error("ERR invalid stream ID");
        };
        let start = match parse_range_bound(&start_text, true) {
            Ok(id) => id,
            Err(reply) => return reply,
        };
        let end = match parse_range_bound(&end_text, false) {
            Ok(id) => id,
            Err(reply) => return reply,
        };

        let mut count = 0usize;
        if args.len() == 5 {
            if self
                .arg_string(&args[3])
                .map(|s| s.to_uppercase() != "COUNT")
                .unwrap_or(true)
            {
                return RespValue::error("ERR syntax error");
            }
            count = match self.arg_i64(&args[4]) {
                Some(n) if n >= 0 => n as usize,
                _ => return RespValue::error("ERR COUNT must be a non-negative integer"),
            };
        }

        match self.keyspace.open_stream(&key) {
            Ok(Some(stream)) => entries_reply(&stream.range(start, end, count)),
            Ok(None) => RespValue::array(vec![]),
            Err(e) => store_error_reply(e),
        }
    }

    /// `XDEL key id [id ...]`
    pub(crate) fn cmd_xdel(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return wrong_args("XDEL");
        }
        let Some(key) = self.arg_bytes(&args[0]) else {
            return RespValue::error("ERR invalid key");
        };
        let mut ids = Vec::with_capacity(args.len() - 1);
        for arg in &args[1..] {
            let Some(text) = self.arg_string(arg) else {
                return RespValue::error("ERR invalid stream ID");
            };
            match parse_exact_id(&text) {
                Ok(id) => ids.push(id),
                Err(reply) => return reply,
            }
        }

        match self.keyspace.open_stream(&key) {
            Ok(Some(stream)) => {
                let deleted = stream.delete(&ids);
                if deleted > 0 {
                    self.keyspace.bump_changes(deleted as u64);
                }
                RespValue::integer(deleted as i64)
            }
            Ok(None) => RespValue::integer(0),
            Err(e) => store_error_reply(e),
        }
    }

    /// `XGROUP CREATE key group id` / `XGROUP DESTROY key group`
    pub(crate) fn cmd_xgroup(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() {
            return wrong_args("XGROUP");
        }
        let Some(sub) = self.arg_string(&args[0]).map(|s| s.to_uppercase()) else {
            return RespValue::error("ERR syntax error");
        };
        match sub.as_str() {
            "CREATE" => {
                if args.len() != 4 {
                    return wrong_args("XGROUP CREATE");
                }
                let (Some(key), Some(group), Some(start_text)) = (
                    self.arg_bytes(&args[1]),
                    self.arg_string(&args[2]),
                    self.arg_string(&args[3]),
                ) else {
                    return RespValue::error("ERR arguments must be strings");
                };
                let stream = match self.keyspace.open_stream(&key) {
                    Ok(Some(stream)) => stream,
                    Ok(None) => {
                        return store_error_reply(crate::storage::StoreError::NoSuchKey)
                    }
                    Err(e) => return store_error_reply(e),
                };
                let start = if start_text == "$" {
                    stream.last_id()
                } else {
                    match parse_exact_id(&start_text) {
                        Ok(id) => id,
                        Err(reply) => return reply,
                    }
                };
                match stream.create_group(&group, start) {
                    Ok(()) => {
                        self.keyspace.bump_changes(1);
                        RespValue::ok()
                    }
                    Err(e) => store_error_reply(e),
                }
            }
            "DESTROY" => {
                if args.len() != 3 {
                    return wrong_args("XGROUP DESTROY");
                }
                let (Some(key), Some(group)) =
                    (self.arg_bytes(&args[1]), self.arg_string(&args[2]))
                else {
                    return RespValue::error("ERR arguments must be strings");
                };
                match self.keyspace.open_stream(&key) {
                    Ok(Some(stream)) => {
                        let removed = stream.destroy_group(&group);
                        if removed {
                            self.keyspace.bump_changes(1);
                        }
                        RespValue::integer(i64::from(removed))
                    }
                    Ok(None) => RespValue::integer(0),
                    Err(e) => store_error_reply(e),
                }
            }
            other => RespValue::error(format!("ERR unknown XGROUP subcommand '{}'", other)),
        }
    }

    /// `XREAD [COUNT n] [BLOCK ms] STREAMS key [key ...] id [id ...]`
    pub(crate) async fn cmd_xread(&self, args: &[RespValue]) -> RespValue {
        let spec = match self.parse_read_spec(args, 0, "XREAD") {
            Ok(spec) => spec,
            Err(reply) => return reply,
        };

        // Resolve IDs up front; `$` means "whatever the stream's last ID is
        // right now", so later appends are what a blocked reader sees.
        let mut after = Vec::with_capacity(spec.raw_ids.len());
        for (name, raw) in spec.names.iter().zip(&spec.raw_ids) {
            if raw == "$" {
                match self.keyspace.open_stream(name) {
                    Ok(Some(stream)) => after.push(stream.last_id()),
                    Ok(None) => after.push(StreamId::ZERO),
                    Err(e) => return store_error_reply(e),
                }
            } else {
                match parse_exact_id(raw) {
                    Ok(id) => after.push(id),
                    Err(reply) => return reply,
                }
            }
        }

        let deadline = match spec.block_ms {
            // BLOCK 0 waits forever.
            Some(0) => None,
            Some(ms) => Some(Instant::now() + Duration::from_millis(ms)),
            None => {
                // Non-blocking: one shot.
                return match self.tail_read(&spec.names, &after, spec.count) {
                    Ok(Some(reply)) => reply,
                    Ok(None) => RespValue::Null,
                    Err(reply) => reply,
                };
            }
        };

        loop {
            // Arm the notifier before checking, so an append that lands
            // between the check and the await still wakes us.
            let notified = self.keyspace.stream_activity().notified();

            match self.tail_read(&spec.names, &after, spec.count) {
                Ok(Some(reply)) => return reply,
                Ok(None) => {}
                Err(reply) => return reply,
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return RespValue::Null;
                    }
                    // Wake on append or timeout; the loop re-checks either way.
                    let _ = tokio::time::timeout(remaining, notified).await;
                }
            }
        }
    }

    /// One pass over the requested streams. `Ok(None)` means nothing new
    /// anywhere.
    fn tail_read(
        &self,
        names: &[Bytes],
        after: &[StreamId],
        count: usize,
    ) -> Result<Option<RespValue>, RespValue> {
        let mut out = Vec::new();
        for (name, &from) in names.iter().zip(after) {
            let stream = match self.keyspace.open_stream(name) {
                Ok(Some(stream)) => stream,
                Ok(None) => continue,
                Err(e) => return Err(store_error_reply(e)),
            };
            let entries = stream.entries_after(from, count);
            if !entries.is_empty() {
                out.push(RespValue::bulk(name.clone()));
                for entry in &entries {
                    push_entry(&mut out, entry);
                }
            }
        }
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(RespValue::array(out)))
        }
    }

    /// `XREADGROUP GROUP group consumer [COUNT n] STREAMS key [key ...] id [id ...]`
    pub(crate) fn cmd_xreadgroup(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 3
            || self
                .arg_string(&args[0])
                .map(|s| s.to_uppercase() != "GROUP")
                .unwrap_or(true)
        {
            return RespValue::error("ERR XREADGROUP must start with GROUP <group> <consumer>");
        }
        let (Some(group), Some(consumer)) =
            (self.arg_string(&args[1]), self.arg_string(&args[2]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };

        let spec = match self.parse_read_spec(args, 3, "XREADGROUP") {
            Ok(spec) => spec,
            Err(reply) => return reply,
        };

        let mut out = Vec::new();
        for (name, raw) in spec.names.iter().zip(&spec.raw_ids) {
            let stream = match self.keyspace.open_stream(name) {
                Ok(Some(stream)) => stream,
                Ok(None) => {
                    return RespValue::error(format!(
                        "NOGROUP No such key '{}' or consumer group '{}'",
                        String::from_utf8_lossy(name),
                        group
                    ))
                }
                Err(e) => return store_error_reply(e),
            };

            let entries = if raw == ">" {
                match stream.read_group(&group, &consumer, spec.count) {
                    Ok(entries) => {
                        if !entries.is_empty() {
                            self.keyspace.bump_changes(1);
                        }
                        entries
                    }
                    Err(e) => return store_error_reply(e),
                }
            } else {
                let from = match parse_exact_id(raw) {
                    Ok(id) => id,
                    Err(reply) => return reply,
                };
                match stream.read_pending(&group, &consumer, from, spec.count) {
                    Ok(entries) => entries,
                    Err(e) => return store_error_reply(e),
                }
            };

            if !entries.is_empty() {
                out.push(RespValue::bulk(name.clone()));
                for entry in &entries {
                    push_entry(&mut out, entry);
                }
            }
        }

        if out.is_empty() {
            RespValue::Null
        } else {
            RespValue::array(out)
        }
    }

    /// `XACK key group id [id ...]`
    pub(crate) fn cmd_xack(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 3 {
            return wrong_args("XACK");
        }
        let (Some(key), Some(group)) = (self.arg_bytes(&args[0]), self.arg_string(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        let mut ids = Vec::with_capacity(args.len() - 2);
        for arg in &args[2..] {
            let Some(text) = self.arg_string(arg) else {
                return RespValue::error("ERR invalid stream ID");
            };
            match parse_exact_id(&text) {
                Ok(id) => ids.push(id),
                Err(reply) => return reply,
            }
        }

        match self.keyspace.open_stream(&key) {
            Ok(Some(stream)) => match stream.ack(&group, &ids) {
                Ok(acked) => {
                    if acked > 0 {
                        self.keyspace.bump_changes(1);
                    }
                    RespValue::integer(acked as i64)
                }
                Err(e) => store_error_reply(e),
            },
            Ok(None) => RespValue::integer(0),
            Err(e) => store_error_reply(e),
        }
    }

    /// `XPENDING key group [consumer]`
    pub(crate) fn cmd_xpending(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 && args.len() != 3 {
            return wrong_args("XPENDING");
        }
        let (Some(key), Some(group)) = (self.arg_bytes(&args[0]), self.arg_string(&args[1]))
        else {
            return RespValue::error("ERR arguments must be strings");
        };
        let consumer = if args.len() == 3 {
            match self.arg_string(&args[2]) {
                Some(name) => Some(name),
                None => return RespValue::error("ERR invalid consumer name"),
            }
        } else {
            None
        };

        match self.keyspace.open_stream(&key) {
            Ok(Some(stream)) => match stream.pending(&group, consumer.as_deref()) {
                Ok(ids) => RespValue::array(
                    ids.into_iter()
                        .map(|id| RespValue::bulk(Bytes::from(id.to_string())))
                        .collect(),
                ),
                Err(e) => store_error_reply(e),
            },
            Ok(None) => RespValue::array(vec![]),
            Err(e) => store_error_reply(e),
        }
    }

    /// Parses `[COUNT n] [BLOCK ms] STREAMS name... id...` starting at
    /// `from`.
    fn parse_read_spec(
        &self,
        args: &[RespValue],
        from: usize,
        command: &str,
    ) -> Result<ReadSpec, RespValue> {
        let mut count = 0usize;
        let mut block_ms = None;
        let mut i = from;
        let mut streams_at = None;

        while i < args.len() {
            let Some(word) = self.arg_string(&args[i]).map(|s| s.to_uppercase()) else {
                return Err(RespValue::error("ERR syntax error"));
            };
            match word.as_str() {
                "COUNT" => {
                    i += 1;
                    count = match args.get(i).and_then(|a| self.arg_i64(a)) {
                        Some(n) if n >= 0 => n as usize,
                        _ => {
                            return Err(RespValue::error(
                                "ERR COUNT must be a non-negative integer",
                            ))
                        }
                    };
                }
                "BLOCK" => {
                    i += 1;
                    block_ms = match args.get(i).and_then(|a| self.arg_i64(a)) {
                        Some(ms) if ms >= 0 => Some(ms as u64),
                        _ => {
                            return Err(RespValue::error(
                                "ERR timeout is not an integer or out of range",
                            ))
                        }
                    };
                }
                "STREAMS" => {
                    streams_at = Some(i + 1);
                    break;
                }
                _ => return Err(RespValue::error("ERR syntax error")),
            }
            i += 1;
        }

        let Some(streams_at) = streams_at else {
            return Err(RespValue::error(format!(
                "ERR {} requires a STREAMS section",
                command
            )));
        };
        let tail = &args[streams_at..];
        if tail.is_empty() || tail.len() % 2 != 0 {
            return Err(RespValue::error(
                "ERR Unbalanced STREAMS list: every stream needs a matching ID",
            ));
        }

        let half = tail.len() / 2;
        let names = match self.all_bytes(&tail[..half]) {
            Ok(names) => names,
            Err(reply) => return Err(reply),
        };
        let mut raw_ids = Vec::with_capacity(half);
        for arg in &tail[half..] {
            match self.arg_string(arg) {
                Some(id) => raw_ids.push(id),
                None => return Err(RespValue::error("ERR invalid stream ID")),
            }
        }

        Ok(ReadSpec {
            count,
            block_ms,
            names,
            raw_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::CommandHandler;
    use crate::protocol::RespValue;
    use crate::storage::Keyspace;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

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

    fn as_bulk_string(reply: &RespValue) -> String {
        match reply {
            RespValue::BulkString(b) => String::from_utf8_lossy(b).to_string(),
            other => panic!("expected bulk string, got {:?}", other),
        }
    }

    fn as_array(reply: RespValue) -> Vec<RespValue> {
        match reply {
            RespValue::Array(items) => items,
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn consumer_group_scenario() {
        let h = handler();

        let id1 = as_bulk_string(&run(&h, &["XADD", "s", "*", "f", "1"]).await);
        let id2 = as_bulk_string(&run(&h, &["XADD", "s", "*", "f", "2"]).await);
        assert!(id2 > id1.clone());

        let range = as_array(run(&h, &["XRANGE", "s", "-", "+"]).await);
        // Two entries, each id + one field/value pair.
        assert_eq!(range.len(), 6);

        assert_eq!(
            run(&h, &["XGROUP", "CREATE", "s", "g", "0-0"]).await,
            RespValue::ok()
        );
        let delivered = as_array(
            run(
                &h,
                &["XREADGROUP", "GROUP", "g", "c1", "COUNT", "10", "STREAMS", "s", ">"],
            )
            .await,
        );
        // Stream name + 2 entries of 3 frames each.
        assert_eq!(delivered.len(), 7);

        let pending = as_array(run(&h, &["XPENDING", "s", "g"]).await);
        assert_eq!(pending.len(), 2);

        assert_eq!(
            run(&h, &["XACK", "s", "g", &id1]).await,
            RespValue::integer(1)
        );
        let pending = as_array(run(&h, &["XPENDING", "s", "g"]).await);
        assert_eq!(pending.len(), 1);
        assert_eq!(as_bulk_string(&pending[0]), id2);
    }

    #[tokio::test]
    async fn explicit_ids_and_ordering() {
        let h = handler();
        assert_eq!(
            as_bulk_string(&run(&h, &["XADD", "s", "5-1", "f", "v"]).await),
            "5-1"
        );
        assert!(run(&h, &["XADD", "s", "5-1", "f", "v"]).await.is_error());
        assert!(run(&h, &["XADD", "s", "4-0", "f", "v"]).await.is_error());
        assert!(run(&h, &["XADD", "s", "0-0", "f", "v"]).await.is_error());
        assert_eq!(run(&h, &["XLEN", "s"]).await, RespValue::integer(1));
    }

    #[tokio::test]
    async fn xrange_bounds_and_count() {
        let h = handler();
        for i in 1..=4 {
            run(&h, &["XADD", "s", &format!("{}-0", i), "n", "v"]).await;
        }

        assert_eq!(as_array(run(&h, &["XRANGE", "s", "2", "3"]).await).len(), 6);
        assert_eq!(
            as_array(run(&h, &["XRANGE", "s", "-", "+", "COUNT", "2"]).await).len(),
            6
        );
        assert_eq!(as_array(run(&h, &["XRANGE", "missing", "-", "+"]).await).len(), 0);
    }

    #[tokio::test]
    async fn xdel_removes_entries() {
        let h = handler();
        run(&h, &["XADD", "s", "1-0", "f", "v"]).await;
        run(&h, &["XADD", "s", "2-0", "f", "v"]).await;

        assert_eq!(
            run(&h, &["XDEL", "s", "1-0", "9-9"]).await,
            RespValue::integer(1)
        );
        assert_eq!(run(&h, &["XLEN", "s"]).await, RespValue::integer(1));
        // The high-water mark still blocks reused IDs.
        assert!(run(&h, &["XADD", "s", "2-0", "f", "v"]).await.is_error());
    }

    #[tokio::test]
    async fn xread_tail_semantics() {
        let h = handler();
        run(&h, &["XADD", "s", "1-0", "f", "a"]).await;
        run(&h, &["XADD", "s", "2-0", "f", "b"]).await;

        let reply = as_array(run(&h, &["XREAD", "STREAMS", "s", "1-0"]).await);
        // Name + one entry (id, field, value).
        assert_eq!(reply.len(), 4);
        assert_eq!(as_bulk_string(&reply[0]), "s");
        assert_eq!(as_bulk_string(&reply[1]), "2-0");

        // Nothing after the last ID.
        assert_eq!(
            run(&h, &["XREAD", "STREAMS", "s", "2-0"]).await,
            RespValue::Null
        );
        // `$` reads only entries appended after the call.
        assert_eq!(
            run(&h, &["XREAD", "STREAMS", "s", "$"]).await,
            RespValue::Null
        );
    }

    #[tokio::test]
    async fn blocking_xread_wakes_on_append() {
        let keyspace = Arc::new(Keyspace::new());
        let reader = CommandHandler::new(Arc::clone(&keyspace), None);
        let writer = CommandHandler::new(Arc::clone(&keyspace), None);

        let read_task = tokio::spawn(async move {
            reader
                .execute(RespValue::Array(
                    ["XREAD", "BLOCK", "2000", "STREAMS", "s", "$"]
                        .iter()
                        .map(|p| RespValue::BulkString(Bytes::from(p.to_string())))
                        .collect(),
                ))
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        run(&writer, &["XADD", "s", "*", "f", "late"]).await;

        let reply = read_task.await.unwrap();
        let items = as_array(reply);
        assert_eq!(as_bulk_string(&items[0]), "s");
        assert_eq!(as_bulk_string(&items[2]), "f");
        assert_eq!(as_bulk_string(&items[3]), "late");
    }

    #[tokio::test]
    async fn blocking_xread_times_out_with_null() {
        let h = handler();
        let started = std::time::Instant::now();
        let reply = run(&h, &["XREAD", "BLOCK", "60", "STREAMS", "s", "$"]).await;
        assert_eq!(reply, RespValue::Null);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn xreadgroup_redelivery() {
        let h = handler();
        run(&h, &["XADD", "s", "1-0", "f", "a"]).await;
        run(&h, &["XGROUP", "CREATE", "s", "g", "0-0"]).await;
        run(&h, &["XREADGROUP", "GROUP", "g", "c1", "STREAMS", "s", ">"]).await;

        // Concrete ID replays this consumer's pending entries.
        let replay = as_array(
            run(&h, &["XREADGROUP", "GROUP", "g", "c1", "STREAMS", "s", "0-0"]).await,
        );
        assert_eq!(replay.len(), 4);
        assert_eq!(as_bulk_string(&replay[1]), "1-0");

        // Pending state unchanged by the replay.
        assert_eq!(as_array(run(&h, &["XPENDING", "s", "g"]).await).len(), 1);
    }

    #[tokio::test]
    async fn group_errors() {
        let h = handler();
        assert!(run(&h, &["XGROUP", "CREATE", "missing", "g", "0-0"])
            .await
            .is_error());

        run(&h, &["XADD", "s", "1-0", "f", "v"]).await;
        run(&h, &["XGROUP", "CREATE", "s", "g", "0-0"]).await;
        match run(&h, &["XGROUP", "CREATE", "s", "g", "0-0"]).await {
            RespValue::Error(msg) => assert!(msg.starts_with("BUSYGROUP")),
            other => panic!("unexpected reply {:?}", other),
        }

        match run(&h, &["XREADGROUP", "GROUP", "ghost", "c", "STREAMS", "s", ">"]).await {
            RespValue::Error(msg) => assert!(msg.starts_with("NOGROUP")),
            other => panic!("unexpected reply {:?}", other),
        }
        match run(&h, &["XREADGROUP", "GROUP", "g", "c", "STREAMS", "nostream", ">"]).await {
            RespValue::Error(msg) => assert!(msg.starts_with("NOGROUP")),
            other => panic!("unexpected reply {:?}", other),
        }

        assert_eq!(
            run(&h, &["XGROUP", "DESTROY", "s", "g"]).await,
            RespValue::integer(1)
        );
        assert_eq!(
            run(&h, &["XGROUP", "DESTROY", "s", "g"]).await,
            RespValue::integer(0)
        );
    }

    #[tokio::test]
    async fn xack_is_idempotent() {
        let h = handler();
        run(&h, &["XADD", "s", "1-0", "f", "v"]).await;
        run(&h, &["XGROUP", "CREATE", "s", "g", "0-0"]).await;
        run(&h, &["XREADGROUP", "GROUP", "g", "c", "STREAMS", "s", ">"]).await;

        assert_eq!(run(&h, &["XACK", "s", "g", "1-0"]).await, RespValue::integer(1));
        assert_eq!(run(&h, &["XACK", "s", "g", "1-0"]).await, RespValue::integer(0));
        assert_eq!(
            run(&h, &["XACK", "s", "g", "42-0"]).await,
            RespValue::integer(0)
        );
    }
}
