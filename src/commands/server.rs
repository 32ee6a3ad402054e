//! Server and persistence command handlers.

use crate::commands::handler::{wrong_args, CommandHandler};
use crate::protocol::RespValue;
use crate::snapshot::SnapshotError;
use bytes::Bytes;

impl CommandHandler {
    /// `PING [message]`
    pub(crate) fn cmd_ping(&self, args: &[RespValue]) -> RespValue {
        match args.len() {
            0 => RespValue::simple("PONG"),
            1 => match self.arg_bytes(&args[0]) {
                Some(message) => RespValue::bulk(message),
                None => RespValue::error("ERR invalid message"),
            },
            _ => wrong_args("PING"),
        }
    }

    /// `ECHO message`
    pub(crate) fn cmd_echo(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("ECHO");
        }
        match self.arg_bytes(&args[0]) {
            Some(message) => RespValue::bulk(message),
            None => RespValue::error("ERR invalid message"),
        }
    }

    /// `DBSIZE` — live key count.
    pub(crate) fn cmd_dbsize(&self, args: &[RespValue]) -> RespValue {
        if !args.is_empty() {
            return wrong_args("DBSIZE");
        }
        RespValue::integer(self.keyspace.len() as i64)
    }

    /// `FLUSHALL`
    pub(crate) fn cmd_flushall(&self, args: &[RespValue]) -> RespValue {
        if !args.is_empty() {
            return wrong_args("FLUSHALL");
        }
        self.keyspace.flush_all();
        RespValue::ok()
    }

    /// `INFO [section]` — human-readable key:value lines, Redis style.
    pub(crate) fn cmd_info(&self, args: &[RespValue]) -> RespValue {
        if args.len() > 1 {
            return wrong_args("INFO");
        }
        let section = args
            .first()
            .and_then(|a| self.arg_string(a))
            .map(|s| s.to_lowercase());

        let mut report = String::new();
        let wanted = |name: &str| section.as_deref().map(|s| s == name).unwrap_or(true);

        if wanted("server") {
            report.push_str("# Server\r\n");
            report.push_str(&format!("flarekv_version:{}\r\n", crate::VERSION));
            report.push_str("mode:standalone\r\n");
            report.push_str(&format!(
                "uptime_in_seconds:{}\r\n",
                self.started_at.elapsed().as_secs()
            ));
            report.push_str("\r\n");
        }

        if wanted("persistence") {
            report.push_str("# Persistence\r\n");
            match &self.snapshotter {
                Some(snapshotter) => {
                    let stats = snapshotter.stats();
                    report.push_str("rdb_enabled:1\r\n");
                    report.push_str(&format!(
                        "rdb_changes_since_last_save:{}\r\n",
                        stats.changes_since_save
                    ));
                    report.push_str(&format!(
                        "rdb_bgsave_in_progress:{}\r\n",
                        u8::from(stats.save_in_progress)
                    ));
                    report.push_str(&format!("rdb_last_save_time:{}\r\n", stats.last_save_unix));
                    report.push_str(&format!("rdb_last_bgsave_status:{}\r\n", stats.last_status));
                    report.push_str(&format!("rdb_total_saves:{}\r\n", stats.total_saves));
                    report.push_str(&format!("rdb_file_path:{}\r\n", stats.file_path));
                }
                None => report.push_str("rdb_enabled:0\r\n"),
            }
            report.push_str("\r\n");
        }

        if wanted("memory") {
            report.push_str("# Memory\r\n");
            report.push_str(&format!("keys:{}\r\n", self.keyspace.len()));
            report.push_str("\r\n");
        }

        if report.is_empty() {
            return RespValue::error("ERR unknown INFO section");
        }
        RespValue::bulk(Bytes::from(report))
    }

    /// `SAVE` — foreground snapshot; blocks until the file is on disk.
    pub(crate) async fn cmd_save(&self, args: &[RespValue]) -> RespValue {
        if !args.is_empty() {
            return wrong_args("SAVE");
        }
        let Some(snapshotter) = &self.snapshotter else {
            return RespValue::error("ERR snapshots are disabled");
        };
        match snapshotter.save().await {
            Ok(_) => RespValue::ok(),
            Err(SnapshotError::SaveInProgress) => {
                RespValue::error("ERR a save operation is already in progress")
            }
            Err(e) => RespValue::error(format!("ERR save failed: {}", e)),
        }
    }

    /// `BGSAVE` — schedules a background snapshot.
    pub(crate) fn cmd_bgsave(&self, args: &[RespValue]) -> RespValue {
        if !args.is_empty() {
            return wrong_args("BGSAVE");
        }
        let Some(snapshotter) = &self.snapshotter else {
            return RespValue::error("ERR snapshots are disabled");
        };
        match snapshotter.spawn_background_save() {
            Ok(()) => RespValue::simple("Background saving started"),
            Err(SnapshotError::SaveInProgress) => {
                RespValue::error("ERR a save operation is already in progress")
            }
            Err(e) => RespValue::error(format!("ERR save failed: {}", e)),
        }
    }

    /// `LASTSAVE` — unix timestamp of the last successful snapshot.
    pub(crate) fn cmd_lastsave(&self, args: &[RespValue]) -> RespValue {
        if !args.is_empty() {
            return wrong_args("LASTSAVE");
        }
        match &self.snapshotter {
            Some(snapshotter) => RespValue::integer(snapshotter.last_save_unix()),
            None => RespValue::error("ERR snapshots are disabled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::CommandHandler;
    use crate::protocol::RespValue;
    use crate::snapshot::Snapshotter;
    use crate::storage::Keyspace;
    use bytes::Bytes;
    use std::sync::Arc;
    use tempfile::TempDir;

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

    fn info_text(reply: RespValue) -> String {
        match reply {
            RespValue::BulkString(b) => String::from_utf8_lossy(&b).to_string(),
            other => panic!("expected bulk string, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ping_echo() {
        let h = handler();
        assert_eq!(run(&h, &["PING"]).await, RespValue::simple("PONG"));
        assert_eq!(
            run(&h, &["PING", "hi"]).await,
            RespValue::bulk(Bytes::from("hi"))
        );
        assert_eq!(
            run(&h, &["ECHO", "hello"]).await,
            RespValue::bulk(Bytes::from("hello"))
        );
        assert!(run(&h, &["ECHO"]).await.is_error());
    }

    #[tokio::test]
    async fn dbsize_and_flushall() {
        let h = handler();
        run(&h, &["MSET", "a", "1", "b", "2"]).await;
        assert_eq!(run(&h, &["DBSIZE"]).await, RespValue::integer(2));

        assert_eq!(run(&h, &["FLUSHALL"]).await, RespValue::ok());
        assert_eq!(run(&h, &["DBSIZE"]).await, RespValue::integer(0));
    }

    #[tokio::test]
    async fn info_sections() {
        let h = handler();
        run(&h, &["SET", "k", "v"]).await;

        let all = info_text(run(&h, &["INFO"]).await);
        assert!(all.contains("# Server"));
        assert!(all.contains("# Persistence"));
        assert!(all.contains("# Memory"));
        assert!(all.contains("rdb_enabled:0"));
        assert!(all.contains("keys:1"));

        let memory = info_text(run(&h, &["INFO", "memory"]).await);
        assert!(memory.contains("keys:1"));
        assert!(!memory.contains("# Server"));

        assert!(run(&h, &["INFO", "bogus"]).await.is_error());
    }

    #[tokio::test]
    async fn persistence_commands_without_snapshotter() {
        let h = handler();
        assert!(run(&h, &["SAVE"]).await.is_error());
        assert!(run(&h, &["BGSAVE"]).await.is_error());
        assert!(run(&h, &["LASTSAVE"]).await.is_error());
    }

    #[tokio::test]
    async fn save_and_lastsave() {
        let dir = TempDir::new().unwrap();
        let keyspace = Arc::new(Keyspace::new());
        let snapshotter = Arc::new(Snapshotter::new(
            dir.path().join("dump.rdb"),
            Arc::clone(&keyspace),
        ));
        let h = CommandHandler::new(keyspace, Some(snapshotter));

        run(&h, &["SET", "k", "v"]).await;
        assert_eq!(run(&h, &["LASTSAVE"]).await, RespValue::integer(0));
        assert_eq!(run(&h, &["SAVE"]).await, RespValue::ok());
        match run(&h, &["LASTSAVE"]).await {
            RespValue::Integer(ts) => assert!(ts > 0),
            other => panic!("unexpected reply {:?}", other),
        }

        let info = info_text(run(&h, &["INFO", "persistence"]).await);
        assert!(info.contains("rdb_enabled:1"));
        assert!(info.contains("rdb_total_saves:1"));
        assert!(info.contains("rdb_changes_since_last_save:0"));
    }

    #[tokio::test]
    async fn bgsave_writes_file() {
        let dir = TempDir::new().unwrap();
        let keyspace = Arc::new(Keyspace::new());
        let snapshotter = Arc::new(Snapshotter::new(
            dir.path().join("dump.rdb"),
            Arc::clone(&keyspace),
        ));
        let h = CommandHandler::new(keyspace, Some(snapshotter));

        run(&h, &["SET", "k", "v"]).await;
        assert_eq!(
            run(&h, &["BGSAVE"]).await,
            RespValue::simple("Background saving started")
        );

        // Give the spawned save a moment to land.
        for _ in 0..50 {
            if dir.path().join("dump.rdb").exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(dir.path().join("dump.rdb").exists());
    }
}
