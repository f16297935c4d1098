use async_trait::async_trait;

/// A command is a verb plus its arguments, e.g. `["HSET", "icinga:config:host", "id", "{...}"]`.
pub type Command = Vec<String>;

/// Atomically rewinds a dump stream to a single `wip` marker: appends a new
/// `wip` entry then deletes every entry that preceded it, returning the new
/// entry id. Issued through [`Connection::fire_and_forget`] as an `EVAL`
/// command against the dump stream key (`KEYS[1]`); shared here so both the
/// real Redis connection and anything reasoning about dump atomicity refer
/// to the same literal script.
pub const RESET_DUMP_SCRIPT: &str = r#"
local id = redis.call('XADD', KEYS[1], '*', 'type', '*', 'state', 'wip')

local xr = redis.call('XRANGE', KEYS[1], '-', '+')
for i = 1, #xr - 1 do
	redis.call('XDEL', KEYS[1], xr[i][1])
end

return id
"#;

/// Thin wrapper over a Redis-compatible pipelined connection. Both methods
/// are non-blocking for the caller beyond an internal bounded queue; at-most-
/// once delivery per enqueue, best-effort ordering within one connection.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Enqueues a single command. Never waits for the remote's reply.
    async fn fire_and_forget(&self, cmd: Command);

    /// Enqueues a sequence of commands such that no other enqueued work
    /// interleaves between them — used to frame `MULTI … EXEC` blocks.
    async fn fire_and_forget_batch(&self, cmds: Vec<Command>);

    fn is_connected(&self) -> bool;
}
