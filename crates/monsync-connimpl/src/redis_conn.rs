use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use monsync_conn::{Command, Connection};
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{debug, warn};

use crate::error::RedisConnError;

/// Pipelined Redis [`Connection`] backed by `redis`'s auto-reconnecting
/// [`ConnectionManager`]. Commands are translated verbatim: the first
/// element of a [`Command`] is the verb, the rest its arguments.
#[derive(Clone)]
pub struct RedisConnection {
    manager: ConnectionManager,
    connected: Arc<AtomicBool>,
}

impl RedisConnection {
    pub async fn connect(url: &str) -> Result<Self, RedisConnError> {
        let client = Client::open(url).map_err(RedisConnError::ClientBuild)?;
        let manager = client.get_connection_manager().await?;
        Ok(RedisConnection {
            manager,
            connected: Arc::new(AtomicBool::new(true)),
        })
    }

    fn to_redis_cmd(cmd: &Command) -> Option<redis::Cmd> {
        let (verb, args) = cmd.split_first()?;
        let mut redis_cmd = redis::cmd(verb);
        for arg in args {
            redis_cmd.arg(arg);
        }
        Some(redis_cmd)
    }
}

#[async_trait]
impl Connection for RedisConnection {
    async fn fire_and_forget(&self, cmd: Command) {
        let Some(redis_cmd) = Self::to_redis_cmd(&cmd) else {
            return;
        };
        let mut conn = self.manager.clone();
        if let Err(err) = redis_cmd.query_async::<_, ()>(&mut conn).await {
            self.connected.store(false, Ordering::SeqCst);
            warn!(%err, command = ?cmd, "redis command failed");
        } else {
            self.connected.store(true, Ordering::SeqCst);
        }
    }

    async fn fire_and_forget_batch(&self, cmds: Vec<Command>) {
        if cmds.is_empty() {
            return;
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for cmd in &cmds {
            if let Some(redis_cmd) = Self::to_redis_cmd(cmd) {
                pipe.add_command(redis_cmd);
            }
        }
        let mut conn = self.manager.clone();
        match pipe.query_async::<_, ()>(&mut conn).await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                debug!(batch_len = cmds.len(), "redis batch applied");
            }
            Err(err) => {
                self.connected.store(false, Ordering::SeqCst);
                warn!(%err, batch_len = cmds.len(), "redis batch failed");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
