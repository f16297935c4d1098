use std::sync::{Arc, Mutex, OnceLock, Weak};

use monsync_conn::Connection;
use monsync_config::WriterConfig;
use monsync_domain::ident::object_identifier;
use monsync_domain::repository::ObjectRepository;

use crate::events::run_event_router;
use crate::queue::WorkQueue;

fn registry() -> &'static Mutex<Vec<Weak<Writer>>> {
    static REGISTRY: OnceLock<Mutex<Vec<Weak<Writer>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// One synchronizer instance: a connection, the remote key prefixes and
/// environment identity it writes under, and the work queue every dump or
/// event handler enqueues onto. Replaces the original's static module-init
/// registration with an explicit [`Writer::new`] plus a process-wide weak
/// registry any caller can enumerate via [`Writer::instances`].
pub struct Writer {
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) config_prefix: String,
    pub(crate) checksum_prefix: String,
    pub(crate) state_prefix: String,
    pub(crate) environment: String,
    pub(crate) env_id: String,
    pub(crate) chunk_size: usize,
    pub(crate) flush_every: usize,
    pub(crate) concurrency: usize,
    pub queue: WorkQueue,
}

impl Writer {
    pub fn new(config: &WriterConfig, connection: Arc<dyn Connection>) -> Arc<Writer> {
        let writer = Arc::new(Writer {
            connection,
            config_prefix: config.config_prefix.clone(),
            checksum_prefix: config.checksum_prefix.clone(),
            state_prefix: config.state_prefix.clone(),
            environment: config.environment.clone(),
            env_id: object_identifier(&config.environment),
            chunk_size: config.chunk_size,
            flush_every: config.flush_every,
            concurrency: config.concurrency,
            queue: WorkQueue::new(config.concurrency * 4, config.concurrency),
        });
        registry().lock().expect("registry poisoned").push(Arc::downgrade(&writer));
        writer
    }

    /// Subscribes to `repository`'s lifecycle events and starts the event
    /// router task that enqueues matching `send_*` calls onto this writer's
    /// queue. The router runs for as long as the returned handle is kept or
    /// the repository outlives it; dropping neither is required for
    /// correctness, only for a clean shutdown.
    pub fn attach(self: &Arc<Self>, repository: Arc<ObjectRepository>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(run_event_router(self.clone(), repository))
    }

    pub fn env_id(&self) -> &str {
        &self.env_id
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Live instances registered via [`Writer::new`] that haven't been
    /// dropped yet.
    pub fn instances() -> Vec<Arc<Writer>> {
        registry()
            .lock()
            .expect("registry poisoned")
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monsync_conn::InMemoryConnection;

    #[test]
    fn new_derives_env_id_from_environment_name() {
        let config = WriterConfig {
            environment: "prod".to_string(),
            ..WriterConfig::default()
        };
        let writer = Writer::new(&config, Arc::new(InMemoryConnection::new()));
        assert_eq!(writer.env_id(), object_identifier("prod"));
    }

    #[test]
    fn new_registers_the_instance_for_enumeration() {
        let config = WriterConfig::default();
        let writer = Writer::new(&config, Arc::new(InMemoryConnection::new()));
        assert!(Writer::instances().iter().any(|w| Arc::ptr_eq(w, &writer)));
    }
}
