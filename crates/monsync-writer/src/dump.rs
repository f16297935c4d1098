use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use monsync_deps::{insert_object_dependencies, RelationAccumulator};
use monsync_domain::ident::object_identifier;
use monsync_domain::repository::ObjectRepository;
use monsync_domain::types::{ConfigObject, ObjectKind};
use tracing::{error, info};

use crate::queue::WorkQueue;
use crate::serialize::{prepare_object, serialize_state};
use crate::writer::Writer;

const DUMP_STREAM: &str = "icinga:dump";

/// Outcome of one `update_all_config_objects` run.
#[derive(Debug, Clone)]
pub struct DumpReport {
    pub started_at: DateTime<Utc>,
    pub duration: std::time::Duration,
    pub per_type_counts: BTreeMap<String, usize>,
    pub exceptions: Vec<String>,
}

struct TypeSpec {
    typename: &'static str,
    kind: ObjectKind,
    is_service: Option<bool>,
}

fn type_specs() -> Vec<TypeSpec> {
    let mut specs = Vec::new();
    for kind in ObjectKind::all() {
        match kind {
            ObjectKind::Comment => {
                specs.push(TypeSpec { typename: "hostcomment", kind: *kind, is_service: Some(false) });
                specs.push(TypeSpec { typename: "servicecomment", kind: *kind, is_service: Some(true) });
            }
            ObjectKind::Downtime => {
                specs.push(TypeSpec { typename: "hostdowntime", kind: *kind, is_service: Some(false) });
                specs.push(TypeSpec { typename: "servicedowntime", kind: *kind, is_service: Some(true) });
            }
            other => specs.push(TypeSpec { typename: other.reflection_name(), kind: *other, is_service: None }),
        }
    }
    specs
}

fn matches_spec(object: &ConfigObject, spec: &TypeSpec) -> bool {
    if object.kind() != spec.kind {
        return false;
    }
    match (object, spec.is_service) {
        (ConfigObject::Comment(c), Some(wants_service)) => c.is_service_comment() == wants_service,
        (ConfigObject::Downtime(d), Some(wants_service)) => d.is_service_downtime() == wants_service,
        _ => true,
    }
}

/// Relation hash suffixes that might exist for a kind, used to scope the
/// pre-dump delete to exactly the hashes that kind can populate.
fn relation_suffixes(kind: ObjectKind) -> &'static [&'static str] {
    match kind {
        ObjectKind::Host | ObjectKind::Service => &["customvar", "groupmember"],
        ObjectKind::User => &["customvar", "groupmember"],
        ObjectKind::TimePeriod => &["range", "override:include", "override:exclude"],
        ObjectKind::Zone => &["parent"],
        ObjectKind::Notification => &["user", "usergroup"],
        ObjectKind::CheckCommand | ObjectKind::NotificationCommand | ObjectKind::EventCommand => {
            &["argument", "envvar"]
        }
        _ => &[],
    }
}

async fn delete_type_hashes(writer: &Writer, spec: &TypeSpec) {
    let t = spec.typename;
    let mut keys = vec![
        format!("{}{t}", writer.config_prefix),
        format!("{}{t}", writer.checksum_prefix),
    ];
    for suffix in relation_suffixes(spec.kind) {
        keys.push(format!("{}{t}:{suffix}", writer.config_prefix));
        keys.push(format!("{}{t}:{suffix}", writer.checksum_prefix));
    }
    if matches!(spec.kind, ObjectKind::Host | ObjectKind::Service | ObjectKind::User) {
        keys.push(format!("{}{t}", writer.state_prefix));
    }
    for key in keys {
        writer.connection.fire_and_forget(vec!["DEL".to_string(), key]).await;
    }
}

async fn delete_global_hashes(writer: &Writer) {
    for name in ["customvar", "action_url", "notes_url", "icon_image"] {
        writer
            .connection
            .fire_and_forget(vec!["DEL".to_string(), format!("{}{name}", writer.config_prefix)])
            .await;
    }
}

async fn reset_dump_stream(writer: &Writer) {
    writer
        .connection
        .fire_and_forget(vec![
            "EVAL".to_string(),
            monsync_conn::RESET_DUMP_SCRIPT.to_string(),
            "1".to_string(),
            DUMP_STREAM.to_string(),
        ])
        .await;
}

fn object_write_commands(writer: &Writer, object: &ConfigObject, typename: &str, states: &mut Vec<(String, String)>) -> Vec<Vec<String>> {
    let mut commands = Vec::new();
    let Some((attrs, checksum)) = prepare_object(object, &writer.env_id) else {
        return commands;
    };
    let object_key = object_identifier(object.name().as_str());

    let mut acc = RelationAccumulator::new();
    if let Err(err) = insert_object_dependencies(object, typename, &writer.env_id, &writer.config_prefix, &writer.checksum_prefix, false, &mut acc) {
        tracing::warn!(%err, object = %object.name(), "failed to emit object dependencies during dump");
    }
    for (hash, pairs) in acc.hmsets {
        let mut cmd = vec!["HMSET".to_string(), hash];
        for (field, value) in pairs {
            cmd.push(field);
            cmd.push(value);
        }
        commands.push(cmd);
    }

    commands.push(vec!["HSET".to_string(), format!("{}{typename}", writer.config_prefix), object_key.clone(), attrs.to_string()]);
    commands.push(vec!["HSET".to_string(), format!("{}{typename}", writer.checksum_prefix), object_key.clone(), checksum.to_string()]);

    if matches!(object, ConfigObject::Host(_) | ConfigObject::Service(_)) {
        if let Some(state) = serialize_state(object, &writer.env_id, None, Utc::now()) {
            states.push((object_key, state.to_string()));
        }
    }

    commands
}

/// Dumps every active object matching `spec`, split into batches of
/// `writer.chunk_size` and handed to a nested [`WorkQueue`] so chunks of the
/// same type are written concurrently, each flushing an atomic batch every
/// `writer.flush_every` objects.
async fn dump_type(writer: &Arc<Writer>, repository: &ObjectRepository, spec: &TypeSpec) -> usize {
    delete_type_hashes(writer, spec).await;

    let objects: Vec<ConfigObject> = repository
        .of_kind(spec.kind)
        .await
        .into_iter()
        .filter(|o| o.meta().active && matches_spec(o, spec))
        .collect();
    let count = objects.len();

    let chunks: Vec<Vec<ConfigObject>> = objects.chunks(writer.chunk_size).map(|c| c.to_vec()).collect();
    if !chunks.is_empty() {
        let chunk_queue = WorkQueue::new(chunks.len(), writer.concurrency);
        let writer = writer.clone();
        let typename = spec.typename;
        chunk_queue
            .parallel_for(chunks, move |chunk| {
                let writer = writer.clone();
                async move {
                    dump_chunk(&writer, typename, &chunk).await;
                    Ok(())
                }
            })
            .await;
    }

    writer
        .connection
        .fire_and_forget(vec![
            "XADD".to_string(),
            DUMP_STREAM.to_string(),
            "*".to_string(),
            "type".to_string(),
            spec.typename.to_string(),
            "state".to_string(),
            "done".to_string(),
        ])
        .await;

    count
}

/// Processes one chunk of objects: builds their write commands, flushing an
/// atomic batch every `writer.flush_every` objects.
async fn dump_chunk(writer: &Writer, typename: &str, chunk: &[ConfigObject]) {
    let mut batch: Vec<Vec<String>> = Vec::new();
    let mut states: Vec<(String, String)> = Vec::new();
    let mut since_flush = 0usize;

    for object in chunk {
        batch.extend(object_write_commands(writer, object, typename, &mut states));
        since_flush += 1;

        if since_flush >= writer.flush_every {
            flush_chunk(writer, typename, &mut batch, &mut states).await;
            since_flush = 0;
        }
    }
    flush_chunk(writer, typename, &mut batch, &mut states).await;
}

/// Sends whatever is pending in `batch`/`states` as one atomic pipelined
/// batch, leaving both empty afterward. A no-op when nothing is pending.
async fn flush_chunk(writer: &Writer, typename: &str, batch: &mut Vec<Vec<String>>, states: &mut Vec<(String, String)>) {
    if !states.is_empty() {
        let mut cmd = vec!["HMSET".to_string(), format!("{}{typename}", writer.state_prefix)];
        for (key, value) in states.drain(..) {
            cmd.push(key);
            cmd.push(value);
        }
        batch.push(cmd);
    }
    if batch.is_empty() {
        return;
    }
    let commands = std::mem::take(batch);
    writer.connection.fire_and_forget_batch(commands).await;
}

/// Implements the full re-dump: atomic stream reset, global-hash cleanup,
/// then one parallel pass per typename that deletes-then-repopulates that
/// type's hashes. Worker failures are collected rather than aborting the
/// dump; the final `done` marker is always emitted.
pub async fn update_all_config_objects(writer: &Arc<Writer>, repository: Arc<ObjectRepository>) -> DumpReport {
    let started_at = Utc::now();
    let start_instant = std::time::Instant::now();

    reset_dump_stream(writer).await;
    delete_global_hashes(writer).await;

    let specs = type_specs();
    let counts = Arc::new(tokio::sync::Mutex::new(BTreeMap::new()));

    let inner_queue = WorkQueueHandle::new(writer.clone(), repository, counts.clone());
    inner_queue.run(specs).await;

    let exceptions = writer.queue.exceptions().await;
    for exception in &exceptions {
        error!(%exception, "dump worker failed");
    }

    writer
        .connection
        .fire_and_forget(vec![
            "XADD".to_string(),
            DUMP_STREAM.to_string(),
            "*".to_string(),
            "type".to_string(),
            "*".to_string(),
            "state".to_string(),
            "done".to_string(),
        ])
        .await;

    let per_type_counts = counts.lock().await.clone();
    info!(types = per_type_counts.len(), duration_ms = start_instant.elapsed().as_millis(), "dump complete");

    DumpReport {
        started_at,
        duration: start_instant.elapsed(),
        per_type_counts,
        exceptions,
    }
}

struct WorkQueueHandle {
    writer: Arc<Writer>,
    repository: Arc<ObjectRepository>,
    counts: Arc<tokio::sync::Mutex<BTreeMap<String, usize>>>,
}

impl WorkQueueHandle {
    fn new(writer: Arc<Writer>, repository: Arc<ObjectRepository>, counts: Arc<tokio::sync::Mutex<BTreeMap<String, usize>>>) -> Self {
        WorkQueueHandle { writer, repository, counts }
    }

    async fn run(&self, specs: Vec<TypeSpec>) {
        for spec in specs {
            let writer = self.writer.clone();
            let repository = self.repository.clone();
            let counts = self.counts.clone();
            self.writer
                .queue
                .enqueue(async move {
                    let typename = spec.typename.to_string();
                    let count = dump_type(&writer, &repository, &spec).await;
                    counts.lock().await.insert(typename, count);
                    Ok(())
                })
                .await;
        }
        self.writer.queue.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monsync_conn::InMemoryConnection;
    use monsync_config::WriterConfig;
    use monsync_domain::types::{CheckableConfig, CheckableState, Host, ObjectMeta};

    fn host(name: &str) -> ConfigObject {
        ConfigObject::Host(Host {
            meta: ObjectMeta::new(name),
            config: CheckableConfig::default(),
            state: CheckableState::default(),
            address: "10.0.0.1".into(),
            address6: String::new(),
        })
    }

    #[tokio::test]
    async fn dump_populates_host_hash_and_emits_done_markers() {
        let conn = Arc::new(InMemoryConnection::new());
        let writer = Writer::new(&WriterConfig::default(), conn.clone());
        let repository = Arc::new(ObjectRepository::new());
        repository.upsert(host("h1")).await;
        repository.upsert(host("h2")).await;

        let report = update_all_config_objects(&writer, repository).await;

        assert_eq!(report.per_type_counts.get("host"), Some(&2));
        let hash = conn.hash("icinga:config:host").await;
        assert_eq!(hash.len(), 2);
        assert!(hash.contains_key(&object_identifier("h1")));

        let stream = conn.stream(DUMP_STREAM).await;
        assert!(stream.iter().any(|(_, fields)| fields.iter().any(|(k, v)| k == "type" && v == "host")));
        assert!(stream.iter().any(|(_, fields)| fields.iter().any(|(k, v)| k == "type" && v == "*")));
    }

    #[tokio::test]
    async fn dump_writes_host_state_hash() {
        let conn = Arc::new(InMemoryConnection::new());
        let writer = Writer::new(&WriterConfig::default(), conn.clone());
        let repository = Arc::new(ObjectRepository::new());
        repository.upsert(host("h1")).await;

        update_all_config_objects(&writer, repository).await;

        let id = object_identifier("h1");
        assert!(conn.hash_field("icinga:state:host", &id).await.is_some());
    }

    #[tokio::test]
    async fn dump_deletes_stale_entries_from_a_previous_run() {
        let conn = Arc::new(InMemoryConnection::new());
        let writer = Writer::new(&WriterConfig::default(), conn.clone());
        let repository = Arc::new(ObjectRepository::new());
        repository.upsert(host("h1")).await;
        update_all_config_objects(&writer, repository.clone()).await;

        repository.deactivate(ObjectKind::Host, &monsync_domain::types::ObjectName::new("h1")).await.unwrap();
        repository.upsert(host("h2")).await;
        update_all_config_objects(&writer, repository).await;

        let hash = conn.hash("icinga:config:host").await;
        assert_eq!(hash.len(), 1);
        assert!(hash.contains_key(&object_identifier("h2")));
    }
}
