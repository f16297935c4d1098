use std::sync::Arc;

use chrono::Utc;
use monsync_deps::{insert_object_dependencies, RelationAccumulator};
use monsync_domain::ident::object_identifier;
use monsync_domain::repository::{DomainEvent, ObjectRepository};
use monsync_domain::types::{ConfigObject, ObjectKind, ObjectName};
use tracing::{debug, warn};

use crate::serialize::{prepare_object, serialize_state};
use crate::writer::Writer;

const CONFIG_UPDATE_CHANNEL: &str = "icinga:config:update";
const CONFIG_DELETE_CHANNEL: &str = "icinga:config:delete";

fn accumulator_into_commands(acc: RelationAccumulator) -> Vec<Vec<String>> {
    let mut commands = Vec::new();
    for (hash, pairs) in acc.hmsets {
        let mut cmd = vec!["HMSET".to_string(), hash];
        for (field, value) in pairs {
            cmd.push(field);
            cmd.push(value);
        }
        commands.push(cmd);
    }
    for (channel, messages) in acc.publishes {
        for message in messages {
            commands.push(vec!["PUBLISH".to_string(), channel.clone(), message]);
        }
    }
    commands
}

/// Builds the attribute/checksum/relation/state write for one object,
/// matching `CreateConfigUpdate` followed by the checkable state `HSET`.
/// Returns an empty vector for an unrecognised object kind.
fn build_config_update_commands(
    writer: &Writer,
    object: &ConfigObject,
    check_command_timeout: Option<f64>,
    runtime_update: bool,
) -> Vec<Vec<String>> {
    let Some((attrs, checksum)) = prepare_object(object, &writer.env_id) else {
        return Vec::new();
    };

    let type_name = object.row_typename();
    let object_key = object_identifier(object.name().as_str());

    let mut acc = RelationAccumulator::new();
    if let Err(err) = insert_object_dependencies(
        object,
        &type_name,
        &writer.env_id,
        &writer.config_prefix,
        &writer.checksum_prefix,
        runtime_update,
        &mut acc,
    ) {
        warn!(%err, %type_name, "failed to emit object dependencies");
    }

    let mut commands = accumulator_into_commands(acc);

    commands.push(vec![
        "HSET".to_string(),
        format!("{}{type_name}", writer.config_prefix),
        object_key.clone(),
        attrs.to_string(),
    ]);
    commands.push(vec![
        "HSET".to_string(),
        format!("{}{type_name}", writer.checksum_prefix),
        object_key.clone(),
        checksum.to_string(),
    ]);

    if let Some(state) = serialize_state(object, &writer.env_id, check_command_timeout, Utc::now()) {
        commands.push(vec![
            "HSET".to_string(),
            format!("{}{type_name}", writer.state_prefix),
            object_key.clone(),
            state.to_string(),
        ]);
    }

    if runtime_update {
        commands.push(vec![
            "PUBLISH".to_string(),
            CONFIG_UPDATE_CHANNEL.to_string(),
            format!("{type_name}:{object_key}"),
        ]);
    }

    commands
}

/// Resolves a checkable's check command timeout from `repository` so
/// `serialize_state` doesn't need graph access of its own.
async fn resolve_check_command_timeout(repository: &ObjectRepository, object: &ConfigObject) -> Option<f64> {
    let command_name = match object {
        ConfigObject::Host(h) => &h.config.check_command,
        ConfigObject::Service(s) => &s.config.check_command,
        _ => return None,
    };
    let command = repository.get(ObjectKind::CheckCommand, command_name).await?;
    match command {
        ConfigObject::CheckCommand(c) => Some(c.timeout),
        _ => None,
    }
}

/// Flattens and enqueues an atomic batch for one object's config (and, for
/// checkables, state) write. A no-op when the writer has no live
/// connection — state converges on the next dump instead.
pub async fn send_config_update(writer: &Writer, repository: &ObjectRepository, object: &ConfigObject, runtime_update: bool) {
    if !writer.connection.is_connected() {
        return;
    }
    let timeout = resolve_check_command_timeout(repository, object).await;
    let commands = build_config_update_commands(writer, object, timeout, runtime_update);
    if commands.is_empty() {
        return;
    }
    debug!(object = %object.name(), "enqueueing config update");
    writer.connection.fire_and_forget_batch(commands).await;
}

/// Enqueues the three-command delete sequence for one object.
pub async fn send_config_delete(writer: &Writer, object: &ConfigObject) {
    let type_name = object.row_typename();
    let object_key = object_identifier(object.name().as_str());
    let commands = vec![
        vec!["HDEL".to_string(), format!("{}{type_name}", writer.config_prefix), object_key.clone()],
        vec!["DEL".to_string(), format!("{}{type_name}:{object_key}", writer.state_prefix)],
        vec![
            "PUBLISH".to_string(),
            CONFIG_DELETE_CHANNEL.to_string(),
            format!("{type_name}:{object_key}"),
        ],
    ];
    debug!(object = %object.name(), "enqueueing config delete");
    writer.connection.fire_and_forget_batch(commands).await;
}

fn checkable_stream_name(object: &ConfigObject) -> Option<&'static str> {
    match object {
        ConfigObject::Host(_) => Some("icinga:state:stream:host"),
        ConfigObject::Service(_) => Some("icinga:state:stream:service"),
        _ => None,
    }
}

/// Appends a flattened-state entry to the per-kind status stream. A no-op
/// for non-checkables or when disconnected.
pub async fn send_status_update(writer: &Writer, repository: &ObjectRepository, object: &ConfigObject) {
    if !writer.connection.is_connected() {
        return;
    }
    let Some(stream) = checkable_stream_name(object) else { return };
    let timeout = resolve_check_command_timeout(repository, object).await;
    let Some(state) = serialize_state(object, &writer.env_id, timeout, Utc::now()) else {
        return;
    };
    let Some(fields) = state.as_object() else { return };

    let mut cmd = vec!["XADD".to_string(), stream.to_string(), "*".to_string()];
    for (key, value) in fields {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        cmd.push(key.clone());
        cmd.push(monsync_domain::ident::validate_utf8_lossy(&rendered));
    }
    debug!(object = %object.name(), "enqueueing status update");
    writer.connection.fire_and_forget(cmd).await;
}

async fn dispatch(writer: &Arc<Writer>, repository: &Arc<ObjectRepository>, event: DomainEvent) {
    match event {
        DomainEvent::StateChange(object) | DomainEvent::AcknowledgementCleared(object) => {
            let inner_writer = writer.clone();
            let inner_repository = repository.clone();
            writer
                .queue
                .enqueue(async move {
                    send_status_update(&inner_writer, &inner_repository, &object).await;
                    Ok(())
                })
                .await;
        }
        DomainEvent::ActiveChanged(object) | DomainEvent::VersionChanged(object) => {
            if object.meta().active {
                let inner_writer = writer.clone();
                let inner_repository = repository.clone();
                writer
                    .queue
                    .enqueue(async move {
                        send_config_update(&inner_writer, &inner_repository, &object, true).await;
                        Ok(())
                    })
                    .await;
            } else {
                let inner_writer = writer.clone();
                writer
                    .queue
                    .enqueue(async move {
                        send_config_delete(&inner_writer, &object).await;
                        Ok(())
                    })
                    .await;
            }
        }
        DomainEvent::DowntimeStarted(downtime)
        | DomainEvent::DowntimeTriggered(downtime)
        | DomainEvent::DowntimeRemoved(downtime) => {
            let kind = if downtime.service.is_some() { ObjectKind::Service } else { ObjectKind::Host };
            let name = ObjectName::new(downtime.host.as_str());
            if let Some(checkable) = repository.get(kind, &name).await {
                let inner_writer = writer.clone();
                let inner_repository = repository.clone();
                writer
                    .queue
                    .enqueue(async move {
                        send_status_update(&inner_writer, &inner_repository, &checkable).await;
                        Ok(())
                    })
                    .await;
            }
        }
    }
}

/// Runs forever, draining `repository`'s lifecycle events onto `writer`'s
/// work queue. Exits once the repository's broadcast channel closes.
pub async fn run_event_router(writer: Arc<Writer>, repository: Arc<ObjectRepository>) {
    let mut events = repository.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => dispatch(&writer, &repository, event).await,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event router lagged, some lifecycle events were dropped");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monsync_conn::InMemoryConnection;
    use monsync_config::WriterConfig;
    use monsync_domain::types::{CheckableConfig, CheckableState, CheckResult, Host, ObjectMeta};

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
    async fn send_config_update_writes_attrs_checksum_and_publishes() {
        let conn = Arc::new(InMemoryConnection::new());
        let writer = Writer::new(&WriterConfig::default(), conn.clone());
        let repo = ObjectRepository::new();
        let h = host("h1");

        send_config_update(&writer, &repo, &h, true).await;

        let id = object_identifier("h1");
        assert!(conn.hash_field("icinga:config:host", &id).await.is_some());
        assert!(conn.hash_field("icinga:config:checksum:host", &id).await.is_some());
        let published = conn.published("icinga:config:update").await;
        assert!(published.iter().any(|m| m == &format!("host:{id}")));
    }

    #[tokio::test]
    async fn send_config_update_is_noop_when_disconnected() {
        let conn = Arc::new(InMemoryConnection::new());
        conn.set_connected(false);
        let writer = Writer::new(&WriterConfig::default(), conn.clone());
        let repo = ObjectRepository::new();
        let h = host("h1");

        send_config_update(&writer, &repo, &h, true).await;

        assert!(conn.hash("icinga:config:host").await.is_empty());
    }

    #[tokio::test]
    async fn send_config_delete_removes_config_and_state_and_publishes() {
        let conn = Arc::new(InMemoryConnection::new());
        let writer = Writer::new(&WriterConfig::default(), conn.clone());
        let h = host("h1");
        let id = object_identifier("h1");

        send_config_update(&writer, &ObjectRepository::new(), &h, false).await;
        assert!(conn.hash_field("icinga:config:host", &id).await.is_some());

        send_config_delete(&writer, &h).await;

        assert!(conn.hash_field("icinga:config:host", &id).await.is_none());
        assert!(conn.hash_field("icinga:state:host", &id).await.is_none());
        let published = conn.published("icinga:config:delete").await;
        assert!(published.iter().any(|m| m == &format!("host:{id}")));
    }

    #[tokio::test]
    async fn send_status_update_appends_to_host_stream() {
        let conn = Arc::new(InMemoryConnection::new());
        let writer = Writer::new(&WriterConfig::default(), conn.clone());
        let repo = ObjectRepository::new();
        let mut h = host("h1");
        if let ConfigObject::Host(ref mut inner) = h {
            inner.state.last_check_result = Some(CheckResult { output: "ok".into(), ..Default::default() });
        }

        send_status_update(&writer, &repo, &h).await;

        let entries = conn.stream("icinga:state:stream:host").await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].1.iter().any(|(k, v)| k == "output" && v == "ok"));
    }

    #[tokio::test]
    async fn active_changed_event_with_inactive_object_enqueues_delete() {
        let conn = Arc::new(InMemoryConnection::new());
        let writer = Writer::new(&WriterConfig::default(), conn.clone());
        let repo = Arc::new(ObjectRepository::new());
        repo.upsert(host("h1")).await;
        send_config_update(&writer, &repo, &host("h1"), false).await;

        let handle = writer.attach(repo.clone());
        repo.deactivate(ObjectKind::Host, &ObjectName::new("h1")).await.unwrap();
        writer.queue.join().await;

        let id = object_identifier("h1");
        let mut attempts = 0;
        while conn.hash_field("icinga:config:host", &id).await.is_some() && attempts < 50 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            attempts += 1;
        }
        assert!(conn.hash_field("icinga:config:host", &id).await.is_none());
        handle.abort();
    }
}
