use serde_json::json;

use monsync_domain::ident::{checksum_array, hash_value, object_identifier};
use monsync_domain::types::{CheckableConfig, ConfigObject};

use crate::accumulator::RelationAccumulator;
use crate::error::DepsError;

const UPDATE_CHANNEL: &str = "icinga:config:update";

fn row_id(parts: &[&str]) -> Result<String, DepsError> {
    checksum_array(parts).map_err(|source| DepsError::Encode {
        relation: "row_id".to_string(),
        source,
    })
}

fn encode<T: serde::Serialize>(relation: &str, value: &T) -> Result<String, DepsError> {
    serde_json::to_string(value).map_err(|source| DepsError::Encode {
        relation: relation.to_string(),
        source,
    })
}

/// Flattens one object's relationships into `acc`. Mirrors
/// `InsertObjectDependencies`: customvars are always emitted first, then a
/// type-specific block. `runtime_update` controls whether each emission
/// also appends a summary string onto the config-update channel.
pub fn insert_object_dependencies(
    object: &ConfigObject,
    type_name: &str,
    env_id: &str,
    config_prefix: &str,
    checksum_prefix: &str,
    runtime_update: bool,
    acc: &mut RelationAccumulator,
) -> Result<(), DepsError> {
    let object_key = object_identifier(object.name().as_str());

    emit_customvars(object, type_name, env_id, &object_key, config_prefix, checksum_prefix, runtime_update, acc)?;

    match object {
        ConfigObject::Host(h) => {
            emit_checkable_relations(&h.config, type_name, env_id, &object_key, config_prefix, checksum_prefix, runtime_update, acc)?;
        }
        ConfigObject::Service(s) => {
            emit_checkable_relations(&s.config, type_name, env_id, &object_key, config_prefix, checksum_prefix, runtime_update, acc)?;
        }
        ConfigObject::TimePeriod(tp) => {
            for (k, v) in &tp.ranges {
                let range_id = row_id(&[env_id, k, v])?;
                let row = row_id(&[env_id, &range_id, &object_key])?;
                let payload = encode(
                    "range",
                    &json!({"object_id": object_key, "range_key": k, "range_value": v}),
                )?;
                acc.push(format!("{config_prefix}timeperiod:range"), row.clone(), payload);
                if runtime_update {
                    acc.publish(UPDATE_CHANNEL, format!("timeperiod:range:{row}"));
                }
            }
            let ranges_checksum = hash_value(&tp.ranges).map_err(|source| DepsError::Encode {
                relation: "range".to_string(),
                source,
            })?;
            acc.push(
                format!("{checksum_prefix}timeperiod:range"),
                object_key.clone(),
                encode("range", &json!({"checksum": ranges_checksum}))?,
            );

            emit_override_list(&tp.includes, "include", type_name, env_id, &object_key, config_prefix, checksum_prefix, runtime_update, acc)?;
            emit_override_list(&tp.excludes, "exclude", type_name, env_id, &object_key, config_prefix, checksum_prefix, runtime_update, acc)?;
        }
        ConfigObject::Zone(z) => {
            for parent in &z.all_parents {
                let parent_id = object_identifier(parent.as_str());
                let row = row_id(&[env_id, &parent_id, &object_key])?;
                let payload = encode("parent", &json!({"object_id": object_key, "parent_id": parent_id}))?;
                acc.push(format!("{config_prefix}zone:parent"), row.clone(), payload);
                if runtime_update {
                    acc.publish(UPDATE_CHANNEL, format!("zone:parent:{row}"));
                }
            }
            let all_parent_ids: Vec<String> = z.all_parents.iter().map(|p| object_identifier(p.as_str())).collect();
            let checksum = hash_value(&all_parent_ids).map_err(|source| DepsError::Encode {
                relation: "parent".to_string(),
                source,
            })?;
            acc.push(
                format!("{checksum_prefix}zone:parent"),
                object_key.clone(),
                encode("parent", &json!({"checksum": checksum}))?,
            );
        }
        ConfigObject::User(u) => {
            emit_group_membership(&u.groups, "user", "groupmember", env_id, &object_key, config_prefix, checksum_prefix, runtime_update, acc)?;
        }
        ConfigObject::Notification(n) => {
            emit_group_membership(&n.users, "notification", "user", env_id, &object_key, config_prefix, checksum_prefix, runtime_update, acc)?;
            emit_group_membership(&n.user_groups, "notification", "usergroup", env_id, &object_key, config_prefix, checksum_prefix, runtime_update, acc)?;
        }
        ConfigObject::CheckCommand(cmd) | ConfigObject::NotificationCommand(cmd) | ConfigObject::EventCommand(cmd) => {
            emit_command_values(&cmd.arguments, "argument", type_name, env_id, &object_key, config_prefix, checksum_prefix, runtime_update, acc)?;
            emit_command_values(&cmd.env, "envvar", type_name, env_id, &object_key, config_prefix, checksum_prefix, runtime_update, acc)?;
        }
        _ => {}
    }

    Ok(())
}

fn emit_customvars(
    object: &ConfigObject,
    type_name: &str,
    env_id: &str,
    object_key: &str,
    config_prefix: &str,
    checksum_prefix: &str,
    runtime_update: bool,
    acc: &mut RelationAccumulator,
) -> Result<(), DepsError> {
    let Some(vars) = object.vars() else { return Ok(()) };
    for (k, v) in vars {
        let value_json = encode("customvar", v)?;
        acc.push(format!("{config_prefix}customvar"), k.clone(), value_json);

        let row = row_id(&[env_id, k, object_key])?;
        let row_payload = encode("customvar", &json!({"object_id": object_key, "env_id": env_id, "customvar_id": k}))?;
        acc.push(format!("{config_prefix}{type_name}:customvar"), row.clone(), row_payload);

        let checksum = hash_value(v).map_err(|source| DepsError::Encode {
            relation: "customvar".to_string(),
            source,
        })?;
        acc.push(
            format!("{checksum_prefix}{type_name}:customvar"),
            object_key.to_string(),
            encode("customvar", &json!({"checksum": checksum}))?,
        );

        if runtime_update {
            acc.publish(UPDATE_CHANNEL, format!("{type_name}:customvar:{row}"));
        }
    }
    Ok(())
}

fn emit_checkable_relations(
    config: &CheckableConfig,
    type_name: &str,
    env_id: &str,
    object_key: &str,
    config_prefix: &str,
    checksum_prefix: &str,
    runtime_update: bool,
    acc: &mut RelationAccumulator,
) -> Result<(), DepsError> {
    for (field, value) in [
        ("action_url", &config.action_url),
        ("notes_url", &config.notes_url),
        ("icon_image", &config.icon_image),
    ] {
        if value.is_empty() {
            continue;
        }
        let key = row_id(&[env_id, value])?;
        acc.push(format!("{config_prefix}{field}"), key, encode(field, value)?);
    }

    emit_group_membership(&config.groups, type_name, "groupmember", env_id, object_key, config_prefix, checksum_prefix, runtime_update, acc)?;
    Ok(())
}

fn emit_group_membership(
    groups: &[monsync_domain::types::ObjectName],
    type_name: &str,
    relation: &str,
    env_id: &str,
    object_key: &str,
    config_prefix: &str,
    checksum_prefix: &str,
    runtime_update: bool,
    acc: &mut RelationAccumulator,
) -> Result<(), DepsError> {
    for group in groups {
        let group_id = object_identifier(group.as_str());
        let row = row_id(&[env_id, &group_id, object_key])?;
        let payload = encode(relation, &json!({"object_id": object_key, "group_id": group_id}))?;
        acc.push(format!("{config_prefix}{type_name}:{relation}"), row.clone(), payload);
        if runtime_update {
            acc.publish(UPDATE_CHANNEL, format!("{type_name}:{relation}:{row}"));
        }
    }
    let group_ids: Vec<String> = groups.iter().map(|g| object_identifier(g.as_str())).collect();
    let checksum = hash_value(&group_ids).map_err(|source| DepsError::Encode {
        relation: relation.to_string(),
        source,
    })?;
    acc.push(
        format!("{checksum_prefix}{type_name}:{relation}"),
        object_key.to_string(),
        encode(relation, &json!({"checksum": checksum}))?,
    );
    Ok(())
}

fn emit_override_list(
    names: &[monsync_domain::types::ObjectName],
    which: &str,
    type_name: &str,
    env_id: &str,
    object_key: &str,
    config_prefix: &str,
    checksum_prefix: &str,
    runtime_update: bool,
    acc: &mut RelationAccumulator,
) -> Result<(), DepsError> {
    let relation = format!("override:{which}");
    for name in names {
        let period_id = object_identifier(name.as_str());
        let row = row_id(&[env_id, &period_id, object_key])?;
        let payload = encode(&relation, &json!({"object_id": object_key, "timeperiod_id": period_id}))?;
        acc.push(format!("{config_prefix}{}:{relation}", type_name), row.clone(), payload);
        if runtime_update {
            acc.publish(UPDATE_CHANNEL, format!("{type_name}:{relation}:{row}"));
        }
    }
    let ids: Vec<String> = names.iter().map(|n| object_identifier(n.as_str())).collect();
    let checksum = hash_value(&ids).map_err(|source| DepsError::Encode {
        relation: relation.clone(),
        source,
    })?;
    acc.push(
        format!("{checksum_prefix}{}:{relation}", type_name),
        object_key.to_string(),
        encode(&relation, &json!({"checksum": checksum}))?,
    );
    Ok(())
}

fn emit_command_values(
    values: &std::collections::BTreeMap<String, monsync_domain::types::ArgValue>,
    relation: &str,
    type_name: &str,
    env_id: &str,
    object_key: &str,
    config_prefix: &str,
    checksum_prefix: &str,
    runtime_update: bool,
    acc: &mut RelationAccumulator,
) -> Result<(), DepsError> {
    use monsync_domain::types::ArgValue;

    for (key, value) in values {
        let mut row_payload = match value {
            ArgValue::Scalar(v) => {
                let mut m = serde_json::Map::new();
                m.insert("value".to_string(), json!(encode(relation, v)?));
                m
            }
            ArgValue::Array(v) => {
                let mut m = serde_json::Map::new();
                m.insert("value".to_string(), json!(encode(relation, v)?));
                m
            }
            ArgValue::Dict(map) => {
                // The original re-encodes only the dict's existing `value`
                // member in place, leaving the rest of the descriptor
                // (description, required, set_if, ...) untouched.
                let mut out: serde_json::Map<String, serde_json::Value> =
                    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let inner = out.get("value").cloned().unwrap_or(serde_json::Value::Null);
                out.insert("value".to_string(), json!(encode(relation, &inner)?));
                out
            }
        };
        row_payload.insert("command_id".to_string(), json!(object_key));
        row_payload.insert(format!("{relation}_key"), json!(key));
        row_payload.insert("env_id".to_string(), json!(env_id));

        let row = hash_value(&(object_key, key.as_str(), env_id)).map_err(|source| DepsError::Encode {
            relation: relation.to_string(),
            source,
        })?;
        acc.push(
            format!("{config_prefix}{type_name}:{relation}"),
            row.clone(),
            encode(relation, &row_payload)?,
        );

        let checksum = hash_value(value).map_err(|source| DepsError::Encode {
            relation: relation.to_string(),
            source,
        })?;
        acc.push(
            format!("{checksum_prefix}{type_name}:{relation}"),
            row.clone(),
            encode(relation, &json!({"checksum": checksum}))?,
        );

        if runtime_update {
            acc.publish(UPDATE_CHANNEL, format!("{type_name}:{relation}:{row}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monsync_domain::types::{CheckableConfig, CheckableState, Host, ObjectMeta, ObjectName};
    use std::collections::BTreeMap;

    fn host_with_groups(name: &str, groups: Vec<&str>) -> ConfigObject {
        let mut config = CheckableConfig::default();
        config.groups = groups.into_iter().map(ObjectName::new).collect();
        ConfigObject::Host(Host {
            meta: ObjectMeta::new(name),
            config,
            state: CheckableState::default(),
            address: "10.0.0.1".into(),
            address6: String::new(),
        })
    }

    #[test]
    fn host_groupmember_row_has_expected_shape() {
        let host = host_with_groups("h1", vec!["g1"]);
        let mut acc = RelationAccumulator::new();
        insert_object_dependencies(&host, "host", "env1", "icinga:config:", "icinga:config:checksum:", false, &mut acc).unwrap();

        let rows = acc.hmsets.get("icinga:config:host:groupmember").expect("groupmember hash present");
        assert_eq!(rows.len(), 1);
        let payload: serde_json::Value = serde_json::from_str(&rows[0].1).unwrap();
        assert_eq!(payload["object_id"], json!(object_identifier("h1")));
        assert_eq!(payload["group_id"], json!(object_identifier("g1")));
    }

    #[test]
    fn checkable_stops_after_groupmember_block() {
        // Host has no customvars in this fixture; the only hashes populated
        // should be groupmember + its checksum — never timeperiod/zone/etc.
        let host = host_with_groups("h1", vec!["g1"]);
        let mut acc = RelationAccumulator::new();
        insert_object_dependencies(&host, "host", "env1", "icinga:config:", "icinga:config:checksum:", false, &mut acc).unwrap();

        for hash_name in acc.hmsets.keys() {
            assert!(
                hash_name.contains("groupmember"),
                "unexpected relation hash for a checkable: {hash_name}"
            );
        }
    }

    #[test]
    fn command_arguments_produce_one_row_per_argument() {
        use monsync_domain::types::{ArgValue, Command, ObjectMeta};

        let mut arguments = BTreeMap::new();
        arguments.insert("-H".to_string(), ArgValue::Scalar(json!("$host$")));
        arguments.insert("-c".to_string(), ArgValue::Scalar(json!(5)));

        let cmd = ConfigObject::CheckCommand(Command {
            meta: ObjectMeta::new("ping"),
            command_line: ArgValue::Array(vec![json!("ping")]),
            timeout: 60.0,
            arguments,
            env: BTreeMap::new(),
        });

        let mut acc = RelationAccumulator::new();
        insert_object_dependencies(&cmd, "checkcommand", "env1", "icinga:config:", "icinga:config:checksum:", false, &mut acc).unwrap();

        let rows = acc.hmsets.get("icinga:config:checkcommand:argument").unwrap();
        assert_eq!(rows.len(), 2);

        let c_row = rows.iter().find(|(_, v)| v.contains("\"argument_key\":\"-c\"")).unwrap();
        let c_payload: serde_json::Value = serde_json::from_str(&c_row.1).unwrap();
        assert_eq!(c_payload["value"], json!("5"));

        let h_row = rows.iter().find(|(_, v)| v.contains("\"argument_key\":\"-H\"")).unwrap();
        let h_payload: serde_json::Value = serde_json::from_str(&h_row.1).unwrap();
        assert_eq!(h_payload["value"], json!("\"$host$\""));
    }

    #[test]
    fn command_dict_argument_reencodes_only_its_value_member() {
        use monsync_domain::types::{ArgValue, Command, ObjectMeta};

        let mut descriptor = BTreeMap::new();
        descriptor.insert("value".to_string(), json!("$host$"));
        descriptor.insert("description".to_string(), json!("the target host"));
        descriptor.insert("required".to_string(), json!(true));

        let mut arguments = BTreeMap::new();
        arguments.insert("-H".to_string(), ArgValue::Dict(descriptor));

        let cmd = ConfigObject::CheckCommand(Command {
            meta: ObjectMeta::new("ping"),
            command_line: ArgValue::Array(vec![json!("ping")]),
            timeout: 60.0,
            arguments,
            env: BTreeMap::new(),
        });

        let mut acc = RelationAccumulator::new();
        insert_object_dependencies(&cmd, "checkcommand", "env1", "icinga:config:", "icinga:config:checksum:", false, &mut acc).unwrap();

        let rows = acc.hmsets.get("icinga:config:checkcommand:argument").unwrap();
        assert_eq!(rows.len(), 1);
        let payload: serde_json::Value = serde_json::from_str(&rows[0].1).unwrap();
        assert_eq!(payload["value"], json!("\"$host$\""));
        assert_eq!(payload["description"], json!("the target host"));
        assert_eq!(payload["required"], json!(true));
    }

    #[test]
    fn customvar_emits_global_type_and_checksum_rows() {
        use monsync_domain::types::{CheckableConfig, CheckableState, Host, ObjectMeta, VarMap};

        let mut vars = VarMap::new();
        vars.insert("os".to_string(), json!("linux"));
        let mut config = CheckableConfig::default();
        config.vars = vars;

        let host = ConfigObject::Host(Host {
            meta: ObjectMeta::new("h1"),
            config,
            state: CheckableState::default(),
            address: "10.0.0.1".into(),
            address6: String::new(),
        });

        let mut acc = RelationAccumulator::new();
        insert_object_dependencies(&host, "host", "env1", "icinga:config:", "icinga:config:checksum:", true, &mut acc).unwrap();

        assert!(acc.hmsets.contains_key("icinga:config:customvar"));
        assert!(acc.hmsets.contains_key("icinga:config:host:customvar"));
        assert!(acc.hmsets.contains_key("icinga:config:checksum:host:customvar"));
        assert!(acc.publishes.get("icinga:config:update").unwrap().iter().any(|m| m.starts_with("host:customvar:")));
    }
}
