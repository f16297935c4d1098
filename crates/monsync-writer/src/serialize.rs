use std::ops::BitOr;

use chrono::{DateTime, Utc};
use monsync_domain::ident::{hash_value, object_identifier};
use monsync_domain::types::{ArgValue, ConfigObject};
use serde_json::{json, Map, Value};

fn arg_value_json(v: &ArgValue) -> Value {
    match v {
        ArgValue::Scalar(s) => s.clone(),
        ArgValue::Array(a) => json!(a),
        ArgValue::Dict(d) => json!(d),
    }
}

fn id_field(attrs: &mut Map<String, Value>, base: &str, name: &str) {
    attrs.insert(base.to_string(), json!(name));
    attrs.insert(format!("{base}_id"), json!(object_identifier(name)));
}

/// Flattens one live object into `(attributes, checksum_wrapper)`, or `None`
/// for a kind this writer never projects. Endpoints get base attributes
/// only; services override `name` to their bare short name.
pub fn prepare_object(o: &ConfigObject, env_id: &str) -> Option<(Value, Value)> {
    let mut attrs = Map::new();

    let name = match o {
        ConfigObject::Service(s) => s.short_name.clone(),
        other => other.name().as_str().to_string(),
    };
    attrs.insert("name".into(), json!(name));
    attrs.insert("name_checksum".into(), json!(object_identifier(o.name().as_str())));
    attrs.insert("env_id".into(), json!(env_id));

    if let Some(zone) = &o.meta().zone {
        id_field(&mut attrs, "zone", zone.as_str());
    }

    match o {
        ConfigObject::Endpoint(_) => {}

        ConfigObject::Host(h) => {
            attrs.insert("display_name".into(), json!(h.config.display_name));
            attrs.insert("address".into(), json!(h.address));
            attrs.insert("address6".into(), json!(h.address6));
            insert_checkable_config(&mut attrs, &h.config);
        }

        ConfigObject::Service(s) => {
            attrs.insert("display_name".into(), json!(s.config.display_name));
            id_field(&mut attrs, "host", s.host.as_str());
            insert_checkable_config(&mut attrs, &s.config);
        }

        ConfigObject::Zone(z) => {
            attrs.insert("is_global".into(), json!(z.is_global));
            if let Some(parent) = &z.parent {
                attrs.insert("parent".into(), json!(parent.as_str()));
                // Preserves the upstream's own bug: the parent checksum is
                // computed from this zone's own name, not the parent's.
                attrs.insert("parent_id".into(), json!(object_identifier(o.name().as_str())));
            }
        }

        ConfigObject::User(u) => {
            attrs.insert("display_name".into(), json!(u.display_name));
            attrs.insert("email".into(), json!(u.email));
            attrs.insert("pager".into(), json!(u.pager));
            attrs.insert("enable_notifications".into(), json!(u.enable_notifications));
            attrs.insert("states".into(), json!(u.states));
            attrs.insert("types".into(), json!(u.types));
            if let Some(period) = &u.period {
                id_field(&mut attrs, "period", period.as_str());
            }
        }

        ConfigObject::UserGroup(g) | ConfigObject::HostGroup(g) | ConfigObject::ServiceGroup(g) => {
            attrs.insert("display_name".into(), json!(g.display_name));
        }

        ConfigObject::TimePeriod(tp) => {
            attrs.insert("display_name".into(), json!(tp.display_name));
            attrs.insert("prefer_includes".into(), json!(tp.prefer_includes));
        }

        ConfigObject::Notification(n) => {
            id_field(&mut attrs, "host", n.host.as_str());
            if let Some(service) = &n.service {
                attrs.insert("service".into(), json!(service));
            }
            id_field(&mut attrs, "command", n.command.as_str());
            if let Some(period) = &n.period {
                id_field(&mut attrs, "period", period.as_str());
            }
            attrs.insert("times_begin".into(), json!(n.times_begin));
            attrs.insert("times_end".into(), json!(n.times_end));
            attrs.insert("interval".into(), json!(n.interval));
            attrs.insert("states".into(), json!(n.states));
            attrs.insert("types".into(), json!(n.types));
        }

        ConfigObject::CheckCommand(c) | ConfigObject::NotificationCommand(c) | ConfigObject::EventCommand(c) => {
            attrs.insert("command_line".into(), arg_value_json(&c.command_line));
            attrs.insert("timeout".into(), json!(c.timeout));
        }

        ConfigObject::Comment(c) => {
            id_field(&mut attrs, "host", c.host.as_str());
            if let Some(service) = &c.service {
                attrs.insert("service".into(), json!(service));
            }
            attrs.insert("author".into(), json!(c.author));
            attrs.insert("text".into(), json!(c.text));
            attrs.insert("entry_time".into(), json!(c.entry_time));
            attrs.insert("persistent".into(), json!(c.persistent));
            attrs.insert("expire_time".into(), json!(c.expire_time));
        }

        ConfigObject::Downtime(d) => {
            id_field(&mut attrs, "host", d.host.as_str());
            if let Some(service) = &d.service {
                attrs.insert("service".into(), json!(service));
            }
            attrs.insert("author".into(), json!(d.author));
            attrs.insert("comment".into(), json!(d.comment));
            attrs.insert("entry_time".into(), json!(d.entry_time));
            attrs.insert("start_time".into(), json!(d.start_time));
            attrs.insert("end_time".into(), json!(d.end_time));
            attrs.insert("duration".into(), json!(d.duration));
            attrs.insert("fixed".into(), json!(d.fixed));
            attrs.insert("in_effect".into(), json!(d.is_in_effect()));
            attrs.insert("trigger_time".into(), json!(d.trigger_time));
        }
    }

    let attrs = Value::Object(attrs);
    let checksum = json!({ "checksum": hash_value(&attrs).ok()? });
    Some((attrs, checksum))
}

fn insert_checkable_config(attrs: &mut Map<String, Value>, config: &monsync_domain::types::CheckableConfig) {
    id_field(attrs, "check_command", config.check_command.as_str());
    if let Some(event_command) = &config.event_command {
        id_field(attrs, "event_command", event_command.as_str());
    }
    if let Some(check_period) = &config.check_period {
        id_field(attrs, "check_period", check_period.as_str());
    }
    if let Some(endpoint) = &config.command_endpoint {
        id_field(attrs, "command_endpoint", endpoint.as_str());
    }
    attrs.insert("check_interval".into(), json!(config.check_interval));
    attrs.insert("retry_interval".into(), json!(config.retry_interval));
    attrs.insert("active_checks_enabled".into(), json!(config.active_checks_enabled));
    attrs.insert("passive_checks_enabled".into(), json!(config.passive_checks_enabled));
    attrs.insert("event_handler_enabled".into(), json!(config.event_handler_enabled));
    attrs.insert("notifications_enabled".into(), json!(config.notifications_enabled));
    attrs.insert("flapping_enabled".into(), json!(config.flapping_enabled));
    attrs.insert("flapping_threshold_low".into(), json!(config.flapping_threshold_low));
    attrs.insert("flapping_threshold_high".into(), json!(config.flapping_threshold_high));
    attrs.insert("perfdata_enabled".into(), json!(config.perfdata_enabled));
    attrs.insert("is_volatile".into(), json!(config.is_volatile));
    attrs.insert("notes".into(), json!(config.notes));
    attrs.insert("notes_url".into(), json!(config.notes_url));
    attrs.insert("action_url".into(), json!(config.action_url));
    attrs.insert("icon_image".into(), json!(config.icon_image));
    attrs.insert("icon_image_alt".into(), json!(config.icon_image_alt));
}

fn is_ok_state(current_state: i64) -> bool {
    current_state == 0
}

/// Flattens current runtime state for a checkable (host or service),
/// returning `None` for any other kind. `check_command_timeout` is the
/// resolved `timeout` of the checkable's check command, used as the
/// fallback when the checkable itself carries no override — the caller
/// looks this up from the object repository since the serializer has no
/// graph access of its own.
pub fn serialize_state(
    o: &ConfigObject,
    env_id: &str,
    check_command_timeout: Option<f64>,
    now: DateTime<Utc>,
) -> Option<Value> {
    let state = o.checkable_state()?;
    let mut attrs = Map::new();

    attrs.insert("object_id".into(), json!(object_identifier(o.name().as_str())));
    attrs.insert("env_id".into(), json!(env_id));
    attrs.insert("state".into(), json!(state.current_state));
    attrs.insert("last_hard_state".into(), json!(state.last_hard_state));
    // Carried verbatim from the upstream: last_soft_state mirrors the
    // current state rather than the checkable's actual last soft state.
    attrs.insert("last_soft_state".into(), json!(state.current_state));
    attrs.insert("severity".into(), json!(state.severity));
    attrs.insert("check_attempt".into(), json!(state.check_attempt));
    attrs.insert("max_check_attempts".into(), json!(state.max_check_attempts));
    attrs.insert("is_active".into(), json!(state.is_active));

    let is_problem = !is_ok_state(state.current_state);
    attrs.insert("is_problem".into(), json!(is_problem));
    attrs.insert(
        "is_handled".into(),
        json!(is_problem && (state.in_downtime || state.is_acknowledged)),
    );
    attrs.insert("is_reachable".into(), json!(state.is_reachable));
    attrs.insert("is_flapping".into(), json!(state.is_flapping));
    attrs.insert("is_acknowledged".into(), json!(state.is_acknowledged));
    attrs.insert("in_downtime".into(), json!(state.in_downtime));

    let timeout = state.check_timeout.or(check_command_timeout).unwrap_or(0.0);
    attrs.insert("check_timeout".into(), json!(timeout));
    attrs.insert("last_update".into(), json!(now.timestamp() as f64));
    attrs.insert("last_state_change".into(), json!(state.last_state_change));
    attrs.insert("next_check".into(), json!(state.next_check));

    if let Some(cr) = &state.last_check_result {
        if !cr.output.is_empty() {
            let mut parts = cr.output.splitn(2, '\n');
            let head = parts.next().unwrap_or("");
            attrs.insert("output".into(), json!(head));
            if let Some(rest) = parts.next() {
                if !rest.is_empty() {
                    attrs.insert("long_output".into(), json!(rest));
                }
            }
        }
        attrs.insert("performance_data".into(), json!(cr.performance_data.join(" ")));
        attrs.insert("commandline".into(), json!(cr.command_line));
        attrs.insert("execution_time".into(), json!(cr.execution_time));
        attrs.insert("latency".into(), json!(cr.latency));
    }

    if state.is_acknowledged {
        if let Some(comment) = state.acknowledgement_comment() {
            attrs.insert(
                "acknowledgement_comment_id".into(),
                json!(object_identifier(comment.name.as_str())),
            );
        }
    }

    Some(Value::Object(attrs))
}

/// Bitmask over the attribute flags a reflected field may carry
/// (`Config`, `State`, `NoUserView`, `Navigation`), mirroring the upstream
/// reflection table without needing a runtime type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMask(u8);

impl FieldMask {
    pub const CONFIG: FieldMask = FieldMask(0b0001);
    pub const STATE: FieldMask = FieldMask(0b0010);
    pub const NO_USER_VIEW: FieldMask = FieldMask(0b0100);
    pub const NAVIGATION: FieldMask = FieldMask(0b1000);

    pub fn contains(self, other: FieldMask) -> bool {
        self.0 & other.0 == other.0
    }

    fn intersects(self, other: FieldMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for FieldMask {
    type Output = FieldMask;
    fn bitor(self, rhs: FieldMask) -> FieldMask {
        FieldMask(self.0 | rhs.0)
    }
}

struct FieldDescriptor {
    name: &'static str,
    flags: FieldMask,
    value: fn(&ConfigObject) -> Option<Value>,
}

fn field_descriptors(o: &ConfigObject) -> Vec<FieldDescriptor> {
    match o {
        ConfigObject::Host(_) | ConfigObject::Service(_) => vec![
            FieldDescriptor {
                name: "display_name",
                flags: FieldMask::CONFIG,
                value: |o| match o {
                    ConfigObject::Host(h) => Some(json!(h.config.display_name)),
                    ConfigObject::Service(s) => Some(json!(s.config.display_name)),
                    _ => None,
                },
            },
            FieldDescriptor {
                name: "current_state",
                flags: FieldMask::STATE,
                value: |o| o.checkable_state().map(|s| json!(s.current_state)),
            },
            FieldDescriptor {
                name: "internal_notes",
                flags: FieldMask::NO_USER_VIEW | FieldMask::CONFIG,
                value: |_| Some(json!("")),
            },
            FieldDescriptor {
                name: "zone_name",
                flags: FieldMask::NAVIGATION,
                value: |o| o.meta().zone.as_ref().map(|z| json!(z.as_str())),
            },
        ],
        _ => Vec::new(),
    }
}

/// A general attribute-mask-driven flattener: includes only fields whose
/// flags intersect `mask`, always drops `NoUserView` fields, and drops
/// fields marked `Navigation`-only (no `Config`/`State` bit set alongside
/// it). Downtimes additionally carry `in_effect`/`trigger_time`, which are
/// derived rather than fielded.
pub fn reflect_fields(o: &ConfigObject, mask: FieldMask) -> Value {
    let mut fields = Map::new();

    for d in field_descriptors(o) {
        if d.flags.contains(FieldMask::NO_USER_VIEW) {
            continue;
        }
        if d.flags.contains(FieldMask::NAVIGATION) && !d.flags.intersects(FieldMask::CONFIG | FieldMask::STATE) {
            continue;
        }
        if !d.flags.intersects(mask) {
            continue;
        }
        if let Some(value) = (d.value)(o) {
            fields.insert(d.name.to_string(), value);
        }
    }

    if let ConfigObject::Downtime(d) = o {
        fields.insert("in_effect".into(), json!(d.is_in_effect()));
        fields.insert("trigger_time".into(), json!(d.trigger_time));
    }

    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monsync_domain::types::*;

    fn host(name: &str, groups: Vec<&str>) -> ConfigObject {
        let mut config = CheckableConfig::default();
        config.check_command = ObjectName::new("ping");
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
    fn prepare_object_overrides_service_name_to_short_name() {
        let service = ConfigObject::Service(Service {
            meta: ObjectMeta::new(Service::full_name("web", "http")),
            config: CheckableConfig::default(),
            state: CheckableState::default(),
            host: ObjectName::new("web"),
            short_name: "http".into(),
        });
        let (attrs, _) = prepare_object(&service, "env1").unwrap();
        assert_eq!(attrs["name"], json!("http"));
        assert_eq!(attrs["host_id"], json!(object_identifier("web")));
    }

    #[test]
    fn prepare_object_zone_preserves_self_referential_parent_id() {
        let zone = ConfigObject::Zone(Zone {
            meta: ObjectMeta::new("child"),
            is_global: false,
            parent: Some(ObjectName::new("parent")),
            all_parents: vec![ObjectName::new("parent")],
        });
        let (attrs, _) = prepare_object(&zone, "env1").unwrap();
        assert_eq!(attrs["parent_id"], json!(object_identifier("child")));
    }

    #[test]
    fn checksum_wrapper_matches_hash_of_attributes() {
        let h = host("h1", vec![]);
        let (attrs, checksum) = prepare_object(&h, "env1").unwrap();
        assert_eq!(checksum["checksum"], json!(hash_value(&attrs).unwrap()));
    }

    #[test]
    fn serialize_state_splits_output_on_first_newline() {
        let mut h = host("h1", vec![]);
        if let ConfigObject::Host(ref mut inner) = h {
            inner.state.last_check_result = Some(CheckResult {
                output: "a\nb\nc".into(),
                ..Default::default()
            });
        }
        let state = serialize_state(&h, "env1", None, Utc::now()).unwrap();
        assert_eq!(state["output"], json!("a"));
        assert_eq!(state["long_output"], json!("b\nc"));
    }

    #[test]
    fn serialize_state_single_line_output_has_no_long_output() {
        let mut h = host("h1", vec![]);
        if let ConfigObject::Host(ref mut inner) = h {
            inner.state.last_check_result = Some(CheckResult {
                output: "a".into(),
                ..Default::default()
            });
        }
        let state = serialize_state(&h, "env1", None, Utc::now()).unwrap();
        assert_eq!(state["output"], json!("a"));
        assert!(state.get("long_output").is_none());
    }

    #[test]
    fn serialize_state_empty_output_sets_neither_field() {
        let mut h = host("h1", vec![]);
        if let ConfigObject::Host(ref mut inner) = h {
            inner.state.last_check_result = Some(CheckResult {
                output: String::new(),
                ..Default::default()
            });
        }
        let state = serialize_state(&h, "env1", None, Utc::now()).unwrap();
        assert!(state.get("output").is_none());
        assert!(state.get("long_output").is_none());
    }

    #[test]
    fn serialize_state_check_timeout_falls_back_to_command_timeout() {
        let h = host("h1", vec![]);
        let state = serialize_state(&h, "env1", Some(42.0), Utc::now()).unwrap();
        assert_eq!(state["check_timeout"], json!(42.0));
    }

    #[test]
    fn serialize_state_picks_ack_comment_with_max_entry_time() {
        let mut h = host("h1", vec![]);
        if let ConfigObject::Host(ref mut inner) = h {
            inner.state.is_acknowledged = true;
            inner.state.comments = vec![
                CommentRef { name: ObjectName::new("c1"), entry_type: CommentEntryType::Acknowledgement, entry_time: 10.0 },
                CommentRef { name: ObjectName::new("c2"), entry_type: CommentEntryType::Acknowledgement, entry_time: 30.0 },
                CommentRef { name: ObjectName::new("c3"), entry_type: CommentEntryType::Acknowledgement, entry_time: 20.0 },
            ];
        }
        let state = serialize_state(&h, "env1", None, Utc::now()).unwrap();
        assert_eq!(state["acknowledgement_comment_id"], json!(object_identifier("c2")));
    }

    #[test]
    fn reflect_fields_drops_no_user_view_and_navigation_only() {
        let h = host("h1", vec![]);
        let fields = reflect_fields(&h, FieldMask::CONFIG | FieldMask::STATE);
        assert!(fields.get("internal_notes").is_none());
        assert!(fields.get("zone_name").is_none());
        assert!(fields.get("display_name").is_some());
    }

    #[test]
    fn reflect_fields_on_downtime_emits_derived_fields() {
        let dt = ConfigObject::Downtime(Downtime {
            meta: ObjectMeta::new("dt1"),
            host: ObjectName::new("h1"),
            service: None,
            author: "op".into(),
            comment: "maint".into(),
            entry_time: 0.0,
            start_time: 0.0,
            end_time: 0.0,
            duration: 0.0,
            fixed: true,
            trigger_time: Some(5.0),
        });
        let fields = reflect_fields(&dt, FieldMask::CONFIG);
        assert_eq!(fields["in_effect"], json!(true));
        assert_eq!(fields["trigger_time"], json!(5.0));
    }
}
