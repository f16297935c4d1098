use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Name of a config object, scoped by its [`ObjectKind`]. For hosts and
/// services this is the full key (`"host!service"` for services); callers
/// that need the short service name use [`Service::short_name`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectName(pub String);

impl ObjectName {
    pub fn new(s: impl Into<String>) -> Self {
        ObjectName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ObjectName {
    fn from(s: &str) -> Self {
        ObjectName::new(s)
    }
}

impl From<String> for ObjectName {
    fn from(s: String) -> Self {
        ObjectName(s)
    }
}

// ── Object kind ──────────────────────────────────────────────────────────────

/// The family a config object belongs to. Drives dispatch in the serializer
/// and dependency emitter instead of comparing against singleton type
/// instances, since there is no runtime type registry here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Endpoint,
    Zone,
    Host,
    Service,
    User,
    UserGroup,
    HostGroup,
    ServiceGroup,
    TimePeriod,
    Notification,
    CheckCommand,
    NotificationCommand,
    EventCommand,
    Comment,
    Downtime,
}

impl ObjectKind {
    /// Lowercase reflection name, matching the Redis key / checksum-row
    /// typename convention (`host`, `service`, `checkcommand`, ...).
    pub fn reflection_name(&self) -> &'static str {
        match self {
            ObjectKind::Endpoint => "endpoint",
            ObjectKind::Zone => "zone",
            ObjectKind::Host => "host",
            ObjectKind::Service => "service",
            ObjectKind::User => "user",
            ObjectKind::UserGroup => "usergroup",
            ObjectKind::HostGroup => "hostgroup",
            ObjectKind::ServiceGroup => "servicegroup",
            ObjectKind::TimePeriod => "timeperiod",
            ObjectKind::Notification => "notification",
            ObjectKind::CheckCommand => "checkcommand",
            ObjectKind::NotificationCommand => "notificationcommand",
            ObjectKind::EventCommand => "eventcommand",
            ObjectKind::Comment => "comment",
            ObjectKind::Downtime => "downtime",
        }
    }

    pub fn all() -> &'static [ObjectKind] {
        &[
            ObjectKind::Endpoint,
            ObjectKind::Zone,
            ObjectKind::Host,
            ObjectKind::Service,
            ObjectKind::User,
            ObjectKind::UserGroup,
            ObjectKind::HostGroup,
            ObjectKind::ServiceGroup,
            ObjectKind::TimePeriod,
            ObjectKind::Notification,
            ObjectKind::CheckCommand,
            ObjectKind::NotificationCommand,
            ObjectKind::EventCommand,
            ObjectKind::Comment,
            ObjectKind::Downtime,
        ]
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reflection_name())
    }
}

// ── Shared metadata ──────────────────────────────────────────────────────────

/// Fields every config object carries regardless of kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: ObjectName,
    pub active: bool,
    /// Monotonic revision stamp; bumped on every mutation so the writer can
    /// tell a version-changed event apart from an active/inactive flip.
    pub version: u64,
    /// Name of the zone this object belongs to, if zone-scoped.
    pub zone: Option<ObjectName>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<ObjectName>) -> Self {
        ObjectMeta {
            name: name.into(),
            active: true,
            version: 1,
            zone: None,
        }
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }
}

// ── Custom variables ─────────────────────────────────────────────────────────

pub type VarMap = BTreeMap<String, serde_json::Value>;

// ── Check state ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateType {
    Soft,
    Hard,
}

impl StateType {
    pub fn as_i64(&self) -> i64 {
        match self {
            StateType::Soft => 0,
            StateType::Hard => 1,
        }
    }
}

/// An entry time / author pair attached to a checkable for acknowledgement
/// comment lookup; avoids needing a full cross-object graph walk just to
/// find "the comment that caused this acknowledgement".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentEntryType {
    UserComment,
    Downtime,
    Flapping,
    Acknowledgement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRef {
    pub name: ObjectName,
    pub entry_type: CommentEntryType,
    pub entry_time: f64,
}

/// Most recent check result for a checkable. Only the fields the serializer
/// needs to flatten into the state stream are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub output: String,
    pub performance_data: Vec<String>,
    pub command_line: Vec<String>,
    pub execution_time: f64,
    pub latency: f64,
}

/// Runtime check state shared by hosts and services. Kept as a single
/// struct embedded in both rather than a shared trait object, since every
/// field is read directly by the serializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckableState {
    pub current_state: i64,
    pub last_hard_state: i64,
    pub last_soft_state: i64,
    pub state_type: StateType,
    pub severity: i64,
    pub check_attempt: i64,
    pub max_check_attempts: i64,
    pub is_active: bool,
    pub is_reachable: bool,
    pub is_flapping: bool,
    pub is_acknowledged: bool,
    pub in_downtime: bool,
    pub last_check_result: Option<CheckResult>,
    pub last_state_change: f64,
    pub last_update: f64,
    pub next_check: f64,
    pub check_timeout: Option<f64>,
    /// Comments anchored to this checkable, newest-relevant lookups done by
    /// scanning for [`CommentEntryType::Acknowledgement`] with the highest
    /// `entry_time`.
    pub comments: Vec<CommentRef>,
}

impl Default for CheckableState {
    fn default() -> Self {
        CheckableState {
            current_state: 0,
            last_hard_state: 0,
            last_soft_state: 0,
            state_type: StateType::Hard,
            severity: 0,
            check_attempt: 1,
            max_check_attempts: 3,
            is_active: true,
            is_reachable: true,
            is_flapping: false,
            is_acknowledged: false,
            in_downtime: false,
            last_check_result: None,
            last_state_change: 0.0,
            last_update: 0.0,
            next_check: 0.0,
            check_timeout: None,
            comments: Vec::new(),
        }
    }
}

impl CheckableState {
    /// The comment backing the current acknowledgement, chosen as the
    /// acknowledgement comment with the greatest `entry_time` — mirrors
    /// picking the most recently raised ack when several overlap.
    pub fn acknowledgement_comment(&self) -> Option<&CommentRef> {
        self.comments
            .iter()
            .filter(|c| matches!(c.entry_type, CommentEntryType::Acknowledgement))
            .max_by(|a, b| a.entry_time.partial_cmp(&b.entry_time).unwrap())
    }
}

// ── Checkable config fields ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckableConfig {
    pub display_name: String,
    pub check_command: ObjectName,
    pub event_command: Option<ObjectName>,
    pub check_period: Option<ObjectName>,
    pub command_endpoint: Option<ObjectName>,
    pub check_interval: f64,
    pub retry_interval: f64,
    pub active_checks_enabled: bool,
    pub passive_checks_enabled: bool,
    pub event_handler_enabled: bool,
    pub notifications_enabled: bool,
    pub flapping_enabled: bool,
    pub flapping_threshold_low: f64,
    pub flapping_threshold_high: f64,
    pub perfdata_enabled: bool,
    pub is_volatile: bool,
    pub notes: String,
    pub notes_url: String,
    pub action_url: String,
    pub icon_image: String,
    pub icon_image_alt: String,
    pub groups: Vec<ObjectName>,
    pub vars: VarMap,
}

impl Default for CheckableConfig {
    fn default() -> Self {
        CheckableConfig {
            display_name: String::new(),
            check_command: ObjectName::new(""),
            event_command: None,
            check_period: None,
            command_endpoint: None,
            check_interval: 60.0,
            retry_interval: 30.0,
            active_checks_enabled: true,
            passive_checks_enabled: false,
            event_handler_enabled: true,
            notifications_enabled: true,
            flapping_enabled: true,
            flapping_threshold_low: 25.0,
            flapping_threshold_high: 30.0,
            perfdata_enabled: true,
            is_volatile: false,
            notes: String::new(),
            notes_url: String::new(),
            action_url: String::new(),
            icon_image: String::new(),
            icon_image_alt: String::new(),
            groups: Vec::new(),
            vars: VarMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub meta: ObjectMeta,
    pub config: CheckableConfig,
    pub state: CheckableState,
    pub address: String,
    pub address6: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub meta: ObjectMeta,
    pub config: CheckableConfig,
    pub state: CheckableState,
    pub host: ObjectName,
    /// Short name, distinct from `meta.name` which carries `"host!service"`.
    pub short_name: String,
}

impl Service {
    pub fn full_name(host: &str, short_name: &str) -> ObjectName {
        ObjectName::new(format!("{host}!{short_name}"))
    }
}

// ── Zone / Endpoint ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub meta: ObjectMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub meta: ObjectMeta,
    pub is_global: bool,
    pub parent: Option<ObjectName>,
    /// Transitive parents, nearest first, resolved ahead of time by whatever
    /// builds the repository (mirrors the original's `GetAllParents()`).
    pub all_parents: Vec<ObjectName>,
}

// ── Groups ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub meta: ObjectMeta,
    pub display_name: String,
}

// ── TimePeriod ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePeriod {
    pub meta: ObjectMeta,
    pub display_name: String,
    pub prefer_includes: bool,
    pub ranges: BTreeMap<String, String>,
    pub includes: Vec<ObjectName>,
    pub excludes: Vec<ObjectName>,
}

// ── User ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub meta: ObjectMeta,
    pub display_name: String,
    pub email: String,
    pub pager: String,
    pub enable_notifications: bool,
    pub states: Vec<String>,
    pub types: Vec<String>,
    pub period: Option<ObjectName>,
    pub groups: Vec<ObjectName>,
    pub vars: VarMap,
}

// ── Notification ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub meta: ObjectMeta,
    pub host: ObjectName,
    pub service: Option<String>,
    pub command: ObjectName,
    pub users: Vec<ObjectName>,
    pub user_groups: Vec<ObjectName>,
    pub period: Option<ObjectName>,
    pub times_begin: Option<f64>,
    pub times_end: Option<f64>,
    pub interval: f64,
    pub states: Vec<String>,
    pub types: Vec<String>,
}

// ── Commands ─────────────────────────────────────────────────────────────────

/// A command-line argument or environment variable value, matching the
/// scalar / array / dict shapes a check command definition may use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Scalar(serde_json::Value),
    Array(Vec<serde_json::Value>),
    Dict(BTreeMap<String, serde_json::Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub meta: ObjectMeta,
    pub command_line: ArgValue,
    pub timeout: f64,
    pub arguments: BTreeMap<String, ArgValue>,
    pub env: BTreeMap<String, ArgValue>,
}

// ── Comment / Downtime ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub meta: ObjectMeta,
    pub host: ObjectName,
    pub service: Option<String>,
    pub author: String,
    pub text: String,
    pub entry_type: CommentEntryType,
    pub entry_time: f64,
    pub persistent: bool,
    pub expire_time: Option<f64>,
}

impl Comment {
    pub fn is_service_comment(&self) -> bool {
        self.service.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Downtime {
    pub meta: ObjectMeta,
    pub host: ObjectName,
    pub service: Option<String>,
    pub author: String,
    pub comment: String,
    pub entry_time: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub fixed: bool,
    pub trigger_time: Option<f64>,
}

impl Downtime {
    pub fn is_service_downtime(&self) -> bool {
        self.service.is_some()
    }

    pub fn is_in_effect(&self) -> bool {
        self.trigger_time.is_some()
    }
}

// ── Unifying enum ────────────────────────────────────────────────────────────

/// A single config object of any kind. Carrying every variant in one enum
/// is what lets the serializer and dependency emitter dispatch on
/// `ObjectKind` instead of runtime type comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ConfigObject {
    Endpoint(Endpoint),
    Zone(Zone),
    Host(Host),
    Service(Service),
    User(User),
    UserGroup(Group),
    HostGroup(Group),
    ServiceGroup(Group),
    TimePeriod(TimePeriod),
    Notification(Notification),
    CheckCommand(Command),
    NotificationCommand(Command),
    EventCommand(Command),
    Comment(Comment),
    Downtime(Downtime),
}

impl ConfigObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ConfigObject::Endpoint(_) => ObjectKind::Endpoint,
            ConfigObject::Zone(_) => ObjectKind::Zone,
            ConfigObject::Host(_) => ObjectKind::Host,
            ConfigObject::Service(_) => ObjectKind::Service,
            ConfigObject::User(_) => ObjectKind::User,
            ConfigObject::UserGroup(_) => ObjectKind::UserGroup,
            ConfigObject::HostGroup(_) => ObjectKind::HostGroup,
            ConfigObject::ServiceGroup(_) => ObjectKind::ServiceGroup,
            ConfigObject::TimePeriod(_) => ObjectKind::TimePeriod,
            ConfigObject::Notification(_) => ObjectKind::Notification,
            ConfigObject::CheckCommand(_) => ObjectKind::CheckCommand,
            ConfigObject::NotificationCommand(_) => ObjectKind::NotificationCommand,
            ConfigObject::EventCommand(_) => ObjectKind::EventCommand,
            ConfigObject::Comment(_) => ObjectKind::Comment,
            ConfigObject::Downtime(_) => ObjectKind::Downtime,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ConfigObject::Endpoint(o) => &o.meta,
            ConfigObject::Zone(o) => &o.meta,
            ConfigObject::Host(o) => &o.meta,
            ConfigObject::Service(o) => &o.meta,
            ConfigObject::User(o) => &o.meta,
            ConfigObject::UserGroup(o) => &o.meta,
            ConfigObject::HostGroup(o) => &o.meta,
            ConfigObject::ServiceGroup(o) => &o.meta,
            ConfigObject::TimePeriod(o) => &o.meta,
            ConfigObject::Notification(o) => &o.meta,
            ConfigObject::CheckCommand(o) => &o.meta,
            ConfigObject::NotificationCommand(o) => &o.meta,
            ConfigObject::EventCommand(o) => &o.meta,
            ConfigObject::Comment(o) => &o.meta,
            ConfigObject::Downtime(o) => &o.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ConfigObject::Endpoint(o) => &mut o.meta,
            ConfigObject::Zone(o) => &mut o.meta,
            ConfigObject::Host(o) => &mut o.meta,
            ConfigObject::Service(o) => &mut o.meta,
            ConfigObject::User(o) => &mut o.meta,
            ConfigObject::UserGroup(o) => &mut o.meta,
            ConfigObject::HostGroup(o) => &mut o.meta,
            ConfigObject::ServiceGroup(o) => &mut o.meta,
            ConfigObject::TimePeriod(o) => &mut o.meta,
            ConfigObject::Notification(o) => &mut o.meta,
            ConfigObject::CheckCommand(o) => &mut o.meta,
            ConfigObject::NotificationCommand(o) => &mut o.meta,
            ConfigObject::EventCommand(o) => &mut o.meta,
            ConfigObject::Comment(o) => &mut o.meta,
            ConfigObject::Downtime(o) => &mut o.meta,
        }
    }

    pub fn name(&self) -> &ObjectName {
        &self.meta().name
    }

    /// Redis row typename: splits comments and downtimes into host/service
    /// variants the way the checksum and state hashes do, since those two
    /// kinds don't get their own top-level hash.
    pub fn row_typename(&self) -> String {
        match self {
            ConfigObject::Comment(c) if c.is_service_comment() => "servicecomment".to_string(),
            ConfigObject::Comment(_) => "hostcomment".to_string(),
            ConfigObject::Downtime(d) if d.is_service_downtime() => "servicedowntime".to_string(),
            ConfigObject::Downtime(_) => "hostdowntime".to_string(),
            other => other.kind().reflection_name().to_string(),
        }
    }

    /// Custom variables carried by this object, if its kind supports them.
    pub fn vars(&self) -> Option<&VarMap> {
        match self {
            ConfigObject::Host(h) => Some(&h.config.vars),
            ConfigObject::Service(s) => Some(&s.config.vars),
            ConfigObject::User(u) => Some(&u.vars),
            _ => None,
        }
    }

    pub fn checkable_state(&self) -> Option<&CheckableState> {
        match self {
            ConfigObject::Host(h) => Some(&h.state),
            ConfigObject::Service(s) => Some(&s.state),
            _ => None,
        }
    }

    pub fn checkable_state_mut(&mut self) -> Option<&mut CheckableState> {
        match self {
            ConfigObject::Host(h) => Some(&mut h.state),
            ConfigObject::Service(s) => Some(&mut s.state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn row_typename_splits_host_and_service_downtime() {
        let host_dt = ConfigObject::Downtime(Downtime {
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
            trigger_time: None,
        });
        assert_eq!(host_dt.row_typename(), "hostdowntime");

        let mut svc_dt = host_dt.clone();
        if let ConfigObject::Downtime(ref mut d) = svc_dt {
            d.service = Some("svc1".into());
        }
        assert_eq!(svc_dt.row_typename(), "servicedowntime");
    }

    #[test]
    fn acknowledgement_comment_picks_latest_entry_time() {
        let mut state = CheckableState::default();
        state.comments.push(CommentRef {
            name: ObjectName::new("c1"),
            entry_type: CommentEntryType::Acknowledgement,
            entry_time: 10.0,
        });
        state.comments.push(CommentRef {
            name: ObjectName::new("c2"),
            entry_type: CommentEntryType::Acknowledgement,
            entry_time: 20.0,
        });
        state.comments.push(CommentRef {
            name: ObjectName::new("c3"),
            entry_type: CommentEntryType::UserComment,
            entry_time: 999.0,
        });

        let picked = state.acknowledgement_comment().unwrap();
        assert_eq!(picked.name.as_str(), "c2");
    }
}
