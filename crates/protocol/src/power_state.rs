//! Power state transitions: the raw hook log entries and the intervals
//! reconstructed from them.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Which side of a transition a hook invocation was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    Pre,
    Post,
}

/// The transition a hook was invoked for.
///
/// systemd-sleep passes its verb through unchanged, so verbs this build does
/// not know about are kept as [`SleepAction::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SleepAction {
    Suspend,
    Hibernate,
    HybridSleep,
    SuspendThenHibernate,
    Shutdown,
    /// e.g. `suspend-after-failed-hibernate`
    Other(String),
}

impl SleepAction {
    pub fn as_str(&self) -> &str {
        match self {
            SleepAction::Suspend => "suspend",
            SleepAction::Hibernate => "hibernate",
            SleepAction::HybridSleep => "hybrid-sleep",
            SleepAction::SuspendThenHibernate => "suspend-then-hibernate",
            SleepAction::Shutdown => "shutdown",
            SleepAction::Other(name) => name,
        }
    }

    fn known(name: &str) -> Option<Self> {
        match name {
            "suspend" => Some(SleepAction::Suspend),
            "hibernate" => Some(SleepAction::Hibernate),
            "hybrid-sleep" => Some(SleepAction::HybridSleep),
            "suspend-then-hibernate" => Some(SleepAction::SuspendThenHibernate),
            "shutdown" => Some(SleepAction::Shutdown),
            _ => None,
        }
    }
}

impl fmt::Display for SleepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SleepAction {
    fn from(name: &str) -> Self {
        SleepAction::known(name).unwrap_or_else(|| SleepAction::Other(name.to_string()))
    }
}

impl From<String> for SleepAction {
    fn from(name: String) -> Self {
        SleepAction::known(&name).unwrap_or(SleepAction::Other(name))
    }
}

impl From<SleepAction> for String {
    fn from(action: SleepAction) -> Self {
        match action {
            SleepAction::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// One line of the state log written by the sleep/shutdown hooks.
///
/// ```json
/// {"ts":1700000000,"action":"pre","what":"suspend-then-hibernate","sleep_action":"suspend"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLogEntry {
    pub ts: i64,
    pub action: LogAction,
    pub what: SleepAction,
    /// Sub-phase reported by systemd-sleep; hooks write an empty string when
    /// it is not set.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub sleep_action: Option<SleepAction>,
}

impl StateLogEntry {
    pub fn pre(ts: i64, what: SleepAction) -> Self {
        Self {
            ts,
            action: LogAction::Pre,
            what,
            sleep_action: None,
        }
    }

    pub fn post(ts: i64, what: SleepAction) -> Self {
        Self {
            ts,
            action: LogAction::Post,
            what,
            sleep_action: None,
        }
    }

    pub fn with_sleep_action(mut self, action: SleepAction) -> Self {
        self.sleep_action = Some(action);
        self
    }

    pub fn is_pre(&self) -> bool {
        self.action == LogAction::Pre
    }

    pub fn is_post(&self) -> bool {
        self.action == LogAction::Post
    }

    /// The sub-phase if one was recorded, otherwise `what`.
    pub fn effective_action(&self) -> &SleepAction {
        self.sleep_action.as_ref().unwrap_or(&self.what)
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<SleepAction>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(SleepAction::from))
}

/// Type of a reconstructed power state interval, with the per-phase
/// durations that apply to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PowerStateKind {
    Suspend {
        suspend_secs: i64,
    },
    Hibernate {
        hibernate_secs: i64,
    },
    HybridSleep {
        suspend_secs: i64,
    },
    SuspendThenHibernate {
        suspend_secs: i64,
        hibernate_secs: i64,
    },
    Shutdown,
    /// A sleep verb without its own variant. Its time counts as suspended.
    Other {
        name: String,
        suspend_secs: i64,
    },
}

impl PowerStateKind {
    /// Kind for a single pre/post pair of the given action lasting `secs`.
    pub fn for_action(action: &SleepAction, secs: i64) -> Self {
        match action {
            SleepAction::Suspend => PowerStateKind::Suspend { suspend_secs: secs },
            SleepAction::Hibernate => PowerStateKind::Hibernate {
                hibernate_secs: secs,
            },
            SleepAction::HybridSleep => PowerStateKind::HybridSleep { suspend_secs: secs },
            SleepAction::SuspendThenHibernate => PowerStateKind::SuspendThenHibernate {
                suspend_secs: secs,
                hibernate_secs: 0,
            },
            SleepAction::Shutdown => PowerStateKind::Shutdown,
            SleepAction::Other(name) => PowerStateKind::Other {
                name: name.clone(),
                suspend_secs: secs,
            },
        }
    }

    /// Rebuilds a kind from its flat storage columns.
    pub fn from_parts(type_name: &str, suspend_secs: i64, hibernate_secs: i64) -> Self {
        match type_name {
            "suspend" => PowerStateKind::Suspend { suspend_secs },
            "hibernate" => PowerStateKind::Hibernate { hibernate_secs },
            "hybrid-sleep" => PowerStateKind::HybridSleep { suspend_secs },
            "suspend-then-hibernate" => PowerStateKind::SuspendThenHibernate {
                suspend_secs,
                hibernate_secs,
            },
            "shutdown" => PowerStateKind::Shutdown,
            other => PowerStateKind::Other {
                name: other.to_string(),
                suspend_secs,
            },
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            PowerStateKind::Suspend { .. } => "suspend",
            PowerStateKind::Hibernate { .. } => "hibernate",
            PowerStateKind::HybridSleep { .. } => "hybrid-sleep",
            PowerStateKind::SuspendThenHibernate { .. } => "suspend-then-hibernate",
            PowerStateKind::Shutdown => "shutdown",
            PowerStateKind::Other { name, .. } => name,
        }
    }

    /// Seconds spent suspended, 0 for kinds without a suspend phase.
    pub fn suspend_secs(&self) -> i64 {
        match *self {
            PowerStateKind::Suspend { suspend_secs }
            | PowerStateKind::HybridSleep { suspend_secs }
            | PowerStateKind::SuspendThenHibernate { suspend_secs, .. }
            | PowerStateKind::Other { suspend_secs, .. } => suspend_secs,
            _ => 0,
        }
    }

    /// Seconds spent hibernated, 0 for kinds without a hibernate phase.
    pub fn hibernate_secs(&self) -> i64 {
        match *self {
            PowerStateKind::Hibernate { hibernate_secs }
            | PowerStateKind::SuspendThenHibernate { hibernate_secs, .. } => hibernate_secs,
            _ => 0,
        }
    }

    fn has_suspend_phase(&self) -> bool {
        !matches!(
            self,
            PowerStateKind::Hibernate { .. } | PowerStateKind::Shutdown
        )
    }

    fn has_hibernate_phase(&self) -> bool {
        matches!(
            self,
            PowerStateKind::Hibernate { .. } | PowerStateKind::SuspendThenHibernate { .. }
        )
    }
}

impl fmt::Display for PowerStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A completed (or still open at `end_time`) power state interval.
///
/// Serializes flat, with `type` and only the phase durations that apply:
///
/// ```json
/// {"start_time":100,"end_time":170,"type":"suspend-then-hibernate","suspend_secs":20,"hibernate_secs":45}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "EventRecord", into = "EventRecord")]
pub struct PowerStateEvent {
    pub start_time: i64,
    pub end_time: i64,
    pub kind: PowerStateKind,
}

impl PowerStateEvent {
    pub fn new(start_time: i64, end_time: i64, kind: PowerStateKind) -> Self {
        Self {
            start_time,
            end_time: end_time.max(start_time),
            kind,
        }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end_time - self.start_time
    }

    pub fn suspend_secs(&self) -> i64 {
        self.kind.suspend_secs()
    }

    pub fn hibernate_secs(&self) -> i64 {
        self.kind.hibernate_secs()
    }
}

#[derive(Serialize, Deserialize)]
struct EventRecord {
    start_time: i64,
    end_time: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suspend_secs: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hibernate_secs: Option<i64>,
}

impl From<PowerStateEvent> for EventRecord {
    fn from(event: PowerStateEvent) -> Self {
        let kind = &event.kind;
        Self {
            start_time: event.start_time,
            end_time: event.end_time,
            kind: kind.type_name().to_string(),
            suspend_secs: kind.has_suspend_phase().then(|| kind.suspend_secs()),
            hibernate_secs: kind.has_hibernate_phase().then(|| kind.hibernate_secs()),
        }
    }
}

impl From<EventRecord> for PowerStateEvent {
    fn from(record: EventRecord) -> Self {
        let kind = PowerStateKind::from_parts(
            &record.kind,
            record.suspend_secs.unwrap_or(0),
            record.hibernate_secs.unwrap_or(0),
        );
        PowerStateEvent::new(record.start_time, record.end_time, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_action_prefers_sleep_action() {
        let entry = StateLogEntry::pre(10, SleepAction::SuspendThenHibernate)
            .with_sleep_action(SleepAction::Hibernate);
        assert_eq!(entry.effective_action(), &SleepAction::Hibernate);

        let plain = StateLogEntry::pre(10, SleepAction::Suspend);
        assert_eq!(plain.effective_action(), &SleepAction::Suspend);
    }

    #[test]
    fn test_kind_for_action_attributes_duration() {
        assert_eq!(
            PowerStateKind::for_action(&SleepAction::Hibernate, 30).hibernate_secs(),
            30
        );
        assert_eq!(
            PowerStateKind::for_action(&SleepAction::Hibernate, 30).suspend_secs(),
            0
        );
        assert_eq!(
            PowerStateKind::for_action(&SleepAction::HybridSleep, 12).suspend_secs(),
            12
        );
        assert_eq!(
            PowerStateKind::for_action(&SleepAction::Shutdown, 99),
            PowerStateKind::Shutdown
        );
    }

    #[test]
    fn test_kind_from_parts() {
        let kind = PowerStateKind::from_parts("suspend-then-hibernate", 20, 45);
        assert_eq!(kind.suspend_secs(), 20);
        assert_eq!(kind.hibernate_secs(), 45);
        assert_eq!(kind.type_name(), "suspend-then-hibernate");

        let other = PowerStateKind::from_parts("suspend-after-failed-hibernate", 30, 9);
        assert_eq!(
            other,
            PowerStateKind::Other {
                name: "suspend-after-failed-hibernate".to_string(),
                suspend_secs: 30,
            }
        );
        assert_eq!(other.type_name(), "suspend-after-failed-hibernate");
        assert_eq!(other.hibernate_secs(), 0);
    }

    #[test]
    fn test_unknown_verb_is_kept() {
        let action = SleepAction::from("suspend-after-failed-hibernate");
        assert_eq!(
            action,
            SleepAction::Other("suspend-after-failed-hibernate".to_string())
        );
        assert_eq!(action.as_str(), "suspend-after-failed-hibernate");
        assert_eq!(SleepAction::from("hybrid-sleep"), SleepAction::HybridSleep);
        assert_eq!(String::from(SleepAction::SuspendThenHibernate), "suspend-then-hibernate");

        let kind = PowerStateKind::for_action(&action, 40);
        assert_eq!(kind.suspend_secs(), 40);
        assert_eq!(kind.type_name(), "suspend-after-failed-hibernate");
    }

    #[test]
    fn test_event_end_never_precedes_start() {
        let event = PowerStateEvent::new(100, 90, PowerStateKind::Shutdown);
        assert_eq!(event.end_time, 100);
        assert_eq!(event.duration_secs(), 0);
    }
}
