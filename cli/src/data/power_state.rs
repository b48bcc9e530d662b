//! Rebuilds suspend, hibernate and shutdown intervals from the pre/post
//! markers written by the sleep hooks.

use powermon_protocol::{PowerStateEvent, PowerStateKind, SleepAction, StateLogEntry};

/// Replays `entries` (in logged order) into power state events.
///
/// Transitions without a closing `post` end at `now`. Orphaned `post` entries
/// are skipped. Deduplication against earlier runs is left to the store.
pub fn reconstruct(entries: &[StateLogEntry], now: i64) -> Vec<PowerStateEvent> {
    let mut events = Vec::new();
    let mut i = 0;

    while i < entries.len() {
        let entry = &entries[i];

        if !entry.is_pre() {
            i += 1;
            continue;
        }

        match entry.what {
            SleepAction::Shutdown => {
                // Only read after the next boot, so there is never a post.
                events.push(PowerStateEvent::new(entry.ts, now, PowerStateKind::Shutdown));
                i += 1;
            }
            SleepAction::SuspendThenHibernate => {
                let (event, consumed) = suspend_then_hibernate(&entries[i..], now);
                events.push(event);
                i += consumed;
            }
            _ => {
                let action = entry.effective_action();
                let (end, consumed) = match entries.get(i + 1) {
                    Some(next) if next.is_post() => (next.ts, 2),
                    _ => (now, 1),
                };
                let kind = PowerStateKind::for_action(action, elapsed(entry.ts, end));
                events.push(PowerStateEvent::new(entry.ts, end, kind));
                i += consumed;
            }
        }
    }

    events
}

/// Handles the up to four markers of a suspend-then-hibernate cycle:
/// pre(suspend), post(suspend), pre(hibernate), post(hibernate).
///
/// Returns the event and the number of entries consumed.
fn suspend_then_hibernate(entries: &[StateLogEntry], now: i64) -> (PowerStateEvent, usize) {
    let start = entries[0].ts;
    let phase = |idx: usize, pre: bool, action: SleepAction| {
        entries
            .get(idx)
            .filter(|e| e.is_pre() == pre && *e.effective_action() == action)
            .map(|e| e.ts)
    };

    let Some(post_suspend) = phase(1, false, SleepAction::Suspend) else {
        let kind = PowerStateKind::Suspend {
            suspend_secs: elapsed(start, now),
        };
        return (PowerStateEvent::new(start, now, kind), 1);
    };
    let suspend_secs = elapsed(start, post_suspend);

    let Some(pre_hibernate) = phase(2, true, SleepAction::Hibernate) else {
        // Woke before the hibernate timer fired.
        let kind = PowerStateKind::Suspend { suspend_secs };
        return (PowerStateEvent::new(start, post_suspend, kind), 2);
    };

    let (end, consumed) = match phase(3, false, SleepAction::Hibernate) {
        Some(post_hibernate) => (post_hibernate, 4),
        None => (now, 3),
    };
    let kind = PowerStateKind::SuspendThenHibernate {
        suspend_secs,
        hibernate_secs: elapsed(pre_hibernate, end),
    };
    (PowerStateEvent::new(start, end, kind), consumed)
}

fn elapsed(from: i64, to: i64) -> i64 {
    (to - from).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use powermon_protocol::SleepAction::*;

    fn s2h_pre(ts: i64, phase: SleepAction) -> StateLogEntry {
        StateLogEntry::pre(ts, SuspendThenHibernate).with_sleep_action(phase)
    }

    fn s2h_post(ts: i64, phase: SleepAction) -> StateLogEntry {
        StateLogEntry::post(ts, SuspendThenHibernate).with_sleep_action(phase)
    }

    #[test]
    fn test_suspend_pair() {
        let entries = [StateLogEntry::pre(100, Suspend), StateLogEntry::post(120, Suspend)];
        assert_eq!(
            reconstruct(&entries, 1_000),
            vec![PowerStateEvent::new(
                100,
                120,
                PowerStateKind::Suspend { suspend_secs: 20 }
            )]
        );
    }

    #[test]
    fn test_orphaned_pre_ends_now() {
        let entries = [StateLogEntry::pre(150, Suspend)];
        assert_eq!(
            reconstruct(&entries, 200),
            vec![PowerStateEvent::new(
                150,
                200,
                PowerStateKind::Suspend { suspend_secs: 50 }
            )]
        );
    }

    #[test]
    fn test_hibernate_duration_attributed_to_hibernate() {
        let entries = [
            StateLogEntry::pre(10, Hibernate),
            StateLogEntry::post(70, Hibernate),
        ];
        let events = reconstruct(&entries, 100);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].hibernate_secs(), 60);
        assert_eq!(events[0].suspend_secs(), 0);
    }

    #[test]
    fn test_sleep_action_overrides_what() {
        let entries = [
            StateLogEntry::pre(10, Suspend).with_sleep_action(Hibernate),
            StateLogEntry::post(40, Suspend).with_sleep_action(Hibernate),
        ];
        let events = reconstruct(&entries, 100);
        assert_eq!(
            events[0].kind,
            PowerStateKind::Hibernate { hibernate_secs: 30 }
        );
    }

    #[test]
    fn test_composite_full_sequence() {
        let entries = [
            s2h_pre(100, Suspend),
            s2h_post(120, Suspend),
            s2h_pre(125, Hibernate),
            s2h_post(170, Hibernate),
        ];
        assert_eq!(
            reconstruct(&entries, 1_000),
            vec![PowerStateEvent::new(
                100,
                170,
                PowerStateKind::SuspendThenHibernate {
                    suspend_secs: 20,
                    hibernate_secs: 45,
                }
            )]
        );
    }

    #[test]
    fn test_composite_still_hibernated() {
        let entries = [
            s2h_pre(100, Suspend),
            s2h_post(120, Suspend),
            s2h_pre(125, Hibernate),
        ];
        assert_eq!(
            reconstruct(&entries, 400),
            vec![PowerStateEvent::new(
                100,
                400,
                PowerStateKind::SuspendThenHibernate {
                    suspend_secs: 20,
                    hibernate_secs: 275,
                }
            )]
        );
    }

    #[test]
    fn test_composite_woke_before_hibernate() {
        let entries = [s2h_pre(100, Suspend), s2h_post(120, Suspend)];
        assert_eq!(
            reconstruct(&entries, 400),
            vec![PowerStateEvent::new(
                100,
                120,
                PowerStateKind::Suspend { suspend_secs: 20 }
            )]
        );
    }

    #[test]
    fn test_composite_orphaned() {
        let entries = [s2h_pre(100, Suspend)];
        assert_eq!(
            reconstruct(&entries, 160),
            vec![PowerStateEvent::new(
                100,
                160,
                PowerStateKind::Suspend { suspend_secs: 60 }
            )]
        );
    }

    #[test]
    fn test_composite_followed_by_plain_suspend() {
        let entries = [
            s2h_pre(100, Suspend),
            s2h_post(120, Suspend),
            StateLogEntry::pre(500, Suspend),
            StateLogEntry::post(530, Suspend),
        ];
        let events = reconstruct(&entries, 1_000);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].end_time, 120);
        assert_eq!(
            events[1],
            PowerStateEvent::new(500, 530, PowerStateKind::Suspend { suspend_secs: 30 })
        );
    }

    #[test]
    fn test_unknown_verb_pairs_like_suspend() {
        let verb = || Other("suspend-after-failed-hibernate".to_string());
        let entries = [
            StateLogEntry::pre(100, Suspend).with_sleep_action(verb()),
            StateLogEntry::post(130, Suspend).with_sleep_action(verb()),
        ];
        assert_eq!(
            reconstruct(&entries, 1_000),
            vec![PowerStateEvent::new(
                100,
                130,
                PowerStateKind::Other {
                    name: "suspend-after-failed-hibernate".to_string(),
                    suspend_secs: 30,
                }
            )]
        );
    }

    #[test]
    fn test_shutdown_ends_now() {
        let entries = [StateLogEntry::pre(100, Shutdown)];
        assert_eq!(
            reconstruct(&entries, 500),
            vec![PowerStateEvent::new(100, 500, PowerStateKind::Shutdown)]
        );
    }

    #[test]
    fn test_orphaned_post_skipped() {
        let entries = [
            StateLogEntry::post(90, Suspend),
            StateLogEntry::pre(100, Suspend),
            StateLogEntry::post(110, Suspend),
        ];
        let events = reconstruct(&entries, 500);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_time, 100);
    }

    #[test]
    fn test_empty_log() {
        assert!(reconstruct(&[], 500).is_empty());
    }

    #[test]
    fn test_reconstruct_is_idempotent() {
        let entries = [
            StateLogEntry::pre(10, Shutdown),
            StateLogEntry::pre(100, Suspend),
            StateLogEntry::post(120, Suspend),
            s2h_pre(200, Suspend),
            s2h_post(260, Suspend),
            s2h_pre(270, Hibernate),
            StateLogEntry::pre(900, Hibernate),
        ];
        let first = reconstruct(&entries, 1_000);
        let second = reconstruct(&entries, 1_000);
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_clock_going_backwards_clamps_durations() {
        let entries = [StateLogEntry::pre(100, Suspend), StateLogEntry::post(90, Suspend)];
        let events = reconstruct(&entries, 500);
        assert_eq!(events[0].end_time, 100);
        assert_eq!(events[0].suspend_secs(), 0);
    }
}
