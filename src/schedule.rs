use std::time::Duration;

use chrono::{NaiveTime, Weekday};
use serde::Serialize;

use crate::model::policy::UpdateInterval;

/// Day the weekly and fortnightly triggers fire on.
pub const WEEKLY_RUN_DAY: Weekday = Weekday::Tue;

pub const MAINTENANCE_TASK: &str = "Winget-Warden";
pub const NOTIFICATION_TASK: &str = "Winget-Warden-Notify";

/// SID of the Authenticated Users group.
pub const AUTHENTICATED_USERS_SID: &str = "S-1-5-11";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    AtLogon,
    Daily {
        #[serde(serialize_with = "hh_mm")]
        at: NaiveTime,
        days_interval: u8,
    },
    Weekly {
        #[serde(serialize_with = "hh_mm")]
        at: NaiveTime,
        weeks_interval: u8,
        day: Weekday,
    },
    Monthly {
        #[serde(serialize_with = "hh_mm")]
        at: NaiveTime,
        day_of_month: u8,
    },
}

impl Trigger {
    pub fn label(&self) -> String {
        match self {
            Trigger::AtLogon => "at logon".to_string(),
            Trigger::Daily { days_interval: 1, .. } => "daily".to_string(),
            Trigger::Daily { days_interval, .. } => format!("every {days_interval} days"),
            Trigger::Weekly {
                weeks_interval: 1,
                day,
                ..
            } => format!("weekly on {day}"),
            Trigger::Weekly {
                weeks_interval,
                day,
                ..
            } => format!("every {weeks_interval} weeks on {day}"),
            Trigger::Monthly { day_of_month, .. } => format!("monthly on day {day_of_month}"),
        }
    }

    pub fn anchor(&self) -> Option<NaiveTime> {
        match self {
            Trigger::AtLogon => None,
            Trigger::Daily { at, .. } | Trigger::Weekly { at, .. } | Trigger::Monthly { at, .. } => {
                Some(*at)
            }
        }
    }
}

/// Logon trigger when requested, plus one recurrence trigger for `interval`.
/// An empty result means the caller registers an always-eligible task.
pub fn build_triggers(interval: Option<UpdateInterval>, at: NaiveTime, at_logon: bool) -> Vec<Trigger> {
    let mut triggers = Vec::new();
    if at_logon {
        triggers.push(Trigger::AtLogon);
    }

    let recurrence = interval.map(|interval| match interval {
        UpdateInterval::Daily => Trigger::Daily {
            at,
            days_interval: 1,
        },
        UpdateInterval::Every2Days => Trigger::Daily {
            at,
            days_interval: 2,
        },
        UpdateInterval::Weekly => Trigger::Weekly {
            at,
            weeks_interval: 1,
            day: WEEKLY_RUN_DAY,
        },
        UpdateInterval::Every2Weeks => Trigger::Weekly {
            at,
            weeks_interval: 2,
            day: WEEKLY_RUN_DAY,
        },
        UpdateInterval::Monthly => Trigger::Monthly {
            at,
            day_of_month: 1,
        },
    });
    triggers.extend(recurrence);
    triggers
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Principal {
    /// Local system account, highest run level.
    System,
    /// The Authenticated Users group.
    AuthenticatedUsers,
}

/// Access-control entry applied to a task after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    pub sid: &'static str,
    /// SDDL rights string.
    pub rights: &'static str,
}

/// What the scheduler-registration collaborator needs to create a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDefinition {
    pub name: &'static str,
    pub principal: Principal,
    #[serde(serialize_with = "as_secs")]
    pub execution_limit: Duration,
    pub triggers: Vec<Trigger>,
    pub grant: Option<AccessGrant>,
}

impl TaskDefinition {
    /// Empty trigger set: the task is always eligible to run on demand.
    pub fn is_unconditional(&self) -> bool {
        self.triggers.is_empty()
    }
}

pub fn maintenance_task(triggers: Vec<Trigger>) -> TaskDefinition {
    TaskDefinition {
        name: MAINTENANCE_TASK,
        principal: Principal::System,
        execution_limit: Duration::from_secs(3 * 60 * 60),
        triggers,
        grant: None,
    }
}

pub fn notification_task() -> TaskDefinition {
    TaskDefinition {
        name: NOTIFICATION_TASK,
        principal: Principal::AuthenticatedUsers,
        execution_limit: Duration::from_secs(5 * 60),
        triggers: Vec::new(),
        grant: Some(AccessGrant {
            sid: AUTHENTICATED_USERS_SID,
            rights: "GRGX",
        }),
    }
}

fn hh_mm<S: serde::Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format("%H:%M"))
}

fn as_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(raw: &str) -> NaiveTime {
        NaiveTime::parse_from_str(raw, "%H:%M").unwrap()
    }

    #[test]
    fn weekly_without_logon_is_one_trigger() {
        let triggers = build_triggers(Some(UpdateInterval::Weekly), time("16:00"), false);
        assert_eq!(
            triggers,
            vec![Trigger::Weekly {
                at: time("16:00"),
                weeks_interval: 1,
                day: Weekday::Tue
            }]
        );
        assert_eq!(triggers[0].anchor(), Some(time("16:00")));
    }

    #[test]
    fn daily_with_logon_is_two_triggers() {
        let triggers = build_triggers(Some(UpdateInterval::Daily), time("09:00"), true);
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0], Trigger::AtLogon);
        assert_eq!(triggers[1].anchor(), Some(time("09:00")));
        assert_eq!(triggers[0].label(), "at logon");
        assert_eq!(triggers[1].label(), "daily");
    }

    #[test]
    fn each_interval_maps_to_its_recurrence() {
        let at = time("06:00");
        assert!(matches!(
            build_triggers(Some(UpdateInterval::Every2Days), at, false).as_slice(),
            [Trigger::Daily { days_interval: 2, .. }]
        ));
        assert!(matches!(
            build_triggers(Some(UpdateInterval::Every2Weeks), at, false).as_slice(),
            [Trigger::Weekly { weeks_interval: 2, day: Weekday::Tue, .. }]
        ));
        assert!(matches!(
            build_triggers(Some(UpdateInterval::Monthly), at, false).as_slice(),
            [Trigger::Monthly { day_of_month: 1, .. }]
        ));
    }

    #[test]
    fn no_interval_and_no_logon_is_unconditional() {
        let triggers = build_triggers(None, time("06:00"), false);
        assert!(triggers.is_empty());
        assert!(maintenance_task(triggers).is_unconditional());
    }

    #[test]
    fn task_definitions_carry_principal_and_limits() {
        let maintenance = maintenance_task(Vec::new());
        assert_eq!(maintenance.principal, Principal::System);
        assert_eq!(maintenance.execution_limit, Duration::from_secs(10_800));

        let notify = notification_task();
        assert_eq!(notify.principal, Principal::AuthenticatedUsers);
        assert_eq!(notify.execution_limit, Duration::from_secs(300));
        assert_eq!(notify.grant.as_ref().map(|g| g.sid), Some("S-1-5-11"));
    }

    #[test]
    fn triggers_serialize_with_short_times() {
        let json = serde_json::to_value(build_triggers(Some(UpdateInterval::Weekly), time("16:00"), true)).unwrap();
        assert_eq!(json[0]["kind"], "at_logon");
        assert_eq!(json[1]["kind"], "weekly");
        assert_eq!(json[1]["at"], "16:00");
        assert_eq!(json[1]["day"], "Tue");
    }
}
