use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::Serialize;
use thiserror::Error;

/// Fixed set of operator policy keys kept in the machine-wide store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PolicyKey {
    NotificationLevel,
    AutoUpdate,
    AutoUpdateBlocklist,
    DisableOnMetered,
    MachineScopeOnly,
    UpdateOnLogin,
    UpdateInterval,
    UpdateTime,
    StoreUpdatesOriginalValue,
}

impl PolicyKey {
    pub const ALL: [PolicyKey; 9] = [
        PolicyKey::NotificationLevel,
        PolicyKey::AutoUpdate,
        PolicyKey::AutoUpdateBlocklist,
        PolicyKey::DisableOnMetered,
        PolicyKey::MachineScopeOnly,
        PolicyKey::UpdateOnLogin,
        PolicyKey::UpdateInterval,
        PolicyKey::UpdateTime,
        PolicyKey::StoreUpdatesOriginalValue,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PolicyKey::NotificationLevel => "NotificationLevel",
            PolicyKey::AutoUpdate => "AutoUpdate",
            PolicyKey::AutoUpdateBlocklist => "AutoUpdateBlocklist",
            PolicyKey::DisableOnMetered => "DisableOnMetered",
            PolicyKey::MachineScopeOnly => "MachineScopeOnly",
            PolicyKey::UpdateOnLogin => "UpdateOnLogin",
            PolicyKey::UpdateInterval => "UpdateInterval",
            PolicyKey::UpdateTime => "UpdateTime",
            PolicyKey::StoreUpdatesOriginalValue => "StoreUpdatesOriginalValue",
        }
    }

    /// Parse a user-supplied value for this key, enforcing its constraint.
    pub fn parse_value(self, raw: &str) -> Result<PolicyValue, PolicyError> {
        let raw = raw.trim();
        let invalid = |reason: &str| PolicyError::InvalidValue {
            key: self,
            reason: format!("{reason} (got {raw:?})"),
        };

        let value = match self {
            PolicyKey::NotificationLevel => PolicyValue::NotificationLevel(
                raw.parse()
                    .map_err(|_| invalid("expected Full, SuccessOnly or None"))?,
            ),
            PolicyKey::AutoUpdate
            | PolicyKey::DisableOnMetered
            | PolicyKey::MachineScopeOnly
            | PolicyKey::UpdateOnLogin => {
                PolicyValue::Flag(parse_flag(raw).ok_or_else(|| invalid("expected 0 or 1"))?)
            }
            PolicyKey::AutoUpdateBlocklist => PolicyValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            PolicyKey::UpdateInterval => PolicyValue::Interval(raw.parse().map_err(|_| {
                invalid("expected Daily, Every2Days, Weekly, Every2Weeks or Monthly")
            })?),
            PolicyKey::UpdateTime => PolicyValue::Time(
                parse_time_of_day(raw).ok_or_else(|| invalid("expected HH:MM or HH:MM:SS"))?,
            ),
            PolicyKey::StoreUpdatesOriginalValue => PolicyValue::Integer(
                raw.parse()
                    .map_err(|_| invalid("expected a non-negative integer"))?,
            ),
        };
        Ok(value)
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyKey {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyKey::ALL
            .into_iter()
            .find(|key| key.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PolicyError::UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("expected Key=Value, got {0:?}")]
    MalformedAssignment(String),
    #[error("unknown policy key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: PolicyKey, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationLevel {
    Full,
    SuccessOnly,
    None,
}

impl NotificationLevel {
    pub fn name(self) -> &'static str {
        match self {
            NotificationLevel::Full => "Full",
            NotificationLevel::SuccessOnly => "SuccessOnly",
            NotificationLevel::None => "None",
        }
    }
}

impl FromStr for NotificationLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            NotificationLevel::Full,
            NotificationLevel::SuccessOnly,
            NotificationLevel::None,
        ]
        .into_iter()
        .find(|level| level.name().eq_ignore_ascii_case(s.trim()))
        .ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateInterval {
    Daily,
    Every2Days,
    Weekly,
    Every2Weeks,
    Monthly,
}

impl UpdateInterval {
    pub fn name(self) -> &'static str {
        match self {
            UpdateInterval::Daily => "Daily",
            UpdateInterval::Every2Days => "Every2Days",
            UpdateInterval::Weekly => "Weekly",
            UpdateInterval::Every2Weeks => "Every2Weeks",
            UpdateInterval::Monthly => "Monthly",
        }
    }
}

impl FromStr for UpdateInterval {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            UpdateInterval::Daily,
            UpdateInterval::Every2Days,
            UpdateInterval::Weekly,
            UpdateInterval::Every2Weeks,
            UpdateInterval::Monthly,
        ]
        .into_iter()
        .find(|interval| interval.name().eq_ignore_ascii_case(s.trim()))
        .ok_or(())
    }
}

/// A validated policy value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PolicyValue {
    NotificationLevel(NotificationLevel),
    Flag(bool),
    List(Vec<String>),
    Interval(UpdateInterval),
    Time(NaiveTime),
    Integer(u32),
}

impl fmt::Display for PolicyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyValue::NotificationLevel(level) => f.write_str(level.name()),
            PolicyValue::Flag(flag) => write!(f, "{}", u8::from(*flag)),
            PolicyValue::List(items) => f.write_str(&items.join(",")),
            PolicyValue::Interval(interval) => f.write_str(interval.name()),
            PolicyValue::Time(time) => write!(f, "{}", time.format("%H:%M:%S")),
            PolicyValue::Integer(value) => write!(f, "{value}"),
        }
    }
}

/// Partial write: only the `Some` fields are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyUpdate {
    pub notification_level: Option<NotificationLevel>,
    pub auto_update: Option<bool>,
    pub auto_update_blocklist: Option<Vec<String>>,
    pub disable_on_metered: Option<bool>,
    pub machine_scope_only: Option<bool>,
    pub update_on_login: Option<bool>,
    pub update_interval: Option<UpdateInterval>,
    pub update_time: Option<NaiveTime>,
    pub store_updates_original_value: Option<u32>,
}

impl PolicyUpdate {
    /// Apply a `Key=Value` assignment as given on the command line.
    pub fn assign(&mut self, assignment: &str) -> Result<(), PolicyError> {
        let (key, raw) = assignment
            .split_once('=')
            .ok_or_else(|| PolicyError::MalformedAssignment(assignment.to_string()))?;
        let key: PolicyKey = key.parse()?;
        let value = key.parse_value(raw)?;
        self.set(key, value)
    }

    pub fn set(&mut self, key: PolicyKey, value: PolicyValue) -> Result<(), PolicyError> {
        let mismatch = |value: &PolicyValue| PolicyError::InvalidValue {
            key,
            reason: format!("value {value} has the wrong type"),
        };

        match (key, value) {
            (PolicyKey::NotificationLevel, PolicyValue::NotificationLevel(v)) => {
                self.notification_level = Some(v)
            }
            (PolicyKey::AutoUpdate, PolicyValue::Flag(v)) => self.auto_update = Some(v),
            (PolicyKey::AutoUpdateBlocklist, PolicyValue::List(v)) => {
                self.auto_update_blocklist = Some(v)
            }
            (PolicyKey::DisableOnMetered, PolicyValue::Flag(v)) => {
                self.disable_on_metered = Some(v)
            }
            (PolicyKey::MachineScopeOnly, PolicyValue::Flag(v)) => {
                self.machine_scope_only = Some(v)
            }
            (PolicyKey::UpdateOnLogin, PolicyValue::Flag(v)) => self.update_on_login = Some(v),
            (PolicyKey::UpdateInterval, PolicyValue::Interval(v)) => {
                self.update_interval = Some(v)
            }
            (PolicyKey::UpdateTime, PolicyValue::Time(v)) => self.update_time = Some(v),
            (PolicyKey::StoreUpdatesOriginalValue, PolicyValue::Integer(v)) => {
                self.store_updates_original_value = Some(v)
            }
            (_, other) => return Err(mismatch(&other)),
        }
        Ok(())
    }

    /// Supplied fields in key order.
    pub fn entries(&self) -> Vec<(PolicyKey, PolicyValue)> {
        let mut out = Vec::new();
        if let Some(v) = self.notification_level {
            out.push((PolicyKey::NotificationLevel, PolicyValue::NotificationLevel(v)));
        }
        if let Some(v) = self.auto_update {
            out.push((PolicyKey::AutoUpdate, PolicyValue::Flag(v)));
        }
        if let Some(v) = &self.auto_update_blocklist {
            out.push((PolicyKey::AutoUpdateBlocklist, PolicyValue::List(v.clone())));
        }
        if let Some(v) = self.disable_on_metered {
            out.push((PolicyKey::DisableOnMetered, PolicyValue::Flag(v)));
        }
        if let Some(v) = self.machine_scope_only {
            out.push((PolicyKey::MachineScopeOnly, PolicyValue::Flag(v)));
        }
        if let Some(v) = self.update_on_login {
            out.push((PolicyKey::UpdateOnLogin, PolicyValue::Flag(v)));
        }
        if let Some(v) = self.update_interval {
            out.push((PolicyKey::UpdateInterval, PolicyValue::Interval(v)));
        }
        if let Some(v) = self.update_time {
            out.push((PolicyKey::UpdateTime, PolicyValue::Time(v)));
        }
        if let Some(v) = self.store_updates_original_value {
            out.push((PolicyKey::StoreUpdatesOriginalValue, PolicyValue::Integer(v)));
        }
        out
    }
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M"))
        .ok()
}
