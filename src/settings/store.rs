use chrono::NaiveTime;
use thiserror::Error;

use crate::model::policy::{
    NotificationLevel, PolicyKey, PolicyUpdate, PolicyValue, UpdateInterval, parse_time_of_day,
};
use crate::settings::backend::{BackendError, PolicyBackend, RawValue};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("persisted value for {key} is invalid: {reason}")]
    Invalid { key: PolicyKey, reason: String },
}

/// Typed access to the operator policy over a [`PolicyBackend`].
pub struct SettingsStore<B> {
    backend: B,
}

impl<B: PolicyBackend> SettingsStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read one key. An absent key is logged and yields `Ok(None)`.
    pub fn get(&self, key: PolicyKey) -> Result<Option<PolicyValue>, SettingsError> {
        let value = self.read(key)?;
        if value.is_none() {
            tracing::warn!("no value set for {key}");
        }
        Ok(value)
    }

    /// Every key with its current value, absent ones included.
    pub fn snapshot(&self) -> Result<Vec<(PolicyKey, Option<PolicyValue>)>, SettingsError> {
        PolicyKey::ALL
            .into_iter()
            .map(|key| Ok((key, self.read(key)?)))
            .collect()
    }

    /// Persist the supplied fields and leave the rest untouched. Returns the
    /// keys actually written.
    pub fn set(&mut self, update: &PolicyUpdate) -> Result<Vec<PolicyKey>, SettingsError> {
        let mut written = Vec::new();
        for (key, value) in update.entries() {
            if let PolicyValue::Integer(original) = value {
                if key == PolicyKey::StoreUpdatesOriginalValue {
                    if self.preserve_original(original)? {
                        written.push(key);
                    }
                    continue;
                }
            }

            self.backend.write(key.name(), encode(&value))?;
            tracing::info!("policy {key} set to {value}");
            written.push(key);
        }
        Ok(written)
    }

    /// Record the pre-override value of the external store policy. Only the
    /// first capture is kept; returns whether this call recorded it.
    pub fn preserve_original(&mut self, value: u32) -> Result<bool, SettingsError> {
        let key = PolicyKey::StoreUpdatesOriginalValue;
        if self.backend.read(key.name())?.is_some() {
            tracing::debug!("{key} already captured, keeping it");
            return Ok(false);
        }
        self.backend.write(key.name(), RawValue::Dword(value))?;
        tracing::info!("captured {key} = {value}");
        Ok(true)
    }

    pub fn original_store_value(&self) -> Result<Option<u32>, SettingsError> {
        match self.read(PolicyKey::StoreUpdatesOriginalValue)? {
            Some(PolicyValue::Integer(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Drop the captured original once it has been written back.
    pub fn clear_original(&mut self) -> Result<(), SettingsError> {
        self.backend
            .remove(PolicyKey::StoreUpdatesOriginalValue.name())?;
        Ok(())
    }

    pub fn machine_scope_only(&self) -> Result<bool, SettingsError> {
        self.flag(PolicyKey::MachineScopeOnly)
    }

    pub fn update_on_login(&self) -> Result<bool, SettingsError> {
        self.flag(PolicyKey::UpdateOnLogin)
    }

    pub fn update_interval(&self) -> Result<Option<UpdateInterval>, SettingsError> {
        match self.read(PolicyKey::UpdateInterval)? {
            Some(PolicyValue::Interval(interval)) => Ok(Some(interval)),
            _ => Ok(None),
        }
    }

    pub fn update_time(&self) -> Result<Option<NaiveTime>, SettingsError> {
        match self.read(PolicyKey::UpdateTime)? {
            Some(PolicyValue::Time(time)) => Ok(Some(time)),
            _ => Ok(None),
        }
    }

    fn flag(&self, key: PolicyKey) -> Result<bool, SettingsError> {
        Ok(matches!(self.read(key)?, Some(PolicyValue::Flag(true))))
    }

    fn read(&self, key: PolicyKey) -> Result<Option<PolicyValue>, SettingsError> {
        self.backend
            .read(key.name())?
            .map(|raw| decode(key, raw))
            .transpose()
    }
}

fn encode(value: &PolicyValue) -> RawValue {
    match value {
        PolicyValue::Flag(flag) => RawValue::Dword(u32::from(*flag)),
        PolicyValue::Integer(value) => RawValue::Dword(*value),
        PolicyValue::List(items) => RawValue::MultiString(items.clone()),
        other => RawValue::String(other.to_string()),
    }
}

fn decode(key: PolicyKey, raw: RawValue) -> Result<PolicyValue, SettingsError> {
    let invalid = |reason: String| SettingsError::Invalid { key, reason };

    match (key, raw) {
        (PolicyKey::NotificationLevel, RawValue::String(text)) => text
            .parse::<NotificationLevel>()
            .map(PolicyValue::NotificationLevel)
            .map_err(|_| invalid(format!("unknown level {text:?}"))),
        (
            PolicyKey::AutoUpdate
            | PolicyKey::DisableOnMetered
            | PolicyKey::MachineScopeOnly
            | PolicyKey::UpdateOnLogin,
            RawValue::Dword(flag),
        ) => match flag {
            0 => Ok(PolicyValue::Flag(false)),
            1 => Ok(PolicyValue::Flag(true)),
            other => Err(invalid(format!("flag must be 0 or 1, found {other}"))),
        },
        (PolicyKey::AutoUpdateBlocklist, RawValue::MultiString(items)) => {
            Ok(PolicyValue::List(items))
        }
        (PolicyKey::AutoUpdateBlocklist, RawValue::String(item)) if item.is_empty() => {
            Ok(PolicyValue::List(Vec::new()))
        }
        (PolicyKey::AutoUpdateBlocklist, RawValue::String(item)) => {
            Ok(PolicyValue::List(vec![item]))
        }
        (PolicyKey::UpdateInterval, RawValue::String(text)) => text
            .parse::<UpdateInterval>()
            .map(PolicyValue::Interval)
            .map_err(|_| invalid(format!("unknown interval {text:?}"))),
        (PolicyKey::UpdateTime, RawValue::String(text)) => parse_time_of_day(&text)
            .map(PolicyValue::Time)
            .ok_or_else(|| invalid(format!("not a time of day: {text:?}"))),
        (PolicyKey::StoreUpdatesOriginalValue, RawValue::Dword(value)) => {
            Ok(PolicyValue::Integer(value))
        }
        (_, other) => Err(invalid(format!("unexpected value kind {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;

    fn store() -> SettingsStore<MemoryBackend> {
        SettingsStore::new(MemoryBackend::default())
    }

    #[test]
    fn missing_key_yields_none() {
        let store = store();
        assert_eq!(store.get(PolicyKey::UpdateTime).unwrap(), None);
    }

    #[test]
    fn set_writes_only_supplied_fields() {
        let mut store = store();
        store
            .set(&PolicyUpdate {
                auto_update: Some(true),
                update_interval: Some(UpdateInterval::Weekly),
                ..PolicyUpdate::default()
            })
            .unwrap();
        store
            .set(&PolicyUpdate {
                notification_level: Some(NotificationLevel::SuccessOnly),
                ..PolicyUpdate::default()
            })
            .unwrap();

        assert_eq!(
            store.get(PolicyKey::AutoUpdate).unwrap(),
            Some(PolicyValue::Flag(true))
        );
        assert_eq!(
            store.update_interval().unwrap(),
            Some(UpdateInterval::Weekly)
        );
        assert_eq!(
            store.get(PolicyKey::NotificationLevel).unwrap(),
            Some(PolicyValue::NotificationLevel(NotificationLevel::SuccessOnly))
        );
        assert_eq!(store.get(PolicyKey::UpdateOnLogin).unwrap(), None);
    }

    #[test]
    fn original_store_value_is_never_overwritten() {
        let mut store = store();
        assert!(store.preserve_original(2).unwrap());
        assert!(!store.preserve_original(4).unwrap());

        let written = store
            .set(&PolicyUpdate {
                store_updates_original_value: Some(0),
                auto_update: Some(false),
                ..PolicyUpdate::default()
            })
            .unwrap();

        assert_eq!(written, vec![PolicyKey::AutoUpdate]);
        assert_eq!(store.original_store_value().unwrap(), Some(2));
    }

    #[test]
    fn clearing_the_original_allows_a_new_capture() {
        let mut store = store();
        store.preserve_original(2).unwrap();
        store.clear_original().unwrap();
        assert_eq!(store.original_store_value().unwrap(), None);
        assert!(store.preserve_original(3).unwrap());
    }

    #[test]
    fn persisted_values_are_validated_on_read() {
        let mut backend = MemoryBackend::default();
        backend.write("AutoUpdate", RawValue::Dword(7)).unwrap();
        backend
            .write("UpdateInterval", RawValue::String("Hourly".into()))
            .unwrap();
        let store = SettingsStore::new(backend);

        assert!(matches!(
            store.get(PolicyKey::AutoUpdate),
            Err(SettingsError::Invalid {
                key: PolicyKey::AutoUpdate,
                ..
            })
        ));
        assert!(store.get(PolicyKey::UpdateInterval).is_err());
    }

    #[test]
    fn values_are_encoded_as_registry_kinds() {
        let mut store = store();
        let mut update = PolicyUpdate::default();
        update.assign("UpdateTime=16:00").unwrap();
        update.assign("MachineScopeOnly=1").unwrap();
        update.assign("AutoUpdateBlocklist=A,B").unwrap();
        store.set(&update).unwrap();

        let backend = store.backend();
        assert_eq!(
            backend.read("UpdateTime").unwrap(),
            Some(RawValue::String("16:00:00".into()))
        );
        assert_eq!(
            backend.read("MachineScopeOnly").unwrap(),
            Some(RawValue::Dword(1))
        );
        assert_eq!(
            backend.read("AutoUpdateBlocklist").unwrap(),
            Some(RawValue::MultiString(vec!["A".into(), "B".into()]))
        );
        assert!(store.machine_scope_only().unwrap());
    }

    #[test]
    fn snapshot_lists_every_key() {
        let store = store();
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.len(), PolicyKey::ALL.len());
        assert!(snapshot.iter().all(|(_, value)| value.is_none()));
    }
}
