//! Per-project on/off state of toggleable features.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;

/// Persisted boolean per (scope, feature). Scope is a project id.
///
/// Absent entries read as `false`. `toggle` is a plain read-modify-write:
/// two concurrent toggles on the same pair resolve as last-write-wins.
pub trait ToggleStore {
    type Error;

    fn get(&self, scope: i64, feature: &str) -> Result<bool, Self::Error>;

    fn set(&self, scope: i64, feature: &str, on: bool) -> Result<(), Self::Error>;

    /// Flip the stored value and return the new one.
    fn toggle(&self, scope: i64, feature: &str) -> Result<bool, Self::Error> {
        let next = !self.get(scope, feature)?;
        self.set(scope, feature, next)?;
        Ok(next)
    }
}

/// Process-local toggle store.
#[derive(Debug, Default)]
pub struct MemoryToggleStore {
    states: Mutex<HashMap<(i64, String), bool>>,
}

impl MemoryToggleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToggleStore for MemoryToggleStore {
    type Error = Infallible;

    fn get(&self, scope: i64, feature: &str) -> Result<bool, Infallible> {
        let states = self.states.lock().expect("toggle store lock poisoned");
        Ok(states
            .get(&(scope, feature.to_string()))
            .copied()
            .unwrap_or(false))
    }

    fn set(&self, scope: i64, feature: &str, on: bool) -> Result<(), Infallible> {
        let mut states = self.states.lock().expect("toggle store lock poisoned");
        states.insert((scope, feature.to_string()), on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_state_reads_as_off() {
        let store = MemoryToggleStore::new();
        assert!(!store.get(7, "designer-enhancements").unwrap());
    }

    #[test]
    fn toggle_after_set_off_turns_feature_on() {
        let store = MemoryToggleStore::new();
        store.set(7, "designer-enhancements", false).unwrap();

        assert!(store.toggle(7, "designer-enhancements").unwrap());
        assert!(store.get(7, "designer-enhancements").unwrap());
    }

    #[test]
    fn toggling_twice_restores_original_value() {
        let store = MemoryToggleStore::new();
        for initial in [false, true] {
            store.set(1, "survey-annotations", initial).unwrap();
            store.toggle(1, "survey-annotations").unwrap();
            store.toggle(1, "survey-annotations").unwrap();
            assert_eq!(store.get(1, "survey-annotations").unwrap(), initial);
        }
    }

    #[test]
    fn set_is_idempotent() {
        let store = MemoryToggleStore::new();
        store.set(2, "data-entry-annotations", true).unwrap();
        store.set(2, "data-entry-annotations", true).unwrap();
        assert!(store.get(2, "data-entry-annotations").unwrap());
    }

    #[test]
    fn scopes_are_independent() {
        let store = MemoryToggleStore::new();
        store.toggle(1, "designer-enhancements").unwrap();

        assert!(store.get(1, "designer-enhancements").unwrap());
        assert!(!store.get(2, "designer-enhancements").unwrap());
        assert!(!store.get(1, "survey-annotations").unwrap());
    }
}
