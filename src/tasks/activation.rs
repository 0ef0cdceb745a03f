//! Activation steps shared between [`super::artifacts::InstallArtifacts`]
//! and the reload tasks that follow it.
//!
//! The artifact task records the trigger of every destination it changed;
//! each reload task asks whether its trigger is pending and does nothing
//! otherwise, so an idempotent re-run reloads nothing.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::catalog::Activation;

/// Cheaply clonable set of pending activation steps.
#[derive(Debug, Clone, Default)]
pub struct Activations {
    pending: Arc<Mutex<BTreeSet<Activation>>>,
}

impl Activations {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `activation` is owed. [`Activation::None`] is ignored.
    pub fn push(&self, activation: &Activation) {
        if *activation == Activation::None {
            return;
        }
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(activation.clone());
    }

    /// Whether `activation` is owed.
    #[must_use]
    pub fn contains(&self, activation: &Activation) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(activation)
    }

    /// Units owed a restart, sorted.
    #[must_use]
    pub fn restarts(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|a| match a {
                Activation::Restart(unit) => Some(unit.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether nothing is owed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_set_is_empty() {
        assert!(Activations::new().is_empty());
    }

    #[test]
    fn none_is_not_recorded() {
        let set = Activations::new();
        set.push(&Activation::None);
        assert!(set.is_empty());
    }

    #[test]
    fn clone_sees_same_state() {
        let set = Activations::new();
        let cloned = set.clone();
        set.push(&Activation::Boot);
        set.push(&Activation::Restart("b.service".into()));
        set.push(&Activation::Restart("a.service".into()));
        assert!(cloned.contains(&Activation::Boot));
        assert!(!cloned.contains(&Activation::Udev));
        assert_eq!(cloned.restarts(), ["a.service", "b.service"]);
    }
}
