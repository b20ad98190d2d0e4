//! Versioned, monotonically improving state replicated to every machine.

use parking_lot::RwLock;
use std::fmt::Debug;

/// A replicated value ordered by an "improves on" relation, e.g. a
/// branch-and-bound upper bound.
///
/// `is_newer_than` must be a strict order: a value is never newer than
/// itself. Pruning stays correct with a stale copy as long as the relation
/// only ever admits valid improvements.
pub trait Shared: Clone + Default + Debug + Send + Sync + 'static {
    fn is_newer_than(&self, other: &Self) -> bool;
}

/// Workloads that share nothing use `()`.
impl Shared for () {
    fn is_newer_than(&self, _other: &Self) -> bool {
        false
    }
}

/// One node's copy of the shared value.
///
/// Every read and merge goes through one lock, so concurrent proposals from
/// tasks on the same machine see a consistent compare-and-replace.
#[derive(Debug, Default)]
pub struct SharedCell<S> {
    value: RwLock<S>,
}

impl<S: Shared> SharedCell<S> {
    pub fn new(value: S) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Current copy
    pub fn get(&self) -> S {
        self.value.read().clone()
    }

    /// Overwrite unconditionally. Used when a new computation installs its
    /// initial value.
    pub fn replace(&self, value: S) {
        *self.value.write() = value;
    }

    /// Install `proposed` only if it improves on the current copy.
    /// Returns whether it was installed; replaying an applied value is a no-op.
    pub fn merge(&self, proposed: S) -> bool {
        let mut current = self.value.write();
        if proposed.is_newer_than(&current) {
            *current = proposed;
            true
        } else {
            false
        }
    }
}
