//! Per-object immutability marks.
//!
//! Freezing is shallow: an object's delegate is not required to be frozen
//! as well.  A frozen instance whose prototype is still writable can
//! therefore observe inherited changes.

use std::collections::BTreeSet;

use crate::error::ObjcapError;
use crate::events::{FREEZE_COMPONENT, PolicyEventOutcome, PolicyEventType};
use crate::object_model::ObjectHandle;
use crate::policy_context::PolicyContext;

/// Monotonic frozen marks keyed by object identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreezeController {
    frozen: BTreeSet<ObjectHandle>,
}

impl FreezeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_frozen(&self, object: ObjectHandle) -> bool {
        self.frozen.contains(&object)
    }

    /// Set the mark; returns `true` the first time.
    pub(crate) fn mark(&mut self, object: ObjectHandle) -> bool {
        self.frozen.insert(object)
    }

    pub(crate) fn forget(&mut self, object: ObjectHandle) {
        self.frozen.remove(&object);
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.frozen.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.frozen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frozen.is_empty()
    }
}

impl PolicyContext {
    /// Revoke every settable grant on `object`, including the ones it
    /// inherits from its delegates, then mark it frozen.
    pub fn freeze(&mut self, object: ObjectHandle) -> Result<ObjectHandle, ObjcapError> {
        self.heap.get(object)?;
        let revoked = self.registry.revoke_settable(object)
            + self.registry.shadow_inherited_settable(&self.heap, object);
        let outcome = if self.freezer.mark(object) {
            PolicyEventOutcome::Frozen
        } else {
            PolicyEventOutcome::AlreadyFrozen
        };
        self.emit(
            self.event(FREEZE_COMPONENT, PolicyEventType::Freeze, outcome)
                .object(object)
                .detail(format!("revoked {revoked} settable grants")),
        );
        Ok(object)
    }

    pub fn is_frozen(&self, object: ObjectHandle) -> bool {
        self.freezer.is_frozen(object)
    }
}
