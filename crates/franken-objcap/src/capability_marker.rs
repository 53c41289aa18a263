//! Calling-discipline roles for callables.
//!
//! A callable is unmarked (ordinary function, callable either way),
//! constructor-only (reachable through `construct`), or a method of one
//! owner type (reachable only on instances of that type).  Roles live in a
//! side table keyed by callable identity.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ObjcapError;
use crate::events::{MARKER_COMPONENT, PolicyEventOutcome, PolicyEventType};
use crate::object_model::ObjectHandle;
use crate::policy_context::PolicyContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "owner", rename_all = "snake_case")]
pub enum CapabilityRole {
    #[default]
    Unmarked,
    ConstructorOnly,
    MethodOf(ObjectHandle),
}

impl CapabilityRole {
    pub fn is_method(self) -> bool {
        matches!(self, Self::MethodOf(_))
    }

    pub fn is_constructor_only(self) -> bool {
        matches!(self, Self::ConstructorOnly)
    }
}

impl fmt::Display for CapabilityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmarked => write!(f, "unmarked"),
            Self::ConstructorOnly => write!(f, "constructor_only"),
            Self::MethodOf(owner) => write!(f, "method_of({owner})"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityMarker {
    roles: BTreeMap<ObjectHandle, CapabilityRole>,
}

impl CapabilityMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(&self, callable: ObjectHandle) -> CapabilityRole {
        self.roles.get(&callable).copied().unwrap_or_default()
    }

    pub(crate) fn set(&mut self, callable: ObjectHandle, role: CapabilityRole) {
        self.roles.insert(callable, role);
    }

    pub(crate) fn forget(&mut self, callable: ObjectHandle) {
        self.roles.remove(&callable);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, CapabilityRole)> + '_ {
        self.roles.iter().map(|(callable, role)| (*callable, *role))
    }
}

impl PolicyContext {
    pub fn role_of(&self, callable: ObjectHandle) -> CapabilityRole {
        self.marker.role(callable)
    }

    /// Declare `callable` reachable only through `construct`, optionally
    /// linking it to its supertype.
    pub fn mark_constructor_only(
        &mut self,
        callable: ObjectHandle,
        super_type: Option<ObjectHandle>,
    ) -> Result<ObjectHandle, ObjcapError> {
        self.heap.callable_slot(callable)?;
        if self.role_of(callable).is_method() {
            return Err(self.role_failure(callable, "methods can't be constructors"));
        }
        self.marker.set(callable, CapabilityRole::ConstructorOnly);
        self.emit(
            self.event(
                MARKER_COMPONENT,
                PolicyEventType::RoleMarked,
                PolicyEventOutcome::Marked,
            )
            .callable(callable)
            .detail(CapabilityRole::ConstructorOnly.to_string()),
        );
        if let Some(super_type) = super_type {
            self.set_super_once(callable, super_type)?;
        }
        Ok(callable)
    }

    /// Declare `callable` a method of `owner` and freeze it.
    ///
    /// Re-marking for the same owner is a no-op apart from the freeze; a
    /// method cannot be moved to a different owner.
    pub fn mark_method_of(
        &mut self,
        callable: ObjectHandle,
        owner: ObjectHandle,
    ) -> Result<ObjectHandle, ObjcapError> {
        self.heap.callable_slot(callable)?;
        match self.role_of(callable) {
            CapabilityRole::ConstructorOnly => {
                return Err(self.role_failure(callable, "constructors can't be methods"));
            }
            CapabilityRole::MethodOf(existing) if existing != owner => {
                return Err(self.role_failure(
                    callable,
                    format!("already a method of {existing}"),
                ));
            }
            _ => {}
        }
        self.heap.callable_slot(owner)?;
        if self.role_of(owner).is_method() {
            return Err(self.role_failure(owner, "methods can't have methods"));
        }
        let role = CapabilityRole::MethodOf(owner);
        self.marker.set(callable, role);
        self.emit(
            self.event(
                MARKER_COMPONENT,
                PolicyEventType::RoleMarked,
                PolicyEventOutcome::Marked,
            )
            .callable(callable)
            .object(owner)
            .detail(role.to_string()),
        );
        self.freeze(callable)
    }

    pub fn is_callable_as_constructor(&self, callable: ObjectHandle) -> bool {
        self.heap.is_callable(callable) && !self.role_of(callable).is_method()
    }

    pub fn is_callable_as_method(&self, callable: ObjectHandle) -> bool {
        self.heap.is_callable(callable) && !self.role_of(callable).is_constructor_only()
    }

    /// Whether `callable` may run with `instance` as its receiver.
    pub fn is_method_of_instance(&self, callable: ObjectHandle, instance: ObjectHandle) -> bool {
        match self.role_of(callable) {
            CapabilityRole::MethodOf(owner) => {
                self.heap.is_instance_of(instance, owner).unwrap_or(false)
            }
            CapabilityRole::Unmarked => true,
            CapabilityRole::ConstructorOnly => false,
        }
    }

    pub(crate) fn role_failure(
        &mut self,
        callable: ObjectHandle,
        detail: impl Into<String>,
    ) -> ObjcapError {
        let err = ObjcapError::role(callable, detail);
        self.emit(
            self.event(
                MARKER_COMPONENT,
                PolicyEventType::RoleMarked,
                PolicyEventOutcome::Denied,
            )
            .callable(callable)
            .failure(&err),
        );
        err
    }
}
