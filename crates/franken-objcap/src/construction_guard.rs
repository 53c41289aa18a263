//! Instance lifecycle: `Raw → Cooking → Cooked`.
//!
//! A freshly allocated instance is `Raw`.  The outermost base constructor
//! moves it to `Cooking`; derived constructors must see it still `Raw`
//! (they delegate to their super constructor before touching it), and
//! methods must never see it `Raw`.  An instance with no entry in the
//! guard table is `Cooked`.
//!
//! These checks stop a constructor from being replayed as a method on an
//! already-built object, and a method from running on a half-built one.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability_marker::CapabilityRole;
use crate::error::ObjcapError;
use crate::events::{GUARD_COMPONENT, PolicyEventOutcome, PolicyEventType};
use crate::object_model::{ObjectHandle, Value};
use crate::policy_context::PolicyContext;

// ---------------------------------------------------------------------------
// States and policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructionState {
    Raw,
    Cooking,
}

impl fmt::Display for ConstructionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Cooking => write!(f, "cooking"),
        }
    }
}

/// What a rejected `enter_method` does to a `Raw` instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawMarkerPolicy {
    /// The rejection leaves the instance `Raw`.
    #[default]
    SideEffectFree,
    /// The rejection clears the `Raw` marker, so the instance is `Cooked`
    /// afterwards and a retried method call succeeds.
    ConsumeOnReject,
}

/// Result of the raw check performed on method entry.
///
/// `None` states mean `Cooked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardObservation {
    pub state_before: Option<ConstructionState>,
    pub state_after: Option<ConstructionState>,
    pub allowed: bool,
}

impl GuardObservation {
    /// Whether the check cleared a `Raw` marker.
    pub fn consumed_raw(&self) -> bool {
        self.state_before == Some(ConstructionState::Raw) && self.state_after.is_none()
    }

    fn unchanged(state: Option<ConstructionState>, allowed: bool) -> Self {
        Self {
            state_before: state,
            state_after: state,
            allowed,
        }
    }
}

// ---------------------------------------------------------------------------
// ConstructionGuard: lifecycle side table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstructionGuard {
    states: BTreeMap<ObjectHandle, ConstructionState>,
}

impl ConstructionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, instance: ObjectHandle) -> Option<ConstructionState> {
        self.states.get(&instance).copied()
    }

    pub fn is_raw(&self, instance: ObjectHandle) -> bool {
        self.state(instance) == Some(ConstructionState::Raw)
    }

    pub(crate) fn mark_raw(&mut self, instance: ObjectHandle) {
        self.states.insert(instance, ConstructionState::Raw);
    }

    /// `Raw → Cooking`; `false` (and no change) from any other state.
    pub(crate) fn begin_cooking(&mut self, instance: ObjectHandle) -> bool {
        match self.states.get_mut(&instance) {
            Some(state @ ConstructionState::Raw) => {
                *state = ConstructionState::Cooking;
                true
            }
            _ => false,
        }
    }

    /// Observe the raw marker for a method entry and apply `policy`.
    pub(crate) fn admit_method(
        &mut self,
        instance: ObjectHandle,
        policy: RawMarkerPolicy,
    ) -> GuardObservation {
        let before = self.state(instance);
        if before != Some(ConstructionState::Raw) {
            return GuardObservation::unchanged(before, true);
        }
        match policy {
            RawMarkerPolicy::SideEffectFree => GuardObservation::unchanged(before, false),
            RawMarkerPolicy::ConsumeOnReject => {
                self.states.remove(&instance);
                GuardObservation {
                    state_before: before,
                    state_after: None,
                    allowed: false,
                }
            }
        }
    }

    /// Drop any remaining entry, leaving the instance `Cooked`.  Returns the
    /// state it had.
    pub(crate) fn finish(&mut self, instance: ObjectHandle) -> Option<ConstructionState> {
        self.states.remove(&instance)
    }

    pub(crate) fn forget(&mut self, instance: ObjectHandle) {
        self.states.remove(&instance);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, ConstructionState)> + '_ {
        self.states.iter().map(|(instance, state)| (*instance, *state))
    }
}

// ---------------------------------------------------------------------------
// Policy operations
// ---------------------------------------------------------------------------

impl PolicyContext {
    pub fn construction_state(&self, instance: ObjectHandle) -> Option<ConstructionState> {
        self.guard.state(instance)
    }

    /// Allocate a `Raw` instance delegating to `ty`'s prototype.
    pub fn make_raw_instance(&mut self, ty: ObjectHandle) -> Result<ObjectHandle, ObjcapError> {
        let prototype = self.heap.type_prototype(ty)?;
        let instance = self.heap.alloc(Some(prototype));
        self.guard.mark_raw(instance);
        self.emit(
            self.event(
                GUARD_COMPONENT,
                PolicyEventType::InstanceAllocated,
                PolicyEventOutcome::Transitioned,
            )
            .callable(ty)
            .object(instance)
            .detail(ConstructionState::Raw.to_string()),
        );
        Ok(instance)
    }

    /// Run `ty` as a constructor over a fresh instance.
    ///
    /// The instance is `Cooked` once the body returns.  A failing body
    /// releases the half-built instance before the error is returned.
    pub fn construct(
        &mut self,
        ty: ObjectHandle,
        args: Vec<Value>,
    ) -> Result<ObjectHandle, ObjcapError> {
        self.heap.callable_slot(ty)?;
        if let CapabilityRole::MethodOf(owner) = self.role_of(ty) {
            return Err(self.role_failure(ty, format!("method of {owner} can't be constructed")));
        }
        let instance = self.make_raw_instance(ty)?;
        if let Err(err) = self.invoke(ty, Value::Object(instance), args) {
            if self.heap.contains(instance) {
                self.release(instance)?;
            }
            return Err(err);
        }
        let outcome = match self.guard.finish(instance) {
            Some(ConstructionState::Raw) => PolicyEventOutcome::CookedOnReturn,
            _ => PolicyEventOutcome::Cooked,
        };
        self.emit(
            self.event(GUARD_COMPONENT, PolicyEventType::ConstructionFinished, outcome)
                .callable(ty)
                .object(instance),
        );
        Ok(instance)
    }

    /// Entry check of the outermost constructor: `Raw → Cooking`.
    pub fn enter_base(
        &mut self,
        ty: ObjectHandle,
        instance: ObjectHandle,
    ) -> Result<GuardObservation, ObjcapError> {
        self.require_raw_instance_of(ty, instance, PolicyEventType::EnterBase)?;
        self.guard.begin_cooking(instance);
        let observation = GuardObservation {
            state_before: Some(ConstructionState::Raw),
            state_after: Some(ConstructionState::Cooking),
            allowed: true,
        };
        self.emit(
            self.event(
                GUARD_COMPONENT,
                PolicyEventType::EnterBase,
                PolicyEventOutcome::Transitioned,
            )
            .callable(ty)
            .object(instance),
        );
        Ok(observation)
    }

    /// Entry check of a derived constructor.  No transition.
    pub fn enter_derived(
        &mut self,
        ty: ObjectHandle,
        instance: ObjectHandle,
    ) -> Result<GuardObservation, ObjcapError> {
        self.require_raw_instance_of(ty, instance, PolicyEventType::EnterDerived)?;
        self.emit(
            self.event(
                GUARD_COMPONENT,
                PolicyEventType::EnterDerived,
                PolicyEventOutcome::Unchanged,
            )
            .callable(ty)
            .object(instance),
        );
        Ok(GuardObservation::unchanged(Some(ConstructionState::Raw), true))
    }

    /// Entry check of a method running with `instance` as its receiver.
    pub fn enter_method(
        &mut self,
        callable: ObjectHandle,
        instance: ObjectHandle,
    ) -> Result<GuardObservation, ObjcapError> {
        self.heap.callable_slot(callable)?;
        self.heap.get(instance)?;
        if self.role_of(callable).is_constructor_only() {
            return Err(self.role_failure(callable, "constructors can't be called as methods"));
        }
        if !self.is_method_of_instance(callable, instance) {
            return Err(self.guard_failure(
                PolicyEventType::EnterMethod,
                callable,
                instance,
                "entering stolen method",
            ));
        }
        let observation = self
            .guard
            .admit_method(instance, self.config.raw_marker_policy);
        if !observation.allowed {
            let detail = if observation.consumed_raw() {
                "can't call method as constructor; raw marker consumed"
            } else {
                "can't call method as constructor"
            };
            return Err(self.guard_failure(PolicyEventType::EnterMethod, callable, instance, detail));
        }
        self.emit(
            self.event(
                GUARD_COMPONENT,
                PolicyEventType::EnterMethod,
                PolicyEventOutcome::Allowed,
            )
            .callable(callable)
            .object(instance),
        );
        Ok(observation)
    }

    /// `enter_method` followed by the call itself.
    pub fn call_method(
        &mut self,
        callable: ObjectHandle,
        instance: ObjectHandle,
        args: Vec<Value>,
    ) -> Result<Value, ObjcapError> {
        self.enter_method(callable, instance)?;
        self.invoke(callable, Value::Object(instance), args)
    }

    fn require_raw_instance_of(
        &mut self,
        ty: ObjectHandle,
        instance: ObjectHandle,
        event: PolicyEventType,
    ) -> Result<(), ObjcapError> {
        if !self.heap.is_instance_of(instance, ty)? {
            return Err(self.guard_failure(event, ty, instance, "entering stolen constructor"));
        }
        if !self.guard.is_raw(instance) {
            return Err(self.guard_failure(event, ty, instance, "can't call constructor as method"));
        }
        Ok(())
    }

    fn guard_failure(
        &mut self,
        event: PolicyEventType,
        callable: ObjectHandle,
        instance: ObjectHandle,
        detail: &str,
    ) -> ObjcapError {
        let err = ObjcapError::identity(instance, detail);
        self.emit(
            self.event(GUARD_COMPONENT, event, PolicyEventOutcome::Denied)
                .callable(callable)
                .object(instance)
                .failure(&err),
        );
        err
    }
}
