//! Per-(object, property) permission grants and the default access policy.
//!
//! Two caller roles are distinguished:
//! - **self**: an authored instance's own method acting on its receiver;
//! - **public**: any other caller.
//!
//! An explicit grant always wins.  Without one, self callers may write to
//! any unfrozen object (and so add properties to themselves), while public
//! callers only get the permissive defaults on plain data containers.  A
//! successful default decision is memoized as a grant, so later checks take
//! the fast path.
//!
//! Grants are inherited: a check resolves the nearest record along the
//! object's delegate chain, so members and whitelisted methods granted on a
//! prototype are visible through every instance.  A new own record starts
//! from the inherited bits and only ever raises them.
//!
//! Grants are monotonic: `settable ⇒ enumerable ⇒ readable` holds for every
//! record, and the only revocation is freezing, which clears `settable`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::container::ContainerClassifier;
use crate::error::{AccessOperation, ObjcapError};
use crate::events::{ACCESS_COMPONENT, PolicyEventOutcome, PolicyEventType};
use crate::object_model::{ObjectHandle, ObjectHeap, Value};
use crate::policy_context::PolicyContext;
use crate::property_name::NameTier;

// ---------------------------------------------------------------------------
// PermissionGrant
// ---------------------------------------------------------------------------

/// Strength of a grant.  Each level implies the ones below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantLevel {
    Read,
    Enumerate,
    Set,
}

impl fmt::Display for GrantLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Enumerate => write!(f, "enumerate"),
            Self::Set => write!(f, "set"),
        }
    }
}

/// Permission bits for one (object, property) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub readable: bool,
    pub enumerable: bool,
    pub settable: bool,
}

impl PermissionGrant {
    pub fn allows(self, level: GrantLevel) -> bool {
        match level {
            GrantLevel::Read => self.readable,
            GrantLevel::Enumerate => self.enumerable,
            GrantLevel::Set => self.settable,
        }
    }

    /// `settable ⇒ enumerable ⇒ readable`.
    pub fn is_monotonic(self) -> bool {
        (!self.settable || self.enumerable) && (!self.enumerable || self.readable)
    }

    fn raise(&mut self, level: GrantLevel) {
        self.readable = true;
        if level >= GrantLevel::Enumerate {
            self.enumerable = true;
        }
        if level >= GrantLevel::Set {
            self.settable = true;
        }
    }
}

// ---------------------------------------------------------------------------
// AccessRegistry: grant side table
// ---------------------------------------------------------------------------

/// Identity-keyed grant table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRegistry {
    grants: BTreeMap<ObjectHandle, BTreeMap<String, PermissionGrant>>,
}

impl AccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record held on `object` itself, if any.
    pub fn own(&self, object: ObjectHandle, name: &str) -> Option<PermissionGrant> {
        self.grants
            .get(&object)
            .and_then(|names| names.get(name))
            .copied()
    }

    /// Own grant bits, ignoring delegates.
    pub fn grant(&self, object: ObjectHandle, name: &str) -> PermissionGrant {
        self.own(object, name).unwrap_or_default()
    }

    /// Nearest record along `object`'s delegate chain, `object` first.  A
    /// broken chain (cycle, excessive depth) resolves own records only.
    pub fn resolve(
        &self,
        heap: &ObjectHeap,
        object: ObjectHandle,
        name: &str,
    ) -> PermissionGrant {
        self.resolve_inherited(heap, object, name, true)
    }

    fn resolve_inherited(
        &self,
        heap: &ObjectHeap,
        object: ObjectHandle,
        name: &str,
        include_own: bool,
    ) -> PermissionGrant {
        if include_own && let Some(grant) = self.own(object, name) {
            return grant;
        }
        heap.delegate_chain(object)
            .unwrap_or_default()
            .into_iter()
            .find_map(|ancestor| self.own(ancestor, name))
            .unwrap_or_default()
    }

    pub fn has(
        &self,
        heap: &ObjectHeap,
        object: ObjectHandle,
        name: &str,
        level: GrantLevel,
    ) -> bool {
        self.resolve(heap, object, name).allows(level)
    }

    /// Raise the own grant to `level`; returns whether anything changed.
    pub fn allow(&mut self, object: ObjectHandle, name: &str, level: GrantLevel) -> bool {
        self.allow_over(object, name, level, PermissionGrant::default())
    }

    /// Like [`allow`](Self::allow), but a new own record starts from
    /// `inherited` so it never shadows stronger delegate grants.
    pub fn allow_over(
        &mut self,
        object: ObjectHandle,
        name: &str,
        level: GrantLevel,
        inherited: PermissionGrant,
    ) -> bool {
        let grant = self
            .grants
            .entry(object)
            .or_default()
            .entry(name.to_string())
            .or_insert(inherited);
        let before = *grant;
        grant.raise(level);
        before != *grant
    }

    /// Clear every settable bit on `object`; returns how many were cleared.
    pub fn revoke_settable(&mut self, object: ObjectHandle) -> usize {
        let Some(names) = self.grants.get_mut(&object) else {
            return 0;
        };
        let mut revoked = 0;
        for grant in names.values_mut().filter(|grant| grant.settable) {
            grant.settable = false;
            revoked += 1;
        }
        revoked
    }

    /// Shadow every settable grant `object` inherits (and has no own record
    /// for) with an own non-settable copy; returns how many were shadowed.
    pub fn shadow_inherited_settable(
        &mut self,
        heap: &ObjectHeap,
        object: ObjectHandle,
    ) -> usize {
        let mut inherited: BTreeMap<String, PermissionGrant> = BTreeMap::new();
        for ancestor in heap.delegate_chain(object).unwrap_or_default() {
            for (name, grant) in self.grants_of(ancestor) {
                if self.own(object, name).is_none() {
                    inherited.entry(name.to_string()).or_insert(grant);
                }
            }
        }
        let names = self.grants.entry(object).or_default();
        let mut shadowed = 0;
        for (name, mut grant) in inherited.into_iter().filter(|(_, grant)| grant.settable) {
            grant.settable = false;
            names.insert(name, grant);
            shadowed += 1;
        }
        if names.is_empty() {
            self.grants.remove(&object);
        }
        shadowed
    }

    pub fn grants_of(&self, object: ObjectHandle) -> impl Iterator<Item = (&str, PermissionGrant)> {
        self.grants
            .get(&object)
            .into_iter()
            .flat_map(|names| names.iter().map(|(name, grant)| (name.as_str(), *grant)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &str, PermissionGrant)> {
        self.grants.iter().flat_map(|(object, names)| {
            names
                .iter()
                .map(move |(name, grant)| (*object, name.as_str(), *grant))
        })
    }

    pub fn forget(&mut self, object: ObjectHandle) {
        self.grants.remove(&object);
    }

    /// Number of (object, name) records.
    pub fn len(&self) -> usize {
        self.grants.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Policy operations
// ---------------------------------------------------------------------------

impl PolicyContext {
    // -- Explicit grants (trusted setup) ---------------------------------------

    pub fn allow_read(
        &mut self,
        object: ObjectHandle,
        name: &str,
    ) -> Result<PermissionGrant, ObjcapError> {
        self.register_grant(object, name, GrantLevel::Read)
    }

    /// Implies read.
    pub fn allow_enumerate(
        &mut self,
        object: ObjectHandle,
        name: &str,
    ) -> Result<PermissionGrant, ObjcapError> {
        self.register_grant(object, name, GrantLevel::Enumerate)
    }

    /// Implies enumerate and read.
    pub fn allow_set(
        &mut self,
        object: ObjectHandle,
        name: &str,
    ) -> Result<PermissionGrant, ObjcapError> {
        self.register_grant(object, name, GrantLevel::Set)
    }

    fn register_grant(
        &mut self,
        object: ObjectHandle,
        name: &str,
        level: GrantLevel,
    ) -> Result<PermissionGrant, ObjcapError> {
        self.heap.get(object)?;
        self.raise_grant(object, name, level);
        self.emit(
            self.event(
                ACCESS_COMPONENT,
                PolicyEventType::GrantRegistered,
                PolicyEventOutcome::Granted,
            )
            .object(object)
            .property(name)
            .detail(level.to_string()),
        );
        Ok(self.grant_of(object, name))
    }

    /// Effective grant bits, explicit, memoized or inherited.
    pub fn grant_of(&self, object: ObjectHandle, name: &str) -> PermissionGrant {
        self.registry.resolve(&self.heap, object, name)
    }

    pub(crate) fn raise_grant(
        &mut self,
        object: ObjectHandle,
        name: &str,
        level: GrantLevel,
    ) -> bool {
        let inherited = self.registry.resolve_inherited(&self.heap, object, name, false);
        self.registry.allow_over(object, name, level, inherited)
    }

    fn has_grant(&self, object: ObjectHandle, name: &str, level: GrantLevel) -> bool {
        self.registry.has(&self.heap, object, name, level)
    }

    // -- Queries -----------------------------------------------------------------

    pub fn can_read_self(&mut self, object: ObjectHandle, name: &str) -> bool {
        let allowed = self.self_grant(object, name, GrantLevel::Read);
        self.counters.tally(allowed);
        allowed
    }

    pub fn can_read_public(&mut self, object: ObjectHandle, name: &str) -> bool {
        let allowed = self.public_default(object, name, GrantLevel::Read);
        self.counters.tally(allowed);
        allowed
    }

    pub fn can_enumerate_self(&mut self, object: ObjectHandle, name: &str) -> bool {
        let allowed = self.self_grant(object, name, GrantLevel::Enumerate);
        self.counters.tally(allowed);
        allowed
    }

    pub fn can_enumerate_public(&mut self, object: ObjectHandle, name: &str) -> bool {
        let allowed = self.public_default(object, name, GrantLevel::Enumerate);
        self.counters.tally(allowed);
        allowed
    }

    /// Self callers may write any visible name of an unfrozen object.
    pub fn can_set_self(&mut self, object: ObjectHandle, name: &str) -> bool {
        let allowed = NameTier::of(name).visible_to_self()
            && (self.has_grant(object, name, GrantLevel::Set) || !self.is_frozen(object));
        self.counters.tally(allowed);
        allowed
    }

    /// Public callers may only add or overwrite on unfrozen plain containers,
    /// unless the name already carries a settable grant.
    pub fn can_set_public(&mut self, object: ObjectHandle, name: &str) -> bool {
        let allowed = NameTier::of(name).visible_to_public()
            && (self.has_grant(object, name, GrantLevel::Set)
                || (!self.is_frozen(object)
                    && ContainerClassifier::is_plain_container(&self.heap, object)));
        self.counters.tally(allowed);
        allowed
    }

    fn self_grant(&self, object: ObjectHandle, name: &str, level: GrantLevel) -> bool {
        NameTier::of(name).visible_to_self() && self.has_grant(object, name, level)
    }

    /// Public read/enumerate rule with memoization for container members.
    fn public_default(&mut self, object: ObjectHandle, name: &str, level: GrantLevel) -> bool {
        if !NameTier::of(name).visible_to_public() {
            return false;
        }
        if self.has_grant(object, name, level) {
            return true;
        }
        if !ContainerClassifier::is_plain_container(&self.heap, object)
            || !self.heap.has_own(object, name)
        {
            return false;
        }
        self.memoize(object, name, level);
        true
    }

    fn memoize(&mut self, object: ObjectHandle, name: &str, level: GrantLevel) {
        if !self.raise_grant(object, name, level) {
            return;
        }
        self.counters.memoized_grants += 1;
        self.emit(
            self.event(
                ACCESS_COMPONENT,
                PolicyEventType::GrantMemoized,
                PolicyEventOutcome::Granted,
            )
            .object(object)
            .property(name)
            .detail(level.to_string()),
        );
    }

    // -- Reads -------------------------------------------------------------------

    /// A method reading a property of its own receiver; `Undefined` when
    /// not readable.
    pub fn read_self(&mut self, object: ObjectHandle, name: &str) -> Result<Value, ObjcapError> {
        if self.can_read_self(object, name) {
            self.heap.lookup(object, name)
        } else {
            Ok(Value::Undefined)
        }
    }

    /// An external caller reading a property; `Undefined` when not readable.
    pub fn read_public(&mut self, object: ObjectHandle, name: &str) -> Result<Value, ObjcapError> {
        if self.can_read_public(object, name) {
            self.heap.lookup(object, name)
        } else {
            Ok(Value::Undefined)
        }
    }

    // -- Writes ------------------------------------------------------------------

    pub fn write_self(
        &mut self,
        object: ObjectHandle,
        name: &str,
        value: Value,
    ) -> Result<Value, ObjcapError> {
        self.heap.get(object)?;
        if !self.can_set_self(object, name) {
            return Err(self.deny(AccessOperation::Set, object, name));
        }
        self.store(object, name, value)
    }

    pub fn write_public(
        &mut self,
        object: ObjectHandle,
        name: &str,
        value: Value,
    ) -> Result<Value, ObjcapError> {
        self.heap.get(object)?;
        if !self.can_set_public(object, name) {
            return Err(self.deny(AccessOperation::Set, object, name));
        }
        self.store(object, name, value)
    }

    fn store(
        &mut self,
        object: ObjectHandle,
        name: &str,
        value: Value,
    ) -> Result<Value, ObjcapError> {
        self.memoize(object, name, GrantLevel::Set);
        self.heap.put(object, name, value.clone())?;
        Ok(value)
    }

    // -- Deletes -----------------------------------------------------------------

    /// Deletion is not supported.  The access check still runs first, so a
    /// refused caller sees `AccessDenied` and a permitted one `Unsupported`.
    pub fn delete_self(&mut self, object: ObjectHandle, name: &str) -> Result<(), ObjcapError> {
        if !self.can_set_self(object, name) {
            return Err(self.deny(AccessOperation::Delete, object, name));
        }
        Err(self.unsupported_delete(object, name))
    }

    /// Public deletion additionally requires a plain container target.
    pub fn delete_public(&mut self, object: ObjectHandle, name: &str) -> Result<(), ObjcapError> {
        if !self.can_set_public(object, name)
            || !ContainerClassifier::is_plain_container(&self.heap, object)
        {
            return Err(self.deny(AccessOperation::Delete, object, name));
        }
        Err(self.unsupported_delete(object, name))
    }

    fn unsupported_delete(&mut self, object: ObjectHandle, name: &str) -> ObjcapError {
        let err = ObjcapError::Unsupported {
            operation: AccessOperation::Delete,
            object,
            name: name.to_string(),
        };
        self.emit(
            self.event(
                ACCESS_COMPONENT,
                PolicyEventType::Delete,
                PolicyEventOutcome::Denied,
            )
            .object(object)
            .property(name)
            .failure(&err),
        );
        err
    }

    pub(crate) fn deny(
        &mut self,
        operation: AccessOperation,
        object: ObjectHandle,
        name: &str,
    ) -> ObjcapError {
        let err = ObjcapError::access_denied(operation, object, name);
        let event_type = if operation == AccessOperation::Delete {
            PolicyEventType::Delete
        } else {
            PolicyEventType::AccessCheck
        };
        self.emit(
            self.event(ACCESS_COMPONENT, event_type, PolicyEventOutcome::Denied)
                .object(object)
                .property(name)
                .failure(&err),
        );
        err
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn instance_of_authored_type(ctx: &mut PolicyContext) -> ObjectHandle {
        let ty = ctx.new_callable("Account");
        instance_of_authored_type_from(ctx, ty)
    }

    fn instance_of_authored_type_from(ctx: &mut PolicyContext, ty: ObjectHandle) -> ObjectHandle {
        let instance = ctx.make_raw_instance(ty).expect("raw");
        ctx.enter_base(ty, instance).expect("enter base");
        instance
    }

    #[test]
    fn grant_levels_imply_lower_levels() {
        let mut grant = PermissionGrant::default();
        grant.raise(GrantLevel::Set);
        assert!(grant.readable && grant.enumerable && grant.settable);

        let mut grant = PermissionGrant::default();
        grant.raise(GrantLevel::Enumerate);
        assert!(grant.readable && grant.enumerable && !grant.settable);
        assert!(grant.is_monotonic());
    }

    #[test]
    fn allow_reports_changes_only_once() {
        let mut registry = AccessRegistry::new();
        let obj = ObjectHandle(1);
        assert!(registry.allow(obj, "x", GrantLevel::Read));
        assert!(!registry.allow(obj, "x", GrantLevel::Read));
        assert!(registry.allow(obj, "x", GrantLevel::Set));
        assert!(!registry.allow(obj, "x", GrantLevel::Enumerate));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn revoke_settable_keeps_read_and_enumerate() {
        let mut registry = AccessRegistry::new();
        let obj = ObjectHandle(1);
        registry.allow(obj, "a", GrantLevel::Set);
        registry.allow(obj, "b", GrantLevel::Set);
        registry.allow(obj, "c", GrantLevel::Read);
        assert_eq!(registry.revoke_settable(obj), 2);
        let a = registry.grant(obj, "a");
        assert!(a.readable && a.enumerable && !a.settable);
        assert_eq!(registry.revoke_settable(obj), 0);
    }

    #[test]
    fn prototype_grants_are_inherited_nearest_first() {
        let mut ctx = PolicyContext::default();
        let ty = ctx.new_callable("Account");
        let proto = ctx.heap().type_prototype(ty).expect("proto");
        ctx.heap.put(proto, "describe", Value::Int(1)).expect("put");
        ctx.allow_read(proto, "describe").expect("grant");
        let obj = instance_of_authored_type_from(&mut ctx, ty);

        assert!(ctx.can_read_public(obj, "describe"));
        assert!(ctx.can_read_self(obj, "describe"));
        assert!(!ctx.can_enumerate_public(obj, "describe"));
        assert_eq!(ctx.read_public(obj, "describe").expect("read"), Value::Int(1));
        assert!(ctx.registry.own(obj, "describe").is_none());

        // An own record starts from the inherited bits.
        ctx.allow_enumerate(proto, "label").expect("grant");
        let own = ctx.allow_read(obj, "label").expect("own grant");
        assert!(own.readable && own.enumerable && !own.settable);
    }

    #[test]
    fn self_read_requires_explicit_grant() {
        let mut ctx = PolicyContext::default();
        let obj = instance_of_authored_type(&mut ctx);
        assert!(!ctx.can_read_self(obj, "name"));
        ctx.allow_read(obj, "name").expect("grant");
        assert!(ctx.can_read_self(obj, "name"));
    }

    #[test]
    fn self_access_sees_private_but_not_internal_names() {
        let mut ctx = PolicyContext::default();
        let obj = instance_of_authored_type(&mut ctx);
        ctx.write_self(obj, "balance_", Value::Int(10)).expect("write");
        assert!(ctx.can_read_self(obj, "balance_"));
        assert!(!ctx.can_read_public(obj, "balance_"));

        ctx.allow_set(obj, "hidden__").expect("grant");
        assert!(!ctx.can_read_self(obj, "hidden__"));
        assert!(!ctx.can_set_self(obj, "hidden__"));
        let err = ctx
            .write_self(obj, "hidden__", Value::Int(1))
            .expect_err("internal");
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[test]
    fn public_read_memoizes_container_members() {
        let mut ctx = PolicyContext::default();
        let record = ctx.new_record([("x", Value::Int(5))]);
        assert_eq!(ctx.grant_of(record, "x"), PermissionGrant::default());

        assert!(ctx.can_read_public(record, "x"));
        let grant = ctx.grant_of(record, "x");
        assert!(grant.readable);
        assert!(!grant.settable);
        assert_eq!(ctx.counters().memoized_grants, 1);
        assert!(
            ctx.events()
                .iter()
                .any(|e| e.event == PolicyEventType::GrantMemoized)
        );
    }

    #[test]
    fn public_read_denies_inherited_and_missing_names() {
        let mut ctx = PolicyContext::default();
        let object_prototype = ctx.intrinsics().object_prototype;
        ctx.heap
            .put(object_prototype, "inherited", Value::Int(1))
            .expect("put");
        let record = ctx.new_record(Vec::<(String, Value)>::new());
        assert!(!ctx.can_read_public(record, "missing"));
        assert!(!ctx.can_read_public(record, "inherited"));
        assert_eq!(
            ctx.read_public(record, "inherited").expect("read"),
            Value::Undefined
        );
    }

    #[test]
    fn public_read_on_authored_instance_needs_grant() {
        let mut ctx = PolicyContext::default();
        let obj = instance_of_authored_type(&mut ctx);
        ctx.write_self(obj, "owner", Value::from("ada")).expect("write");
        // The self write memoized a settable grant, which external callers
        // observe too.
        assert!(ctx.can_read_public(obj, "owner"));
        assert!(!ctx.can_read_public(obj, "other"));
        assert_eq!(ctx.read_public(obj, "owner").expect("read"), Value::from("ada"));
        assert_eq!(ctx.read_public(obj, "other").expect("read"), Value::Undefined);
    }

    #[test]
    fn public_enumerate_memoizes_enumerable_and_readable() {
        let mut ctx = PolicyContext::default();
        let record = ctx.new_record([("k", Value::Bool(true))]);
        assert!(ctx.can_enumerate_public(record, "k"));
        let grant = ctx.grant_of(record, "k");
        assert!(grant.readable && grant.enumerable && !grant.settable);
        assert!(ctx.can_enumerate_self(record, "k"));
    }

    #[test]
    fn public_cannot_add_properties_to_authored_instance() {
        let mut ctx = PolicyContext::default();
        let obj = instance_of_authored_type(&mut ctx);
        let err = ctx
            .write_public(obj, "injected", Value::Int(1))
            .expect_err("denied");
        assert_eq!(
            err,
            ObjcapError::AccessDenied {
                operation: AccessOperation::Set,
                object: obj,
                name: "injected".to_string(),
            }
        );

        // Once the instance adds the property itself, clients may assign it.
        ctx.write_self(obj, "injected", Value::Int(0)).expect("self write");
        assert_eq!(
            ctx.write_public(obj, "injected", Value::Int(2)).expect("public write"),
            Value::Int(2)
        );
    }

    #[test]
    fn public_write_to_container_grants_settable() {
        let mut ctx = PolicyContext::default();
        let record = ctx.new_record(Vec::<(String, Value)>::new());
        ctx.write_public(record, "fresh", Value::Int(3)).expect("write");
        let grant = ctx.grant_of(record, "fresh");
        assert!(grant.readable && grant.enumerable && grant.settable);
        assert_eq!(ctx.read_public(record, "fresh").expect("read"), Value::Int(3));
    }

    #[test]
    fn public_write_rejects_private_names_even_on_containers() {
        let mut ctx = PolicyContext::default();
        let record = ctx.new_record(Vec::<(String, Value)>::new());
        assert!(!ctx.can_set_public(record, "x_"));
        assert!(ctx.write_public(record, "x_", Value::Null).is_err());
    }

    #[test]
    fn write_to_unknown_object_is_reported() {
        let mut ctx = PolicyContext::default();
        let err = ctx
            .write_self(ObjectHandle(4_000), "x", Value::Null)
            .expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::UnknownObject);
    }

    #[test]
    fn delete_distinguishes_denied_from_unsupported() {
        let mut ctx = PolicyContext::default();
        let record = ctx.new_record([("x", Value::Int(1))]);
        let err = ctx.delete_public(record, "x").expect_err("delete");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        let err = ctx.delete_self(record, "x").expect_err("delete");
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        ctx.freeze(record).expect("freeze");
        let err = ctx.delete_public(record, "x").expect_err("delete");
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        let err = ctx.delete_self(record, "x").expect_err("delete");
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        assert!(ctx.heap().has_own(record, "x"));
    }

    #[test]
    fn public_delete_on_authored_instance_is_denied_despite_grant() {
        let mut ctx = PolicyContext::default();
        let obj = instance_of_authored_type(&mut ctx);
        ctx.allow_set(obj, "x").expect("grant");
        let err = ctx.delete_public(obj, "x").expect_err("delete");
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        let err = ctx.delete_self(obj, "x").expect_err("delete");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn counters_track_decisions() {
        let mut ctx = PolicyContext::default();
        let record = ctx.new_record([("x", Value::Int(1))]);
        assert!(ctx.can_read_public(record, "x"));
        assert!(!ctx.can_read_public(record, "x_"));
        let counters = ctx.counters();
        assert_eq!(counters.allowed, 1);
        assert_eq!(counters.denied, 1);
    }
}
