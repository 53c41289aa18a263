//! The explicit policy context.
//!
//! There is no process-wide policy: every heap, grant table, frozen mark,
//! role, super-link and construction state belongs to one `PolicyContext`,
//! and several isolated contexts can coexist in one process (one per
//! sandboxed session, say).
//!
//! A context is a single logical mutator.  All mutating operations take
//! `&mut self`, so the test-and-set guards (`enter_base`, `enter_method`,
//! `freeze`) can never interleave.  Native bodies are `Rc`-shared, which
//! keeps the context on one thread.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::access_registry::{AccessRegistry, GrantLevel};
use crate::capability_marker::{CapabilityMarker, CapabilityRole};
use crate::class_builder::{ClassBuilder, SUPER_LINK_NAME};
use crate::config::PolicyConfig;
use crate::construction_guard::ConstructionGuard;
use crate::error::ObjcapError;
use crate::events::{
    DecisionCounters, HEAP_COMPONENT, PolicyEvent, PolicyEventOutcome, PolicyEventType,
};
use crate::freeze::FreezeController;
use crate::object_model::{ContainerKind, Invocation, ObjectHandle, ObjectHeap, Value};
use crate::taming::TamingTable;

pub const RECORD_TYPE_NAME: &str = "Object";
pub const SEQUENCE_TYPE_NAME: &str = "Array";
pub const SEQUENCE_LENGTH_NAME: &str = "length";

/// The two generic container types every context starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub object: ObjectHandle,
    pub object_prototype: ObjectHandle,
    pub array: ObjectHandle,
    pub array_prototype: ObjectHandle,
}

#[derive(Debug)]
pub struct PolicyContext {
    pub(crate) config: PolicyConfig,
    pub(crate) heap: ObjectHeap,
    pub(crate) registry: AccessRegistry,
    pub(crate) freezer: FreezeController,
    pub(crate) marker: CapabilityMarker,
    pub(crate) guard: ConstructionGuard,
    pub(crate) classes: ClassBuilder,
    pub(crate) taming: TamingTable,
    pub(crate) host_types: BTreeMap<String, ObjectHandle>,
    pub(crate) counters: DecisionCounters,
    intrinsics: Intrinsics,
    events: Vec<PolicyEvent>,
}

impl Default for PolicyContext {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

impl PolicyContext {
    /// Start a setup phase with the record and sequence intrinsics in place.
    pub fn new(config: PolicyConfig) -> Self {
        let mut heap = ObjectHeap::new(config.max_delegate_depth.max(1));

        let object_prototype = heap.alloc(None);
        let object =
            heap.alloc_callable(RECORD_TYPE_NAME, ContainerKind::Record, Some(object_prototype));
        let array_prototype = heap.alloc(Some(object_prototype));
        let array = heap.alloc_callable(
            SEQUENCE_TYPE_NAME,
            ContainerKind::Sequence,
            Some(array_prototype),
        );
        for (ty, proto) in [(object, object_prototype), (array, array_prototype)] {
            if let Ok(prototype) = heap.get_mut(proto) {
                prototype.constructor = Some(ty);
            }
        }

        let mut marker = CapabilityMarker::new();
        marker.set(object, CapabilityRole::ConstructorOnly);
        marker.set(array, CapabilityRole::ConstructorOnly);
        let mut classes = ClassBuilder::new();
        classes.link(array, object);
        let mut registry = AccessRegistry::new();
        if heap.put(array, SUPER_LINK_NAME, Value::Object(object)).is_ok() {
            registry.allow(array, SUPER_LINK_NAME, GrantLevel::Read);
        }

        Self {
            config,
            heap,
            registry,
            freezer: FreezeController::new(),
            marker,
            guard: ConstructionGuard::new(),
            classes,
            taming: TamingTable::default(),
            host_types: BTreeMap::from([
                (RECORD_TYPE_NAME.to_string(), object),
                (SEQUENCE_TYPE_NAME.to_string(), array),
            ]),
            counters: DecisionCounters::default(),
            intrinsics: Intrinsics {
                object,
                object_prototype,
                array,
                array_prototype,
            },
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Read-only view of the object graph.
    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    pub fn intrinsics(&self) -> Intrinsics {
        self.intrinsics
    }

    pub fn counters(&self) -> DecisionCounters {
        self.counters
    }

    pub fn events(&self) -> &[PolicyEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<PolicyEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Allocation -----------------------------------------------------------

    /// Allocate a plain record holding `entries` as own properties.
    pub fn new_record<K, I>(&mut self, entries: I) -> ObjectHandle
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let record = self.heap.alloc(Some(self.intrinsics.object_prototype));
        if let Ok(object) = self.heap.get_mut(record) {
            object
                .properties
                .extend(entries.into_iter().map(|(k, v)| (k.into(), v)));
        }
        record
    }

    /// Allocate a plain sequence with indexed elements and a `length`.
    pub fn new_sequence<I>(&mut self, values: I) -> ObjectHandle
    where
        I: IntoIterator<Item = Value>,
    {
        let sequence = self.heap.alloc(Some(self.intrinsics.array_prototype));
        if let Ok(object) = self.heap.get_mut(sequence) {
            let mut len: i64 = 0;
            for (index, value) in values.into_iter().enumerate() {
                object.properties.insert(index.to_string(), value);
                len += 1;
            }
            object
                .properties
                .insert(SEQUENCE_LENGTH_NAME.to_string(), Value::Int(len));
        }
        sequence
    }

    /// Allocate an unmarked callable of an authored type.  Its fresh
    /// prototype delegates to the record prototype.
    pub fn new_callable(&mut self, name: impl Into<String>) -> ObjectHandle {
        self.new_typed_callable(name, ContainerKind::Authored)
    }

    /// Allocate a callable whose behaviour is `body`.
    pub fn new_native<F>(
        &mut self,
        name: impl Into<String>,
        body: F,
    ) -> Result<ObjectHandle, ObjcapError>
    where
        F: Fn(&mut PolicyContext, &Invocation) -> Result<Value, ObjcapError> + 'static,
    {
        let callable = self.new_callable(name);
        self.attach_body(callable, Rc::new(body))?;
        Ok(callable)
    }

    pub(crate) fn attach_body(
        &mut self,
        callable: ObjectHandle,
        body: crate::NativeBody,
    ) -> Result<(), ObjcapError> {
        self.heap.install_body(callable, body)
    }

    fn new_typed_callable(&mut self, name: impl Into<String>, kind: ContainerKind) -> ObjectHandle {
        let prototype = self.heap.alloc(Some(self.intrinsics.object_prototype));
        let callable = self.heap.alloc_callable(name, kind, Some(prototype));
        if let Ok(object) = self.heap.get_mut(prototype) {
            object.constructor = Some(callable);
        }
        callable
    }

    /// Declare (or look up) a pre-existing host type by name.  An existing
    /// declaration keeps its original container kind.
    pub fn declare_host_type(&mut self, name: &str, kind: ContainerKind) -> ObjectHandle {
        if let Some(existing) = self.host_types.get(name) {
            return *existing;
        }
        let ty = self.new_typed_callable(name, kind);
        self.host_types.insert(name.to_string(), ty);
        ty
    }

    pub fn host_type(&self, name: &str) -> Option<ObjectHandle> {
        self.host_types.get(name).copied()
    }

    // -- Calls ------------------------------------------------------------------

    /// Call `callable` with `this` bound, without any role or lifecycle check.
    ///
    /// Translated code reaches methods through
    /// [`call_method`](Self::call_method) and constructors through
    /// [`construct`](Self::construct); this is the raw dispatch beneath both.
    pub fn invoke(
        &mut self,
        callable: ObjectHandle,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, ObjcapError> {
        self.heap.callable_slot(callable)?;
        let Some(body) = self.heap.body(callable) else {
            return Ok(Value::Undefined);
        };
        let invocation = Invocation {
            callee: callable,
            this,
            args,
        };
        body(self, &invocation)
    }

    // -- Release ---------------------------------------------------------------

    /// Retire an object and drop every side-table entry keyed by it.
    pub fn release(&mut self, object: ObjectHandle) -> Result<(), ObjcapError> {
        self.heap.release(object)?;
        self.registry.forget(object);
        self.freezer.forget(object);
        self.marker.forget(object);
        self.guard.forget(object);
        self.classes.forget(object);
        self.taming.forget(object);
        self.host_types.retain(|_, ty| *ty != object);
        self.emit(
            self.event(
                HEAP_COMPONENT,
                PolicyEventType::ObjectReleased,
                PolicyEventOutcome::Released,
            )
            .object(object),
        );
        Ok(())
    }

    // -- Events -----------------------------------------------------------------

    pub(crate) fn event(
        &self,
        component: &str,
        event: PolicyEventType,
        outcome: PolicyEventOutcome,
    ) -> PolicyEvent {
        PolicyEvent::base(&self.config.trace_id, component, event, outcome)
    }

    pub(crate) fn emit(&mut self, event: PolicyEvent) {
        if self.config.record_events {
            self.events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerClassifier, ObjectClass};
    use crate::error::ErrorKind;

    #[test]
    fn intrinsics_are_constructor_only_containers() {
        let ctx = PolicyContext::default();
        let i = ctx.intrinsics();
        assert_eq!(ctx.role_of(i.object), CapabilityRole::ConstructorOnly);
        assert_eq!(ctx.role_of(i.array), CapabilityRole::ConstructorOnly);
        assert_eq!(ctx.super_of(i.array), Some(i.object));
        assert_eq!(ctx.host_type("Object"), Some(i.object));
        assert_eq!(ctx.host_type("Array"), Some(i.array));
    }

    #[test]
    fn records_and_sequences_classify_as_containers() {
        let mut ctx = PolicyContext::default();
        let record = ctx.new_record([("x", Value::Int(1))]);
        let sequence = ctx.new_sequence([Value::Int(1), Value::Int(2)]);
        assert_eq!(
            ContainerClassifier::classify(ctx.heap(), record),
            ObjectClass::PlainRecord
        );
        assert_eq!(
            ContainerClassifier::classify(ctx.heap(), sequence),
            ObjectClass::PlainSequence
        );
        assert_eq!(
            ctx.heap().lookup(sequence, "length").expect("length"),
            Value::Int(2)
        );
        assert_eq!(ctx.heap().lookup(sequence, "1").expect("index"), Value::Int(2));
    }

    #[test]
    fn new_callable_gets_fresh_prototype_with_back_reference() {
        let mut ctx = PolicyContext::default();
        let f = ctx.new_callable("Widget");
        let proto = ctx.heap().type_prototype(f).expect("prototype");
        assert_eq!(ctx.heap().get(proto).expect("proto").constructor, Some(f));
        assert_eq!(ctx.role_of(f), CapabilityRole::Unmarked);
    }

    #[test]
    fn invoke_runs_native_body_with_receiver() {
        let mut ctx = PolicyContext::default();
        let echo = ctx.new_native("echo", |_ctx, inv| {
            Ok(inv.args.first().cloned().unwrap_or(Value::Undefined))
        }).expect("native");
        let out = ctx
            .invoke(echo, Value::Null, vec![Value::from("hi")])
            .expect("invoke");
        assert_eq!(out, Value::from("hi"));
    }

    #[test]
    fn invoke_rejects_non_callables() {
        let mut ctx = PolicyContext::default();
        let record = ctx.new_record(Vec::<(String, Value)>::new());
        let err = ctx
            .invoke(record, Value::Undefined, Vec::new())
            .expect_err("not callable");
        assert_eq!(err.kind(), ErrorKind::NotCallable);
    }

    #[test]
    fn declare_host_type_is_idempotent() {
        let mut ctx = PolicyContext::default();
        let a = ctx.declare_host_type("Date", ContainerKind::Authored);
        let b = ctx.declare_host_type("Date", ContainerKind::Record);
        assert_eq!(a, b);
        assert_eq!(
            ctx.heap().callable_slot(a).expect("slot").container_kind,
            ContainerKind::Authored
        );
    }

    #[test]
    fn release_purges_side_tables() {
        let mut ctx = PolicyContext::default();
        let record = ctx.new_record([("x", Value::Int(1))]);
        ctx.allow_set(record, "x").expect("grant");
        ctx.freeze(record).expect("freeze");
        ctx.release(record).expect("release");

        assert!(!ctx.is_frozen(record));
        assert!(!ctx.can_read_self(record, "x"));
        assert!(ctx.registry.grants_of(record).next().is_none());
        assert_eq!(
            ctx.events().last().map(|e| e.event),
            Some(PolicyEventType::ObjectReleased)
        );
    }

    #[test]
    fn events_can_be_disabled() {
        let config = PolicyConfig {
            record_events: false,
            ..PolicyConfig::default()
        };
        let mut ctx = PolicyContext::new(config);
        let record = ctx.new_record([("x", Value::Int(1))]);
        ctx.freeze(record).expect("freeze");
        assert!(ctx.events().is_empty());
    }

    #[test]
    fn contexts_are_isolated() {
        let mut a = PolicyContext::default();
        let b = PolicyContext::default();
        let record = a.new_record([("x", Value::Int(1))]);
        a.freeze(record).expect("freeze");
        assert!(a.is_frozen(record));
        assert!(!b.is_frozen(record));
    }
}
