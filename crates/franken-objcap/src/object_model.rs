//! Arena-backed object graph governed by the capability policy.
//!
//! Objects are addressed by [`ObjectHandle`] and never carry policy state:
//! grants, frozen marks, roles and construction states all live in side
//! tables keyed by handle.  Handles are never reused, so a released object's
//! handle stays dangling instead of aliasing a newer allocation.
//!
//! Each object has:
//! - an optional **delegate** (the prototype it inherits from),
//! - an optional **constructor back-reference**, set on prototype objects,
//! - ordered own properties,
//! - for callables, a [`CallableSlot`] naming the type's prototype object and
//!   its statically declared [`ContainerKind`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::ObjcapError;
use crate::policy_context::PolicyContext;

// ---------------------------------------------------------------------------
// ObjectHandle
// ---------------------------------------------------------------------------

/// Opaque identity of an object in an [`ObjectHeap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Runtime value stored in properties and passed to callables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Object(ObjectHandle),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "number",
            Self::Str(_) => "string",
            Self::Object(_) => "object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Object(h) => write!(f, "{h}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<ObjectHandle> for Value {
    fn from(h: ObjectHandle) -> Self {
        Self::Object(h)
    }
}

// ---------------------------------------------------------------------------
// Type descriptors
// ---------------------------------------------------------------------------

/// Static classification declared by a type descriptor.
///
/// Instances whose direct constructor is `Record` or `Sequence` are plain
/// data containers and get the permissive default visibility rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Generic key/value record.
    Record,
    /// Generic indexed sequence.
    Sequence,
    /// A declared type with its own identity.
    #[default]
    Authored,
}

impl ContainerKind {
    pub fn is_plain_container(self) -> bool {
        matches!(self, Self::Record | Self::Sequence)
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record => write!(f, "record"),
            Self::Sequence => write!(f, "sequence"),
            Self::Authored => write!(f, "authored"),
        }
    }
}

/// Internal slot present on callable objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableSlot {
    pub name: String,
    /// Object that instances made by this callable delegate to.
    pub prototype: Option<ObjectHandle>,
    pub container_kind: ContainerKind,
}

/// One object in the heap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapObject {
    pub delegate: Option<ObjectHandle>,
    /// Back-reference from a prototype object to the callable owning it.
    pub constructor: Option<ObjectHandle>,
    pub properties: BTreeMap<String, Value>,
    pub callable: Option<CallableSlot>,
}

impl HeapObject {
    pub fn with_delegate(delegate: Option<ObjectHandle>) -> Self {
        Self {
            delegate,
            ..Self::default()
        }
    }

    pub fn is_callable(&self) -> bool {
        self.callable.is_some()
    }
}

// ---------------------------------------------------------------------------
// Native callable bodies
// ---------------------------------------------------------------------------

/// Receiver, callee and arguments of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub callee: ObjectHandle,
    pub this: Value,
    pub args: Vec<Value>,
}

/// Behaviour attached to a callable.  Bodies receive the whole context so
/// they can route their own property accesses through the policy.
pub type NativeBody = Rc<dyn Fn(&mut PolicyContext, &Invocation) -> Result<Value, ObjcapError>>;

#[derive(Clone, Default)]
struct NativeBodies(BTreeMap<ObjectHandle, NativeBody>);

impl fmt::Debug for NativeBodies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// ObjectHeap
// ---------------------------------------------------------------------------

/// The object arena.
#[derive(Debug, Clone)]
pub struct ObjectHeap {
    objects: Vec<Option<HeapObject>>,
    bodies: NativeBodies,
    max_delegate_depth: u32,
}

impl ObjectHeap {
    pub fn new(max_delegate_depth: u32) -> Self {
        Self {
            objects: Vec::new(),
            bodies: NativeBodies::default(),
            max_delegate_depth,
        }
    }

    /// Allocate an ordinary object delegating to `delegate`.
    pub fn alloc(&mut self, delegate: Option<ObjectHandle>) -> ObjectHandle {
        self.insert(HeapObject::with_delegate(delegate))
    }

    /// Allocate a callable with the given prototype slot.
    pub fn alloc_callable(
        &mut self,
        name: impl Into<String>,
        container_kind: ContainerKind,
        prototype: Option<ObjectHandle>,
    ) -> ObjectHandle {
        self.insert(HeapObject {
            callable: Some(CallableSlot {
                name: name.into(),
                prototype,
                container_kind,
            }),
            ..HeapObject::default()
        })
    }

    fn insert(&mut self, object: HeapObject) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects.push(Some(object));
        handle
    }

    pub fn get(&self, handle: ObjectHandle) -> Result<&HeapObject, ObjcapError> {
        self.objects
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(ObjcapError::UnknownObject { object: handle })
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut HeapObject, ObjcapError> {
        self.objects
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(ObjcapError::UnknownObject { object: handle })
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_ok()
    }

    /// Retire an object.  Its handle is never handed out again.
    pub fn release(&mut self, handle: ObjectHandle) -> Result<HeapObject, ObjcapError> {
        let slot = self
            .objects
            .get_mut(handle.0 as usize)
            .ok_or(ObjcapError::UnknownObject { object: handle })?;
        let object = slot
            .take()
            .ok_or(ObjcapError::UnknownObject { object: handle })?;
        self.bodies.0.remove(&handle);
        Ok(object)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- Properties ---------------------------------------------------------

    pub fn has_own(&self, handle: ObjectHandle, name: &str) -> bool {
        self.get(handle)
            .is_ok_and(|object| object.properties.contains_key(name))
    }

    pub fn own_names(&self, handle: ObjectHandle) -> Result<Vec<String>, ObjcapError> {
        Ok(self.get(handle)?.properties.keys().cloned().collect())
    }

    /// Store `value` as an own property, bypassing every policy check.
    pub fn put(
        &mut self,
        handle: ObjectHandle,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), ObjcapError> {
        self.get_mut(handle)?.properties.insert(name.into(), value);
        Ok(())
    }

    /// Look `name` up along the delegate chain; `Undefined` when absent.
    pub fn lookup(&self, handle: ObjectHandle, name: &str) -> Result<Value, ObjcapError> {
        if let Some(value) = self.get(handle)?.properties.get(name) {
            return Ok(value.clone());
        }
        for ancestor in self.delegate_chain(handle)? {
            if let Some(value) = self.get(ancestor)?.properties.get(name) {
                return Ok(value.clone());
            }
        }
        Ok(Value::Undefined)
    }

    /// Whether `name` is an own or inherited property.
    pub fn has_property(&self, handle: ObjectHandle, name: &str) -> Result<bool, ObjcapError> {
        if self.has_own(handle, name) {
            return Ok(true);
        }
        Ok(self
            .delegate_chain(handle)?
            .into_iter()
            .any(|ancestor| self.has_own(ancestor, name)))
    }

    // -- Delegate chains ----------------------------------------------------

    /// Every ancestor of `handle`, nearest first, excluding `handle` itself.
    pub fn delegate_chain(&self, handle: ObjectHandle) -> Result<Vec<ObjectHandle>, ObjcapError> {
        let mut chain = Vec::new();
        let mut visited = BTreeSet::from([handle]);
        let mut current = self.get(handle)?.delegate;
        while let Some(next) = current {
            if chain.len() as u32 >= self.max_delegate_depth {
                return Err(ObjcapError::invariant(
                    handle,
                    format!(
                        "delegate chain exceeds max depth {}",
                        self.max_delegate_depth
                    ),
                ));
            }
            if !visited.insert(next) {
                return Err(ObjcapError::invariant(handle, "delegate chain cycle detected"));
            }
            chain.push(next);
            current = self.get(next)?.delegate;
        }
        Ok(chain)
    }

    /// `instance` is-a `ty`: the type's prototype occurs in the instance's
    /// delegate chain.
    pub fn is_instance_of(
        &self,
        instance: ObjectHandle,
        ty: ObjectHandle,
    ) -> Result<bool, ObjcapError> {
        let Some(prototype) = self.callable_slot(ty)?.prototype else {
            return Ok(false);
        };
        Ok(self.delegate_chain(instance)?.contains(&prototype))
    }

    /// The constructor back-reference of the object's immediate delegate.
    ///
    /// Callables have no direct constructor, so type descriptors never
    /// expose the machinery that made them.
    pub fn direct_constructor(&self, handle: ObjectHandle) -> Option<ObjectHandle> {
        let object = self.get(handle).ok()?;
        if object.is_callable() {
            return None;
        }
        self.get(object.delegate?).ok()?.constructor
    }

    // -- Callables ----------------------------------------------------------

    pub fn is_callable(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_ok_and(HeapObject::is_callable)
    }

    pub fn callable_slot(&self, handle: ObjectHandle) -> Result<&CallableSlot, ObjcapError> {
        self.get(handle)?
            .callable
            .as_ref()
            .ok_or(ObjcapError::NotCallable { object: handle })
    }

    /// Prototype object of a type, failing when the type has none.
    pub fn type_prototype(&self, ty: ObjectHandle) -> Result<ObjectHandle, ObjcapError> {
        self.callable_slot(ty)?
            .prototype
            .ok_or_else(|| ObjcapError::invariant(ty, "type has no prototype object"))
    }

    /// Point `ty` at `prototype` and give the prototype its back-reference.
    pub fn link_prototype(
        &mut self,
        ty: ObjectHandle,
        prototype: ObjectHandle,
    ) -> Result<(), ObjcapError> {
        self.get(prototype)?;
        let slot = self
            .get_mut(ty)?
            .callable
            .as_mut()
            .ok_or(ObjcapError::NotCallable { object: ty })?;
        slot.prototype = Some(prototype);
        self.get_mut(prototype)?.constructor = Some(ty);
        Ok(())
    }

    pub fn install_body(
        &mut self,
        callable: ObjectHandle,
        body: NativeBody,
    ) -> Result<(), ObjcapError> {
        self.callable_slot(callable)?;
        self.bodies.0.insert(callable, body);
        Ok(())
    }

    pub fn body(&self, callable: ObjectHandle) -> Option<NativeBody> {
        self.bodies.0.get(&callable).cloned()
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_DELEGATE_DEPTH)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
