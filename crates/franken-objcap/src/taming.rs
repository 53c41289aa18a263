//! Taming of pre-existing host types.
//!
//! Host types come with operations the policy does not know about.  Trusted
//! setup whitelists the safe ones as methods, wraps mutating ones so they
//! refuse frozen receivers, and exposes selected statics and prototype
//! fields read-only.  A [`TamingManifest`] carries that whitelist as data.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::{AccessOperation, ObjcapError};
use crate::events::{PolicyEventOutcome, PolicyEventType, TAMING_COMPONENT};
use crate::object_model::{ContainerKind, Invocation, NativeBody, ObjectHandle, Value};
use crate::policy_context::PolicyContext;

// ---------------------------------------------------------------------------
// TamingTable: wrapper → original
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TamingTable {
    originals: BTreeMap<ObjectHandle, ObjectHandle>,
}

impl TamingTable {
    pub fn original_of(&self, wrapper: ObjectHandle) -> Option<ObjectHandle> {
        self.originals.get(&wrapper).copied()
    }

    pub(crate) fn forget(&mut self, object: ObjectHandle) {
        self.originals.remove(&object);
        self.originals.retain(|_, original| *original != object);
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Whitelist for one host type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostTypeTaming {
    pub name: String,
    #[serde(default)]
    pub container_kind: ContainerKind,
    /// Name of another host type this one derives from.
    #[serde(default)]
    pub super_type: Option<String>,
    /// Properties of the type itself readable by restricted code.
    #[serde(default)]
    pub readable_statics: Vec<String>,
    /// Prototype properties readable by restricted code.
    #[serde(default)]
    pub readable_members: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    /// Methods that mutate their receiver; wrapped to refuse frozen ones.
    #[serde(default)]
    pub mutators: Vec<String>,
    /// Freeze the type and its prototype once tamed.
    #[serde(default = "default_freeze")]
    pub freeze: bool,
}

fn default_freeze() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TamingManifest {
    #[serde(default)]
    pub host_types: Vec<HostTypeTaming>,
}

impl TamingManifest {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let manifest: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        for (index, host) in manifest.host_types.iter().enumerate() {
            if host.name.trim().is_empty() {
                return Err(ConfigError::InvalidField {
                    field: format!("host_types[{index}].name"),
                    detail: "must not be empty".to_string(),
                });
            }
        }
        Ok(manifest)
    }
}

/// Tally of what `apply_manifest` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamingReport {
    pub host_types: usize,
    pub readable: usize,
    pub methods: usize,
    pub mutators: usize,
    /// Operations missing from the host type that were installed as inert
    /// placeholders.
    pub installed_operations: usize,
}

// ---------------------------------------------------------------------------
// Taming operations
// ---------------------------------------------------------------------------

impl PolicyContext {
    /// Whitelist `ty.prototype[name]` as readable and mark it a method of `ty`.
    pub fn allow_method(
        &mut self,
        ty: ObjectHandle,
        name: &str,
    ) -> Result<ObjectHandle, ObjcapError> {
        let prototype = self.heap.type_prototype(ty)?;
        let method = self.prototype_callable(prototype, name)?;
        self.allow_read(prototype, name)?;
        self.mark_method_of(method, ty)
    }

    /// Replace `ty.prototype[name]` with a callable running `body`, then
    /// whitelist it.  The replaced callable stays reachable through
    /// [`original_of`](Self::original_of); wrapping a wrapper again keeps the
    /// first original.
    pub fn wrap_method(
        &mut self,
        ty: ObjectHandle,
        name: &str,
        body: NativeBody,
    ) -> Result<ObjectHandle, ObjcapError> {
        let prototype = self.heap.type_prototype(ty)?;
        let mut original = self.prototype_callable(prototype, name)?;
        if let Some(real) = self.taming.original_of(original) {
            original = real;
        }

        let wrapper = self.new_callable(name);
        self.attach_body(wrapper, body)?;
        self.taming.originals.insert(wrapper, original);
        self.heap.put(prototype, name, Value::Object(wrapper))?;
        self.emit(
            self.event(
                TAMING_COMPONENT,
                PolicyEventType::MethodWrapped,
                PolicyEventOutcome::Wrapped,
            )
            .callable(wrapper)
            .object(original)
            .property(name),
        );
        self.allow_method(ty, name)
    }

    pub fn original_of(&self, wrapper: ObjectHandle) -> Option<ObjectHandle> {
        self.taming.original_of(wrapper)
    }

    /// Wrap a receiver-mutating host operation so it refuses frozen
    /// receivers before delegating to the original.
    pub fn wrap_legacy_mutator(
        &mut self,
        ty: ObjectHandle,
        name: &str,
    ) -> Result<ObjectHandle, ObjcapError> {
        let operation = name.to_string();
        let body: NativeBody = Rc::new(
            move |ctx: &mut PolicyContext, inv: &Invocation| -> Result<Value, ObjcapError> {
                if let Some(receiver) = inv.this.as_object()
                    && ctx.is_frozen(receiver)
                {
                    return Err(ctx.deny(AccessOperation::Mutate, receiver, &operation));
                }
                let original = ctx.original_of(inv.callee).ok_or_else(|| {
                    ObjcapError::invariant(inv.callee, "wrapper lost its original")
                })?;
                ctx.invoke(original, inv.this.clone(), inv.args.clone())
            },
        );
        self.wrap_method(ty, name, body)
    }

    /// A frozen sequence holding a copy of `values`.
    pub fn frozen_arguments<I>(&mut self, values: I) -> Result<ObjectHandle, ObjcapError>
    where
        I: IntoIterator<Item = Value>,
    {
        let sequence = self.new_sequence(values);
        self.freeze(sequence)
    }

    /// Freeze a module maker so restricted code cannot rewire it.
    pub fn seal_module(&mut self, maker: ObjectHandle) -> Result<ObjectHandle, ObjcapError> {
        self.heap.callable_slot(maker)?;
        self.freeze(maker)
    }

    /// Apply every host-type entry of `manifest`.
    ///
    /// All named types are declared first, so an entry may derive from a
    /// type listed after it.  Operations missing from the type's own
    /// prototype are installed as inert callables before being whitelisted.
    pub fn apply_manifest(
        &mut self,
        manifest: &TamingManifest,
    ) -> Result<TamingReport, ObjcapError> {
        let mut report = TamingReport::default();
        let types: Vec<ObjectHandle> = manifest
            .host_types
            .iter()
            .map(|host| self.declare_host_type(&host.name, host.container_kind))
            .collect();

        for (host, ty) in manifest.host_types.iter().zip(types) {
            let super_type = match &host.super_type {
                Some(name) => Some(self.host_type(name).ok_or_else(|| {
                    ObjcapError::invariant(ty, format!("unknown super type {name}"))
                })?),
                None => None,
            };
            self.mark_constructor_only(ty, super_type)?;

            for name in &host.readable_statics {
                self.allow_read(ty, name)?;
                report.readable += 1;
            }
            let prototype = self.heap.type_prototype(ty)?;
            for name in &host.readable_members {
                self.allow_read(prototype, name)?;
                report.readable += 1;
            }
            for name in &host.methods {
                report.installed_operations += self.ensure_operation(prototype, name)?;
                self.allow_method(ty, name)?;
                report.methods += 1;
            }
            for name in &host.mutators {
                report.installed_operations += self.ensure_operation(prototype, name)?;
                self.wrap_legacy_mutator(ty, name)?;
                report.mutators += 1;
            }
            if host.freeze {
                self.freeze(prototype)?;
                self.freeze(ty)?;
            }
            report.host_types += 1;
        }
        Ok(report)
    }

    fn ensure_operation(&mut self, prototype: ObjectHandle, name: &str) -> Result<usize, ObjcapError> {
        self.heap.get(prototype)?;
        if self.heap.has_own(prototype, name) {
            return Ok(0);
        }
        let operation = self.new_callable(name);
        self.heap.put(prototype, name, Value::Object(operation))?;
        Ok(1)
    }

    fn prototype_callable(
        &self,
        prototype: ObjectHandle,
        name: &str,
    ) -> Result<ObjectHandle, ObjcapError> {
        if !self.heap.has_property(prototype, name)? {
            return Err(ObjcapError::invariant(prototype, format!("missing: {name}")));
        }
        let value = self.heap.lookup(prototype, name)?;
        let Some(callable) = value.as_object().filter(|handle| self.heap.is_callable(*handle))
        else {
            return Err(ObjcapError::invariant(
                prototype,
                format!("{name} is a {}, not a callable", value.type_name()),
            ));
        };
        Ok(callable)
    }
}
