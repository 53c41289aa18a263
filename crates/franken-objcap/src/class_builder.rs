//! Write-once inheritance links and class declaration.

use std::collections::BTreeMap;

use crate::access_registry::GrantLevel;
use crate::error::ObjcapError;
use crate::events::{CLASS_COMPONENT, PolicyEventOutcome, PolicyEventType};
use crate::object_model::{ObjectHandle, Value};
use crate::policy_context::PolicyContext;

/// Static property through which a type exposes its supertype.  Reserved:
/// `build_class` refuses statics that define it.
pub const SUPER_LINK_NAME: &str = "Super";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassBuilder {
    super_links: BTreeMap<ObjectHandle, ObjectHandle>,
}

impl ClassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn super_of(&self, sub: ObjectHandle) -> Option<ObjectHandle> {
        self.super_links.get(&sub).copied()
    }

    pub(crate) fn link(&mut self, sub: ObjectHandle, sup: ObjectHandle) {
        self.super_links.insert(sub, sup);
    }

    /// Drop links in which `object` takes part on either side.
    pub(crate) fn forget(&mut self, object: ObjectHandle) {
        self.super_links.remove(&object);
        self.super_links.retain(|_, sup| *sup != object);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, ObjectHandle)> + '_ {
        self.super_links.iter().map(|(sub, sup)| (*sub, *sup))
    }
}

impl PolicyContext {
    pub fn super_of(&self, sub: ObjectHandle) -> Option<ObjectHandle> {
        self.classes.super_of(sub)
    }

    /// Record `sub → sup`.  Linking to the same supertype again is a no-op;
    /// a different one fails.
    pub fn set_super_once(
        &mut self,
        sub: ObjectHandle,
        sup: ObjectHandle,
    ) -> Result<ObjectHandle, ObjcapError> {
        self.heap.callable_slot(sub)?;
        self.heap.callable_slot(sup)?;
        if self.role_of(sub).is_method() {
            return Err(self.role_failure(sub, "a method can't inherit"));
        }
        if self.role_of(sup).is_method() {
            return Err(self.role_failure(sup, "can't inherit from a method"));
        }
        if let Some(existing) = self.super_of(sub) {
            if existing == sup {
                self.emit(
                    self.event(
                        CLASS_COMPONENT,
                        PolicyEventType::SuperLinked,
                        PolicyEventOutcome::Unchanged,
                    )
                    .callable(sub)
                    .object(sup),
                );
                return Ok(sub);
            }
            return Err(self.class_failure(sub, format!("can't inherit twice; super is {existing}")));
        }
        if self.is_frozen(sub) {
            return Err(self.class_failure(sub, "sub constructor already frozen"));
        }
        if sub == sup || self.super_chain(sup).contains(&sub) {
            return Err(self.class_failure(sub, "inheritance cycle"));
        }

        self.classes.link(sub, sup);
        self.heap.put(sub, SUPER_LINK_NAME, Value::Object(sup))?;
        self.raise_grant(sub, SUPER_LINK_NAME, GrantLevel::Read);
        self.emit(
            self.event(
                CLASS_COMPONENT,
                PolicyEventType::SuperLinked,
                PolicyEventOutcome::Linked,
            )
            .callable(sub)
            .object(sup),
        );
        Ok(sub)
    }

    /// Declare `sub` as a class deriving from `sup` (the record type when
    /// `None`).  Returns the new prototype.
    ///
    /// Publicly enumerable entries of `members` land on the prototype and
    /// those of `statics` on `sub` itself; both end up frozen.  A frozen
    /// `sub` (already built, sealed or tamed) is refused.
    pub fn build_class(
        &mut self,
        sub: ObjectHandle,
        sup: Option<ObjectHandle>,
        members: Option<ObjectHandle>,
        statics: Option<ObjectHandle>,
    ) -> Result<ObjectHandle, ObjcapError> {
        let sup = sup.unwrap_or(self.intrinsics().object);
        self.heap.callable_slot(sub)?;
        if self.role_of(sub).is_method() {
            return Err(self.role_failure(sub, "a method can't inherit"));
        }
        if self.is_frozen(sub) {
            return Err(self.class_failure(sub, "class already built; sub constructor frozen"));
        }
        if let Some(statics) = statics {
            if self.heap.has_property(statics, SUPER_LINK_NAME)? {
                return Err(self.class_failure(
                    statics,
                    format!("the static name \"{SUPER_LINK_NAME}\" is reserved for the super-constructor"),
                ));
            }
        }

        self.set_super_once(sub, sup)?;
        let super_prototype = self.heap.type_prototype(sup)?;
        let prototype = self.heap.alloc(Some(super_prototype));
        self.heap.link_prototype(sub, prototype)?;

        if let Some(members) = members {
            self.copy_enumerable(members, prototype)?;
        }
        if let Some(statics) = statics {
            self.copy_enumerable(statics, sub)?;
        }
        self.freeze(prototype)?;
        self.freeze(sub)?;

        self.emit(
            self.event(
                CLASS_COMPONENT,
                PolicyEventType::ClassBuilt,
                PolicyEventOutcome::Built,
            )
            .callable(sub)
            .object(prototype),
        );
        Ok(prototype)
    }

    fn copy_enumerable(
        &mut self,
        source: ObjectHandle,
        target: ObjectHandle,
    ) -> Result<(), ObjcapError> {
        for name in self.heap.own_names(source)? {
            if self.can_enumerate_public(source, &name) {
                let value = self.read_public(source, &name)?;
                self.write_self(target, &name, value)?;
            }
        }
        Ok(())
    }

    fn super_chain(&self, ty: ObjectHandle) -> Vec<ObjectHandle> {
        let mut chain = Vec::new();
        let mut current = self.super_of(ty);
        while let Some(next) = current {
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
            current = self.super_of(next);
        }
        chain
    }

    fn class_failure(&mut self, object: ObjectHandle, detail: impl Into<String>) -> ObjcapError {
        let err = ObjcapError::invariant(object, detail);
        self.emit(
            self.event(
                CLASS_COMPONENT,
                PolicyEventType::SuperLinked,
                PolicyEventOutcome::Denied,
            )
            .object(object)
            .failure(&err),
        );
        err
    }
}
