//! Plain-data-container classification.
//!
//! An object is a plain data container when its direct constructor declares
//! [`ContainerKind::Record`] or [`ContainerKind::Sequence`].  The tag is read
//! from the type descriptor, never inferred from the shape of the delegate
//! chain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object_model::{ContainerKind, ObjectHandle, ObjectHeap};

/// Classification of one object for default-visibility decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    PlainRecord,
    PlainSequence,
    /// Instance of a declared type.
    Authored,
    Callable,
    /// No delegate, no constructor back-reference, or a dangling handle.
    Detached,
}

impl ObjectClass {
    pub fn is_plain_container(self) -> bool {
        matches!(self, Self::PlainRecord | Self::PlainSequence)
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainRecord => write!(f, "plain_record"),
            Self::PlainSequence => write!(f, "plain_sequence"),
            Self::Authored => write!(f, "authored"),
            Self::Callable => write!(f, "callable"),
            Self::Detached => write!(f, "detached"),
        }
    }
}

/// Stateless classifier over a heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerClassifier;

impl ContainerClassifier {
    pub fn classify(heap: &ObjectHeap, object: ObjectHandle) -> ObjectClass {
        if heap.is_callable(object) {
            return ObjectClass::Callable;
        }
        let Some(constructor) = heap.direct_constructor(object) else {
            return ObjectClass::Detached;
        };
        match heap.callable_slot(constructor).map(|slot| slot.container_kind) {
            Ok(ContainerKind::Record) => ObjectClass::PlainRecord,
            Ok(ContainerKind::Sequence) => ObjectClass::PlainSequence,
            Ok(ContainerKind::Authored) => ObjectClass::Authored,
            Err(_) => ObjectClass::Detached,
        }
    }

    pub fn is_plain_container(heap: &ObjectHeap, object: ObjectHandle) -> bool {
        Self::classify(heap, object).is_plain_container()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(heap: &mut ObjectHeap, name: &str, kind: ContainerKind) -> ObjectHandle {
        let proto = heap.alloc(None);
        let ty = heap.alloc_callable(name, kind, None);
        heap.link_prototype(ty, proto).expect("link");
        proto
    }

    #[test]
    fn record_and_sequence_instances_are_containers() {
        let mut heap = ObjectHeap::default();
        let record_proto = declare(&mut heap, "Object", ContainerKind::Record);
        let sequence_proto = declare(&mut heap, "Array", ContainerKind::Sequence);
        let record = heap.alloc(Some(record_proto));
        let sequence = heap.alloc(Some(sequence_proto));

        assert_eq!(
            ContainerClassifier::classify(&heap, record),
            ObjectClass::PlainRecord
        );
        assert_eq!(
            ContainerClassifier::classify(&heap, sequence),
            ObjectClass::PlainSequence
        );
        assert!(ContainerClassifier::is_plain_container(&heap, record));
    }

    #[test]
    fn authored_instances_are_not_containers() {
        let mut heap = ObjectHeap::default();
        let record_proto = declare(&mut heap, "Object", ContainerKind::Record);
        let point_proto = heap.alloc(Some(record_proto));
        let point = heap.alloc_callable("Point", ContainerKind::Authored, None);
        heap.link_prototype(point, point_proto).expect("link");
        let p = heap.alloc(Some(point_proto));

        assert_eq!(ContainerClassifier::classify(&heap, p), ObjectClass::Authored);
        assert!(!ContainerClassifier::is_plain_container(&heap, p));
    }

    #[test]
    fn callables_and_orphans_are_not_containers() {
        let mut heap = ObjectHeap::default();
        let f = heap.alloc_callable("f", ContainerKind::Record, None);
        let orphan = heap.alloc(None);
        assert_eq!(ContainerClassifier::classify(&heap, f), ObjectClass::Callable);
        assert_eq!(
            ContainerClassifier::classify(&heap, orphan),
            ObjectClass::Detached
        );
        assert_eq!(
            ContainerClassifier::classify(&heap, ObjectHandle(999)),
            ObjectClass::Detached
        );
    }
}
