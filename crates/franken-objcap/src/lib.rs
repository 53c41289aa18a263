#![forbid(unsafe_code)]
//! Object-capability access policy over a prototype-style object graph.
//!
//! A [`PolicyContext`] owns one object heap together with the identity-keyed
//! side tables that decide who may read, enumerate, or write each property,
//! which callables are constructors or methods, and where every instance is
//! in its raw → cooking → cooked construction lifecycle.
//!
//! Trusted setup code configures a context (roles, grants, classes, taming of
//! host types); afterwards restricted code only goes through the `*_self` /
//! `*_public` access paths and the `enter_*` guards.

pub mod access_registry;
pub mod capability_marker;
pub mod class_builder;
pub mod config;
pub mod construction_guard;
pub mod container;
pub mod error;
pub mod events;
pub mod freeze;
pub mod object_model;
pub mod policy_context;
pub mod property_name;
pub mod snapshot;
pub mod taming;

pub use access_registry::{AccessRegistry, GrantLevel, PermissionGrant};
pub use capability_marker::{CapabilityMarker, CapabilityRole};
pub use class_builder::{ClassBuilder, SUPER_LINK_NAME};
pub use config::{ConfigError, PolicyConfig};
pub use construction_guard::{
    ConstructionGuard, ConstructionState, GuardObservation, RawMarkerPolicy,
};
pub use container::{ContainerClassifier, ObjectClass};
pub use error::{AccessOperation, ErrorKind, ObjcapError};
pub use events::{DecisionCounters, PolicyEvent, PolicyEventOutcome, PolicyEventType};
pub use freeze::FreezeController;
pub use object_model::{
    CallableSlot, ContainerKind, HeapObject, Invocation, NativeBody, ObjectHandle, ObjectHeap,
    Value,
};
pub use policy_context::{Intrinsics, PolicyContext};
pub use property_name::NameTier;
pub use snapshot::{
    GrantRecord, HostTypeRecord, PolicySnapshot, RoleRecord, StateRecord, SuperLinkRecord,
};
pub use taming::{HostTypeTaming, TamingManifest, TamingReport, TamingTable};
