//! Deterministic snapshots of a context's policy state.
//!
//! A snapshot lists every side table in handle order and carries no trace
//! id, so two contexts built by the same setup produce the same digest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::access_registry::PermissionGrant;
use crate::capability_marker::CapabilityRole;
use crate::construction_guard::ConstructionState;
use crate::error::ObjcapError;
use crate::object_model::ObjectHandle;
use crate::policy_context::PolicyContext;

pub const DIGEST_PREFIX: &str = "sha256:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub object: ObjectHandle,
    pub name: String,
    pub grant: PermissionGrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub callable: ObjectHandle,
    pub role: CapabilityRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperLinkRecord {
    pub sub: ObjectHandle,
    pub sup: ObjectHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub instance: ObjectHandle,
    pub state: ConstructionState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTypeRecord {
    pub name: String,
    pub ty: ObjectHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub live_objects: usize,
    pub grants: Vec<GrantRecord>,
    pub frozen: Vec<ObjectHandle>,
    pub roles: Vec<RoleRecord>,
    pub super_links: Vec<SuperLinkRecord>,
    pub construction_states: Vec<StateRecord>,
    pub host_types: Vec<HostTypeRecord>,
}

impl PolicySnapshot {
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ObjcapError> {
        serde_json::to_vec(self).map_err(|err| {
            ObjcapError::invariant(ObjectHandle(0), format!("snapshot encoding failed: {err}"))
        })
    }

    /// `sha256:<hex>` over the canonical bytes.
    pub fn digest(&self) -> Result<String, ObjcapError> {
        let digest = Sha256::digest(self.canonical_bytes()?);
        Ok(format!("{DIGEST_PREFIX}{}", hex::encode(digest)))
    }
}

impl PolicyContext {
    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            live_objects: self.heap.len(),
            grants: self
                .registry
                .iter()
                .map(|(object, name, grant)| GrantRecord {
                    object,
                    name: name.to_string(),
                    grant,
                })
                .collect(),
            frozen: self.freezer.iter().collect(),
            roles: self
                .marker
                .iter()
                .map(|(callable, role)| RoleRecord { callable, role })
                .collect(),
            super_links: self
                .classes
                .iter()
                .map(|(sub, sup)| SuperLinkRecord { sub, sup })
                .collect(),
            construction_states: self
                .guard
                .iter()
                .map(|(instance, state)| StateRecord { instance, state })
                .collect(),
            host_types: self
                .host_types
                .iter()
                .map(|(name, ty)| HostTypeRecord {
                    name: name.clone(),
                    ty: *ty,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::object_model::Value;

    fn scripted(trace_id: &str) -> PolicyContext {
        let mut ctx = PolicyContext::new(PolicyConfig::default().with_trace_id(trace_id));
        let record = ctx.new_record([("x", Value::Int(1))]);
        ctx.write_public(record, "y", Value::Int(2)).expect("write");
        ctx.freeze(record).expect("freeze");
        let ty = ctx.new_callable("T");
        ctx.make_raw_instance(ty).expect("raw");
        ctx
    }

    #[test]
    fn digest_ignores_trace_id() {
        let a = scripted("trace-a").snapshot();
        let b = scripted("trace-b").snapshot();
        assert_eq!(a, b);
        assert_eq!(a.digest().expect("digest"), b.digest().expect("digest"));
    }

    #[test]
    fn digest_changes_with_state() {
        let mut ctx = scripted("t");
        let before = ctx.snapshot().digest().expect("digest");
        let record = ctx.new_record(Vec::<(String, Value)>::new());
        ctx.freeze(record).expect("freeze");
        let after = ctx.snapshot().digest().expect("digest");
        assert_ne!(before, after);
        assert!(after.starts_with(DIGEST_PREFIX));
        assert_eq!(after.len(), DIGEST_PREFIX.len() + 64);
    }

    #[test]
    fn snapshot_lists_side_tables() {
        let ctx = scripted("t");
        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.frozen.len(), 1);
        assert_eq!(snapshot.construction_states.len(), 1);
        assert_eq!(snapshot.construction_states[0].state, ConstructionState::Raw);
        // The two intrinsics.
        assert_eq!(snapshot.roles.len(), 2);
        assert_eq!(snapshot.super_links.len(), 1);
        assert!(snapshot.grants.iter().all(|g| g.grant.is_monotonic()));

        let json = serde_json::to_string(&snapshot).expect("ser");
        let back: PolicySnapshot = serde_json::from_str(&json).expect("de");
        assert_eq!(back, snapshot);
    }
}
