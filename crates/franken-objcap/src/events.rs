//! Structured policy events with stable observability keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ObjcapError;
use crate::object_model::ObjectHandle;

pub const ACCESS_COMPONENT: &str = "access_registry";
pub const FREEZE_COMPONENT: &str = "freeze_controller";
pub const MARKER_COMPONENT: &str = "capability_marker";
pub const GUARD_COMPONENT: &str = "construction_guard";
pub const CLASS_COMPONENT: &str = "class_builder";
pub const TAMING_COMPONENT: &str = "taming";
pub const HEAP_COMPONENT: &str = "object_heap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEventType {
    GrantRegistered,
    GrantMemoized,
    AccessCheck,
    Delete,
    Freeze,
    RoleMarked,
    SuperLinked,
    InstanceAllocated,
    EnterBase,
    EnterDerived,
    EnterMethod,
    ConstructionFinished,
    ClassBuilt,
    MethodWrapped,
    ObjectReleased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEventOutcome {
    Allowed,
    Denied,
    Granted,
    Frozen,
    AlreadyFrozen,
    Marked,
    Linked,
    Unchanged,
    Transitioned,
    Cooked,
    /// The constructor returned without leaving `Raw`; cooked on return.
    CookedOnReturn,
    Built,
    Wrapped,
    Released,
}

impl fmt::Display for PolicyEventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Granted => "granted",
            Self::Frozen => "frozen",
            Self::AlreadyFrozen => "already_frozen",
            Self::Marked => "marked",
            Self::Linked => "linked",
            Self::Unchanged => "unchanged",
            Self::Transitioned => "transitioned",
            Self::Cooked => "cooked",
            Self::CookedOnReturn => "cooked_on_return",
            Self::Built => "built",
            Self::Wrapped => "wrapped",
            Self::Released => "released",
        };
        f.write_str(name)
    }
}

/// Structured event emitted by a [`PolicyContext`](crate::PolicyContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvent {
    pub trace_id: String,
    pub component: String,
    pub event: PolicyEventType,
    pub outcome: PolicyEventOutcome,
    pub error_code: Option<String>,
    pub object: Option<ObjectHandle>,
    pub property: Option<String>,
    pub callable: Option<ObjectHandle>,
    pub detail: Option<String>,
}

impl PolicyEvent {
    pub(crate) fn base(
        trace_id: &str,
        component: &str,
        event: PolicyEventType,
        outcome: PolicyEventOutcome,
    ) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            component: component.to_string(),
            event,
            outcome,
            error_code: None,
            object: None,
            property: None,
            callable: None,
            detail: None,
        }
    }

    pub(crate) fn object(mut self, object: ObjectHandle) -> Self {
        self.object = Some(object);
        self
    }

    pub(crate) fn property(mut self, name: &str) -> Self {
        self.property = Some(name.to_string());
        self
    }

    pub(crate) fn callable(mut self, callable: ObjectHandle) -> Self {
        self.callable = Some(callable);
        self
    }

    pub(crate) fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn failure(mut self, err: &ObjcapError) -> Self {
        self.error_code = Some(err.error_code().to_string());
        self.detail = Some(err.to_string());
        self
    }
}

/// Running totals of access decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCounters {
    pub allowed: u64,
    pub denied: u64,
    pub memoized_grants: u64,
}

impl DecisionCounters {
    pub(crate) fn tally(&mut self, allowed: bool) {
        if allowed {
            self.allowed += 1;
        } else {
            self.denied += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.allowed + self.denied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccessOperation;

    #[test]
    fn failure_records_code_and_message() {
        let err = ObjcapError::AccessDenied {
            operation: AccessOperation::Set,
            object: ObjectHandle(2),
            name: "x".to_string(),
        };
        let event = PolicyEvent::base(
            "t-1",
            ACCESS_COMPONENT,
            PolicyEventType::AccessCheck,
            PolicyEventOutcome::Denied,
        )
        .object(ObjectHandle(2))
        .property("x")
        .failure(&err);

        assert_eq!(event.error_code.as_deref(), Some("FE-OBJCAP-1001"));
        assert_eq!(event.property.as_deref(), Some("x"));
        assert!(event.detail.expect("detail").contains("cannot set"));
    }

    #[test]
    fn event_json_uses_snake_case_keys() {
        let event = PolicyEvent::base(
            "t-2",
            GUARD_COMPONENT,
            PolicyEventType::EnterBase,
            PolicyEventOutcome::Transitioned,
        );
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "enter_base");
        assert_eq!(json["outcome"], "transitioned");
        assert_eq!(json["component"], "construction_guard");
    }

    #[test]
    fn counters_tally() {
        let mut counters = DecisionCounters::default();
        counters.tally(true);
        counters.tally(false);
        counters.tally(false);
        assert_eq!(counters.allowed, 1);
        assert_eq!(counters.denied, 2);
        assert_eq!(counters.total(), 3);
    }
}
