#![forbid(unsafe_code)]
//! Integration tests for host-type taming, configuration and snapshots.

use std::fs;
use std::path::PathBuf;

use frankenengine_objcap::{
    AccessOperation, CapabilityRole, ConfigError, ErrorKind, ObjcapError, PolicyConfig,
    PolicyContext, RawMarkerPolicy, TamingManifest, TamingReport, Value,
};

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()))
}

fn tamed() -> (PolicyContext, TamingReport) {
    let manifest = TamingManifest::from_json(&fixture("host_taming_manifest.json"))
        .expect("fixture manifest parses");
    let mut ctx = PolicyContext::default();
    let report = ctx.apply_manifest(&manifest).expect("apply");
    (ctx, report)
}

#[test]
fn fixture_manifest_report_counts() {
    let (_, report) = tamed();
    assert_eq!(
        report,
        TamingReport {
            host_types: 6,
            readable: 5,
            methods: 9,
            mutators: 9,
            installed_operations: 18,
        }
    );
}

#[test]
fn tamed_error_hierarchy() {
    let (ctx, _) = tamed();
    let object = ctx.intrinsics().object;
    let error = ctx.host_type("Error").expect("Error");
    let range = ctx.host_type("RangeError").expect("RangeError");
    assert_eq!(ctx.super_of(error), Some(object));
    assert_eq!(ctx.super_of(range), Some(error));
    assert_eq!(ctx.role_of(range), CapabilityRole::ConstructorOnly);
    assert!(ctx.is_frozen(range));
    assert!(!ctx.is_frozen(object));
}

#[test]
fn array_mutators_refuse_frozen_sequences() {
    let (mut ctx, _) = tamed();
    let array = ctx.intrinsics().array;
    let push = ctx
        .heap()
        .lookup(ctx.intrinsics().array_prototype, "push")
        .expect("push")
        .as_object()
        .expect("push is an object");
    assert_eq!(ctx.role_of(push), CapabilityRole::MethodOf(array));
    assert!(ctx.original_of(push).is_some());

    let open = ctx.new_sequence([Value::Int(1)]);
    assert_eq!(
        ctx.call_method(push, open, vec![Value::Int(2)]).expect("push"),
        Value::Undefined
    );

    let args = ctx.frozen_arguments([Value::Int(1)]).expect("args");
    let err = ctx.call_method(push, args, vec![Value::Int(2)]).expect_err("frozen");
    assert_eq!(
        err,
        ObjcapError::AccessDenied {
            operation: AccessOperation::Mutate,
            object: args,
            name: "push".to_string(),
        }
    );
}

#[test]
fn tamed_methods_are_readable_but_stolen_calls_fail() {
    let (mut ctx, _) = tamed();
    let date = ctx.host_type("Date").expect("Date");
    let proto = ctx.heap().type_prototype(date).expect("proto");
    assert!(ctx.can_read_public(proto, "getTime"));
    assert!(ctx.can_read_public(date, "parse"));
    assert!(!ctx.can_read_public(proto, "setHours"));

    let get_time = ctx
        .read_public(proto, "getTime")
        .expect("read")
        .as_object()
        .expect("callable");
    let record = ctx.new_record(Vec::<(String, Value)>::new());
    let err = ctx.call_method(get_time, record, Vec::new()).expect_err("stolen");
    assert_eq!(err.kind(), ErrorKind::IdentityViolation);

    let today = ctx.construct(date, Vec::new()).expect("construct");
    ctx.call_method(get_time, today, Vec::new()).expect("call");
}

#[test]
fn tamed_methods_are_reachable_through_host_instances() {
    let (mut ctx, _) = tamed();
    let date = ctx.host_type("Date").expect("Date");
    let today = ctx.construct(date, Vec::new()).expect("construct");
    assert!(ctx.can_read_public(today, "getTime"));
    assert!(!ctx.can_read_public(today, "setHours"));
    assert!(!ctx.can_set_public(today, "getTime"));

    let get_time = ctx
        .read_public(today, "getTime")
        .expect("read")
        .as_object()
        .expect("getTime is visible on instances");
    ctx.call_method(get_time, today, Vec::new()).expect("call");

    let array = ctx.intrinsics().array;
    let seq = ctx.new_sequence([Value::Int(1)]);
    let push = ctx
        .read_public(seq, "push")
        .expect("read")
        .as_object()
        .expect("push is visible on sequences");
    assert_eq!(ctx.role_of(push), CapabilityRole::MethodOf(array));
    ctx.call_method(push, seq, vec![Value::Int(2)]).expect("push");
}

#[test]
fn reapplying_manifest_keeps_snapshot_shape() {
    let manifest = TamingManifest::from_json(&fixture("host_taming_manifest.json"))
        .expect("manifest");
    let mut ctx = PolicyContext::default();
    ctx.apply_manifest(&manifest).expect("first");
    let roles = ctx.snapshot().roles.len();
    let links = ctx.snapshot().super_links;
    ctx.apply_manifest(&manifest).expect("second");
    let again = ctx.snapshot();
    assert_eq!(again.super_links, links);
    // Mutators are re-wrapped, so only their fresh wrappers add roles.
    assert_eq!(again.roles.len(), roles + 9);
}

#[test]
fn identical_setups_share_a_digest() {
    let (a, _) = tamed();
    let config = PolicyConfig::from_json(&fixture("policy_config.json")).expect("config");
    let manifest = TamingManifest::from_json(&fixture("host_taming_manifest.json"))
        .expect("manifest");
    let mut b = PolicyContext::new(config);
    b.apply_manifest(&manifest).expect("apply");
    assert!(b.events().is_empty());
    assert_eq!(
        a.snapshot().digest().expect("digest"),
        b.snapshot().digest().expect("digest")
    );
}

#[test]
fn config_fixture_round_trips() {
    let config = PolicyConfig::from_json(&fixture("policy_config.json")).expect("config");
    assert_eq!(config.trace_id, "cli-fixture");
    assert_eq!(config.raw_marker_policy, RawMarkerPolicy::SideEffectFree);
    assert!(!config.record_events);

    let json = serde_json::to_string(&config).expect("ser");
    assert_eq!(PolicyConfig::from_json(&json).expect("de"), config);

    let err = PolicyConfig::from_json(r#"{"trace_id":""}"#).expect_err("empty trace");
    assert!(matches!(err, ConfigError::InvalidField { ref field, .. } if field == "trace_id"));
}

#[test]
fn sealed_module_rejects_super_link() {
    let mut ctx = PolicyContext::default();
    let maker = ctx.new_callable("plugin");
    ctx.seal_module(maker).expect("seal");
    let err = ctx
        .set_super_once(maker, ctx.intrinsics().object)
        .expect_err("frozen");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
}
