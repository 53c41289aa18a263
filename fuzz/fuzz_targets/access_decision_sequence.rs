#![no_main]

use frankenengine_objcap::{
    ContainerKind, GrantLevel, ObjectHandle, PolicyContext, PolicySnapshot, Value,
};
use libfuzzer_sys::fuzz_target;

const MAX_OPS: usize = 256;
const NAMES: [&str; 6] = ["x", "y", "len", "secret_", "slot__", "Super"];

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let mut ctx = PolicyContext::default();
    let ty = ctx.declare_host_type("Fuzzed", ContainerKind::Authored);
    let mut objects: Vec<ObjectHandle> = vec![
        ctx.new_record([("x", Value::Int(1))]),
        ctx.new_sequence([Value::Int(0), Value::Null]),
        ty,
    ];
    if let Ok(instance) = ctx.make_raw_instance(ty) {
        objects.push(instance);
    }

    for chunk in data.chunks(2).take(MAX_OPS) {
        let op = chunk[0];
        let arg = chunk.get(1).copied().unwrap_or(0);
        let object = objects[usize::from(arg) % objects.len()];
        let name = NAMES[usize::from(arg >> 3) % NAMES.len()];
        let was_frozen = ctx.is_frozen(object);

        match op % 12 {
            0 => {
                let _ = ctx.can_read_public(object, name);
            }
            1 => {
                let _ = ctx.can_enumerate_public(object, name);
            }
            2 => {
                let _ = ctx.write_public(object, name, Value::Int(i64::from(arg)));
            }
            3 => {
                let _ = ctx.write_self(object, name, Value::Int(i64::from(arg)));
            }
            4 => {
                if ctx.freeze(object).is_ok() {
                    // Own and inherited settable grants are both gone.
                    assert!(!ctx.grant_of(object, name).settable);
                }
            }
            5 => {
                let _ = explicit_grant(&mut ctx, object, name, arg);
            }
            6 => {
                let _ = ctx.delete_public(object, name);
            }
            7 => {
                let _ = ctx.enter_base(ty, object);
            }
            8 => {
                let _ = ctx.enter_method(ty, object);
            }
            9 => objects.push(ctx.new_record([(name, Value::Bool(true))])),
            10 => {
                if let Ok(instance) = ctx.make_raw_instance(ty) {
                    objects.push(instance);
                }
            }
            _ => {
                let _ = ctx.read_self(object, name);
            }
        }

        // Frozen marks never clear.
        if was_frozen {
            assert!(ctx.is_frozen(object));
        }
    }

    let snapshot = ctx.snapshot();
    for record in &snapshot.grants {
        assert!(record.grant.is_monotonic(), "non-monotonic grant {record:?}");
    }
    if let Ok(json) = serde_json::to_string(&snapshot) {
        let decoded: PolicySnapshot = serde_json::from_str(&json).expect("snapshot decodes");
        assert_eq!(decoded, snapshot);
    }
});

fn explicit_grant(ctx: &mut PolicyContext, object: ObjectHandle, name: &str, arg: u8) -> bool {
    let level = match arg % 3 {
        0 => GrantLevel::Read,
        1 => GrantLevel::Enumerate,
        _ => GrantLevel::Set,
    };
    let result = match level {
        GrantLevel::Read => ctx.allow_read(object, name),
        GrantLevel::Enumerate => ctx.allow_enumerate(object, name),
        GrantLevel::Set => ctx.allow_set(object, name),
    };
    result.is_ok_and(|grant| grant.allows(level))
}
