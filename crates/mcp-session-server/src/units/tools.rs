//! Actions: add, echo, fail.

use serde_json::{json, Value};

use mcp_units::{fields, unit_fn, FieldSpec, Registry, UnitArgs, UnitError, UnitKind, UnitMeta};

pub fn register(registry: &mut Registry) {
    registry.register_unit(
        UnitKind::Action,
        "add",
        UnitMeta::describe("Add two numbers").with_schema(fields([
            ("a", FieldSpec::number().describe("First addend")),
            ("b", FieldSpec::number().describe("Second addend")),
        ])),
        unit_fn(|args, _ctx| async move { add(&args) }),
    );

    registry.register_unit(
        UnitKind::Action,
        "echo",
        UnitMeta::describe("Echo a message back, logging it to the session stream")
            .with_schema(fields([("message", FieldSpec::string())])),
        unit_fn(|args, ctx| async move {
            let message = args.require_str("message")?.to_string();
            ctx.log("info", json!({ "echo": message }));
            Ok(Value::String(message))
        }),
    );

    registry.register_unit(
        UnitKind::Action,
        "fail",
        UnitMeta::describe("Always fails; exercises error results").with_schema(fields([(
            "message",
            FieldSpec::string().optional(),
        )])),
        unit_fn(|args, _ctx| async move {
            let message = args.get_str("message").unwrap_or("intentional failure");
            Err(UnitError::handler(message))
        }),
    );
}

/// Integer inputs give an integer sum.
fn add(args: &UnitArgs) -> Result<Value, UnitError> {
    let ints = args
        .get("a")
        .and_then(Value::as_i64)
        .zip(args.get("b").and_then(Value::as_i64));
    if let Some(sum) = ints.and_then(|(a, b)| a.checked_add(b)) {
        return Ok(json!(sum));
    }
    Ok(json!(args.require_f64("a")? + args.require_f64("b")?))
}
