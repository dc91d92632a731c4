//! Template: review — ask for a code review.

use serde_json::Value;

use mcp_units::{fields, unit_fn, FieldSpec, Registry, UnitKind, UnitMeta};

pub fn register(registry: &mut Registry) {
    registry.register_unit(
        UnitKind::Template,
        "review",
        UnitMeta::describe("Review a piece of code").with_schema(fields([
            ("code", FieldSpec::string().describe("Code to review")),
            (
                "language",
                FieldSpec::string()
                    .describe("Language of the code")
                    .optional(),
            ),
        ])),
        unit_fn(|args, _ctx| async move {
            let code = args.require_str("code")?;
            let language = args.get_str("language").unwrap_or("the given language");
            Ok(Value::String(format!(
                "Please review this code written in {language}.\n\
                 Point out bugs first, then style issues.\n\n{code}"
            )))
        }),
    );
}
