//! Datasources: a static server-info document and a templated greeting.

use serde_json::json;

use mcp_units::{unit_fn, Registry, UnitKind, UnitMeta};

use crate::types::{SERVER_NAME, SERVER_VERSION};

pub fn register(registry: &mut Registry) {
    registry.register_unit(
        UnitKind::Datasource,
        "server-info",
        UnitMeta::describe("Server name, version, and the caller's session")
            .with_uri("info://server")
            .with_mime_type("application/json"),
        unit_fn(|_args, ctx| async move {
            Ok(json!({
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
                "session": ctx.session_id(),
            }))
        }),
    );

    registry.register_unit(
        UnitKind::Datasource,
        "greeting",
        UnitMeta::describe("A personalised greeting").with_uri("greeting://{name}"),
        unit_fn(|args, _ctx| async move {
            let name = args.require_str("name")?;
            Ok(json!(format!("Hello, {name}!")))
        }),
    );
}
