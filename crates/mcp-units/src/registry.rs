//! Unit registration and lookup.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::schema::{to_validator, ObjectShape};
use crate::types::{UnitArgs, UnitContext, UnitError, UnitKind, UnitMeta, UnitResult};
use crate::uri::UriTemplate;

/// Future returned by a unit callback.
pub type UnitFuture = BoxFuture<'static, UnitResult<Value>>;

/// Shared callback invoked for every call of a unit.
pub type UnitCallback = Arc<dyn Fn(UnitArgs, UnitContext) -> UnitFuture + Send + Sync>;

/// Wrap an async closure as a [`UnitCallback`].
pub fn unit_fn<F, Fut>(f: F) -> UnitCallback
where
    F: Fn(UnitArgs, UnitContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UnitResult<Value>> + Send + 'static,
{
    Arc::new(move |args, ctx| f(args, ctx).boxed())
}

/// A registered unit: metadata plus callback. Immutable once built.
#[derive(Clone)]
pub struct HandlerRecord {
    pub name: String,
    pub kind: UnitKind,
    pub meta: UnitMeta,
    pub is_template: bool,
    validator: Option<ObjectShape>,
    uri: Option<UriTemplate>,
    callback: UnitCallback,
}

impl HandlerRecord {
    pub fn new(kind: UnitKind, name: impl Into<String>, meta: UnitMeta, callback: UnitCallback) -> Self {
        let validator = meta.schema.as_ref().map(to_validator);
        let uri = meta.uri_template.as_deref().map(UriTemplate::parse);
        let is_template = uri.as_ref().is_some_and(UriTemplate::is_template);
        Self {
            name: name.into(),
            kind,
            meta,
            is_template,
            validator,
            uri,
            callback,
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.meta.description.as_deref()
    }

    pub fn validator(&self) -> Option<&ObjectShape> {
        self.validator.as_ref()
    }

    pub fn uri(&self) -> Option<&UriTemplate> {
        self.uri.as_ref()
    }

    /// JSON Schema describing accepted arguments.
    pub fn input_schema(&self) -> Value {
        match &self.validator {
            Some(shape) => shape.to_json_schema(),
            None => serde_json::json!({ "type": "object" }),
        }
    }

    /// Validate arguments and run the callback.
    pub async fn invoke(&self, raw_args: Option<Value>, ctx: UnitContext) -> UnitResult<Value> {
        let args = match &self.validator {
            Some(shape) => UnitArgs::Validated(shape.validate(raw_args)?),
            None => UnitArgs::Untyped(match raw_args {
                Some(Value::Object(map)) => map,
                None | Some(Value::Null) => serde_json::Map::new(),
                Some(other) => {
                    let mut map = serde_json::Map::new();
                    map.insert("value".to_string(), other);
                    map
                }
            }),
        };

        tracing::debug!(kind = %self.kind, unit = %self.name, "Invoking unit");
        (self.callback)(args, ctx).await
    }
}

impl fmt::Debug for HandlerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRecord")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("meta", &self.meta)
            .field("is_template", &self.is_template)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
struct KindTable {
    order: Vec<HandlerRecord>,
    index: HashMap<String, usize>,
}

impl KindTable {
    fn insert(&mut self, record: HandlerRecord) -> bool {
        match self.index.get(&record.name) {
            Some(&pos) => {
                self.order[pos] = record;
                true
            }
            None => {
                self.index.insert(record.name.clone(), self.order.len());
                self.order.push(record);
                false
            }
        }
    }
}

/// Named handler records for the three unit kinds.
///
/// Populated before the server starts accepting traffic, then shared
/// read-only. Listing preserves insertion order; re-registering a name
/// replaces the record in place.
#[derive(Clone, Default)]
pub struct Registry {
    tables: [KindTable; 3],
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_unit(
        &mut self,
        kind: UnitKind,
        name: impl Into<String>,
        meta: UnitMeta,
        handler: UnitCallback,
    ) {
        self.register(HandlerRecord::new(kind, name, meta, handler));
    }

    /// Insert an already-built record. Last write wins.
    pub fn register(&mut self, record: HandlerRecord) {
        let kind = record.kind;
        let name = record.name.clone();
        if self.tables[kind.index()].insert(record) {
            tracing::debug!(%kind, unit = %name, "Replaced unit registration");
        } else {
            tracing::debug!(%kind, unit = %name, "Registered unit");
        }
    }

    pub fn list_units(&self, kind: UnitKind) -> &[HandlerRecord] {
        &self.tables[kind.index()].order
    }

    pub fn get_unit(&self, kind: UnitKind, name: &str) -> UnitResult<&HandlerRecord> {
        let table = &self.tables[kind.index()];
        table
            .index
            .get(name)
            .map(|&pos| &table.order[pos])
            .ok_or_else(|| UnitError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    /// Find the datasource serving `uri`: exact URIs first, then templates.
    ///
    /// A datasource registered without a URI is addressed by its name.
    pub fn resolve_uri(&self, uri: &str) -> Option<(&HandlerRecord, serde_json::Map<String, Value>)> {
        let datasources = self.list_units(UnitKind::Datasource);
        datasources
            .iter()
            .filter(|r| !r.is_template)
            .find(|r| r.meta.uri_template.as_deref().unwrap_or(&r.name) == uri)
            .map(|r| (r, serde_json::Map::new()))
            .or_else(|| {
                datasources
                    .iter()
                    .filter(|r| r.is_template)
                    .find_map(|r| r.uri()?.matches(uri).map(|vars| (r, vars)))
            })
    }

    /// All records across kinds, actions first.
    pub fn records(&self) -> impl Iterator<Item = &HandlerRecord> {
        self.tables.iter().flat_map(|t| t.order.iter())
    }

    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.order.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Registry");
        for kind in UnitKind::ALL {
            let names: Vec<_> = self.list_units(kind).iter().map(|r| &r.name).collect();
            dbg.field(kind.as_str(), &names);
        }
        dbg.finish()
    }
}
