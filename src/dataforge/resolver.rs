//! Lazy navigation of the record graph
//!
//! A [`ResolvedNode`] wraps one decoded instance. Field access transparently
//! follows strong/weak pointers and record references into further
//! resolutions, each costing one unit of the depth budget. The record ids on
//! the current path form the visited set; a reference back into it is cut.
//! Neither cut is an error: the node simply has no child there, and the
//! resolver records a [`ResolveDiagnostic`] the caller can inspect.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{json, Map, Value as Json};
use tracing::trace;

use crate::dataforge::instance::{Instance, Value};
use crate::dataforge::reader::{DataForge, Record};
use crate::dataforge::types::{Guid, InstanceRef};
use crate::error::Error;

/// Resolver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ResolverOptions {
    /// How many pointer or reference hops one resolution may take
    pub max_depth: u32,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self { max_depth: 12 }
    }
}

/// Why a resolution stopped short
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveDiagnostic {
    /// The depth budget ran out before the target could be followed
    DepthExceeded { from: String, target: String },
    /// The target record is already on the current path
    Cycle { from: String, target: Guid },
    /// A reference names a record that does not exist
    Missing { from: String, target: String },
    /// The target exists but could not be decoded
    Decode { target: String, reason: String },
}

impl ResolveDiagnostic {
    /// The error value for budget and cycle cuts, for logging and summaries
    pub fn to_error(&self) -> Option<Error> {
        match self {
            ResolveDiagnostic::DepthExceeded { from, target } => Some(Error::DepthExceeded {
                from: from.clone(),
                target: target.clone(),
            }),
            ResolveDiagnostic::Cycle { from, target } => Some(Error::DepthExceeded {
                from: from.clone(),
                target: target.to_string(),
            }),
            _ => None,
        }
    }

    pub fn is_depth_exceeded(&self) -> bool {
        matches!(self, ResolveDiagnostic::DepthExceeded { .. })
    }
}

/// Resolves record ids into [`ResolvedNode`]s over one database
pub struct Resolver<'a> {
    df: &'a DataForge,
    options: ResolverOptions,
    diagnostics: RefCell<Vec<ResolveDiagnostic>>,
}

impl<'a> Resolver<'a> {
    pub fn new(df: &'a DataForge, options: ResolverOptions) -> Self {
        Self {
            df,
            options,
            diagnostics: RefCell::new(Vec::new()),
        }
    }

    pub fn database(&self) -> &'a DataForge {
        self.df
    }

    /// Resolve a record with the configured depth budget
    pub fn resolve(&self, id: &Guid) -> Option<ResolvedNode<'_>> {
        self.resolve_with_budget(id, self.options.max_depth)
    }

    pub fn resolve_with_budget(&self, id: &Guid, depth_budget: u32) -> Option<ResolvedNode<'_>> {
        match self.df.record(id) {
            Some(record) => self.resolve_record_with_budget(record, depth_budget),
            None => {
                self.report(ResolveDiagnostic::Missing {
                    from: "<root>".to_string(),
                    target: id.to_string(),
                });
                None
            }
        }
    }

    pub fn resolve_record(&self, record: &Record) -> Option<ResolvedNode<'_>> {
        self.resolve_record_with_budget(record, self.options.max_depth)
    }

    fn resolve_record_with_budget(&self, record: &Record, budget: u32) -> Option<ResolvedNode<'_>> {
        let instance = self.decode(record.instance_ref(), &record.name)?;
        Some(ResolvedNode {
            resolver: self,
            instance,
            label: Rc::from(record.name.as_str()),
            record: Some(record.id),
            visited: Rc::new(vec![record.id]),
            budget,
        })
    }

    fn decode(&self, at: InstanceRef, label: &str) -> Option<Rc<Instance>> {
        match self.df.instance(at) {
            Ok(instance) => Some(Rc::new(instance)),
            Err(e) => {
                self.report(ResolveDiagnostic::Decode {
                    target: label.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn report(&self, diagnostic: ResolveDiagnostic) {
        trace!(?diagnostic, "resolution cut");
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    /// Everything reported since the last call
    pub fn take_diagnostics(&self) -> Vec<ResolveDiagnostic> {
        std::mem::take(&mut *self.diagnostics.borrow_mut())
    }

    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.borrow().len()
    }
}

/// A decoded instance plus the context needed to keep walking from it
#[derive(Clone)]
pub struct ResolvedNode<'r> {
    resolver: &'r Resolver<'r>,
    instance: Rc<Instance>,
    label: Rc<str>,
    /// The record this node is, if it is a record root
    record: Option<Guid>,
    visited: Rc<Vec<Guid>>,
    budget: u32,
}

impl std::fmt::Debug for ResolvedNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedNode")
            .field("label", &self.label)
            .field("type", &self.instance.type_name)
            .field("budget", &self.budget)
            .finish()
    }
}

impl<'r> ResolvedNode<'r> {
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn type_name(&self) -> &str {
        &self.instance.type_name
    }

    /// Record id when this node is a record root
    pub fn record_id(&self) -> Option<Guid> {
        self.record
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn remaining_budget(&self) -> u32 {
        self.budget
    }

    /// Whether this node's struct is `base` or derives from it
    pub fn is_a(&self, base: &str) -> bool {
        self.resolver
            .df
            .inherits_from(self.instance.struct_index, base)
    }

    /// Raw field value, no following
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.instance.get(name)
    }

    /// Field as a node: inline structs are free, pointers and references
    /// cost one unit of budget
    pub fn child(&self, name: &str) -> Option<ResolvedNode<'r>> {
        let value = self.instance.get(name)?;
        self.follow(value, name)
    }

    /// Every resolvable element of an array field; null and cut elements are skipped
    pub fn children(&self, name: &str) -> Vec<ResolvedNode<'r>> {
        match self.instance.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| self.follow(item, name))
                .collect(),
            Some(other) => self.follow(other, name).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// First pointer target of an array field whose struct is or derives from `type_name`.
    /// Non-matching targets are never decoded.
    pub fn find_child(&self, name: &str, type_name: &str) -> Option<ResolvedNode<'r>> {
        let items = self.instance.get(name)?.as_array()?;
        items.iter().find_map(|item| match item.as_pointer() {
            Some(p) if self.resolver.df.inherits_from(p.struct_index, type_name) => {
                self.follow(item, name)
            }
            Some(_) => None,
            None => item
                .as_instance()
                .filter(|i| self.resolver.df.inherits_from(i.struct_index, type_name))
                .and_then(|_| self.follow(item, name)),
        })
    }

    /// Walk a dotted path of node-valued fields
    pub fn path(&self, path: &str) -> Option<ResolvedNode<'r>> {
        let mut node = self.clone();
        for part in path.split('.') {
            node = node.child(part)?;
        }
        Some(node)
    }

    /// Scalar at a dotted path; every segment but the last may be followed
    pub fn value(&self, path: &str) -> Option<Value> {
        match path.rsplit_once('.') {
            Some((prefix, last)) => self.path(prefix)?.instance.get(last).cloned(),
            None => self.instance.get(path).cloned(),
        }
    }

    pub fn f64(&self, path: &str) -> Option<f64> {
        self.value(path).as_ref().and_then(Value::as_f64)
    }

    pub fn string(&self, path: &str) -> Option<String> {
        match self.value(path)? {
            Value::String(s) | Value::Locale(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn bool(&self, path: &str) -> Option<bool> {
        self.value(path).as_ref().and_then(Value::as_bool)
    }

    /// Record id a reference field points at, without resolving it
    pub fn reference(&self, path: &str) -> Option<Guid> {
        self.value(path).as_ref().and_then(Value::as_reference)
    }

    fn follow(&self, value: &Value, field: &str) -> Option<ResolvedNode<'r>> {
        match value {
            Value::Class(inner) => Some(ResolvedNode {
                resolver: self.resolver,
                instance: Rc::new((**inner).clone()),
                label: Rc::from(format!("{}.{}", self.label, field)),
                record: None,
                visited: self.visited.clone(),
                budget: self.budget,
            }),
            Value::StrongPointer(Some(p)) | Value::WeakPointer(Some(p)) => {
                let target = format!(
                    "{}[{}]",
                    self.resolver.df.struct_name(p.struct_index).unwrap_or("?"),
                    p.instance_index
                );
                let budget = self.spend(field, &target)?;
                let instance = self.resolver.decode(*p, &target)?;
                Some(ResolvedNode {
                    resolver: self.resolver,
                    instance,
                    label: Rc::from(target),
                    record: None,
                    visited: self.visited.clone(),
                    budget,
                })
            }
            Value::Reference(Some(id)) => self.follow_reference(id, field),
            _ => None,
        }
    }

    fn follow_reference(&self, id: &Guid, field: &str) -> Option<ResolvedNode<'r>> {
        let from = format!("{}.{}", self.label, field);
        if self.visited.contains(id) {
            self.resolver.report(ResolveDiagnostic::Cycle {
                from,
                target: *id,
            });
            return None;
        }
        let Some(record) = self.resolver.df.record(id) else {
            self.resolver.report(ResolveDiagnostic::Missing {
                from,
                target: id.to_string(),
            });
            return None;
        };
        let budget = self.spend(field, &record.name)?;
        let instance = self.resolver.decode(record.instance_ref(), &record.name)?;

        let mut visited = (*self.visited).clone();
        visited.push(*id);
        Some(ResolvedNode {
            resolver: self.resolver,
            instance,
            label: Rc::from(record.name.as_str()),
            record: Some(*id),
            visited: Rc::new(visited),
            budget,
        })
    }

    fn spend(&self, field: &str, target: &str) -> Option<u32> {
        if self.budget == 0 {
            self.resolver.report(ResolveDiagnostic::DepthExceeded {
                from: format!("{}.{}", self.label, field),
                target: target.to_string(),
            });
            return None;
        }
        Some(self.budget - 1)
    }

    /// Expand this node into a JSON tree, following everything the budget allows.
    /// Cut edges appear as `{"__cut": target}`.
    pub fn materialize(&self) -> Json {
        let mut map = Map::new();
        map.insert("__type".into(), json!(self.instance.type_name.as_ref()));
        if let Some(id) = self.record {
            map.insert("__ref".into(), json!(id.to_string()));
        }
        for field in &self.instance.fields {
            map.insert(
                field.name.to_string(),
                self.materialize_value(&field.value, &field.name),
            );
        }
        Json::Object(map)
    }

    fn materialize_value(&self, value: &Value, field: &str) -> Json {
        match value {
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(|item| self.materialize_value(item, field))
                    .collect(),
            ),
            Value::Class(_)
            | Value::StrongPointer(Some(_))
            | Value::WeakPointer(Some(_))
            | Value::Reference(Some(_)) => match self.follow(value, field) {
                Some(node) => node.materialize(),
                None => json!({ "__cut": cut_label(value) }),
            },
            other => serde_json::to_value(other).unwrap_or(Json::Null),
        }
    }
}

fn cut_label(value: &Value) -> String {
    match value {
        Value::Reference(Some(id)) => id.to_string(),
        Value::StrongPointer(Some(p)) | Value::WeakPointer(Some(p)) => {
            format!("{}[{}]", p.struct_index, p.instance_index)
        }
        _ => String::new(),
    }
}
