//! Decoded struct instances

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::dataforge::types::{Guid, InstanceRef};

/// A single decoded property value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Localization key, usually `@`-prefixed
    Locale(String),
    Guid(Guid),
    Enum(String),
    /// Inline nested struct
    Class(Box<Instance>),
    StrongPointer(Option<InstanceRef>),
    WeakPointer(Option<InstanceRef>),
    /// Reference to another record by id
    Reference(Option<Guid>),
    Array(Vec<Value>),
    /// A field whose type tag this decoder does not understand
    Unparsed(u16),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Float(v) => Some(*v as i64),
            Value::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::UInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Text of string-like values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Locale(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Class(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Target of a strong or weak pointer
    pub fn as_pointer(&self) -> Option<InstanceRef> {
        match self {
            Value::StrongPointer(p) | Value::WeakPointer(p) => *p,
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<Guid> {
        match self {
            Value::Reference(r) => *r,
            Value::Guid(g) if !g.is_empty() => Some(*g),
            _ => None,
        }
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(self, Value::Unparsed(_))
    }
}

/// One named field of an instance
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Arc<str>,
    pub value: Value,
}

/// A decoded struct instance. Fields are in layout order: inherited fields
/// first, then the struct's own.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub struct_index: u32,
    pub type_name: Arc<str>,
    pub fields: Vec<Field>,
}

impl Instance {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name.as_ref() == name)
            .map(|f| &f.value)
    }

    /// Follow a dotted path through inline structs, e.g. `"AttachDef.Size"`
    pub fn path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut value = self.get(parts.next()?)?;
        for part in parts {
            value = value.as_instance()?.get(part)?;
        }
        Some(value)
    }

    pub fn f64(&self, path: &str) -> Option<f64> {
        self.path(path).and_then(Value::as_f64)
    }

    pub fn str(&self, path: &str) -> Option<&str> {
        self.path(path).and_then(Value::as_str)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_ref())
    }

    /// Count of fields that could not be decoded
    pub fn unparsed_count(&self) -> usize {
        self.fields.iter().filter(|f| f.value.is_unparsed()).count()
    }
}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("__type", self.type_name.as_ref())?;
        for field in &self.fields {
            map.serialize_entry(field.name.as_ref(), &field.value)?;
        }
        map.end()
    }
}
