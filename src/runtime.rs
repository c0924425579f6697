//! In-process model of what the generated Ruby does with a parsed JSON value.
//!
//! `decode` accepts and rejects exactly where `from_dynamic!` would raise, and
//! [`Typed::to_dynamic`] produces what `to_dynamic` would return. Used by the
//! `check` command to validate samples without a Ruby interpreter.
use indexmap::IndexMap;
use serde_json::{Number, Value};

use crate::error::DecodeError;
use crate::ir::{ClassType, EnumType, Name, Type, TypeGraph, TypeRef, UnionType};
use crate::lower::Lowerer;
use crate::lower::union::slot_name;

/// A decoded value. Nil is what a Ruby attribute holds for JSON null.
#[derive(Debug, Clone, PartialEq)]
pub enum Typed {
    Nil,
    Any(Value),
    Bool(bool),
    Integer(Number),
    Double(Number),
    String(String),
    Array(Vec<Typed>),
    Map(IndexMap<String, Typed>),
    Enum { name: Name, value: String },
    /// Fields keyed by JSON property name, in declaration order.
    Struct { name: Name, fields: IndexMap<String, Typed> },
    /// Only the slots whose attempt produced a non-nil value.
    Union { name: Name, slots: IndexMap<&'static str, Typed> },
}

impl Typed {
    pub fn to_dynamic(&self) -> Value {
        match self {
            Typed::Nil => Value::Null,
            Typed::Any(v) => v.clone(),
            Typed::Bool(b) => Value::Bool(*b),
            Typed::Integer(n) | Typed::Double(n) => Value::Number(n.clone()),
            Typed::String(s) => Value::String(s.clone()),
            Typed::Array(xs) => Value::Array(xs.iter().map(Typed::to_dynamic).collect()),
            Typed::Map(m) => Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_dynamic())).collect()),
            Typed::Enum { value, .. } => Value::String(value.clone()),
            Typed::Struct { fields, .. } => {
                Value::Object(fields.iter().map(|(k, v)| (k.clone(), v.to_dynamic())).collect())
            }
            // first non-nil slot in declaration order
            Typed::Union { slots, .. } => slots.values().next().map_or(Value::Null, Typed::to_dynamic),
        }
    }
}

/// Decode `value` as the generated `from_dynamic!`/`from_json!` for `t` would.
pub fn decode(graph: &TypeGraph, t: TypeRef, value: &Value) -> Result<Typed, DecodeError> {
    Decoder { graph, lower: Lowerer::new(graph) }.decode(t, value, ".", false)
}

/// `encoded` reproduces `original` up to key order, with keys absent from
/// `original` allowed to reappear as null.
pub fn round_trips(original: &Value, encoded: &Value) -> bool {
    match (original, encoded) {
        (Value::Object(a), Value::Object(b)) => {
            a.keys().all(|k| b.contains_key(k))
                && b.iter().all(|(k, bv)| match a.get(k) {
                    Some(av) => round_trips(av, bv),
                    None => bv.is_null(),
                })
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| round_trips(x, y))
        }
        (a, b) => a == b,
    }
}

struct Decoder<'g> {
    graph: &'g TypeGraph,
    lower: Lowerer<'g>,
}

impl<'g> Decoder<'g> {
    /// `optional`: nil is accepted as is, mirroring the `&.` / `.optional` forms.
    fn decode(&self, t: TypeRef, v: &Value, path: &str, optional: bool) -> Result<Typed, DecodeError> {
        let ty = self.graph.get(t);
        if optional && (v.is_null() || (is_struct_reference(self.graph, ty) && v == &Value::Bool(false))) {
            return Ok(Typed::Nil);
        }
        match ty {
            Type::Any | Type::Null | Type::Bool | Type::Integer | Type::Double | Type::String => {
                self.primitive(t, ty, v, path)
            }
            Type::Array { items } => {
                let xs = v.as_array().ok_or_else(|| mismatch(path, "Types::Strict::Array", v))?;
                xs.iter()
                    .enumerate()
                    .map(|(i, x)| self.decode(*items, x, &index_path(path, i), false))
                    .collect::<Result<_, _>>()
                    .map(Typed::Array)
            }
            Type::Map { values } => {
                let m = v.as_object().ok_or_else(|| mismatch(path, "Types::Strict::Hash", v))?;
                let mut decoded = IndexMap::with_capacity(m.len());
                for (k, x) in m {
                    decoded.insert(k.clone(), self.decode(*values, x, &key_path(path, k), false)?);
                }
                Ok(Typed::Map(decoded))
            }
            Type::Enum(e) => self.enumeration(e, v, path),
            Type::Class(c) => self.class(c, v, path),
            Type::Union(u) => match self.graph.nullable_from_union(u) {
                Some(_) if v.is_null() => Ok(Typed::Nil),
                Some(inner) => self.decode(inner, v, path, false),
                None => self.union(u, v, path),
            },
        }
    }

    fn primitive(&self, t: TypeRef, ty: &Type, v: &Value, path: &str) -> Result<Typed, DecodeError> {
        let decoded = match (ty, v) {
            (Type::Any, Value::Null) | (Type::Null, Value::Null) => Some(Typed::Nil),
            (Type::Any, v) => Some(Typed::Any(v.clone())),
            (Type::Bool, Value::Bool(b)) => Some(Typed::Bool(*b)),
            (Type::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(Typed::Integer(n.clone())),
            (Type::Double, Value::Number(n)) => Some(Typed::Double(n.clone())),
            (Type::String, Value::String(s)) => Some(Typed::String(s.clone())),
            _ => None,
        };
        decoded.ok_or_else(|| mismatch(path, &self.lower.dry_type(t, false), v))
    }

    fn enumeration(&self, e: &EnumType, v: &Value, path: &str) -> Result<Typed, DecodeError> {
        let s = v
            .as_str()
            .ok_or_else(|| mismatch(path, &format!("Types::{}", e.name), v))?;
        if !e.cases.contains_key(s) {
            return Err(DecodeError::UnknownEnumCase {
                path: path.to_string(),
                name: e.name.to_string(),
                value: s.to_string(),
            });
        }
        Ok(Typed::Enum { name: e.name.clone(), value: s.to_string() })
    }

    fn class(&self, c: &ClassType, v: &Value, path: &str) -> Result<Typed, DecodeError> {
        let obj = v.as_object().ok_or_else(|| mismatch(path, "Types::Strict::Hash", v))?;
        let mut fields = IndexMap::with_capacity(c.properties.len());
        for (json, p) in &c.properties {
            let raw = obj.get(json).unwrap_or(&Value::Null);
            let field = self.decode(p.ty, raw, &key_path(path, json), p.is_optional)?;
            fields.insert(json.clone(), field);
        }
        Ok(Typed::Struct { name: c.name.clone(), fields })
    }

    fn union(&self, u: &UnionType, v: &Value, path: &str) -> Result<Typed, DecodeError> {
        let (null, members) = self.graph.remove_null_from_union(u);
        let mut slots = IndexMap::new();
        for m in members {
            let slot = slot_name(self.graph.get(m));
            match self.decode(m, v, path, false) {
                Ok(Typed::Nil) => {}
                Ok(value) => {
                    slots.insert(slot, value);
                }
                Err(error) => {
                    tracing::trace!(path, slot, %error, union = %u.name, "union member rejected");
                }
            }
        }
        if slots.is_empty() && !(null.is_some() && v.is_null()) {
            return Err(DecodeError::InvalidUnion { path: path.to_string(), name: u.name.to_string() });
        }
        Ok(Typed::Union { name: u.name.clone(), slots })
    }
}

/// References rendered as `e ? X.from_dynamic!(e) : nil`.
fn is_struct_reference(graph: &TypeGraph, ty: &Type) -> bool {
    match ty {
        Type::Class(_) => true,
        Type::Union(u) => graph.nullable_from_union(u).is_none(),
        _ => false,
    }
}

fn mismatch(path: &str, expected: &str, found: &Value) -> DecodeError {
    DecodeError::Mismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: json_kind(found),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn key_path(path: &str, key: &str) -> String {
    if path == "." { key.to_string() } else { format!("{path}.{key}") }
}

fn index_path(path: &str, i: usize) -> String {
    if path == "." { format!("[{i}]") } else { format!("{path}[{i}]") }
}

// ------------------------------- Tests ------------------------------------ //
