//! Type-directed lowering to Ruby expression fragments.
//!
//! Four structurally recursive functions over the type graph:
//! - [`Lowerer::dry_type`]: the dry-types schema expression for a type,
//! - [`Lowerer::from_dynamic`]: decode a parsed-JSON value into the typed value,
//! - [`Lowerer::to_dynamic`]: encode a typed value back to a parsed-JSON value,
//! - [`Lowerer::marshals_implicitly_to_dynamic`]: whether encoding is the identity.
//!
//! Recursion stops at named types (classes, enums, declared unions), which are
//! referenced by name, so cycles through classes terminate. Nullable unions
//! (`{T, null}`) are erased everywhere into the optional form of `T`.
pub mod union;

use crate::ir::{Type, TypeGraph, TypeRef};

#[derive(Debug, Clone, Copy)]
pub struct Lowerer<'g> {
    graph: &'g TypeGraph,
}

impl<'g> Lowerer<'g> {
    pub fn new(graph: &'g TypeGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &'g TypeGraph {
        self.graph
    }

    /// Schema expression for `t`, wrapped in `.optional` when the context allows nil.
    pub fn dry_type(&self, t: TypeRef, optional: bool) -> String {
        let opt = if optional { ".optional" } else { "" };
        match self.graph.get(t) {
            Type::Any => format!("Types::Any{opt}"),
            Type::Null => format!("Types::Strict::Nil{opt}"),
            Type::Bool => format!("Types::Strict::Bool{opt}"),
            Type::Integer => format!("Types::Strict::Integer{opt}"),
            // JSON numbers only, integral or fractional
            Type::Double => format!("(Types::Strict::Integer | Types::Strict::Float){opt}"),
            Type::String => format!("Types::Strict::String{opt}"),
            Type::Array { items } => {
                format!("Types::Strict::Array.of({}){opt}", self.dry_type(*items, false))
            }
            Type::Map { values } => format!(
                "Types::Strict::Hash.map(Types::Strict::String, {}){opt}",
                self.dry_type(*values, false)
            ),
            Type::Class(c) => format!("Types.Instance({}){opt}", c.name),
            Type::Enum(e) => format!("Types::{}{opt}", e.name),
            Type::Union(u) => match self.graph.nullable_from_union(u) {
                Some(inner) => format!("{}.optional", self.dry_type(inner, false)),
                None => format!("Types.Instance({}){opt}", u.name),
            },
        }
    }

    /// Decode expression for the dynamic value `e`.
    ///
    /// `optional`: the container already allows `e` to be nil, so conversions
    /// are skipped for nil. `cast`: nothing upstream checks `e` against its
    /// schema, so primitives are run through it here. Arrays and maps are always
    /// checked to be arrays/hashes before being walked.
    pub fn from_dynamic(&self, t: TypeRef, e: &str, optional: bool, cast: bool) -> String {
        let nav = if optional { "&" } else { "" };
        match self.graph.get(t) {
            Type::Any | Type::Null | Type::Bool | Type::Integer | Type::Double | Type::String => {
                if cast {
                    format!("{}[{e}]", self.dry_type(t, optional))
                } else {
                    e.to_string()
                }
            }
            Type::Array { items } => {
                let source = self.checked_container(e, "Array", optional);
                format!(
                    "{source}{nav}.map {{ |x| {} }}",
                    self.from_dynamic(*items, "x", false, true)
                )
            }
            Type::Map { values } => {
                let source = self.checked_container(e, "Hash", optional);
                format!(
                    "{source}{nav}.map {{ |k, v| [k, {}] }}{nav}.to_h",
                    self.from_dynamic(*values, "v", false, true)
                )
            }
            Type::Class(c) => {
                let call = format!("{}.from_dynamic!({e})", c.name);
                if optional { format!("{e} ? {call} : nil") } else { call }
            }
            Type::Enum(en) => {
                let lookup = format!("Types::{}[{e}]", en.name);
                if optional { format!("{e}.nil? ? nil : {lookup}") } else { lookup }
            }
            Type::Union(u) => match self.graph.nullable_from_union(u) {
                Some(inner) => {
                    format!("{e}.nil? ? nil : {}", self.from_dynamic(inner, e, false, cast))
                }
                None => {
                    let call = format!("{}.from_dynamic!({e})", u.name);
                    if optional { format!("{e} ? {call} : nil") } else { call }
                }
            },
        }
    }

    fn checked_container(&self, e: &str, strict: &str, optional: bool) -> String {
        if optional {
            format!("Types::Strict::{strict}.optional[{e}]")
        } else {
            format!("Types::Strict::{strict}[{e}]")
        }
    }

    /// Encode expression for the typed value `e`; `e` itself when no conversion is needed.
    pub fn to_dynamic(&self, t: TypeRef, e: &str, optional: bool) -> String {
        if self.marshals_implicitly_to_dynamic(t) {
            return e.to_string();
        }
        let nav = if optional { "&" } else { "" };
        match self.graph.get(t) {
            Type::Any | Type::Null | Type::Bool | Type::Integer | Type::Double | Type::String => {
                e.to_string()
            }
            Type::Enum(_) => e.to_string(),
            Type::Array { items } => {
                format!("{e}{nav}.map {{ |x| {} }}", self.to_dynamic(*items, "x", false))
            }
            Type::Map { values } => format!(
                "{e}{nav}.map {{ |k, v| [k, {}] }}{nav}.to_h",
                self.to_dynamic(*values, "v", false)
            ),
            Type::Class(_) => format!("{e}{nav}.to_dynamic"),
            Type::Union(u) => match self.graph.nullable_from_union(u) {
                Some(inner) => self.to_dynamic(inner, e, true),
                None => format!("{e}{nav}.to_dynamic"),
            },
        }
    }

    /// True when the typed value already is its own dynamic representation.
    pub fn marshals_implicitly_to_dynamic(&self, t: TypeRef) -> bool {
        match self.graph.get(t) {
            Type::Any | Type::Null | Type::Bool | Type::Integer | Type::Double | Type::String => true,
            Type::Enum(_) => true,
            Type::Array { items } => self.marshals_implicitly_to_dynamic(*items),
            Type::Map { values } => self.marshals_implicitly_to_dynamic(*values),
            Type::Class(_) => false,
            Type::Union(u) => match self.graph.nullable_from_union(u) {
                Some(inner) => self.marshals_implicitly_to_dynamic(inner),
                None => false,
            },
        }
    }
}

// ------------------------------- Tests ------------------------------------ //
