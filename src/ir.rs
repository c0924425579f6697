// Structural type graph consumed by the Ruby backend. Built elsewhere, read-only here.
pub mod document;

use std::fmt;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::attributes::AttributeMap;
use crate::error::GenError;

static CONSTANT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9_]*$").unwrap());
static MEMBER_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_][A-Za-z0-9_]*$").unwrap());

/// Index of a node in its [`TypeGraph`]. Cycles go through these, never through ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(usize);

impl TypeRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An already-resolved Ruby identifier. Never invented or changed here, only rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(String);

impl Name {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub enum Type {
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    Array { items: TypeRef },
    Map { values: TypeRef },
    Enum(EnumType),
    Class(ClassType),
    Union(UnionType),
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: Name,
    /// JSON string value → Ruby constant name, in declaration order.
    pub cases: IndexMap<String, Name>,
}

#[derive(Debug, Clone)]
pub struct ClassType {
    pub name: Name,
    /// Keyed by JSON property name, in declaration order.
    pub properties: IndexMap<String, Property>,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub ty: TypeRef,
    pub is_optional: bool,
    /// Ruby attribute name bound to this property.
    pub member: Name,
}

#[derive(Debug, Clone)]
pub struct UnionType {
    pub name: Name,
    pub members: Vec<TypeRef>,
}

#[derive(Debug, Clone)]
pub struct TypeNode {
    pub ty: Type,
    pub attributes: AttributeMap,
}

impl Type {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Any => "any",
            Type::Null => "null",
            Type::Bool => "bool",
            Type::Integer => "integer",
            Type::Double => "double",
            Type::String => "string",
            Type::Array { .. } => "array",
            Type::Map { .. } => "map",
            Type::Enum(_) => "enum",
            Type::Class(_) => "class",
            Type::Union(_) => "union",
        }
    }

    /// Direct children, in a stable order.
    pub fn children(&self) -> Vec<TypeRef> {
        match self {
            Type::Any | Type::Null | Type::Bool | Type::Integer | Type::Double | Type::String => {
                Vec::new()
            }
            Type::Array { items } => vec![*items],
            Type::Map { values } => vec![*values],
            Type::Enum(_) => Vec::new(),
            Type::Class(c) => c.properties.values().map(|p| p.ty).collect(),
            Type::Union(u) => u.members.clone(),
        }
    }
}

// ------------------------------- Graph ------------------------------------ //

#[derive(Debug, Clone)]
pub struct TypeGraph {
    nodes: Vec<TypeNode>,
    top_levels: IndexMap<String, TypeRef>,
}

impl TypeGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, r: TypeRef) -> &Type {
        &self.nodes[r.0].ty
    }

    pub fn attributes(&self, r: TypeRef) -> &AttributeMap {
        &self.nodes[r.0].attributes
    }

    pub fn refs(&self) -> impl Iterator<Item = TypeRef> + '_ {
        (0..self.nodes.len()).map(TypeRef)
    }

    pub fn top_levels(&self) -> impl Iterator<Item = (&str, TypeRef)> {
        self.top_levels.iter().map(|(name, r)| (name.as_str(), *r))
    }

    pub fn top_level(&self, name: &str) -> Result<TypeRef, GenError> {
        self.top_levels
            .get(name)
            .copied()
            .ok_or_else(|| GenError::UnknownTopLevel { name: name.to_string() })
    }

    /// `Some(T)` iff the union is exactly `{T, null}`.
    pub fn nullable_from_union(&self, u: &UnionType) -> Option<TypeRef> {
        if u.members.len() != 2 {
            return None;
        }
        let (nulls, rest): (Vec<TypeRef>, Vec<TypeRef>) =
            u.members.iter().partition(|m| matches!(self.get(**m), Type::Null));
        match (nulls.len(), rest.as_slice()) {
            (1, [inner]) => Some(*inner),
            _ => None,
        }
    }

    /// Split off the null member, keeping the remaining members in declaration order.
    pub fn remove_null_from_union(&self, u: &UnionType) -> (Option<TypeRef>, Vec<TypeRef>) {
        let mut null = None;
        let mut rest = Vec::with_capacity(u.members.len());
        for m in &u.members {
            if matches!(self.get(*m), Type::Null) {
                null = Some(*m);
            } else {
                rest.push(*m);
            }
        }
        (null, rest)
    }

    /// Name of the declaration a reference to `r` resolves to, if it gets one.
    /// Nullable unions are erased and never declared.
    pub fn declared_name(&self, r: TypeRef) -> Option<&Name> {
        match self.get(r) {
            Type::Class(c) => Some(&c.name),
            Type::Enum(e) => Some(&e.name),
            Type::Union(u) if self.nullable_from_union(u).is_none() => Some(&u.name),
            _ => None,
        }
    }
}

// ------------------------------ Builder ----------------------------------- //

/// Assembles a [`TypeGraph`]. `reserve` + `define` allow cyclic graphs.
#[derive(Debug, Default)]
pub struct TypeGraphBuilder {
    nodes: Vec<Option<TypeNode>>,
    top_levels: IndexMap<String, TypeRef>,
}

impl TypeGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ty: Type) -> TypeRef {
        self.add_with_attributes(ty, AttributeMap::empty())
    }

    pub fn add_with_attributes(&mut self, ty: Type, attributes: AttributeMap) -> TypeRef {
        self.nodes.push(Some(TypeNode { ty, attributes }));
        TypeRef(self.nodes.len() - 1)
    }

    pub fn reserve(&mut self) -> TypeRef {
        self.nodes.push(None);
        TypeRef(self.nodes.len() - 1)
    }

    pub fn define(&mut self, r: TypeRef, ty: Type) {
        self.define_with_attributes(r, ty, AttributeMap::empty());
    }

    pub fn define_with_attributes(&mut self, r: TypeRef, ty: Type, attributes: AttributeMap) {
        self.nodes[r.0] = Some(TypeNode { ty, attributes });
    }

    /// Checked conversion of a raw index, for callers holding indices from elsewhere.
    pub fn type_ref(&self, index: usize) -> Result<TypeRef, GenError> {
        if index < self.nodes.len() {
            Ok(TypeRef(index))
        } else {
            Err(GenError::DanglingRef { index, len: self.nodes.len() })
        }
    }

    pub fn top_level(&mut self, name: impl Into<String>, r: TypeRef) {
        self.top_levels.insert(name.into(), r);
    }

    pub fn finish(self) -> Result<TypeGraph, GenError> {
        let len = self.nodes.len();
        let mut nodes = Vec::with_capacity(len);
        for (index, node) in self.nodes.into_iter().enumerate() {
            match node {
                Some(node) => nodes.push(node),
                None => {
                    return Err(GenError::Document(format!(
                        "type #{index} was reserved but never defined"
                    )));
                }
            }
        }
        let graph = TypeGraph { nodes, top_levels: self.top_levels };
        validate(&graph)?;
        Ok(graph)
    }
}

// ----------------------------- Validation --------------------------------- //

fn check_ref(graph: &TypeGraph, r: TypeRef) -> Result<(), GenError> {
    if r.0 < graph.nodes.len() {
        Ok(())
    } else {
        Err(GenError::DanglingRef { index: r.index(), len: graph.nodes.len() })
    }
}

fn check_name(name: &str, re: &Regex, what: &'static str) -> Result<(), GenError> {
    if re.is_match(name) {
        Ok(())
    } else {
        Err(GenError::IllegalName { name: name.to_string(), what })
    }
}

fn validate(graph: &TypeGraph) -> Result<(), GenError> {
    for r in graph.refs() {
        for child in graph.get(r).children() {
            check_ref(graph, child)?;
        }
    }
    for (_, r) in graph.top_levels() {
        check_ref(graph, r)?;
    }

    let mut declared = IndexMap::<&str, TypeRef>::new();
    for r in graph.refs() {
        match graph.get(r) {
            Type::Union(u) => validate_union(graph, u)?,
            Type::Class(c) => {
                let mut members = IndexMap::<&str, ()>::new();
                for p in c.properties.values() {
                    check_name(p.member.as_str(), &MEMBER_NAME, "attribute name")?;
                    if members.insert(p.member.as_str(), ()).is_some() {
                        return Err(GenError::DuplicateMember {
                            class: c.name.to_string(),
                            member: p.member.to_string(),
                        });
                    }
                }
            }
            Type::Enum(e) => {
                for case in e.cases.values() {
                    check_name(case.as_str(), &CONSTANT_NAME, "enum case constant")?;
                }
            }
            _ => {}
        }
        if let Some(name) = graph.declared_name(r) {
            check_name(name.as_str(), &CONSTANT_NAME, "class or module name")?;
            if declared.insert(name.as_str(), r).is_some() {
                return Err(GenError::DuplicateName { name: name.to_string() });
            }
        }
    }

    check_unnamed_cycles(graph)?;

    // top-levels not named by their own type get a wrapper class of that name
    for (name, r) in graph.top_levels() {
        check_name(name, &CONSTANT_NAME, "top-level class name")?;
        let named_by_type = graph.declared_name(r).is_some_and(|n| n.as_str() == name);
        if !named_by_type && declared.contains_key(name) {
            return Err(GenError::DuplicateName { name: name.to_string() });
        }
    }
    Ok(())
}

/// Arrays, maps and nullable unions are rendered inline, so a cycle made only of
/// them has no name to break it.
fn check_unnamed_cycles(graph: &TypeGraph) -> Result<(), GenError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark { New, Active, Done }

    fn inline(graph: &TypeGraph, r: TypeRef) -> bool {
        match graph.get(r) {
            Type::Array { .. } | Type::Map { .. } => true,
            Type::Union(u) => graph.nullable_from_union(u).is_some(),
            _ => false,
        }
    }

    fn visit(graph: &TypeGraph, r: TypeRef, marks: &mut [Mark]) -> Result<(), GenError> {
        match marks[r.0] {
            Mark::Done => return Ok(()),
            Mark::Active => return Err(GenError::UnnamedCycle { index: r.index() }),
            Mark::New => {}
        }
        marks[r.0] = Mark::Active;
        for child in graph.get(r).children() {
            if inline(graph, child) {
                visit(graph, child, marks)?;
            }
        }
        marks[r.0] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::New; graph.nodes.len()];
    for r in graph.refs() {
        if inline(graph, r) {
            visit(graph, r, &mut marks)?;
        }
    }
    Ok(())
}

fn validate_union(graph: &TypeGraph, u: &UnionType) -> Result<(), GenError> {
    if u.members.len() < 2 {
        return Err(GenError::DegenerateUnion { name: u.name.to_string(), count: u.members.len() });
    }
    let mut kinds = Vec::<&'static str>::new();
    for m in &u.members {
        let ty = graph.get(*m);
        if matches!(ty, Type::Union(_)) {
            return Err(GenError::NestedUnion { name: u.name.to_string() });
        }
        let kind = ty.kind_name();
        if kinds.contains(&kind) {
            return Err(GenError::DuplicateUnionKind { name: u.name.to_string(), kind });
        }
        kinds.push(kind);
    }
    Ok(())
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, props: &[(&str, TypeRef, bool)]) -> Type {
        Type::Class(ClassType {
            name: Name::new(name),
            properties: props
                .iter()
                .map(|(json, ty, opt)| {
                    (json.to_string(), Property { ty: *ty, is_optional: *opt, member: Name::new(*json) })
                })
                .collect(),
        })
    }

    fn union(name: &str, members: &[TypeRef]) -> Type {
        Type::Union(UnionType { name: Name::new(name), members: members.to_vec() })
    }

    #[test]
    fn nullable_unions_are_recognized_and_undeclared() {
        let mut b = TypeGraphBuilder::new();
        let s = b.add(Type::String);
        let n = b.add(Type::Null);
        let i = b.add(Type::Integer);
        let opt = b.add(union("OptString", &[n, s]));
        let three = b.add(union("Mixed", &[s, n, i]));
        let g = b.finish().unwrap();

        let Type::Union(u) = g.get(opt) else { panic!() };
        assert_eq!(g.nullable_from_union(u), Some(s));
        assert!(g.declared_name(opt).is_none());

        let Type::Union(u) = g.get(three) else { panic!() };
        assert_eq!(g.nullable_from_union(u), None);
        assert_eq!(g.remove_null_from_union(u), (Some(n), vec![s, i]));
        assert_eq!(g.declared_name(three).map(Name::as_str), Some("Mixed"));
    }

    #[test]
    fn cyclic_classes_build() {
        let mut b = TypeGraphBuilder::new();
        let x = b.reserve();
        b.define(x, class("X", &[("next", x, true)]));
        b.top_level("X", x);
        let g = b.finish().unwrap();
        assert_eq!(g.get(x).children(), vec![x]);
        assert_eq!(g.top_level("X").unwrap(), x);
        assert!(matches!(g.top_level("Y"), Err(GenError::UnknownTopLevel { .. })));
    }

    #[test]
    fn undefined_reservation_is_rejected() {
        let mut b = TypeGraphBuilder::new();
        b.reserve();
        assert!(matches!(b.finish(), Err(GenError::Document(_))));
    }

    #[test]
    fn union_invariants_are_enforced() {
        let mut b = TypeGraphBuilder::new();
        let i = b.add(Type::Integer);
        let j = b.add(Type::Integer);
        b.add(union("Twice", &[i, j]));
        assert!(matches!(b.finish(), Err(GenError::DuplicateUnionKind { kind: "integer", .. })));

        let mut b = TypeGraphBuilder::new();
        let i = b.add(Type::Integer);
        b.add(union("Lonely", &[i]));
        assert!(matches!(b.finish(), Err(GenError::DegenerateUnion { count: 1, .. })));
    }

    #[test]
    fn names_are_sanity_checked() {
        let mut b = TypeGraphBuilder::new();
        let i = b.add(Type::Integer);
        b.add(class("lowercase", &[("a", i, false)]));
        assert!(matches!(b.finish(), Err(GenError::IllegalName { .. })));

        let mut b = TypeGraphBuilder::new();
        let i = b.add(Type::Integer);
        b.add(class("Dup", &[("a", i, false)]));
        b.add(class("Dup", &[("b", i, false)]));
        assert!(matches!(b.finish(), Err(GenError::DuplicateName { .. })));

        let mut b = TypeGraphBuilder::new();
        let i = b.add(Type::Integer);
        b.add(class("Point", &[("Bad-Name", i, false)]));
        assert!(matches!(b.finish(), Err(GenError::IllegalName { what: "attribute name", .. })));
    }

    #[test]
    fn cycles_without_a_named_type_are_rejected() {
        let mut b = TypeGraphBuilder::new();
        let n = b.add(Type::Null);
        let list = b.reserve();
        let opt = b.add(union("OptList", &[list, n]));
        b.define(list, Type::Array { items: opt });
        assert!(matches!(b.finish(), Err(GenError::UnnamedCycle { .. })));
    }

    #[test]
    fn wrapper_top_level_must_not_shadow_a_declaration() {
        let mut b = TypeGraphBuilder::new();
        let i = b.add(Type::Integer);
        let point = b.add(class("Point", &[("x", i, false)]));
        let arr = b.add(Type::Array { items: point });
        b.top_level("Point", arr);
        assert!(matches!(b.finish(), Err(GenError::DuplicateName { .. })));
    }
}
