//! Declaration order for the generated module.
//!
//! Enums come first (they live in `module Types` and reference nothing).
//! Classes and declared unions follow in depth-first post-order over the named
//! types they reference, starting from the top-levels. Order alone cannot
//! resolve cycles, so any class or union referenced by a declaration emitted at
//! or before its own full declaration gets a forward stub ahead of everything.
use indexmap::IndexSet;

use crate::ir::{Type, TypeGraph, TypeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declaration {
    Forward(TypeRef),
    Define(TypeRef),
}

#[derive(Debug, Clone, Default)]
pub struct DeclarationPlan {
    pub enums: Vec<TypeRef>,
    pub forward: Vec<TypeRef>,
    pub ordered: Vec<TypeRef>,
}

impl DeclarationPlan {
    /// Forward stubs, then full declarations, in emission order.
    pub fn declarations(&self) -> impl Iterator<Item = Declaration> + '_ {
        self.forward
            .iter()
            .map(|r| Declaration::Forward(*r))
            .chain(self.ordered.iter().map(|r| Declaration::Define(*r)))
    }
}

/// Classes and declared unions get a Ruby class of their own; everything else
/// (arrays, maps, nullable unions, primitives) is rendered inline.
fn is_struct(graph: &TypeGraph, r: TypeRef) -> bool {
    match graph.get(r) {
        Type::Class(_) => true,
        Type::Union(u) => graph.nullable_from_union(u).is_none(),
        _ => false,
    }
}

/// Struct types referenced from `r`'s body, looking through inline types.
pub fn named_dependencies(graph: &TypeGraph, r: TypeRef) -> Vec<TypeRef> {
    fn walk(graph: &TypeGraph, r: TypeRef, seen: &mut IndexSet<TypeRef>, out: &mut IndexSet<TypeRef>) {
        for child in graph.get(r).children() {
            if is_struct(graph, child) {
                out.insert(child);
            } else if seen.insert(child) {
                walk(graph, child, seen, out);
            }
        }
    }
    let mut seen = IndexSet::new();
    let mut out = IndexSet::new();
    walk(graph, r, &mut seen, &mut out);
    out.into_iter().collect()
}

pub fn plan_declarations(graph: &TypeGraph) -> DeclarationPlan {
    fn visit(graph: &TypeGraph, r: TypeRef, seen: &mut IndexSet<TypeRef>, ordered: &mut Vec<TypeRef>) {
        if !seen.insert(r) {
            return;
        }
        for dep in named_dependencies(graph, r) {
            visit(graph, dep, seen, ordered);
        }
        ordered.push(r);
    }

    let mut seen = IndexSet::new();
    let mut ordered = Vec::new();

    let roots = graph
        .top_levels()
        .flat_map(|(_, r)| if is_struct(graph, r) { vec![r] } else { named_dependencies(graph, r) })
        .chain(graph.refs().filter(|r| is_struct(graph, *r)))
        .collect::<Vec<_>>();
    for r in roots {
        visit(graph, r, &mut seen, &mut ordered);
    }

    let position = ordered
        .iter()
        .enumerate()
        .map(|(i, r)| (*r, i))
        .collect::<std::collections::HashMap<_, _>>();
    let mut forward = IndexSet::new();
    for (i, r) in ordered.iter().enumerate() {
        for dep in named_dependencies(graph, *r) {
            if position[&dep] >= i {
                forward.insert(dep);
            }
        }
    }

    let enums = graph.refs().filter(|r| matches!(graph.get(*r), Type::Enum(_))).collect();

    tracing::debug!(
        enums = ?enums,
        forward = forward.len(),
        declarations = ordered.len(),
        "planned declarations"
    );
    DeclarationPlan { enums, forward: forward.into_iter().collect(), ordered }
}
