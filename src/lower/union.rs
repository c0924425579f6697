//! Decoding and encoding of declared (non-nullable) unions.
//!
//! A declared union becomes a struct with one optional slot per non-null member.
//! Decoding tries every member against the same input, each attempt turning a
//! failure into nil; the result is invalid when every slot stayed nil, unless
//! null is a member and the input is nil. Encoding emits the first non-nil slot
//! in declaration order.
use super::Lowerer;
use crate::error::GenError;
use crate::ir::{Type, TypeRef, UnionType};

/// Slot names are per variant kind, which the union invariant keeps unique.
pub fn slot_name(ty: &Type) -> &'static str {
    match ty {
        Type::Any => "anything",
        Type::Null => "null",
        Type::Bool => "bool",
        Type::Integer => "integer",
        Type::Double => "double",
        Type::String => "string",
        Type::Array { .. } => "array",
        Type::Map { .. } => "map",
        Type::Enum(_) => "enum",
        Type::Class(_) => "klass",
        Type::Union(_) => "union",
    }
}

#[derive(Debug, Clone)]
pub struct UnionSlot {
    pub ty: TypeRef,
    pub name: &'static str,
    /// `attribute :<name>, <schema>`
    pub schema: String,
    /// Decode attempt against `d` that yields nil instead of raising.
    pub attempt: String,
    /// Encode expression for the slot's instance variable.
    pub encode: String,
}

#[derive(Debug, Clone)]
pub struct UnionPlan {
    pub admits_null: bool,
    /// Non-null members in declaration order.
    pub slots: Vec<UnionSlot>,
}

impl Lowerer<'_> {
    pub fn union_plan(&self, u: &UnionType) -> Result<UnionPlan, GenError> {
        if self.graph().nullable_from_union(u).is_some() {
            return Err(GenError::ErasedUnion { name: u.name.to_string() });
        }
        let (null, members) = self.graph().remove_null_from_union(u);
        let slots = members
            .into_iter()
            .map(|ty| {
                let name = slot_name(self.graph().get(ty));
                UnionSlot {
                    ty,
                    name,
                    schema: self.dry_type(ty, true),
                    attempt: format!("({} rescue nil)", self.from_dynamic(ty, "d", false, true)),
                    encode: self.to_dynamic(ty, &format!("@{name}"), false),
                }
            })
            .collect();
        Ok(UnionPlan { admits_null: null.is_some(), slots })
    }
}

impl UnionPlan {
    /// The guard raised after the attempts, given the instance and the raw input.
    pub fn invalid_union_guard(&self, instance: &str, input: &str) -> String {
        let all_nil = format!("{instance}.attributes.values.all?(&:nil?)");
        if self.admits_null {
            format!("raise \"Invalid union\" if {all_nil} && !{input}.nil?")
        } else {
            format!("raise \"Invalid union\" if {all_nil}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ClassType, Name, Property, TypeGraph, TypeGraphBuilder};
    use indexmap::IndexMap;

    fn graph() -> (TypeGraph, TypeRef, TypeRef, TypeRef) {
        let mut b = TypeGraphBuilder::new();
        let int = b.add(Type::Integer);
        let string = b.add(Type::String);
        let null = b.add(Type::Null);
        let point = b.add(Type::Class(ClassType {
            name: Name::new("Point"),
            properties: IndexMap::from([(
                "x".to_string(),
                Property { ty: int, is_optional: false, member: Name::new("x") },
            )]),
        }));
        let plain = b.add(Type::Union(UnionType {
            name: Name::new("IntOrString"),
            members: vec![int, string],
        }));
        let with_null = b.add(Type::Union(UnionType {
            name: Name::new("Loose"),
            members: vec![point, null, string],
        }));
        let erased = b.add(Type::Union(UnionType {
            name: Name::new("MaybeInt"),
            members: vec![int, null],
        }));
        (b.finish().unwrap(), plain, with_null, erased)
    }

    fn union_of(g: &TypeGraph, r: TypeRef) -> &UnionType {
        match g.get(r) {
            Type::Union(u) => u,
            other => panic!("not a union: {other:?}"),
        }
    }

    #[test]
    fn attempts_cast_every_member() {
        let (g, plain, _, _) = graph();
        let plan = Lowerer::new(&g).union_plan(union_of(&g, plain)).unwrap();
        assert!(!plan.admits_null);
        let names: Vec<_> = plan.slots.iter().map(|s| s.name).collect();
        assert_eq!(names, ["integer", "string"]);
        assert_eq!(plan.slots[0].attempt, "(Types::Strict::Integer[d] rescue nil)");
        assert_eq!(plan.slots[1].schema, "Types::Strict::String.optional");
        assert_eq!(plan.slots[1].encode, "@string");
        assert_eq!(
            plan.invalid_union_guard("union", "d"),
            "raise \"Invalid union\" if union.attributes.values.all?(&:nil?)"
        );
    }

    #[test]
    fn null_member_has_no_slot_but_relaxes_the_guard() {
        let (g, _, with_null, _) = graph();
        let plan = Lowerer::new(&g).union_plan(union_of(&g, with_null)).unwrap();
        assert!(plan.admits_null);
        let names: Vec<_> = plan.slots.iter().map(|s| s.name).collect();
        assert_eq!(names, ["klass", "string"]);
        assert_eq!(plan.slots[0].attempt, "(Point.from_dynamic!(d) rescue nil)");
        assert_eq!(plan.slots[0].encode, "@klass.to_dynamic");
        assert!(plan.invalid_union_guard("union", "d").ends_with("&& !d.nil?"));
    }

    #[test]
    fn nullable_unions_are_never_declared() {
        let (g, _, _, erased) = graph();
        assert!(Lowerer::new(&g).union_plan(union_of(&g, erased)).is_err());
    }
}
