//! Type attributes: extensible, mergeable metadata hung off type graph nodes.
//!
//! An [`AttributeKind<T>`] names one kind of fact (a description, per-property
//! descriptions, ...) and knows how to merge two values of it when the types
//! carrying them are unified, and how to demote a value when its type becomes
//! inferred rather than declared. An [`AttributeMap`] holds at most one value per
//! kind. Kinds are identified by name only, so two kinds built independently
//! under the same name address the same entry.
//!
//! Maps are never mutated in place; every operation returns a new map.
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;

// ------------------------------- Kinds ------------------------------------ //

/// Anything that can be stored as an attribute value.
pub trait AttributeValue: Any + Clone + PartialEq + fmt::Debug + Send + Sync {}

impl<T> AttributeValue for T where T: Any + Clone + PartialEq + fmt::Debug + Send + Sync {}

pub struct AttributeKind<T> {
    name: Cow<'static, str>,
    combine: Option<fn(&T, &T) -> T>,
    make_inferred: Option<fn(&T) -> T>,
}

impl<T: AttributeValue> AttributeKind<T> {
    /// A kind without `combine` or `make_inferred` is structural: asking it to
    /// merge or demote a value panics.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        combine: Option<fn(&T, &T) -> T>,
        make_inferred: Option<fn(&T) -> T>,
    ) -> Self {
        Self { name: name.into(), combine, make_inferred }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn combine(&self, a: &T, b: &T) -> T {
        match self.combine {
            Some(f) => f(a, b),
            None => panic!("Cannot combine type attribute {}", self.name),
        }
    }

    pub fn make_inferred(&self, a: &T) -> T {
        match self.make_inferred {
            Some(f) => f(a),
            None => panic!("Cannot make type attribute {} inferred", self.name),
        }
    }

    pub fn make_attributes(&self, value: T) -> AttributeMap {
        self.set_in_attributes(&AttributeMap::empty(), value)
    }

    pub fn try_get_in_attributes<'a>(&self, attributes: &'a AttributeMap) -> Option<&'a T> {
        let slot = attributes.slots.get(self.name())?;
        Some(downcast::<T>(self.name(), slot.value.as_ref()))
    }

    pub fn set_in_attributes(&self, attributes: &AttributeMap, value: T) -> AttributeMap {
        let mut out = attributes.clone();
        out.slots.insert(
            self.name.to_string(),
            Slot { kind: Arc::new(self.clone()), value: Arc::new(value) },
        );
        out
    }

    /// Functional update: `modify` sees the current value (if any); returning
    /// `None` removes the kind from the map.
    pub fn modify_in_attributes(
        &self,
        attributes: &AttributeMap,
        modify: impl FnOnce(Option<&T>) -> Option<T>,
    ) -> AttributeMap {
        match modify(self.try_get_in_attributes(attributes)) {
            Some(value) => self.set_in_attributes(attributes, value),
            None => {
                let mut out = attributes.clone();
                out.slots.shift_remove(self.name());
                out
            }
        }
    }

    pub fn set_default_in_attributes(
        &self,
        attributes: &AttributeMap,
        make_default: impl FnOnce() -> T,
    ) -> AttributeMap {
        if self.try_get_in_attributes(attributes).is_some() {
            return attributes.clone();
        }
        self.set_in_attributes(attributes, make_default())
    }
}

impl<T> Clone for AttributeKind<T> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), combine: self.combine, make_inferred: self.make_inferred }
    }
}

impl<T> PartialEq for AttributeKind<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for AttributeKind<T> {}

impl<T> Hash for AttributeKind<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl<T> fmt::Debug for AttributeKind<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKind").field(&self.name).finish()
    }
}

// ---------------------------- Type erasure --------------------------------- //

type Erased = Arc<dyn Any + Send + Sync>;

/// The per-kind operations a map needs without knowing the value type.
trait ErasedKind: Send + Sync {
    fn combine_values(&self, a: &dyn Any, b: &dyn Any) -> Erased;
    fn infer_value(&self, a: &dyn Any) -> Erased;
    fn values_eq(&self, a: &dyn Any, b: &dyn Any) -> bool;
    fn fmt_value(&self, a: &dyn Any, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T: AttributeValue> ErasedKind for AttributeKind<T> {
    fn combine_values(&self, a: &dyn Any, b: &dyn Any) -> Erased {
        let a = downcast::<T>(self.name(), a);
        let b = downcast::<T>(self.name(), b);
        Arc::new(self.combine(a, b))
    }

    fn infer_value(&self, a: &dyn Any) -> Erased {
        Arc::new(self.make_inferred(downcast::<T>(self.name(), a)))
    }

    fn values_eq(&self, a: &dyn Any, b: &dyn Any) -> bool {
        match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn fmt_value(&self, a: &dyn Any, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(downcast::<T>(self.name(), a), f)
    }
}

/// A value is always stored next to the kind that put it there, so a failed
/// downcast means two kinds with different value types share a name.
fn downcast<'a, T: Any>(name: &str, value: &'a dyn Any) -> &'a T {
    match value.downcast_ref::<T>() {
        Some(x) => x,
        None => panic!(
            "type attribute {name} is registered with a value type other than {}",
            std::any::type_name::<T>()
        ),
    }
}

#[derive(Clone)]
struct Slot {
    kind: Arc<dyn ErasedKind>,
    value: Erased,
}

// ------------------------------- Maps -------------------------------------- //

#[derive(Clone, Default)]
pub struct AttributeMap {
    slots: IndexMap<String, Slot>,
}

impl AttributeMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get<T: AttributeValue>(&self, kind: &AttributeKind<T>) -> Option<&T> {
        kind.try_get_in_attributes(self)
    }
}

impl PartialEq for AttributeMap {
    fn eq(&self, other: &Self) -> bool {
        self.slots.len() == other.slots.len()
            && self.slots.iter().all(|(name, a)| match other.slots.get(name) {
                Some(b) => a.kind.values_eq(a.value.as_ref(), b.value.as_ref()),
                None => false,
            })
    }
}

impl fmt::Debug for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Value<'a>(&'a Slot);
        impl fmt::Debug for Value<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.kind.fmt_value(self.0.value.as_ref(), f)
            }
        }
        f.debug_map()
            .entries(self.slots.iter().map(|(name, slot)| (name, Value(slot))))
            .finish()
    }
}

/// Merge the attributes of types that are being unified into one type.
///
/// Kinds present in a single map pass through unchanged; kinds present in
/// several are folded left to right with that kind's `combine`.
pub fn combine_attributes(attributes: &[AttributeMap]) -> AttributeMap {
    let Some((first, rest)) = attributes.split_first() else {
        return AttributeMap::empty();
    };
    let mut out = first.clone();
    for map in rest {
        for (name, slot) in &map.slots {
            let merged = match out.slots.get(name) {
                None => slot.clone(),
                Some(existing) => Slot {
                    kind: existing.kind.clone(),
                    value: existing.kind.combine_values(existing.value.as_ref(), slot.value.as_ref()),
                },
            };
            out.slots.insert(name.clone(), merged);
        }
    }
    out
}

/// Demote every attribute to the value it carries on an inferred type.
pub fn make_attributes_inferred(attributes: &AttributeMap) -> AttributeMap {
    let slots = attributes
        .slots
        .iter()
        .map(|(name, slot)| {
            let value = slot.kind.infer_value(slot.value.as_ref());
            (name.clone(), Slot { kind: slot.kind.clone(), value })
        })
        .collect();
    AttributeMap { slots }
}

// --------------------------- Built-in kinds -------------------------------- //

pub type Descriptions = IndexSet<String>;
pub type PropertyDescriptions = IndexMap<String, Descriptions>;

fn set_union(a: &Descriptions, b: &Descriptions) -> Descriptions {
    a.union(b).cloned().collect()
}

fn property_descriptions_union(a: &PropertyDescriptions, b: &PropertyDescriptions) -> PropertyDescriptions {
    let mut out = a.clone();
    for (property, descriptions) in b {
        let merged = match out.get(property) {
            Some(existing) => set_union(existing, descriptions),
            None => descriptions.clone(),
        };
        out.insert(property.clone(), merged);
    }
    out
}

/// Free-text descriptions of a type. Descriptions survive unification and inference.
pub static DESCRIPTION: Lazy<AttributeKind<Descriptions>> =
    Lazy::new(|| AttributeKind::new("description", Some(set_union), Some(Descriptions::clone)));

/// Descriptions of a class's properties, keyed by JSON property name.
pub static PROPERTY_DESCRIPTIONS: Lazy<AttributeKind<PropertyDescriptions>> = Lazy::new(|| {
    AttributeKind::new(
        "propertyDescriptions",
        Some(property_descriptions_union),
        Some(PropertyDescriptions::clone),
    )
});

// ------------------------------- Tests ------------------------------------- //

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptions(xs: &[&str]) -> Descriptions {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn combining_a_single_map_is_identity() {
        let a = DESCRIPTION.make_attributes(descriptions(&["a"]));
        let a = PROPERTY_DESCRIPTIONS.set_in_attributes(
            &a,
            IndexMap::from([("x".to_string(), descriptions(&["the x"]))]),
        );
        assert_eq!(combine_attributes(std::slice::from_ref(&a)), a);
        assert!(combine_attributes(&[]).is_empty());
    }

    #[test]
    fn descriptions_union_regardless_of_order() {
        let a = DESCRIPTION.make_attributes(descriptions(&["a"]));
        let b = DESCRIPTION.make_attributes(descriptions(&["b"]));
        let expected = DESCRIPTION.make_attributes(descriptions(&["a", "b"]));
        assert_eq!(combine_attributes(&[a.clone(), b.clone()]), expected);
        assert_eq!(combine_attributes(&[b, a]), expected);
    }

    #[test]
    fn keys_on_one_side_pass_through() {
        let a = DESCRIPTION.make_attributes(descriptions(&["a"]));
        let b = PROPERTY_DESCRIPTIONS.make_attributes(IndexMap::from([(
            "p".to_string(),
            descriptions(&["prop"]),
        )]));
        let c = combine_attributes(&[a, b]);
        assert_eq!(c.len(), 2);
        assert_eq!(DESCRIPTION.try_get_in_attributes(&c), Some(&descriptions(&["a"])));
        assert_eq!(
            PROPERTY_DESCRIPTIONS.try_get_in_attributes(&c).and_then(|m| m.get("p")),
            Some(&descriptions(&["prop"]))
        );
    }

    #[test]
    fn property_descriptions_merge_per_key() {
        let a = PROPERTY_DESCRIPTIONS.make_attributes(IndexMap::from([
            ("x".to_string(), descriptions(&["one"])),
            ("y".to_string(), descriptions(&["why"])),
        ]));
        let b = PROPERTY_DESCRIPTIONS.make_attributes(IndexMap::from([(
            "x".to_string(),
            descriptions(&["two"]),
        )]));
        let c = combine_attributes(&[a, b]);
        let merged = c.get(&*PROPERTY_DESCRIPTIONS).unwrap();
        assert_eq!(merged["x"], descriptions(&["one", "two"]));
        assert_eq!(merged["y"], descriptions(&["why"]));
    }

    #[test]
    fn make_inferred_is_idempotent_for_descriptions() {
        let a = DESCRIPTION.make_attributes(descriptions(&["a", "b"]));
        let once = make_attributes_inferred(&a);
        let twice = make_attributes_inferred(&once);
        assert_eq!(once, a);
        assert_eq!(twice, once);
    }

    #[test]
    fn kinds_are_identified_by_name() {
        let twin: AttributeKind<Descriptions> = AttributeKind::new("description", None, None);
        assert_eq!(twin, *DESCRIPTION);
        let a = DESCRIPTION.make_attributes(descriptions(&["a"]));
        assert_eq!(twin.try_get_in_attributes(&a), Some(&descriptions(&["a"])));
        let b = twin.set_in_attributes(&a, descriptions(&["b"]));
        assert_eq!(b.len(), 1);
        assert_eq!(b.get(&*DESCRIPTION), Some(&descriptions(&["b"])));
    }

    #[test]
    fn modify_removes_on_none_and_set_default_is_lazy() {
        let a = DESCRIPTION.make_attributes(descriptions(&["a"]));
        let removed = DESCRIPTION.modify_in_attributes(&a, |_| None);
        assert!(removed.is_empty());
        // original is untouched
        assert_eq!(a.len(), 1);

        let added = DESCRIPTION.modify_in_attributes(&removed, |current| {
            assert!(current.is_none());
            Some(descriptions(&["fresh"]))
        });
        assert_eq!(added.get(&*DESCRIPTION), Some(&descriptions(&["fresh"])));

        let kept = DESCRIPTION.set_default_in_attributes(&a, || panic!("default must not be built"));
        assert_eq!(kept, a);
        let defaulted = DESCRIPTION.set_default_in_attributes(&removed, || descriptions(&["d"]));
        assert_eq!(defaulted.get(&*DESCRIPTION), Some(&descriptions(&["d"])));
    }

    #[test]
    #[should_panic(expected = "Cannot combine type attribute structural")]
    fn combining_a_structural_kind_panics() {
        let kind: AttributeKind<u32> = AttributeKind::new("structural", None, None);
        let a = kind.make_attributes(1);
        let b = kind.make_attributes(2);
        combine_attributes(&[a, b]);
    }

    #[test]
    #[should_panic(expected = "Cannot make type attribute structural inferred")]
    fn inferring_a_structural_kind_panics() {
        let kind: AttributeKind<u32> = AttributeKind::new("structural", None, None);
        make_attributes_inferred(&kind.make_attributes(1));
    }

    #[test]
    fn structural_kind_passes_through_when_only_one_side_has_it() {
        let kind: AttributeKind<u32> = AttributeKind::new("structural", None, None);
        let a = kind.make_attributes(7);
        let b = DESCRIPTION.make_attributes(descriptions(&["b"]));
        let c = combine_attributes(&[a, b]);
        assert_eq!(c.get(&kind), Some(&7));
    }

    #[test]
    #[should_panic(expected = "registered with a value type other than")]
    fn reading_through_a_mistyped_kind_panics() {
        let a = DESCRIPTION.make_attributes(descriptions(&["a"]));
        let wrong: AttributeKind<u32> = AttributeKind::new("description", None, None);
        wrong.try_get_in_attributes(&a);
    }
}
