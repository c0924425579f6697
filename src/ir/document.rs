//! Serialized form of a finished type graph, as handed over by the builder.
//!
//! Types live in a flat list and refer to each other by index, so cycles need no
//! special encoding:
//!
//! ```json
//! {
//!   "types": [
//!     {"kind": "class", "name": "Node", "properties": {"next": {"type": 0, "optional": true}}}
//!   ],
//!   "top_levels": {"Node": 0}
//! }
//! ```
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::{ClassType, EnumType, Name, Property, Type, TypeGraph, TypeGraphBuilder, TypeRef, UnionType};
use crate::attributes::{AttributeMap, DESCRIPTION, PROPERTY_DESCRIPTIONS};
use crate::error::GenError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    pub types: Vec<NodeDoc>,
    #[serde(default)]
    pub top_levels: IndexMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoc {
    #[serde(flatten)]
    pub shape: ShapeDoc,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub description: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeDoc {
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    Array { items: usize },
    Map { values: usize },
    Enum { name: String, cases: IndexMap<String, String> },
    Class { name: String, properties: IndexMap<String, PropertyDoc> },
    Union { name: String, members: Vec<usize> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDoc {
    #[serde(rename = "type")]
    pub ty: usize,
    #[serde(default)]
    pub optional: bool,
    /// Ruby attribute name; the JSON key when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub description: Vec<String>,
}

impl From<ShapeDoc> for NodeDoc {
    fn from(shape: ShapeDoc) -> Self {
        Self { shape, description: Vec::new() }
    }
}

impl GraphDocument {
    pub fn into_graph(self) -> Result<TypeGraph, GenError> {
        let mut builder = TypeGraphBuilder::new();
        let refs: Vec<TypeRef> = self.types.iter().map(|_| builder.reserve()).collect();

        for (r, node) in refs.iter().zip(self.types) {
            let mut attributes = AttributeMap::empty();
            if !node.description.is_empty() {
                attributes = DESCRIPTION.set_in_attributes(&attributes, node.description.into_iter().collect());
            }
            let ty = match node.shape {
                ShapeDoc::Any => Type::Any,
                ShapeDoc::Null => Type::Null,
                ShapeDoc::Bool => Type::Bool,
                ShapeDoc::Integer => Type::Integer,
                ShapeDoc::Double => Type::Double,
                ShapeDoc::String => Type::String,
                ShapeDoc::Array { items } => Type::Array { items: builder.type_ref(items)? },
                ShapeDoc::Map { values } => Type::Map { values: builder.type_ref(values)? },
                ShapeDoc::Enum { name, cases } => Type::Enum(EnumType {
                    name: Name::new(name),
                    cases: cases.into_iter().map(|(json, constant)| (json, Name::new(constant))).collect(),
                }),
                ShapeDoc::Class { name, properties } => {
                    let mut descriptions = IndexMap::<String, IndexSet<String>>::new();
                    let mut props = IndexMap::with_capacity(properties.len());
                    for (json, p) in properties {
                        if !p.description.is_empty() {
                            descriptions.insert(json.clone(), p.description.into_iter().collect());
                        }
                        let member = Name::new(p.name.unwrap_or_else(|| json.clone()));
                        props.insert(json, Property { ty: builder.type_ref(p.ty)?, is_optional: p.optional, member });
                    }
                    if !descriptions.is_empty() {
                        attributes = PROPERTY_DESCRIPTIONS.set_in_attributes(&attributes, descriptions);
                    }
                    Type::Class(ClassType { name: Name::new(name), properties: props })
                }
                ShapeDoc::Union { name, members } => Type::Union(UnionType {
                    name: Name::new(name),
                    members: members
                        .into_iter()
                        .map(|m| builder.type_ref(m))
                        .collect::<Result<_, _>>()?,
                }),
            };
            builder.define_with_attributes(*r, ty, attributes);
        }

        for (name, index) in self.top_levels {
            let r = builder.type_ref(index)?;
            builder.top_level(name, r);
        }
        builder.finish()
    }
}
