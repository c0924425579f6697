//! Error types shared by the graph builder, the renderer and the runtime model.
use thiserror::Error;

/// Generator-internal inconsistencies. Any of these aborts the whole run:
/// they mean the type graph handed to us is malformed, not that some sample is bad.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("type reference #{index} is out of range (graph has {len} types)")]
    DanglingRef { index: usize, len: usize },

    #[error("union `{name}` has {count} member(s); unions need at least two")]
    DegenerateUnion { name: String, count: usize },

    #[error("union `{name}` has two members of kind `{kind}`")]
    DuplicateUnionKind { name: String, kind: &'static str },

    #[error("union `{name}` directly contains another union")]
    NestedUnion { name: String },

    #[error("`{name}` is not a legal Ruby {what}")]
    IllegalName { name: String, what: &'static str },

    #[error("named type `{name}` is declared more than once")]
    DuplicateName { name: String },

    #[error("class `{class}` binds member name `{member}` twice")]
    DuplicateMember { class: String, member: String },

    #[error("type #{index} is part of a cycle that never passes through a class or declared union")]
    UnnamedCycle { index: usize },

    #[error("no top-level named `{name}`")]
    UnknownTopLevel { name: String },

    #[error("nullable union `{name}` is erased and cannot be declared")]
    ErasedUnion { name: String },

    #[error("invalid type graph document: {0}")]
    Document(String),
}

/// Validation failures of the generated code, as reproduced by [`crate::runtime`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("at {path}: expected {expected}, found {found}")]
    Mismatch {
        path: String,
        expected: String,
        found: &'static str,
    },

    #[error("at {path}: {value:?} is not a case of enum {name}")]
    UnknownEnumCase {
        path: String,
        name: String,
        value: String,
    },

    #[error("at {path}: Invalid union {name}")]
    InvalidUnion { path: String, name: String },
}

impl DecodeError {
    pub fn path(&self) -> &str {
        match self {
            DecodeError::Mismatch { path, .. }
            | DecodeError::UnknownEnumCase { path, .. }
            | DecodeError::InvalidUnion { path, .. } => path,
        }
    }
}
