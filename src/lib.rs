pub mod attributes;
pub mod cli;
pub mod codegen;
pub mod declarations;
pub mod error;
pub mod ir;
pub mod lower;
pub mod path_de;
pub mod runtime;

pub use codegen::{RubyOptions, render_ruby};
pub use error::{DecodeError, GenError};
pub use ir::{Type, TypeGraph, TypeGraphBuilder, TypeRef};
