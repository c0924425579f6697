use serde::de::DeserializeOwned;

use crate::error::GenError;
use crate::ir::TypeGraph;
use crate::ir::document::GraphDocument;

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, GenError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    match serde_path_to_error::deserialize::<_, T>(de) {
        Ok(v) => Ok(v),
        Err(err) => {
            let path = err.path().to_string();
            Err(GenError::Document(format!("at JSON path {path} → {}", err.into_inner())))
        }
    }
}

/// Parse a type graph document and build (and validate) the graph it describes.
pub fn graph_from_str(src: &str) -> Result<TypeGraph, GenError> {
    let doc: GraphDocument = from_str_with_path(src)?;
    tracing::debug!(types = doc.types.len(), top_levels = doc.top_levels.len(), "loaded type graph document");
    doc.into_graph()
}
