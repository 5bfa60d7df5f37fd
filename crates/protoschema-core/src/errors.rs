//! Error types for the schema core.

use crate::models::Location;

/// Render aggregated causes one per line.
fn lines(causes: &[String]) -> String {
    causes.join("\n")
}

/// Top-level error enum for the schema core.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("no sources")]
    NoSources,

    /// Missing imports, ambiguous imports and path/package mismatches.
    #[error("{}", lines(.0))]
    Resolution(Vec<String>),

    /// Unresolvable names, invisible imports and duplicate declarations.
    #[error("{}", lines(.0))]
    Link(Vec<String>),

    #[error("{message}")]
    ModuleCycle {
        message: String,
        cycles: Vec<Vec<String>>,
    },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("module `{module}` depends on undeclared module `{dependency}`")]
    UnknownModule { module: String, dependency: String },

    #[error("type `{0}` is not declared in the schema")]
    UnknownType(String),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("failed to parse {location}: {message}")]
    Parse { location: Location, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    /// Individual causes carried by an aggregated error, or the rendered
    /// message for any other variant.
    pub fn causes(&self) -> Vec<String> {
        match self {
            SchemaError::Resolution(causes) | SchemaError::Link(causes) => causes.clone(),
            other => vec![other.to_string()],
        }
    }
}

pub type SchemaResult<T> = Result<T, SchemaError>;
