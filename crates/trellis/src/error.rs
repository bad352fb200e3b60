//! Error types for template composition and rendering.
//!
//! This module provides [`RenderError`], the error type for all engine
//! operations. It abstracts over the content source and the template
//! evaluator, providing a stable public API.
//!
//! Most of these errors never reach the caller of
//! [`Engine::fetch`](crate::Engine::fetch): load and parse failures are
//! turned into literal diagnostic output at compile time, so a single broken
//! template degrades to an inline message instead of failing the request.

use std::fmt;

use trellis_source::SourceError;

/// Error type for composition and rendering operations.
#[derive(Debug)]
pub enum RenderError {
    /// A template, layout or fragment could not be read from the source.
    Load {
        /// Resolved path that failed to load.
        path: String,
        /// The underlying source error.
        source: SourceError,
    },

    /// The composed document, a fragment or a block failed to compile.
    Parse {
        /// Name of the part that failed (cache key, fragment path or block).
        name: String,
        /// Message from the evaluator.
        message: String,
    },

    /// Executing a compiled template failed.
    TemplateError(String),

    /// Render data could not be serialized.
    SerializationError(String),

    /// Writing rendered output failed.
    IoError(std::io::Error),

    /// Invalid engine configuration (bad syntax keywords, unreadable config).
    ConfigError(String),

    /// The content source refused a watch or lifecycle request.
    Source(SourceError),
}

impl RenderError {
    /// Creates a load error for `path`.
    pub fn load(path: impl Into<String>, source: SourceError) -> Self {
        RenderError::Load {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error for the part called `name`.
    pub fn parse(name: impl Into<String>, message: impl fmt::Display) -> Self {
        RenderError::Parse {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Load { path, source } => {
                write!(f, "failed to read template \"{}\": {}", path, source)
            }
            RenderError::Parse { name, message } => {
                write!(f, "failed to parse \"{}\": {}", name, message)
            }
            RenderError::TemplateError(msg) => write!(f, "template error: {}", msg),
            RenderError::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            RenderError::IoError(err) => write!(f, "I/O error: {}", err),
            RenderError::ConfigError(msg) => write!(f, "configuration error: {}", msg),
            RenderError::Source(err) => write!(f, "content source error: {}", err),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Load { source, .. } => Some(source),
            RenderError::IoError(err) => Some(err),
            RenderError::Source(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::IoError(err)
    }
}

impl From<SourceError> for RenderError {
    fn from(err: SourceError) -> Self {
        RenderError::Source(err)
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for RenderError {
    fn from(err: serde_yaml::Error) -> Self {
        RenderError::ConfigError(err.to_string())
    }
}

impl From<regex::Error> for RenderError {
    fn from(err: regex::Error) -> Self {
        RenderError::ConfigError(err.to_string())
    }
}

impl From<minijinja::Error> for RenderError {
    fn from(err: minijinja::Error) -> Self {
        use minijinja::ErrorKind;

        match err.kind() {
            ErrorKind::BadSerialization => RenderError::SerializationError(err.to_string()),
            ErrorKind::WriteFailure => RenderError::IoError(std::io::Error::other(err.to_string())),
            _ => RenderError::TemplateError(err.to_string()),
        }
    }
}
