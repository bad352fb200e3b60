//! Engine configuration.
//!
//! [`EngineConfig`] holds everything about an engine that can be written
//! down in a file: where templates live, their extension, the directive
//! syntax and the cache invalidation policy. Closures (path fixers, content
//! preprocessors, function providers) are attached through
//! [`EngineBuilder`](crate::EngineBuilder) instead.
//!
//! Every field has a default, so a config file only needs to mention what it
//! changes:
//!
//! ```rust
//! use trellis::{EngineConfig, InvalidationPolicy};
//!
//! let config = EngineConfig::from_yaml(r#"
//! template_dir: ./views
//! invalidation: targeted
//! syntax:
//!   delim_left: "<%"
//!   delim_right: "%>"
//! "#).unwrap();
//!
//! assert_eq!(config.extension, ".html");
//! assert_eq!(config.syntax.block_tag, "Block");
//! assert_eq!(config.syntax.delim_left, "<%");
//! assert_eq!(config.invalidation, InvalidationPolicy::Targeted);
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Default template file extension.
pub const DEFAULT_EXTENSION: &str = ".html";

/// Delimiters and keywords of the composition directives.
///
/// With the defaults, directives look like `{{Extend "layout"}}`,
/// `{{Block "title"}}...{{/Block}}`, `{{Block "title"/}}`, `{{Super/}}`,
/// `{{Include "partials/nav"}}`, `{{Function "menu" "main"}}` and
/// `{{Strip}}...{{/Strip}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Syntax {
    pub delim_left: String,
    pub delim_right: String,
    pub include_tag: String,
    pub function_tag: String,
    pub extend_tag: String,
    pub block_tag: String,
    /// An empty super keyword disables super handling.
    pub super_tag: String,
    pub strip_tag: String,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            delim_left: "{{".into(),
            delim_right: "}}".into(),
            include_tag: "Include".into(),
            function_tag: "Function".into(),
            extend_tag: "Extend".into(),
            block_tag: "Block".into(),
            super_tag: "Super".into(),
            strip_tag: "Strip".into(),
        }
    }
}

impl Syntax {
    /// Checks that the syntax can be turned into a scanner.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.delim_left.is_empty() || self.delim_right.is_empty() {
            return Err(RenderError::ConfigError(
                "directive delimiters must not be empty".into(),
            ));
        }
        let required = [
            ("include_tag", &self.include_tag),
            ("function_tag", &self.function_tag),
            ("extend_tag", &self.extend_tag),
            ("block_tag", &self.block_tag),
            ("strip_tag", &self.strip_tag),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(RenderError::ConfigError(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

/// What a change event does to the compiled-tree cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationPolicy {
    /// Any change to a cached file clears the whole cache.
    #[default]
    Wholesale,
    /// A change removes the file's entry and every entry that depends on it.
    Targeted,
}

/// Serializable engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory joined in front of every template name.
    pub template_dir: PathBuf,
    /// Suffix appended to logical template names.
    pub extension: String,
    /// Directive syntax.
    pub syntax: Syntax,
    /// Debug mode: log compile timings and skip `Strip` compaction.
    pub debug: bool,
    /// Cache invalidation policy.
    pub invalidation: InvalidationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::new(),
            extension: DEFAULT_EXTENSION.into(),
            syntax: Syntax::default(),
            debug: false,
            invalidation: InvalidationPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a default configuration rooted at `template_dir`.
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
            ..Self::default()
        }
    }

    /// Parses a configuration from YAML; missing fields take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, RenderError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.syntax.validate()?;
        Ok(config)
    }

    /// Reads and parses a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self, RenderError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }
}
