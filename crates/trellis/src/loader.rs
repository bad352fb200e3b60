//! Raw content loading.
//!
//! The [`Loader`] maps logical template names to resolved paths and reads
//! them from the configured [`ContentSource`]. Every read runs through the
//! preprocessor chain (in registration order) and then `Strip` compaction.

use std::path::PathBuf;
use std::sync::Arc;

use trellis_source::ContentSource;

use crate::context::RenderContext;
use crate::error::RenderError;
use crate::scanner::TagScanner;
use crate::strip;

/// Maps `name + extension` to the path handed to the content source.
pub type PathFixer = Arc<dyn Fn(&dyn RenderContext, &str) -> String + Send + Sync>;

/// Rewrites raw template bytes before scanning.
pub type Preprocessor = Arc<dyn Fn(Vec<u8>) -> Vec<u8> + Send + Sync>;

/// Resolves and reads template content.
#[derive(Clone)]
pub struct Loader {
    source: Arc<dyn ContentSource>,
    scanner: TagScanner,
    template_dir: PathBuf,
    extension: String,
    debug: bool,
    path_fixer: Option<PathFixer>,
    preprocessors: Vec<Preprocessor>,
}

impl Loader {
    pub fn new(
        source: Arc<dyn ContentSource>,
        scanner: TagScanner,
        template_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            source,
            scanner,
            template_dir: template_dir.into(),
            extension: extension.into(),
            debug: false,
            path_fixer: None,
            preprocessors: Vec::new(),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_path_fixer(mut self, fixer: Option<PathFixer>) -> Self {
        self.path_fixer = fixer;
        self
    }

    pub fn with_preprocessors(mut self, preprocessors: Vec<Preprocessor>) -> Self {
        self.preprocessors = preprocessors;
        self
    }

    pub fn scanner(&self) -> &TagScanner {
        &self.scanner
    }

    pub fn source(&self) -> &Arc<dyn ContentSource> {
        &self.source
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn template_dir(&self) -> &std::path::Path {
        &self.template_dir
    }

    /// Resolves a logical name (without extension) to a content path.
    ///
    /// The path fixer, when set, receives `name + extension` and its result
    /// is used as-is; otherwise the name is joined onto the template dir.
    pub fn resolve(&self, ctx: &dyn RenderContext, name: &str) -> String {
        let file = format!("{}{}", name, self.extension);
        match &self.path_fixer {
            Some(fixer) => fixer(ctx, &file),
            None => self.template_dir.join(file).to_string_lossy().into_owned(),
        }
    }

    /// Reads `path` and applies preprocessors and Strip compaction.
    pub fn load(&self, path: &str) -> Result<String, RenderError> {
        let mut bytes = self
            .source
            .get_raw_bytes(path)
            .map_err(|err| RenderError::load(path, err))?;
        for preprocess in &self.preprocessors {
            bytes = preprocess(bytes);
        }
        let text = String::from_utf8_lossy(&bytes);
        Ok(strip::compact(&self.scanner, &text, self.debug))
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("template_dir", &self.template_dir)
            .field("extension", &self.extension)
            .field("debug", &self.debug)
            .field("path_fixer", &self.path_fixer.is_some())
            .field("preprocessors", &self.preprocessors.len())
            .finish()
    }
}
