use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use tandem_core::{FmiCalls, InterfaceKind, ModelDescription};

use super::descriptor::ComponentElement;

/// Failure reported by an extractor or loader.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

type Release = Box<dyn FnOnce() -> Result<(), CollaboratorError> + Send>;

/// Unpacks a system archive.
pub trait ArchiveExtractor {
    /// Makes the contents of `archive` available on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read or unpacked.
    fn extract(&mut self, archive: &str) -> Result<ExtractedArchive, CollaboratorError>;
}

/// Turns a component element into a description and call surface.
pub trait ComponentLoader {
    /// Loads `element` from the extracted archive rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the component cannot be found or loaded.
    fn load(&mut self, root: &Path, element: &ComponentElement)
    -> Result<LoadedComponent, CollaboratorError>;
}

/// Extracted archive contents, released once at teardown.
pub struct ExtractedArchive {
    root: PathBuf,
    release: Option<Release>,
}

impl ExtractedArchive {
    /// Contents that need no cleanup.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            release: None,
        }
    }

    /// Contents removed by `release`.
    #[must_use]
    pub fn with_release(
        root: impl Into<PathBuf>,
        release: impl FnOnce() -> Result<(), CollaboratorError> + Send + 'static,
    ) -> Self {
        Self {
            root: root.into(),
            release: Some(Box::new(release)),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs the cleanup. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns the cleanup's error.
    pub fn release(&mut self) -> Result<(), CollaboratorError> {
        match self.release.take() {
            Some(release) => release(),
            None => Ok(()),
        }
    }
}

impl Drop for ExtractedArchive {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(root = %self.root.display(), error = %err, "failed to release archive");
        }
    }
}

impl fmt::Debug for ExtractedArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractedArchive")
            .field("root", &self.root)
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// A component ready to instantiate.
pub struct LoadedComponent {
    pub description: Arc<ModelDescription>,
    pub calls: Box<dyn FmiCalls>,
    /// URI of the component's resources, passed at instantiation.
    pub resource_location: String,
    /// Interface to use. Defaults to the descriptor's preferred one.
    pub kind: Option<InterfaceKind>,
}

impl LoadedComponent {
    #[must_use]
    pub fn new(description: Arc<ModelDescription>, calls: Box<dyn FmiCalls>) -> Self {
        Self {
            description,
            calls,
            resource_location: String::new(),
            kind: None,
        }
    }
}

impl fmt::Debug for LoadedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedComponent")
            .field("model_name", &self.description.model_name)
            .field("resource_location", &self.resource_location)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
