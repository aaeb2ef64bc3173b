//! Component descriptors.
//!
//! Each application component (api, queue, ui, ...) is described by exactly
//! one build file and one target image reference. Descriptors are fixed for
//! the duration of a run and share no mutable state.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Tag under which remote build-cache layers are stored, per image.
pub const CACHE_TAG: &str = "buildcache";

/// Tag under which the built image is published.
pub const PUBLISH_TAG: &str = "latest";

/// Describes one buildable component of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Human-readable component name (e.g., "api").
    pub name: String,
    /// Path to the build file (Dockerfile), relative to the repository root.
    pub build_file: String,
    /// Target image reference without a tag (e.g., "rg.example.com/app/api").
    pub image: String,
}

impl ComponentDescriptor {
    pub fn new(
        name: impl Into<String>,
        build_file: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            build_file: build_file.into(),
            image: image.into(),
        }
    }

    /// Validate the one-build-file-one-image invariant.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidInput("component name is empty".to_string()));
        }
        if self.build_file.is_empty() {
            return Err(Error::InvalidInput(format!(
                "component '{}' has no build file",
                self.name
            )));
        }
        if self.image.is_empty() {
            return Err(Error::InvalidInput(format!(
                "component '{}' has no image reference",
                self.name
            )));
        }
        // A tag in the image reference would collide with the tags this tool
        // manages (:latest, :buildcache, :<version>).
        if image_has_tag(&self.image) {
            return Err(Error::InvalidInput(format!(
                "component '{}' image '{}' must not carry a tag",
                self.name, self.image
            )));
        }
        Ok(())
    }

    /// Full reference of the published image (`<image>:latest`).
    pub fn publish_ref(&self) -> String {
        format!("{}:{}", self.image, PUBLISH_TAG)
    }

    /// Full reference of the remote cache (`<image>:buildcache`).
    pub fn cache_ref(&self) -> String {
        format!("{}:{}", self.image, CACHE_TAG)
    }
}

/// Whether an image reference already carries a tag.
///
/// A trailing `:segment` is a tag; a colon followed by a path
/// (`host:port/repo`) is the registry host's port.
fn image_has_tag(image: &str) -> bool {
    match image.rfind(':') {
        Some(pos) => !image[pos + 1..].contains('/'),
        None => false,
    }
}
