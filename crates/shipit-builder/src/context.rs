//! Build context creation.
//!
//! The build context is always the full repository root, shipped to the
//! daemon as a gzipped tarball.

use flate2::Compression;
use flate2::write::GzEncoder;
use shipit_core::{Error, Result};
use std::path::Path;
use tar::Builder;

const LARGE_CONTEXT_BYTES: usize = 500 * 1024 * 1024;

/// Archive the repository root as a gzipped tar build context.
///
/// `build_file` is the path of the component's build file relative to
/// `context_dir`; it must exist, since the daemon resolves it inside the
/// context.
pub fn create_context(context_dir: &Path, build_file: &str) -> Result<Vec<u8>> {
    if !context_dir.is_dir() {
        return Err(Error::NotFound(format!(
            "build context directory {}",
            context_dir.display()
        )));
    }
    if !context_dir.join(build_file).is_file() {
        return Err(Error::NotFound(format!(
            "build file {} in {}",
            build_file,
            context_dir.display()
        )));
    }

    tracing::debug!(context = %context_dir.display(), "Creating build context");

    let mut archive = Vec::new();
    {
        let encoder = GzEncoder::new(&mut archive, Compression::default());
        let mut tar = Builder::new(encoder);
        tar.append_dir_all(".", context_dir)
            .map_err(|e| Error::Internal(format!("failed to archive build context: {}", e)))?;
        let encoder = tar
            .into_inner()
            .map_err(|e| Error::Internal(format!("failed to finish build context: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| Error::Internal(format!("failed to finish build context: {}", e)))?;
    }

    if archive.len() > LARGE_CONTEXT_BYTES {
        tracing::warn!(
            size_mb = archive.len() / 1024 / 1024,
            "Build context is large; consider a .dockerignore"
        );
    }

    tracing::debug!(bytes = archive.len(), "Build context created");
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_create_context_includes_tree() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile.api"), "FROM alpine").unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn f() {}").unwrap();

        let archive = create_context(dir.path(), "Dockerfile.api").unwrap();
        assert!(!archive.is_empty());

        let extract = tempdir().unwrap();
        let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(archive));
        tar::Archive::new(decoder).unpack(extract.path()).unwrap();

        assert!(extract.path().join("Dockerfile.api").exists());
        assert!(extract.path().join("src/lib.rs").exists());
    }

    #[test]
    fn test_missing_build_file_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let result = create_context(dir.path(), "Dockerfile.api");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_missing_context_dir_rejected() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("nope");
        let result = create_context(&gone, "Dockerfile");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
