//! Shape source backed by JSON files on disk.
//!
//! Layout: `<root>/<version>/<Kind>.json`, each file a serialized
//! [`SchemaShape`]. Lets a deployment ship shapes newer than the built-in
//! table without rebuilding.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, SchemaError};
use crate::registry::shape::SchemaShape;
use crate::registry::{SchemaKind, ShapeSource};
use crate::version::SchemaVersion;

/// Loads schema shapes from a directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryShapes {
    root: PathBuf,
}

impl DirectoryShapes {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shape_path(&self, kind: SchemaKind, version: &SchemaVersion) -> PathBuf {
        self.root
            .join(version.to_string())
            .join(format!("{}.json", kind.as_str()))
    }

    /// Versions that have a directory under the root, oldest first.
    ///
    /// Entries that are not version-named directories are skipped.
    pub fn versions(&self) -> Result<Vec<SchemaVersion>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| SchemaError::Io {
            message: format!("Failed to read shape directory: {}", e),
            path: Some(self.root.clone()),
            source: Some(e),
        })?;

        let mut versions = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(SchemaVersion::parse) {
                Some(Ok(version)) => versions.push(version),
                _ => warn!("Ignoring non-version entry in shape directory: {}", path.display()),
            }
        }
        versions.sort();
        debug!(
            "Found {} shape versions in {}",
            versions.len(),
            self.root.display()
        );
        Ok(versions)
    }

    /// Serialize a shape into its place under the root.
    ///
    /// The shape is written to a temp file in the same directory, synced,
    /// then renamed over the target, so readers see the old file or the new
    /// one and never a partial write.
    pub fn store(&self, shape: &SchemaShape) -> Result<PathBuf> {
        let path = self.shape_path(shape.kind, &shape.version);
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent).map_err(|e| SchemaError::io_with_path(e, parent))?;

        let content = serde_json::to_string_pretty(shape)?;
        let mut temp =
            NamedTempFile::new_in(parent).map_err(|e| SchemaError::io_with_path(e, parent))?;
        temp.write_all(content.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| SchemaError::io_with_path(e, temp.path()))?;
        temp.persist(&path)
            .map_err(|e| SchemaError::io_with_path(e.error, &path))?;

        debug!("Stored {} at {}", shape, path.display());
        Ok(path)
    }
}

impl ShapeSource for DirectoryShapes {
    fn fetch(&self, kind: SchemaKind, version: &SchemaVersion) -> Result<SchemaShape> {
        let path = self.shape_path(kind, version);
        let fetch_error = |message: String, source: Option<Box<dyn std::error::Error + Send + Sync>>| {
            SchemaError::RegistryFetch {
                kind: kind.to_string(),
                version: version.to_string(),
                message,
                source,
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            fetch_error(
                format!("cannot read {}: {}", path.display(), e),
                Some(Box::new(e)),
            )
        })?;
        let shape: SchemaShape = serde_json::from_str(&content).map_err(|e| {
            fetch_error(
                format!("cannot parse {}: {}", path.display(), e),
                Some(Box::new(e)),
            )
        })?;

        if shape.kind != kind || shape.version != *version {
            return Err(fetch_error(
                format!(
                    "{} describes {} {} instead",
                    path.display(),
                    shape.kind,
                    shape.version
                ),
                None,
            ));
        }
        shape
            .check()
            .map_err(|e| fetch_error(e.to_string(), Some(Box::new(e))))?;

        debug!("Loaded {} from {}", shape, path.display());
        Ok(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use crate::registry::BuiltinShapes;
    use tempfile::TempDir;

    #[test]
    fn test_store_then_fetch() {
        let temp = TempDir::new().unwrap();
        let dir = DirectoryShapes::new(temp.path());
        let version = SchemaVersion::new(0, 6, 0);
        let builtin = BuiltinShapes::new(InstanceConfig::default())
            .fetch(SchemaKind::Asset, &version)
            .unwrap();

        let path = dir.store(&builtin).unwrap();
        assert!(path.ends_with("0.6.0/Asset.json"));

        let loaded = dir.fetch(SchemaKind::Asset, &version).unwrap();
        assert_eq!(loaded, builtin);
        assert_eq!(dir.versions().unwrap(), vec![version]);
    }

    #[test]
    fn test_store_replaces_whole_file() {
        let temp = TempDir::new().unwrap();
        let dir = DirectoryShapes::new(temp.path());
        let version = SchemaVersion::new(0, 6, 0);
        let shapes = BuiltinShapes::default();
        let asset = shapes.fetch(SchemaKind::Asset, &version).unwrap();

        // A truncated leftover from an earlier writer
        std::fs::create_dir_all(temp.path().join("0.6.0")).unwrap();
        std::fs::write(temp.path().join("0.6.0/Asset.json"), "{\"kind\": \"As").unwrap();

        let path = dir.store(&asset).unwrap();
        let on_disk: SchemaShape =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, asset);

        let names: Vec<_> = std::fs::read_dir(temp.path().join("0.6.0"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["Asset.json"]);
    }

    #[test]
    fn test_missing_and_corrupt_files_are_fetch_errors() {
        let temp = TempDir::new().unwrap();
        let dir = DirectoryShapes::new(temp.path());
        let version = SchemaVersion::new(0, 6, 0);

        let err = dir.fetch(SchemaKind::Dandiset, &version).unwrap_err();
        assert!(matches!(err, SchemaError::RegistryFetch { .. }));

        std::fs::create_dir_all(temp.path().join("0.6.0")).unwrap();
        std::fs::write(temp.path().join("0.6.0/Dandiset.json"), "{not json").unwrap();
        let err = dir.fetch(SchemaKind::Dandiset, &version).unwrap_err();
        assert!(err.to_string().contains("cannot parse"));
    }

    #[test]
    fn test_mislabelled_shape_rejected() {
        let temp = TempDir::new().unwrap();
        let dir = DirectoryShapes::new(temp.path());
        let mut shape = BuiltinShapes::default()
            .fetch(SchemaKind::Asset, &SchemaVersion::new(0, 6, 0))
            .unwrap();
        shape.kind = SchemaKind::BareAsset;
        dir.store(&shape).unwrap();
        std::fs::rename(
            temp.path().join("0.6.0/BareAsset.json"),
            temp.path().join("0.6.0/Asset.json"),
        )
        .unwrap();

        let err = dir
            .fetch(SchemaKind::Asset, &SchemaVersion::new(0, 6, 0))
            .unwrap_err();
        assert!(err.to_string().contains("instead"));
    }

    #[test]
    fn test_versions_skips_stray_entries() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("0.4.0")).unwrap();
        std::fs::create_dir_all(temp.path().join("0.3.1")).unwrap();
        std::fs::create_dir_all(temp.path().join("latest")).unwrap();
        std::fs::write(temp.path().join("README"), "shapes").unwrap();

        let versions = DirectoryShapes::new(temp.path()).versions().unwrap();
        assert_eq!(versions, vec![SchemaVersion::new(0, 3, 1), SchemaVersion::new(0, 4, 0)]);
    }
}
