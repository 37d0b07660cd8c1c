//! Resource directory layout.
//!
//! Shaders and textures are read from a resource root, `res/` unless
//! `UMBRA_ASSET_DIR` says otherwise:
//!
//! ```text
//! res/
//!   shaders/   <name>.<stage>.spv
//!   textures/  container.jpg, awesomeface.png
//! ```

use std::path::{Path, PathBuf};

/// Environment variable overriding the resource root.
pub const ASSET_DIR_ENV: &str = "UMBRA_ASSET_DIR";

const DEFAULT_ROOT: &str = "res";

/// Locations of the on-disk resources the renderer consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    pub shader_dir: PathBuf,
    pub texture_dir: PathBuf,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self::from_root(DEFAULT_ROOT)
    }
}

impl AssetPaths {
    /// Lay out shader and texture directories under `root`.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            shader_dir: root.join("shaders"),
            texture_dir: root.join("textures"),
        }
    }

    /// Resolve the resource root from `UMBRA_ASSET_DIR`, falling back to `res/`.
    pub fn from_env() -> Self {
        match std::env::var_os(ASSET_DIR_ENV) {
            Some(root) if !root.is_empty() => {
                tracing::debug!("Using asset root from {}: {:?}", ASSET_DIR_ENV, root);
                Self::from_root(PathBuf::from(root))
            }
            _ => Self::default(),
        }
    }

    pub fn texture(&self, file: &str) -> PathBuf {
        self.texture_dir.join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let paths = AssetPaths::default();
        assert_eq!(paths.shader_dir, PathBuf::from("res/shaders"));
        assert_eq!(paths.texture_dir, PathBuf::from("res/textures"));
    }

    #[test]
    fn texture_lookup() {
        let paths = AssetPaths::from_root("/assets");
        assert_eq!(
            paths.texture("container.jpg"),
            PathBuf::from("/assets/textures/container.jpg")
        );
    }
}
