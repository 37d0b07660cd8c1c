//! Errors raised while resolving the resources and options an engine starts with.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A shader or texture file is absent from the resource root.
    #[error("Asset missing: {}", .0.display())]
    MissingAsset(PathBuf),

    /// A shader stage the binary was built without.
    #[error("No embedded SPIR-V for {0}")]
    MissingEmbedded(String),

    #[error("Malformed SPIR-V: {0}")]
    MalformedSpirv(String),

    /// The asset exists but could not be read.
    #[error("Could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A command line option the engine cannot act on.
    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

impl Error {
    /// Whether the asset was absent, as opposed to present but unusable.
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::MissingAsset(_) | Self::MissingEmbedded(_))
    }

    /// Classify a failed read of `path`.
    pub fn from_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::MissingAsset(path)
        } else {
            Self::Read { path, source }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn absent_files_are_missing_assets() {
        let err = Error::from_read("res/shaders/light.frag.spv", io::ErrorKind::NotFound.into());
        assert!(err.is_missing());
        assert_eq!(err.to_string(), "Asset missing: res/shaders/light.frag.spv");
    }

    #[test]
    fn unreadable_files_keep_their_cause() {
        let err = Error::from_read("res/textures", io::ErrorKind::PermissionDenied.into());
        assert!(!err.is_missing());
        assert!(matches!(err, Error::Read { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn malformed_bytecode_is_not_missing() {
        assert!(!Error::MalformedSpirv("bad magic".into()).is_missing());
        assert!(Error::MissingEmbedded("light.geom".into()).is_missing());
    }
}
