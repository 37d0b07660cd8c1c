//! Shaders for the Umbra renderer.
//!
//! GLSL sources live in `shaders/`. At runtime, SPIR-V is read from a resource
//! directory as `<name>.<stage>.spv` files. With the `compile` feature the
//! sources are also compiled at build time and [`ShaderLibrary::embedded`]
//! serves them from the binary.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use umbra_core::{AssetPaths, Error, Result};

/// Pipeline stage a SPIR-V module is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Geometry,
    Fragment,
}

impl Stage {
    /// File extension used for this stage.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Geometry => "geom",
            Self::Fragment => "frag",
        }
    }
}

/// Shader program names.
pub mod names {
    pub const SHADOW: &str = "shadow";
    pub const GBUFFER: &str = "gbuffer";
    pub const LIGHTING: &str = "lighting";
    pub const LIGHT_GIZMO: &str = "light";
}

/// Convert SPIR-V bytes to words, checking alignment and the magic number.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| Error::MalformedSpirv(e.to_string()))?;
    match words.first() {
        Some(&0x0723_0203) => Ok(words),
        _ => Err(Error::MalformedSpirv("magic number missing".to_string())),
    }
}

#[derive(Debug, Clone)]
enum Source {
    Directory(PathBuf),
    #[cfg(feature = "compile")]
    Embedded,
}

/// Where shader bytecode comes from.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    source: Source,
}

impl ShaderLibrary {
    /// Read `<dir>/<name>.<stage>.spv` files.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Directory(dir.into()),
        }
    }

    /// Read from the shader directory of `assets`.
    pub fn from_assets(assets: &AssetPaths) -> Self {
        Self::from_dir(&assets.shader_dir)
    }

    /// Serve the SPIR-V compiled into this crate.
    #[cfg(feature = "compile")]
    pub const fn embedded() -> Self {
        Self {
            source: Source::Embedded,
        }
    }

    /// Path a stage would be read from, if backed by a directory.
    pub fn path(&self, name: &str, stage: Stage) -> Option<PathBuf> {
        match &self.source {
            Source::Directory(dir) => Some(dir.join(format!("{name}.{}.spv", stage.extension()))),
            #[cfg(feature = "compile")]
            Source::Embedded => None,
        }
    }

    /// Load one stage of a program.
    ///
    /// A missing file is `Error::MissingAsset`; malformed bytecode is `Error::MalformedSpirv`.
    pub fn load(&self, name: &str, stage: Stage) -> Result<Vec<u32>> {
        match &self.source {
            Source::Directory(dir) => load_file(&dir.join(format!(
                "{name}.{}.spv",
                stage.extension()
            ))),
            #[cfg(feature = "compile")]
            Source::Embedded => embedded::lookup(name, stage)
                .ok_or_else(|| Error::MissingEmbedded(format!("{name}.{}", stage.extension())))
                .and_then(spirv_words),
        }
    }
}

fn load_file(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|e| Error::from_read(path, e))?;
    tracing::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
    spirv_words(&bytes)
}

#[cfg(feature = "compile")]
mod embedded {
    use super::Stage;

    macro_rules! spirv {
        ($file:literal) => {
            include_bytes!(concat!(env!("OUT_DIR"), "/", $file, ".spv"))
        };
    }

    pub fn lookup(name: &str, stage: Stage) -> Option<&'static [u8]> {
        let bytes: &'static [u8] = match (name, stage) {
            ("shadow", Stage::Vertex) => spirv!("shadow.vert"),
            ("shadow", Stage::Geometry) => spirv!("shadow.geom"),
            ("shadow", Stage::Fragment) => spirv!("shadow.frag"),
            ("gbuffer", Stage::Vertex) => spirv!("gbuffer.vert"),
            ("gbuffer", Stage::Fragment) => spirv!("gbuffer.frag"),
            ("lighting", Stage::Vertex) => spirv!("lighting.vert"),
            ("lighting", Stage::Fragment) => spirv!("lighting.frag"),
            ("light", Stage::Vertex) => spirv!("light.vert"),
            ("light", Stage::Fragment) => spirv!("light.frag"),
            _ => return None,
        };
        Some(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes() -> Vec<u8> {
        [0x0723_0203u32, 0x0001_0600, 0, 8, 0]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect()
    }

    #[test]
    fn stage_extensions() {
        assert_eq!(Stage::Vertex.extension(), "vert");
        assert_eq!(Stage::Geometry.extension(), "geom");
        assert_eq!(Stage::Fragment.extension(), "frag");
    }

    #[test]
    fn words_from_valid_bytes() {
        let words = spirv_words(&header_bytes()).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], 0x0723_0203);
    }

    #[test]
    fn rejects_unaligned_or_foreign_bytes() {
        let mut bytes = header_bytes();
        bytes.pop();
        assert!(spirv_words(&bytes).is_err());
        assert!(matches!(spirv_words(&[0u8; 8]), Err(Error::MalformedSpirv(_))));
    }

    #[test]
    fn directory_layout() {
        let library = ShaderLibrary::from_dir("res/shaders");
        assert_eq!(
            library.path(names::SHADOW, Stage::Geometry),
            Some(PathBuf::from("res/shaders/shadow.geom.spv"))
        );
    }

    #[test]
    fn follows_asset_root() {
        let library = ShaderLibrary::from_assets(&AssetPaths::from_root("/data"));
        assert_eq!(
            library.path(names::GBUFFER, Stage::Vertex),
            Some(PathBuf::from("/data/shaders/gbuffer.vert.spv"))
        );
    }

    #[test]
    fn missing_file_is_a_missing_asset() {
        let library = ShaderLibrary::from_dir("no/such/dir");
        let err = library.load(names::LIGHTING, Stage::Fragment).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingAsset(path) if path.ends_with("lighting.frag.spv")
        ));
    }

    #[test]
    fn reads_spirv_from_disk() {
        let dir = std::env::temp_dir().join(format!("umbra-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("quad.vert.spv"), header_bytes()).unwrap();

        let words = ShaderLibrary::from_dir(&dir)
            .load("quad", Stage::Vertex)
            .unwrap();
        assert_eq!(words[0], 0x0723_0203);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
