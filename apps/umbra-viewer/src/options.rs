//! Command line options.

use std::path::PathBuf;

use umbra_core::{AssetPaths, Error, Result};
use umbra_render::ScreenshotConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerOptions {
    pub screenshot: ScreenshotConfig,
    /// Resource root overriding `UMBRA_ASSET_DIR`.
    pub assets: Option<PathBuf>,
    pub vsync: bool,
    pub help: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            screenshot: ScreenshotConfig::default(),
            assets: None,
            vsync: true,
            help: false,
        }
    }
}

impl ViewerOptions {
    pub fn from_env() -> Result<Self> {
        Self::parse(&std::env::args().collect::<Vec<_>>())
    }

    /// Parse `args`, skipping the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut options = Self::default();
        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = args.get(i + 1).map(String::as_str);

            let consumed = options.screenshot.apply_flag(flag, value);
            if consumed > 0 {
                i += consumed;
                continue;
            }

            match flag {
                "-h" | "--help" => options.help = true,
                "--no-vsync" => options.vsync = false,
                "--assets" => {
                    let dir = value.ok_or_else(|| {
                        Error::InvalidOption("--assets needs a directory".to_string())
                    })?;
                    options.assets = Some(PathBuf::from(dir));
                    i += 1;
                }
                "-o" | "--output" | "-f" | "--frames" => {
                    return Err(Error::InvalidOption(format!("{flag} needs a value")));
                }
                _ => return Err(Error::InvalidOption(format!("Unknown option '{flag}'"))),
            }
            i += 1;
        }
        options.screenshot.finish();
        Ok(options)
    }

    pub fn asset_paths(&self) -> AssetPaths {
        self.assets
            .as_ref()
            .map_or_else(AssetPaths::from_env, AssetPaths::from_root)
    }
}

pub fn print_help() {
    eprintln!(
        "Umbra Viewer: deferred shading with omnidirectional shadows

USAGE:
    cargo run -p umbra-viewer -- [OPTIONS]

SCREENSHOT OPTIONS:
    -S, --screenshot        Enable screenshot capture mode
    -o, --output <PATTERN>  Output path pattern (use {{}} for frame number)
                            Default: screenshot_{{}}.png
    -f, --frames <FRAMES>   Frame indices to capture
                            Examples: \"0\" \"0,10,20\" \"0-5\" \"0,5-10,20\"
                            Default: 0
    --exit-after            Exit after capturing all specified frames

OTHER:
    --assets <DIR>          Resource root holding shaders/ and textures/
                            Default: $UMBRA_ASSET_DIR or res
    --no-vsync              Present without waiting for vertical blank
    -h, --help              Print this help message

CONTROLS:
    WASD                    Move
    Space / Ctrl            Up / down
    Shift                   Move slowly
    Mouse                   Look around
    Escape                  Quit

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)
    UMBRA_ASSET_DIR         Resource root"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn parse(list: &[&str]) -> Result<ViewerOptions> {
        let args: Vec<String> = std::iter::once("umbra-viewer")
            .chain(list.iter().copied())
            .map(String::from)
            .collect();
        ViewerOptions::parse(&args)
    }

    #[test]
    fn no_arguments() {
        let options = parse(&[]).unwrap();
        assert_eq!(options, ViewerOptions::default());
        assert!(!options.screenshot.enabled);
    }

    #[test]
    fn mixed_flags() {
        let options = parse(&[
            "--no-vsync",
            "-S",
            "--assets",
            "/data/res",
            "-f",
            "2,4",
            "--exit-after",
        ])
        .unwrap();
        assert!(!options.vsync);
        assert_eq!(options.assets, Some(PathBuf::from("/data/res")));
        assert_eq!(options.screenshot.frames, BTreeSet::from([2, 4]));
        assert!(options.screenshot.exit_after_capture);
        assert_eq!(
            options.asset_paths().texture("a.png"),
            PathBuf::from("/data/res/textures/a.png")
        );
    }

    #[test]
    fn help_flag() {
        assert!(parse(&["--help"]).unwrap().help);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(matches!(parse(&["--fast"]), Err(Error::InvalidOption(_))));
    }

    #[test]
    fn missing_values_are_rejected() {
        assert!(matches!(parse(&["--assets"]), Err(Error::InvalidOption(_))));
        assert!(matches!(parse(&["-S", "-o"]), Err(Error::InvalidOption(_))));
    }
}
