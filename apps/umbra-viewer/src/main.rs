//! Umbra Viewer
//!
//! Nine rotated cubes on a floor, lit by five point lights with
//! omnidirectional shadows. One light orbits the scene.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p umbra-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! ### Screenshot options
//! - `-S, --screenshot`: Enable screenshot capture mode
//! - `-o, --output <PATTERN>`: Output path pattern (use `{}` for frame number)
//! - `-f, --frames <FRAMES>`: Frame indices to capture (e.g., "0,10,20" or "0-5")
//! - `--exit-after`: Exit after capturing all specified frames
//!
//! ### Other
//! - `--assets <DIR>`: Resource root holding `shaders/` and `textures/`
//! - `--no-vsync`: Present without vsync
//! - `-h, --help`: Print help message
//!
//! ## Examples
//!
//! ```bash
//! # Capture frames 0 and 100, then exit
//! cargo run -p umbra-viewer -- -S -f 0,100 -o shots/frame_{}.png --exit-after
//!
//! # Use shaders compiled into the binary
//! cargo run -p umbra-viewer --features embedded-shaders
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)
//! - `UMBRA_ASSET_DIR`: Resource root when `--assets` is not given

mod app;
mod controller;
mod options;

use umbra_app::{run_app, AppConfig};

use crate::app::Viewer;
use crate::options::{print_help, ViewerOptions};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 800;

fn main() -> anyhow::Result<()> {
    let options = ViewerOptions::from_env()?;
    if options.help {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(
        AppConfig::new("Umbra Viewer")
            .with_size(WIDTH, HEIGHT)
            .with_vsync(options.vsync),
    )
}
