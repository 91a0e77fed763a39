use std::path::PathBuf;
use clap::{Parser, ValueEnum};
use crate::mesh::FrontFace;
use crate::renderer::config::RenderConfig;

#[derive(Parser, Debug)]
#[command(name = "strata", version, about = "Vulkan mesh viewer with an ImGui overlay")]
pub struct Cli {
    /// Wavefront OBJ file to display
    #[arg(default_value = "assets/cube.obj")]
    pub mesh: PathBuf,

    /// Winding of front faces in the OBJ file
    #[arg(long, value_enum, default_value_t = Winding::Ccw)]
    pub front_face: Winding,

    /// Wait for vertical blank when presenting
    #[arg(long)]
    pub vsync: bool,

    /// Enable the Khronos validation layer
    #[arg(long, overrides_with = "no_validation")]
    pub validation: bool,

    /// Disable the Khronos validation layer, even in debug builds
    #[arg(long)]
    pub no_validation: bool,

    /// Initial window width in logical pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Initial window height in logical pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winding {
    /// Counter-clockwise
    Ccw,
    /// Clockwise
    Cw,
}

impl From<Winding> for FrontFace {
    fn from(winding: Winding) -> Self {
        match winding {
            Winding::Ccw => FrontFace::CounterClockwise,
            Winding::Cw => FrontFace::Clockwise,
        }
    }
}

impl Cli {
    pub fn render_config(&self) -> RenderConfig {
        let defaults = RenderConfig::default();
        let validation = if self.validation {
            true
        } else if self.no_validation {
            false
        } else {
            defaults.validation
        };

        RenderConfig {
            vsync: self.vsync,
            validation,
            ..defaults
        }
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.width.max(1), self.height.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_open_the_bundled_cube() {
        let cli = Cli::try_parse_from(["strata"]).unwrap();
        assert_eq!(cli.mesh, PathBuf::from("assets/cube.obj"));
        assert_eq!(cli.front_face, Winding::Ccw);
        assert!(!cli.vsync);
        assert_eq!(cli.window_size(), (1280, 720));
        assert_eq!(cli.render_config().validation, cfg!(debug_assertions));
    }

    #[test]
    fn flags_map_into_render_config() {
        let cli = Cli::try_parse_from([
            "strata", "model.obj", "--front-face", "cw", "--vsync", "--no-validation",
            "--width", "640", "--height", "480",
        ])
        .unwrap();
        assert_eq!(cli.mesh, PathBuf::from("model.obj"));
        assert_eq!(FrontFace::from(cli.front_face), FrontFace::Clockwise);
        assert_eq!(cli.window_size(), (640, 480));

        let config = cli.render_config();
        assert!(config.vsync);
        assert!(!config.validation);
    }

    #[test]
    fn later_validation_flag_wins() {
        let cli = Cli::try_parse_from(["strata", "--no-validation", "--validation"]).unwrap();
        assert!(cli.render_config().validation);
    }

    #[test]
    fn unknown_winding_is_rejected() {
        assert!(Cli::try_parse_from(["strata", "--front-face", "both"]).is_err());
    }
}
