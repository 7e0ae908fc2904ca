// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use winit::keyboard::KeyCode;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "v3rse".to_string(),
            width: 480,
            height: 480,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_frames_in_flight: 1,
            vertex_shader: PathBuf::from("dat/shaders/default.vert.glsl.spv"),
            fragment_shader: PathBuf::from("dat/shaders/default.frag.glsl.spv"),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
    pub hot_reload_shaders: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "v3rse.log".to_string(),
            show_fps: true,
            hot_reload_shaders: true,
        }
    }
}

/// Control key bindings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub quit_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            quit_key: "Escape".to_string(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory.
    ///
    /// A missing file means defaults; a file that fails to parse is an error,
    /// so the user's settings are never dropped silently.
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.graphics.max_frames_in_flight == 0 {
            anyhow::bail!("graphics.max_frames_in_flight must be at least 1");
        }
        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::MAILBOX
            }
        }
    }

    /// Validation layers are only ever enabled in debug builds
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }
}

impl ControlsConfig {
    pub fn fullscreen(&self) -> Option<KeyCode> {
        parse_key(&self.fullscreen_key)
    }

    pub fn quit(&self) -> Option<KeyCode> {
        parse_key(&self.quit_key)
    }
}

/// Map a key name from config.toml to a physical key code.
///
/// Names are case-insensitive. Letters and digits are accepted bare ("Q", "1").
pub fn parse_key(name: &str) -> Option<KeyCode> {
    let key = match name.to_ascii_lowercase().as_str() {
        "escape" | "esc" => KeyCode::Escape,
        "enter" | "return" => KeyCode::Enter,
        "space" => KeyCode::Space,
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "f1" => KeyCode::F1,
        "f2" => KeyCode::F2,
        "f3" => KeyCode::F3,
        "f4" => KeyCode::F4,
        "f5" => KeyCode::F5,
        "f6" => KeyCode::F6,
        "f7" => KeyCode::F7,
        "f8" => KeyCode::F8,
        "f9" => KeyCode::F9,
        "f10" => KeyCode::F10,
        "f11" => KeyCode::F11,
        "f12" => KeyCode::F12,
        "a" => KeyCode::KeyA,
        "b" => KeyCode::KeyB,
        "c" => KeyCode::KeyC,
        "d" => KeyCode::KeyD,
        "e" => KeyCode::KeyE,
        "f" => KeyCode::KeyF,
        "g" => KeyCode::KeyG,
        "h" => KeyCode::KeyH,
        "i" => KeyCode::KeyI,
        "j" => KeyCode::KeyJ,
        "k" => KeyCode::KeyK,
        "l" => KeyCode::KeyL,
        "m" => KeyCode::KeyM,
        "n" => KeyCode::KeyN,
        "o" => KeyCode::KeyO,
        "p" => KeyCode::KeyP,
        "q" => KeyCode::KeyQ,
        "r" => KeyCode::KeyR,
        "s" => KeyCode::KeyS,
        "t" => KeyCode::KeyT,
        "u" => KeyCode::KeyU,
        "v" => KeyCode::KeyV,
        "w" => KeyCode::KeyW,
        "x" => KeyCode::KeyX,
        "y" => KeyCode::KeyY,
        "z" => KeyCode::KeyZ,
        "0" => KeyCode::Digit0,
        "1" => KeyCode::Digit1,
        "2" => KeyCode::Digit2,
        "3" => KeyCode::Digit3,
        "4" => KeyCode::Digit4,
        "5" => KeyCode::Digit5,
        "6" => KeyCode::Digit6,
        "7" => KeyCode::Digit7,
        "8" => KeyCode::Digit8,
        "9" => KeyCode::Digit9,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn defaults_match_single_triangle_setup() {
        let config = Config::default();
        assert_eq!(config.window.title, "v3rse");
        assert_eq!(config.window.width, 480);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.graphics.max_frames_in_flight, 1);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(
            config.graphics.vertex_shader,
            PathBuf::from("dat/shaders/default.vert.glsl.spv")
        );
        assert_eq!(
            config.graphics.fragment_shader,
            PathBuf::from("dat/shaders/default.frag.glsl.spv")
        );
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [window]
            title = "demo"

            [graphics]
            present_mode = "FIFO"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.width, 480);
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.controls.quit_key, "Escape");
    }

    #[test]
    fn empty_file_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.window.height, 480);
        assert!(config.debug.hot_reload_shaders);
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let err = Config::from_toml_str("[graphics]\nmax_frames_in_flight = 0\n");
        assert!(err.is_err());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::from_toml_str("[window\ntitle = 3").is_err());
    }

    #[test]
    fn unknown_present_mode_falls_back_to_mailbox() {
        let mut config = Config::default();
        config.graphics.present_mode = "vsync-ish".to_string();
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::MAILBOX);

        config.graphics.present_mode = "Immediate".to_string();
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn rejected_file_error_reaches_caller() {
        let path = std::env::temp_dir().join(format!("v3rse-rejected-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[window]\ntitle = \"mine\"\nwidth = 1024\n\n[graphics]\nmax_frames_in_flight = 0\n",
        )
        .unwrap();

        let result = Config::load_from_path(&path);
        std::fs::remove_file(&path).unwrap();

        let err = result.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to parse config file"), "{}", message);
        assert!(message.contains("max_frames_in_flight"), "{}", message);
    }

    #[test]
    fn valid_file_is_loaded_from_disk() {
        let path = std::env::temp_dir().join(format!("v3rse-valid-{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\ntitle = \"mine\"\nwidth = 1024\n").unwrap();

        let result = Config::load_from_path(&path);
        std::fs::remove_file(&path).unwrap();

        let config = result.unwrap();
        assert_eq!(config.window.title, "mine");
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 480);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert_eq!(config.window.title, "v3rse");
    }

    #[test]
    fn key_names_parse_case_insensitively() {
        assert_eq!(parse_key("F11"), Some(KeyCode::F11));
        assert_eq!(parse_key("escape"), Some(KeyCode::Escape));
        assert_eq!(parse_key("Esc"), Some(KeyCode::Escape));
        assert_eq!(parse_key("q"), Some(KeyCode::KeyQ));
        assert_eq!(parse_key("7"), Some(KeyCode::Digit7));
        assert_eq!(parse_key("PrintScreen"), None);
        assert_eq!(parse_key(""), None);
    }

    #[test]
    fn default_controls_resolve() {
        let controls = ControlsConfig::default();
        assert_eq!(controls.fullscreen(), Some(KeyCode::F11));
        assert_eq!(controls.quit(), Some(KeyCode::Escape));
    }
}
