//! Configuration file handling for transition-chain.
//!
//! Loads configuration from `~/.config/transition-chain/config.toml`, the path
//! in `TRANSITION_CHAIN_CONFIG`, or a custom path passed with `--config`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV: &str = "TRANSITION_CHAIN_CONFIG";

/// Configuration file structure for transition-chain.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// How the external transition renderer is launched.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// Interpreter or executable to run.
    pub program: String,
    /// Script passed as the first argument. Empty means `program` is the renderer.
    pub script: Option<PathBuf>,
    /// Fixed brightness peak handed to every render.
    pub max_brightness: f64,
    /// Appended after the standard arguments.
    pub extra_args: Vec<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            script: Some(PathBuf::from("vid_transition.py")),
            max_brightness: 1.5,
            extra_args: Vec::new(),
        }
    }
}

/// Media toolchain used for probing and encoding.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EncoderConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// Sample rate for generated silence and the output audio track.
    pub audio_sample_rate: u32,
    /// Extra output options inserted before the output path.
    pub extra_args: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            audio_sample_rate: 44100,
            extra_args: Vec::new(),
        }
    }
}

/// Defaults for CLI options.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Transition length for `pair`.
    pub pair_frame_count: u32,
    /// Transition length for `batch`.
    pub batch_frame_count: u32,
    pub output: PathBuf,
    /// Extensions picked up by `batch` directory discovery.
    pub extensions: Vec<String>,
    /// Parent for scoped run directories. System temp when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            pair_frame_count: 30,
            batch_frame_count: 40,
            output: PathBuf::from("final_output.mp4"),
            extensions: vec!["mp4".to_string()],
            work_dir: None,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise `TRANSITION_CHAIN_CONFIG` and then
    /// the default location are tried, falling back to built-in defaults when
    /// no file is present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            return Self::load_file(path);
        }

        let path = resolved_path();
        if path.exists() {
            Self::load_file(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Parse a config file that is known to exist.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    NotFound {
        path: PathBuf,
    },
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound { path } => {
                write!(f, "Config file '{}' does not exist", path.display())
            }
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::NotFound { .. } => None,
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("transition-chain").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/transition-chain/config.toml")
        })
}

/// Config path honoring `TRANSITION_CHAIN_CONFIG`.
pub fn resolved_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_path)
}

/// Commented template written by `config init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# transition-chain configuration

[renderer]
# Interpreter or executable that renders transitions
program = "python"
# Renderer script; set to "" when `program` is the renderer itself
script = "vid_transition.py"
# Brightness peak passed to every render
max_brightness = 1.5
# Extra arguments appended to the renderer command line
extra_args = []

[encoder]
ffmpeg = "ffmpeg"
ffprobe = "ffprobe"
video_codec = "libx264"
audio_codec = "aac"
audio_sample_rate = 44100
extra_args = []

[defaults]
# Transition length in frames for `pair`
pair_frame_count = 30
# Transition length in frames for `batch`
batch_frame_count = 40
output = "final_output.mp4"
# File extensions picked up by `batch`
extensions = ["mp4"]
# Where scoped run directories are created (default: system temp)
# work_dir = "/tmp"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.renderer.program, "python");
        assert_eq!(config.renderer.max_brightness, 1.5);
        assert_eq!(config.defaults.pair_frame_count, 30);
        assert_eq!(config.defaults.batch_frame_count, 40);
        assert_eq!(config.encoder.video_codec, "libx264");
    }

    #[test]
    fn test_template_matches_defaults() {
        let config = Config::from_toml(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [renderer]
            max_brightness = 2.0

            [defaults]
            batch_frame_count = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.renderer.max_brightness, 2.0);
        assert_eq!(config.renderer.program, "python");
        assert_eq!(config.defaults.batch_frame_count, 25);
        assert_eq!(config.defaults.pair_frame_count, 30);
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_load_file_parse_error_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[renderer\nprogram = ").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_load_file_reads_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[encoder]\nffmpeg = \"/usr/local/bin/ffmpeg\"\n[defaults]\nextensions = [\"mp4\", \"mov\"]\n",
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.encoder.ffmpeg, "/usr/local/bin/ffmpeg");
        assert_eq!(config.defaults.extensions, vec!["mp4", "mov"]);
    }

    #[test]
    fn test_default_path_structure() {
        let path = default_path();
        assert!(path.ends_with("transition-chain/config.toml"));
    }
}
