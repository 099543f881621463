use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use facehud_core::detection::infrastructure::onnx_face_mesh_detector::{
    DEFAULT_MAX_FACES, DEFAULT_MIN_CONFIDENCE,
};
use facehud_core::overlay::domain::canvas::Color;
use facehud_core::overlay::domain::overlay_style::{OverlayStyle, DEFAULT_LABEL};
use facehud_core::shared::constants::{
    BLAZEFACE_MODEL_NAME, DEFAULT_REFRESH_HZ, FACE_MESH_MODEL_NAME, FIRST_FRAME_TIMEOUT_SECS,
    IDEAL_CAPTURE_HEIGHT, IDEAL_CAPTURE_WIDTH, MAX_REFRESH_HZ, MIN_REFRESH_HZ,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleSettings {
    pub accent: String,
    pub label: String,
    pub landmark_radius: f64,
    pub corner_length: f64,
    pub box_padding: f64,
}

impl Default for StyleSettings {
    fn default() -> Self {
        let style = OverlayStyle::default();
        Self {
            accent: style.accent.to_hex(),
            label: DEFAULT_LABEL.to_string(),
            landmark_radius: style.landmark_radius,
            corner_length: style.corner_length,
            box_padding: style.box_padding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Capture device, e.g. `/dev/video0`, or a media file when no input
    /// format is given.
    pub device: Option<String>,
    /// ffmpeg input device format (`v4l2`, `avfoundation`, `dshow`).
    pub input_format: Option<String>,
    pub detector_model: Option<PathBuf>,
    pub landmark_model: Option<PathBuf>,
    pub use_cpu: bool,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub max_faces: usize,
    pub min_confidence: f64,
    pub first_frame_timeout_secs: u64,
    pub output_dir: Option<PathBuf>,
    pub snapshot_every: u64,
    pub style: StyleSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: None,
            input_format: None,
            detector_model: None,
            landmark_model: None,
            use_cpu: false,
            width: IDEAL_CAPTURE_WIDTH,
            height: IDEAL_CAPTURE_HEIGHT,
            fps: DEFAULT_REFRESH_HZ,
            max_faces: DEFAULT_MAX_FACES,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            first_frame_timeout_secs: FIRST_FRAME_TIMEOUT_SECS,
            output_dir: None,
            snapshot_every: 1,
            style: StyleSettings::default(),
        }
    }
}

impl Settings {
    /// `<config dir>/FaceHUD/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceHUD").join("settings.json"))
    }

    /// Loads `path`, or the default location when `None`. A missing default
    /// file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| SettingsError::Parse { path, source })
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |msg: String| Err(SettingsError::Invalid(msg));
        if self.width == 0 || self.height == 0 {
            return invalid(format!(
                "Capture size must be non-zero, got {}x{}",
                self.width, self.height
            ));
        }
        if !(MIN_REFRESH_HZ..=MAX_REFRESH_HZ).contains(&self.fps) {
            return invalid(format!(
                "FPS must be between {MIN_REFRESH_HZ} and {MAX_REFRESH_HZ}, got {}",
                self.fps
            ));
        }
        if self.max_faces == 0 {
            return invalid("Max faces must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return invalid(format!(
                "Confidence must be between 0.0 and 1.0, got {}",
                self.min_confidence
            ));
        }
        if Color::from_hex(&self.style.accent).is_none() {
            return invalid(format!(
                "Accent must be a #rrggbb colour, got '{}'",
                self.style.accent
            ));
        }
        if !(0.0..=0.5).contains(&self.style.box_padding) {
            return invalid(format!(
                "Box padding must be between 0.0 and 0.5, got {}",
                self.style.box_padding
            ));
        }
        Ok(())
    }

    pub fn detector_model_path(&self) -> PathBuf {
        self.detector_model
            .clone()
            .unwrap_or_else(|| model_dir().join(BLAZEFACE_MODEL_NAME))
    }

    pub fn landmark_model_path(&self) -> PathBuf {
        self.landmark_model
            .clone()
            .unwrap_or_else(|| model_dir().join(FACE_MESH_MODEL_NAME))
    }

    pub fn overlay_style(&self) -> OverlayStyle {
        let defaults = OverlayStyle::default();
        OverlayStyle {
            accent: Color::from_hex(&self.style.accent).unwrap_or(defaults.accent),
            label: self.style.label.clone(),
            landmark_radius: self.style.landmark_radius,
            corner_length: self.style.corner_length,
            box_padding: self.style.box_padding,
            ..defaults
        }
    }
}

/// Where model files are looked up when no explicit path is configured.
///
/// - macOS: `~/Library/Application Support/FaceHUD/models/`
/// - Linux: `$XDG_DATA_HOME/FaceHUD/models/` or `~/.local/share/FaceHUD/models/`
/// - Windows: `%APPDATA%/FaceHUD/models/`
pub fn model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("FaceHUD")
        .join("models")
}
