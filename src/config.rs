// Session configuration: sequencing policy, collage layout and output

use crate::error::{BoothError, Result};
use crate::font;
use crate::layout::CollageLayout;
use crate::models::EmotionLabel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// How target emotions must be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingMode {
    /// `targets[i]` must be captured before `targets[i + 1]`
    Ordered,
    /// Any not-yet-captured target may be captured next
    FirstMatchAny,
}

/// Capture policy fixed at session start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencePolicy {
    pub targets: Vec<EmotionLabel>,
    /// A sample is decisive only when its top score is strictly above this
    pub confidence_threshold: f32,
    pub poll_interval_ms: u64,
    pub ordering_mode: OrderingMode,
}

impl Default for SequencePolicy {
    fn default() -> Self {
        Self {
            targets: vec![
                EmotionLabel::Happy,
                EmotionLabel::Angry,
                EmotionLabel::Surprised,
                EmotionLabel::Sad,
            ],
            confidence_threshold: 0.6,
            poll_interval_ms: 500,
            ordering_mode: OrderingMode::Ordered,
        }
    }
}

impl SequencePolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(BoothError::InvalidPolicy("targets must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(*target) {
                return Err(BoothError::InvalidPolicy(format!(
                    "target {target} is listed more than once"
                )));
            }
        }
        if !self.confidence_threshold.is_finite() || !(0.0..1.0).contains(&self.confidence_threshold)
        {
            return Err(BoothError::InvalidPolicy(format!(
                "confidence_threshold must be in [0, 1), got {}",
                self.confidence_threshold
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(BoothError::InvalidPolicy(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Collage cell arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arrangement {
    /// Two columns, `ceil(n / 2)` rows
    Grid,
    /// One column of `n` rows
    Stack,
}

/// Encoded format of the finished collage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            OutputFormat::Png => image::ImageFormat::Png,
            OutputFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// Compositor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    pub cell_width: u32,
    pub cell_height: u32,
    pub padding: u32,
    pub arrangement: Arrangement,
    /// Fewest shots `compose` accepts
    pub minimum_count: usize,
    /// Integer scale of the built-in label font
    pub label_scale: u32,
    /// Outline thickness around label text, in pixels
    pub label_outline: u32,
    pub background: [u8; 3],
    pub label_fill: [u8; 3],
    pub label_outline_color: [u8; 3],
    /// Display text per label key (`happy`, `sad`, ...)
    pub glyphs: BTreeMap<String, String>,
    /// Rendered for labels missing from `glyphs`
    pub placeholder_glyph: String,
    pub output_format: OutputFormat,
}

impl Default for LayoutParams {
    fn default() -> Self {
        let glyphs = [
            (EmotionLabel::Happy, "HAPPY :)"),
            (EmotionLabel::Angry, "ANGRY >:("),
            (EmotionLabel::Sad, "SAD :("),
            (EmotionLabel::Surprised, "SURPRISED :O"),
            (EmotionLabel::Neutral, "NEUTRAL :|"),
            (EmotionLabel::Sleepy, "SLEEPY -_-"),
        ]
        .into_iter()
        .map(|(label, text)| (label.as_str().to_string(), text.to_string()))
        .collect();

        Self {
            cell_width: 150,
            cell_height: 150,
            padding: 10,
            arrangement: Arrangement::Grid,
            minimum_count: 4,
            label_scale: 2,
            label_outline: 2,
            background: [255, 255, 255],
            label_fill: [255, 255, 255],
            label_outline_color: [0, 0, 0],
            glyphs,
            placeholder_glyph: "?".to_string(),
            output_format: OutputFormat::Png,
        }
    }
}

impl LayoutParams {
    /// Display text for a label, falling back to the placeholder glyph
    pub fn glyph_for(&self, label: EmotionLabel) -> &str {
        self.glyphs
            .get(label.as_str())
            .map(String::as_str)
            .unwrap_or(&self.placeholder_glyph)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cell_width == 0 || self.cell_height == 0 {
            return Err(BoothError::Config(format!(
                "cell size must be non-zero, got {}x{}",
                self.cell_width, self.cell_height
            )));
        }
        if self.label_scale == 0 {
            return Err(BoothError::Config("label_scale must be at least 1".into()));
        }
        if self.minimum_count == 0 {
            return Err(BoothError::Config("minimum_count must be at least 1".into()));
        }
        if self.placeholder_glyph.trim().is_empty() {
            return Err(BoothError::Config("placeholder_glyph must not be blank".into()));
        }
        self.check_fits(self.minimum_count)?;

        for text in self.glyphs.values().chain([&self.placeholder_glyph]) {
            if !text.chars().all(font::has_glyph) {
                warn!("Label text {:?} has characters the label font draws as boxes", text);
            }
        }
        Ok(())
    }

    /// Rejects parameters whose collage for `count` shots cannot be laid out
    pub fn check_fits(&self, count: usize) -> Result<()> {
        CollageLayout::compute(count, self)
            .map(|_| ())
            .map_err(|e| BoothError::Config(format!("layout is unusable: {e}")))
    }
}

/// Capture-time options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Flip captured frames horizontally before storing them
    pub mirror: bool,
}

/// Where and how the replay binary exports the collage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    pub directory: PathBuf,
    pub file_prefix: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            file_prefix: "emotion-collage".to_string(),
        }
    }
}

/// Full booth configuration as read from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoothConfig {
    pub policy: SequencePolicy,
    pub layout: LayoutParams,
    pub capture: CaptureOptions,
    pub output: OutputOptions,
}

impl BoothConfig {
    /// Loads and validates a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BoothError::Config(format!("Failed to read config {path:?}: {e}"))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded booth config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BoothConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        self.layout.validate()?;
        if self.policy.targets.len() < self.layout.minimum_count {
            return Err(BoothError::Config(format!(
                "{} targets can never satisfy minimum_count {}",
                self.policy.targets.len(),
                self.layout.minimum_count
            )));
        }
        self.layout.check_fits(self.policy.targets.len())
    }
}
