// Core data models for the emotion photo booth

use crate::error::{BoothError, Result};
use image::RgbImage;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A single video frame with tightly packed RGB data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Raw RGB pixel data (width * height * 3 bytes)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    /// Creates a new Frame with the given parameters
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Checks that the dimensions are non-zero and match the buffer length
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BoothError::CompositionFailed(format!(
                "frame has zero dimension {}x{}",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(BoothError::CompositionFailed(format!(
                "frame buffer holds {} bytes, {}x{} RGB needs {expected}",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Borrows the frame as an `RgbImage`, failing on a malformed buffer
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        self.validate()?;
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            BoothError::CompositionFailed("frame buffer rejected by image crate".to_string())
        })
    }

    /// Returns a horizontally flipped copy (selfie view)
    pub fn mirrored(&self) -> Result<Self> {
        let flipped = image::imageops::flip_horizontal(&self.to_rgb_image()?);
        Ok(Self::from(flipped))
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }
}

/// The fixed set of expressions a classifier can report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Happy,
    Angry,
    Sad,
    Surprised,
    Neutral,
    Sleepy,
    Scared,
    Disgusted,
}

impl EmotionLabel {
    /// Every label in its canonical order
    pub const ALL: [EmotionLabel; 8] = [
        EmotionLabel::Happy,
        EmotionLabel::Angry,
        EmotionLabel::Sad,
        EmotionLabel::Surprised,
        EmotionLabel::Neutral,
        EmotionLabel::Sleepy,
        EmotionLabel::Scared,
        EmotionLabel::Disgusted,
    ];

    /// Lowercase key used in configuration and sample scripts
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Surprised => "surprised",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Sleepy => "sleepy",
            EmotionLabel::Scared => "scared",
            EmotionLabel::Disgusted => "disgusted",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = BoothError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        EmotionLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == wanted)
            .ok_or_else(|| BoothError::Config(format!("unknown emotion label: {s:?}")))
    }
}

/// Per-tick classifier output: label scores in the classifier's enumeration order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionSample {
    scores: Vec<(EmotionLabel, f32)>,
}

impl ExpressionSample {
    pub fn new(scores: Vec<(EmotionLabel, f32)>) -> Self {
        Self { scores }
    }

    /// Builds a sample from raw model logits using a numerically stable softmax.
    /// `labels[i]` names output `i`; extra logits without a label are ignored.
    pub fn from_logits(labels: &[EmotionLabel], logits: &[f32]) -> Self {
        if logits.is_empty() {
            return Self::default();
        }
        let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();

        // Labels may repeat (several model classes folded into one label)
        let mut scores: Vec<(EmotionLabel, f32)> = Vec::with_capacity(labels.len());
        for (&label, &logit) in labels.iter().zip(logits) {
            let probability = (logit - max_logit).exp() / exp_sum;
            match scores.iter_mut().find(|(seen, _)| *seen == label) {
                Some((_, total)) => *total += probability,
                None => scores.push((label, probability)),
            }
        }
        Self { scores }
    }

    pub fn scores(&self) -> &[(EmotionLabel, f32)] {
        &self.scores
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Score reported for a label, if any
    pub fn score(&self, label: EmotionLabel) -> Option<f32> {
        self.scores
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, score)| *score)
    }

    /// A sample is malformed when empty or when any score is not a finite value in [0, 1]
    pub fn is_malformed(&self) -> bool {
        self.scores.is_empty()
            || self
                .scores
                .iter()
                .any(|(_, score)| !score.is_finite() || !(0.0..=1.0).contains(score))
    }

    /// Highest-scoring label; the first one seen wins a tie
    pub fn dominant(&self) -> Option<(EmotionLabel, f32)> {
        let mut best: Option<(EmotionLabel, f32)> = None;
        for &(label, score) in &self.scores {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((label, score)),
            }
        }
        best
    }
}

impl Serialize for ExpressionSample {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.scores.len()))?;
        for (label, score) in &self.scores {
            map.serialize_entry(label, score)?;
        }
        map.end()
    }
}

// Deserializes from a map while keeping document order, so the tie-break stays stable
impl<'de> Deserialize<'de> for ExpressionSample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SampleVisitor;

        impl<'de> Visitor<'de> for SampleVisitor {
            type Value = ExpressionSample;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of emotion label to confidence score")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut scores = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, score)) = access.next_entry::<EmotionLabel, f32>()? {
                    scores.push((label, score));
                }
                Ok(ExpressionSample { scores })
            }
        }

        deserializer.deserialize_map(SampleVisitor)
    }
}

/// One stored frame and the emotion that triggered it
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedShot {
    pub label: EmotionLabel,
    pub image: Frame,
    pub captured_at_tick: u64,
}
