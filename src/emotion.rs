// Expression classifier seam and the scripted classifier used for replays

use crate::error::{BoothError, Result};
use crate::models::{EmotionLabel, ExpressionSample, Frame};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{info, warn};

/// Anything that scores the expression of the (single) face in a frame
pub trait ExpressionClassifier {
    /// Returns `Ok(None)` when no face is visible
    fn classify(&mut self, frame: &Frame) -> Result<Option<ExpressionSample>>;
}

/// Output order of HSEmotion-style 8-class models.
/// Contempt has no label of its own and folds into `Disgusted`.
pub const HSEMOTION_LABELS: [EmotionLabel; 8] = [
    EmotionLabel::Angry,
    EmotionLabel::Disgusted,
    EmotionLabel::Scared,
    EmotionLabel::Happy,
    EmotionLabel::Sad,
    EmotionLabel::Surprised,
    EmotionLabel::Neutral,
    EmotionLabel::Disgusted,
];

/// Plays back a prepared list of classifier results, one per call.
///
/// Script format is JSON lines: each line is either a map of label to score
/// (`{"happy": 0.9, "sad": 0.05}`) or `null` for "no face". Blank lines and
/// lines starting with `#` are skipped. A line that fails to parse is kept as
/// an error and reported when its turn comes, like a classifier glitch would be.
pub struct ScriptedClassifier {
    script: VecDeque<Result<Option<ExpressionSample>>>,
    /// Replays from the start once exhausted
    looping: bool,
    original: Vec<String>,
}

impl ScriptedClassifier {
    pub fn new(samples: Vec<Option<ExpressionSample>>) -> Self {
        let original = samples
            .iter()
            .map(|s| serde_json::to_string(s).unwrap_or_else(|_| "null".to_string()))
            .collect();
        Self {
            script: samples.into_iter().map(Ok).collect(),
            looping: false,
            original,
        }
    }

    /// Parses a JSON-lines script
    pub fn from_json_lines(content: &str) -> Self {
        let original: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        let script = original.iter().map(|line| parse_line(line)).collect();
        Self {
            script,
            looping: false,
            original,
        }
    }

    /// Loads a JSON-lines script from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let classifier = Self::from_json_lines(&content);
        info!(
            "Loaded {} scripted samples from {:?}",
            classifier.remaining(),
            path
        );
        Ok(classifier)
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn rewind(&mut self) {
        self.script = self.original.iter().map(|line| parse_line(line)).collect();
    }
}

fn parse_line(line: &str) -> Result<Option<ExpressionSample>> {
    serde_json::from_str::<Option<ExpressionSample>>(line).map_err(BoothError::from)
}

impl ExpressionClassifier for ScriptedClassifier {
    fn classify(&mut self, _frame: &Frame) -> Result<Option<ExpressionSample>> {
        if self.script.is_empty() && self.looping && !self.original.is_empty() {
            self.rewind();
        }
        match self.script.pop_front() {
            Some(Ok(sample)) => Ok(sample),
            Some(Err(e)) => {
                warn!("Scripted sample could not be parsed: {}", e);
                Err(BoothError::Classification(e.to_string()))
            }
            // An exhausted script behaves like an empty booth
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> Frame {
        Frame::new(vec![0; 3], 1, 1)
    }

    #[test]
    fn script_replays_in_order() {
        let mut classifier = ScriptedClassifier::from_json_lines(
            "# warm-up\n{\"happy\": 0.9}\n\nnull\n{\"sad\": 0.2, \"angry\": 0.8}\n",
        );
        assert_eq!(classifier.remaining(), 3);

        let first = classifier.classify(&blank()).unwrap().unwrap();
        assert_eq!(first.dominant(), Some((EmotionLabel::Happy, 0.9)));
        assert!(classifier.classify(&blank()).unwrap().is_none());
        let third = classifier.classify(&blank()).unwrap().unwrap();
        assert_eq!(third.scores()[0].0, EmotionLabel::Sad);
        assert!(classifier.classify(&blank()).unwrap().is_none());
    }

    #[test]
    fn bad_line_surfaces_as_classification_error() {
        let mut classifier = ScriptedClassifier::from_json_lines("{\"bored\": 0.9}\n{\"happy\": 1.0}");
        assert!(matches!(
            classifier.classify(&blank()),
            Err(BoothError::Classification(_))
        ));
        assert!(classifier.classify(&blank()).unwrap().is_some());
    }

    #[test]
    fn looping_script_rewinds() {
        let mut classifier =
            ScriptedClassifier::new(vec![Some(ExpressionSample::new(vec![(EmotionLabel::Sad, 0.7)]))])
                .looping(true);
        for _ in 0..3 {
            let sample = classifier.classify(&blank()).unwrap().unwrap();
            assert_eq!(sample.dominant().map(|(l, _)| l), Some(EmotionLabel::Sad));
        }
    }

    #[test]
    fn hsemotion_logits_fold_contempt_into_disgusted() {
        let logits = [0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0];
        let sample = ExpressionSample::from_logits(&HSEMOTION_LABELS, &logits);
        assert_eq!(sample.scores().len(), 7);
        assert_eq!(sample.dominant().map(|(l, _)| l), Some(EmotionLabel::Disgusted));
    }
}
