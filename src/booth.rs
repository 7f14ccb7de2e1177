// Booth session driver: the poll loop tying collaborators, sequencer and compositor together

use crate::compositor::{CollageCompositor, EncodedImage};
use crate::config::BoothConfig;
use crate::emotion::ExpressionClassifier;
use crate::error::{BoothError, Result};
use crate::image_store::{suggested_name, ImageExport};
use crate::models::{CapturedShot, Frame};
use crate::sequencer::{
    CaptureSequencer, FrameSource, NoActionReason, SequencerEvent, SequencerStats,
};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a booth session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Every target was captured and the collage exported
    Completed {
        shots: Vec<CapturedShot>,
        collage: EncodedImage,
        exported_as: String,
        stats: SequencerStats,
    },
    /// Ticking stopped before all targets were captured
    Cancelled {
        shots_taken: usize,
        stats: SequencerStats,
    },
}

/// Serves the frame that was just classified, so the stored shot is the one that was judged
struct ClassifiedFrame(Option<Frame>);

impl FrameSource for ClassifiedFrame {
    fn get_frame(&mut self) -> Result<Frame> {
        self.0.take().ok_or_else(|| {
            BoothError::CaptureUnavailable("classified frame was already captured".into())
        })
    }
}

/// One booth session over concrete collaborators
pub struct PhotoBooth<S, C, E> {
    sequencer: CaptureSequencer,
    compositor: CollageCompositor,
    frames: S,
    classifier: C,
    exporter: E,
    file_prefix: String,
    poll_interval: Duration,
    tick: u64,
}

impl<S, C, E> PhotoBooth<S, C, E>
where
    S: FrameSource,
    C: ExpressionClassifier,
    E: ImageExport,
{
    /// Builds a session from validated configuration
    pub fn new(config: &BoothConfig, frames: S, classifier: C, exporter: E) -> Result<Self> {
        config.validate()?;
        let sequencer =
            CaptureSequencer::new(config.policy.clone())?.with_mirror(config.capture.mirror);
        let compositor = CollageCompositor::new(config.layout.clone())?;
        Ok(Self {
            sequencer,
            compositor,
            frames,
            classifier,
            exporter,
            file_prefix: config.output.file_prefix.clone(),
            poll_interval: config.policy.poll_interval(),
            tick: 0,
        })
    }

    pub fn sequencer(&self) -> &CaptureSequencer {
        &self.sequencer
    }

    /// Runs one poll tick: grab, classify, decide. Never fails; problems are logged.
    pub fn poll_once(&mut self) -> SequencerEvent {
        let tick = self.tick;
        self.tick += 1;

        let frame = match self.frames.get_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("tick {}: no frame to classify: {}", tick, e);
                return SequencerEvent::NoAction(NoActionReason::CaptureUnavailable);
            }
        };

        let sample = match self.classifier.classify(&frame) {
            Ok(Some(sample)) => sample,
            // No face and classifier glitches reach the sequencer as empty samples
            Ok(None) => {
                debug!("tick {}: no face", tick);
                Default::default()
            }
            Err(e) => {
                warn!("tick {}: classification failed: {}", tick, e);
                Default::default()
            }
        };

        self.sequencer.on_sample(&sample, tick, &mut ClassifiedFrame(Some(frame)))
    }

    /// Polls until every target is captured or `cancel` fires, then composes and exports.
    ///
    /// Ticks are strictly serialized; a tick that comes due while the previous one is
    /// still running is skipped rather than queued.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SessionOutcome> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Booth session started: targets {:?}, polling every {:?}",
            self.sequencer.policy().targets,
            self.poll_interval
        );

        while !self.sequencer.is_complete() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once();
                }
                _ = cancel.cancelled() => {
                    let stats = self.sequencer.stats().clone();
                    info!(
                        "Booth session cancelled after {} captures",
                        self.sequencer.state().shots().len()
                    );
                    return Ok(SessionOutcome::Cancelled {
                        shots_taken: self.sequencer.state().shots().len(),
                        stats,
                    });
                }
            }
        }

        let stats = self.sequencer.stats().clone();
        info!(
            "Session finished: {} samples, {} captures, {} rejected, {} capture failures",
            stats.samples,
            stats.captures,
            stats.rejected(),
            stats.capture_unavailable
        );

        let shots = self.sequencer.into_shots();
        let collage = self.compositor.compose(&shots).map_err(|e| {
            error!("Collage composition failed: {}", e);
            e
        })?;
        let name = suggested_name(&self.file_prefix, &collage);
        self.exporter.export(&collage, &name)?;

        Ok(SessionOutcome::Completed {
            shots,
            collage,
            exported_as: name,
            stats,
        })
    }
}
