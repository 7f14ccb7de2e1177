// Capture sequencing: turns per-tick classification samples into captured shots

use crate::config::{OrderingMode, SequencePolicy};
use crate::error::{BoothError, Result};
use crate::models::{CapturedShot, EmotionLabel, ExpressionSample, Frame};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Anything that can hand over the current video frame
pub trait FrameSource {
    /// Grabs the most recent frame. An error abandons the current capture attempt.
    fn get_frame(&mut self) -> Result<Frame>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn get_frame(&mut self) -> Result<Frame> {
        (**self).get_frame()
    }
}

/// Session lifecycle; moves `Running -> Complete` exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Complete,
}

/// How far the session has progressed through its targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Index of the next required target
    Ordered { cursor: usize },
    /// Targets captured so far, in any order
    FirstMatchAny { satisfied: HashSet<EmotionLabel> },
}

/// Mutable state of one booth session, owned by the sequencer
#[derive(Debug, Clone)]
pub struct SessionState {
    progress: Progress,
    shots: Vec<CapturedShot>,
    phase: Phase,
}

impl SessionState {
    fn new(mode: OrderingMode) -> Self {
        let progress = match mode {
            OrderingMode::Ordered => Progress::Ordered { cursor: 0 },
            OrderingMode::FirstMatchAny => Progress::FirstMatchAny {
                satisfied: HashSet::new(),
            },
        };
        Self {
            progress,
            shots: Vec::new(),
            phase: Phase::Running,
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn shots(&self) -> &[CapturedShot] {
        &self.shots
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
}

/// Why a sample produced no capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoActionReason {
    /// Empty sample or a score outside [0, 1]
    Malformed,
    BelowThreshold,
    /// Dominant emotion is not the one the policy is waiting for
    NotEligible,
    /// Frame source failed; the target stays pending
    CaptureUnavailable,
    /// The session already finished
    SessionComplete,
}

/// Result of feeding one sample to the sequencer
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    NoAction(NoActionReason),
    Captured {
        shot: CapturedShot,
        session_complete: bool,
    },
}

/// Counters kept for observability only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencerStats {
    pub samples: u64,
    pub captures: u64,
    pub malformed: u64,
    pub below_threshold: u64,
    pub not_eligible: u64,
    pub capture_unavailable: u64,
    pub after_complete: u64,
}

impl SequencerStats {
    pub fn rejected(&self) -> u64 {
        self.malformed + self.below_threshold + self.not_eligible
    }

    fn record(&mut self, reason: NoActionReason) {
        match reason {
            NoActionReason::Malformed => self.malformed += 1,
            NoActionReason::BelowThreshold => self.below_threshold += 1,
            NoActionReason::NotEligible => self.not_eligible += 1,
            NoActionReason::CaptureUnavailable => self.capture_unavailable += 1,
            NoActionReason::SessionComplete => self.after_complete += 1,
        }
    }
}

/// The capture state machine for a single session
pub struct CaptureSequencer {
    policy: SequencePolicy,
    state: SessionState,
    stats: SequencerStats,
    mirror: bool,
}

impl CaptureSequencer {
    /// Creates a sequencer for a validated policy
    pub fn new(policy: SequencePolicy) -> Result<Self> {
        policy.validate()?;
        let state = SessionState::new(policy.ordering_mode);
        Ok(Self {
            policy,
            state,
            stats: SequencerStats::default(),
            mirror: false,
        })
    }

    /// Flip captured frames horizontally before storing them
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn policy(&self) -> &SequencePolicy {
        &self.policy
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stats(&self) -> &SequencerStats {
        &self.stats
    }

    pub fn is_complete(&self) -> bool {
        self.state.phase == Phase::Complete
    }

    /// Hands the captured shots over once the session is done
    pub fn into_shots(self) -> Vec<CapturedShot> {
        self.state.shots
    }

    /// Targets that still have to be captured, in policy order
    pub fn pending_targets(&self) -> Vec<EmotionLabel> {
        match &self.state.progress {
            Progress::Ordered { cursor } => self.policy.targets[*cursor..].to_vec(),
            Progress::FirstMatchAny { satisfied } => self
                .policy
                .targets
                .iter()
                .filter(|t| !satisfied.contains(t))
                .copied()
                .collect(),
        }
    }

    /// Processes one classification sample taken at `tick`
    pub fn on_sample(
        &mut self,
        sample: &ExpressionSample,
        tick: u64,
        frames: &mut dyn FrameSource,
    ) -> SequencerEvent {
        self.stats.samples += 1;
        match self.try_capture(sample, tick, frames) {
            Ok(shot) => {
                self.stats.captures += 1;
                let session_complete = self.state.phase == Phase::Complete;
                SequencerEvent::Captured {
                    shot,
                    session_complete,
                }
            }
            Err(reason) => {
                self.stats.record(reason);
                SequencerEvent::NoAction(reason)
            }
        }
    }

    fn try_capture(
        &mut self,
        sample: &ExpressionSample,
        tick: u64,
        frames: &mut dyn FrameSource,
    ) -> std::result::Result<CapturedShot, NoActionReason> {
        if self.state.phase == Phase::Complete {
            return Err(NoActionReason::SessionComplete);
        }
        if sample.is_malformed() {
            debug!("tick {}: malformed sample ignored", tick);
            return Err(NoActionReason::Malformed);
        }
        let (dominant, score) = sample.dominant().ok_or(NoActionReason::Malformed)?;

        if score <= self.policy.confidence_threshold {
            debug!(
                "tick {}: {} at {:.2} not above threshold {:.2}",
                tick, dominant, score, self.policy.confidence_threshold
            );
            return Err(NoActionReason::BelowThreshold);
        }

        if !self.is_eligible(dominant) {
            debug!("tick {}: {} not eligible", tick, dominant);
            return Err(NoActionReason::NotEligible);
        }

        let image = match self.grab_frame(frames) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("tick {}: capture of {} abandoned: {}", tick, dominant, e);
                return Err(NoActionReason::CaptureUnavailable);
            }
        };

        let shot = CapturedShot {
            label: dominant,
            image,
            captured_at_tick: tick,
        };
        self.state.shots.push(shot.clone());
        match &mut self.state.progress {
            Progress::Ordered { cursor } => *cursor += 1,
            Progress::FirstMatchAny { satisfied } => {
                satisfied.insert(dominant);
            }
        }
        info!(
            "Captured {} at tick {} ({}/{})",
            dominant,
            tick,
            self.state.shots.len(),
            self.policy.targets.len()
        );

        if self.state.shots.len() == self.policy.targets.len() {
            self.state.phase = Phase::Complete;
            info!("All {} targets captured, session complete", self.policy.targets.len());
        }
        Ok(shot)
    }

    fn is_eligible(&self, dominant: EmotionLabel) -> bool {
        match &self.state.progress {
            Progress::Ordered { cursor } => self.policy.targets.get(*cursor) == Some(&dominant),
            Progress::FirstMatchAny { satisfied } => {
                self.policy.targets.contains(&dominant) && !satisfied.contains(&dominant)
            }
        }
    }

    fn grab_frame(&self, frames: &mut dyn FrameSource) -> Result<Frame> {
        let frame = frames.get_frame()?;
        frame
            .validate()
            .map_err(|e| BoothError::CaptureUnavailable(e.to_string()))?;
        if self.mirror {
            frame.mirrored()
        } else {
            Ok(frame)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EmotionLabel::*;

    /// Returns a 2x1 frame whose first byte encodes the call number
    struct CountingSource {
        calls: u8,
        fail_next: bool,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: 0,
                fail_next: false,
            }
        }
    }

    impl FrameSource for CountingSource {
        fn get_frame(&mut self) -> Result<Frame> {
            if std::mem::take(&mut self.fail_next) {
                return Err(BoothError::CaptureUnavailable("camera busy".into()));
            }
            self.calls += 1;
            Ok(Frame::new(vec![self.calls, 0, 0, 9, 9, 9], 2, 1))
        }
    }

    fn sample(pairs: &[(EmotionLabel, f32)]) -> ExpressionSample {
        ExpressionSample::new(pairs.to_vec())
    }

    fn ordered_policy() -> SequencePolicy {
        SequencePolicy {
            targets: vec![Happy, Angry, Surprised, Sad],
            confidence_threshold: 0.6,
            poll_interval_ms: 250,
            ordering_mode: OrderingMode::Ordered,
        }
    }

    fn labels(sequencer: &CaptureSequencer) -> Vec<EmotionLabel> {
        sequencer.state().shots().iter().map(|s| s.label).collect()
    }

    #[test]
    fn ordered_walkthrough() {
        let mut seq = CaptureSequencer::new(ordered_policy()).unwrap();
        let mut source = CountingSource::new();

        let feed = [
            (vec![(Happy, 0.9)], true),
            (vec![(Angry, 0.3)], false),
            (vec![(Angry, 0.75)], true),
            (vec![(Sad, 0.95)], false),
            (vec![(Surprised, 0.8)], true),
        ];
        for (tick, (pairs, expect_capture)) in feed.iter().enumerate() {
            let event = seq.on_sample(&sample(pairs), tick as u64, &mut source);
            assert_eq!(
                matches!(event, SequencerEvent::Captured { session_complete: false, .. }),
                *expect_capture,
                "tick {tick}"
            );
            assert!(!seq.is_complete());
        }
        assert_eq!(seq.state().progress(), &Progress::Ordered { cursor: 3 });

        match seq.on_sample(&sample(&[(Sad, 0.9)]), 5, &mut source) {
            SequencerEvent::Captured {
                shot,
                session_complete,
            } => {
                assert!(session_complete);
                assert_eq!(shot.label, Sad);
                assert_eq!(shot.captured_at_tick, 5);
            }
            other => panic!("expected capture, got {other:?}"),
        }
        assert_eq!(labels(&seq), vec![Happy, Angry, Surprised, Sad]);
        assert_eq!(seq.state().phase(), Phase::Complete);
        assert_eq!(seq.stats().below_threshold, 1);
        assert_eq!(seq.stats().not_eligible, 1);
    }

    #[test]
    fn threshold_is_strict() {
        let mut seq = CaptureSequencer::new(ordered_policy()).unwrap();
        let event = seq.on_sample(&sample(&[(Happy, 0.6)]), 0, &mut CountingSource::new());
        assert_eq!(event, SequencerEvent::NoAction(NoActionReason::BelowThreshold));
        assert!(seq.state().shots().is_empty());
    }

    #[test]
    fn threshold_checks_top_score_not_target_score() {
        let mut seq = CaptureSequencer::new(ordered_policy()).unwrap();
        // happy is the target but sad dominates
        let event = seq.on_sample(
            &sample(&[(Happy, 0.65), (Sad, 0.7)]),
            0,
            &mut CountingSource::new(),
        );
        assert_eq!(event, SequencerEvent::NoAction(NoActionReason::NotEligible));
    }

    #[test]
    fn first_match_any_accepts_any_unseen_target() {
        let policy = SequencePolicy {
            ordering_mode: OrderingMode::FirstMatchAny,
            ..ordered_policy()
        };
        let mut seq = CaptureSequencer::new(policy).unwrap();
        let mut source = CountingSource::new();

        let feed = [Sad, Sad, Neutral, Happy, Angry, Happy, Surprised];
        let mut completions = 0;
        for (tick, label) in feed.into_iter().enumerate() {
            if let SequencerEvent::Captured {
                session_complete: true,
                ..
            } = seq.on_sample(&sample(&[(label, 0.9)]), tick as u64, &mut source)
            {
                completions += 1;
            }
        }
        assert_eq!(labels(&seq), vec![Sad, Happy, Angry, Surprised]);
        assert_eq!(completions, 1);
        assert_eq!(seq.stats().not_eligible, 3);
    }

    #[test]
    fn frame_failure_leaves_target_pending() {
        let mut seq = CaptureSequencer::new(ordered_policy()).unwrap();
        let mut source = CountingSource::new();
        source.fail_next = true;

        let event = seq.on_sample(&sample(&[(Happy, 0.9)]), 0, &mut source);
        assert_eq!(event, SequencerEvent::NoAction(NoActionReason::CaptureUnavailable));
        assert_eq!(seq.state().progress(), &Progress::Ordered { cursor: 0 });
        assert_eq!(seq.pending_targets(), vec![Happy, Angry, Surprised, Sad]);

        let event = seq.on_sample(&sample(&[(Happy, 0.9)]), 1, &mut source);
        assert!(matches!(event, SequencerEvent::Captured { .. }));
        assert_eq!(seq.stats().capture_unavailable, 1);
    }

    #[test]
    fn malformed_frame_counts_as_unavailable() {
        struct BrokenSource;
        impl FrameSource for BrokenSource {
            fn get_frame(&mut self) -> Result<Frame> {
                Ok(Frame::new(vec![1, 2], 4, 4))
            }
        }
        let mut seq = CaptureSequencer::new(ordered_policy()).unwrap();
        let event = seq.on_sample(&sample(&[(Happy, 0.9)]), 0, &mut BrokenSource);
        assert_eq!(event, SequencerEvent::NoAction(NoActionReason::CaptureUnavailable));
        assert!(seq.state().shots().is_empty());
    }

    #[test]
    fn malformed_samples_are_no_ops() {
        let mut seq = CaptureSequencer::new(ordered_policy()).unwrap();
        let mut source = CountingSource::new();
        for bad in [sample(&[]), sample(&[(Happy, f32::NAN)]), sample(&[(Happy, 2.0)])] {
            assert_eq!(
                seq.on_sample(&bad, 0, &mut source),
                SequencerEvent::NoAction(NoActionReason::Malformed)
            );
        }
        assert_eq!(source.calls, 0);
        assert_eq!(seq.stats().rejected(), 3);
    }

    #[test]
    fn samples_after_completion_are_ignored() {
        let policy = SequencePolicy {
            targets: vec![Happy],
            ..ordered_policy()
        };
        let mut seq = CaptureSequencer::new(policy).unwrap();
        let mut source = CountingSource::new();
        seq.on_sample(&sample(&[(Happy, 0.9)]), 0, &mut source);
        assert!(seq.is_complete());

        let event = seq.on_sample(&sample(&[(Happy, 0.99)]), 1, &mut source);
        assert_eq!(event, SequencerEvent::NoAction(NoActionReason::SessionComplete));
        assert_eq!(seq.into_shots().len(), 1);
    }

    #[test]
    fn mirror_flips_stored_frame() {
        let policy = SequencePolicy {
            targets: vec![Happy],
            ..ordered_policy()
        };
        let mut seq = CaptureSequencer::new(policy).unwrap().with_mirror(true);
        seq.on_sample(&sample(&[(Happy, 0.9)]), 0, &mut CountingSource::new());
        assert_eq!(seq.state().shots()[0].image.data, vec![9, 9, 9, 1, 0, 0]);
    }

    #[test]
    fn invariants_hold_over_noisy_stream() {
        let policy = SequencePolicy {
            confidence_threshold: 0.8,
            ..ordered_policy()
        };
        let mut seq = CaptureSequencer::new(policy.clone()).unwrap();
        let mut source = CountingSource::new();
        let mut complete_events = 0;

        // Deterministic pseudo-random stream over every label
        let mut state: u32 = 12345;
        for tick in 0..2000u64 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let label = EmotionLabel::ALL[(state >> 16) as usize % EmotionLabel::ALL.len()];
            let score = ((state >> 8) % 1000) as f32 / 1000.0;
            let before = seq.state().shots().len();
            let event = seq.on_sample(&sample(&[(label, score)]), tick, &mut source);
            if let SequencerEvent::Captured {
                shot,
                session_complete,
            } = event
            {
                assert!(score > policy.confidence_threshold);
                assert_eq!(shot.label, policy.targets[before]);
                if session_complete {
                    complete_events += 1;
                }
            }
            assert_eq!(
                seq.is_complete(),
                seq.state().shots().len() == policy.targets.len()
            );
        }

        let captured = labels(&seq);
        let unique: HashSet<_> = captured.iter().collect();
        assert_eq!(unique.len(), captured.len());
        assert!(captured.len() <= policy.targets.len());
        assert!(complete_events <= 1);
    }
}
