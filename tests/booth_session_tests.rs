//! End-to-end booth sessions over scripted collaborators
//!
//! Time is paused so poll ticks advance deterministically.

use emotion_photo_booth::booth::{PhotoBooth, SessionOutcome};
use emotion_photo_booth::config::{BoothConfig, OrderingMode};
use emotion_photo_booth::emotion::ScriptedClassifier;
use emotion_photo_booth::error::{BoothError, Result};
use emotion_photo_booth::image_store::{DirectoryExporter, StillFrameSource};
use emotion_photo_booth::models::{EmotionLabel, Frame};
use emotion_photo_booth::sequencer::{FrameSource, NoActionReason, SequencerEvent};
use image::{Rgb, RgbImage};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use EmotionLabel::*;

fn still_frames() -> StillFrameSource {
    StillFrameSource::new(Frame::from(RgbImage::from_pixel(64, 48, Rgb([10, 120, 200]))))
}

const ORDERED_SCRIPT: &str = r#"
{"happy": 0.9}
{"angry": 0.3}
{"angry": 0.75}
{"sad": 0.95}
{"surprised": 0.8}
{"sad": 0.9}
"#;

#[tokio::test(start_paused = true)]
async fn ordered_session_completes_and_exports() {
    let out = tempfile::tempdir().unwrap();
    let config = BoothConfig::default();
    let exporter = DirectoryExporter::new(out.path()).unwrap();
    let booth = PhotoBooth::new(
        &config,
        still_frames(),
        ScriptedClassifier::from_json_lines(ORDERED_SCRIPT),
        exporter,
    )
    .unwrap();

    let outcome = booth.run(CancellationToken::new()).await.unwrap();
    match outcome {
        SessionOutcome::Completed {
            shots,
            collage,
            exported_as,
            stats,
        } => {
            let labels: Vec<_> = shots.iter().map(|s| s.label).collect();
            assert_eq!(labels, vec![Happy, Angry, Surprised, Sad]);
            assert_eq!(
                shots.iter().map(|s| s.captured_at_tick).collect::<Vec<_>>(),
                vec![0, 2, 4, 5]
            );
            assert_eq!(stats.samples, 6);
            assert_eq!(stats.below_threshold, 1);
            assert_eq!(stats.not_eligible, 1);

            let written = std::fs::read(out.path().join(&exported_as)).unwrap();
            assert_eq!(written, collage.bytes);
            let decoded = image::load_from_memory(&written).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (collage.width, collage.height));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unordered_session_follows_discovery_order() {
    let out = tempfile::tempdir().unwrap();
    let mut config = BoothConfig::default();
    config.policy.ordering_mode = OrderingMode::FirstMatchAny;
    config.policy.confidence_threshold = 0.8;

    let script = r#"
        {"sad": 0.85}
        {"neutral": 0.99}
        {"sad": 0.95}
        {"surprised": 0.79}
        {"surprised": 0.81}
        {"happy": 0.9}
        {"angry": 0.88}
    "#;
    let booth = PhotoBooth::new(
        &config,
        still_frames(),
        ScriptedClassifier::from_json_lines(script),
        DirectoryExporter::new(out.path()).unwrap(),
    )
    .unwrap();

    match booth.run(CancellationToken::new()).await.unwrap() {
        SessionOutcome::Completed { shots, .. } => {
            let labels: Vec<_> = shots.iter().map(|s| s.label).collect();
            assert_eq!(labels, vec![Sad, Surprised, Happy, Angry]);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_an_unfinished_session() {
    let out = tempfile::tempdir().unwrap();
    let config = BoothConfig::default();
    let booth = PhotoBooth::new(
        &config,
        still_frames(),
        ScriptedClassifier::from_json_lines("{\"happy\": 0.9}\n{\"sad\": 0.9}"),
        DirectoryExporter::new(out.path()).unwrap(),
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    match booth.run(cancel).await.unwrap() {
        SessionOutcome::Cancelled { shots_taken, stats } => {
            assert_eq!(shots_taken, 1);
            assert!(stats.samples >= 2);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

/// Fails the first grab outright and serves a truncated frame on the second
struct FlakyFrames {
    calls: u32,
}

impl FrameSource for FlakyFrames {
    fn get_frame(&mut self) -> Result<Frame> {
        self.calls += 1;
        match self.calls {
            1 => Err(BoothError::CaptureUnavailable("usb hiccup".into())),
            2 => Ok(Frame::new(vec![0; 5], 8, 8)),
            _ => Ok(Frame::from(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])))),
        }
    }
}

#[test]
fn failed_capture_is_retried_on_a_later_tick() {
    let out = tempfile::tempdir().unwrap();
    let config = BoothConfig::default();
    let mut booth = PhotoBooth::new(
        &config,
        FlakyFrames { calls: 0 },
        ScriptedClassifier::from_json_lines("{\"happy\": 0.9}\n{\"happy\": 0.9}"),
        DirectoryExporter::new(out.path()).unwrap(),
    )
    .unwrap();

    // no frame at all: nothing is classified
    assert_eq!(
        booth.poll_once(),
        SequencerEvent::NoAction(NoActionReason::CaptureUnavailable)
    );
    assert_eq!(booth.sequencer().stats().samples, 0);

    // a decisive sample on a broken frame is not stored
    assert_eq!(
        booth.poll_once(),
        SequencerEvent::NoAction(NoActionReason::CaptureUnavailable)
    );
    assert!(booth.sequencer().state().shots().is_empty());
    assert_eq!(booth.sequencer().pending_targets()[0], Happy);

    match booth.poll_once() {
        SequencerEvent::Captured { shot, .. } => {
            assert_eq!(shot.label, Happy);
            assert_eq!(shot.captured_at_tick, 2);
        }
        other => panic!("expected retry to capture, got {other:?}"),
    }
    assert_eq!(booth.sequencer().stats().capture_unavailable, 1);
}

/// Each grab is a solid frame one shade brighter than the last
struct ShadedFrames {
    calls: u8,
}

impl FrameSource for ShadedFrames {
    fn get_frame(&mut self) -> Result<Frame> {
        self.calls += 1;
        Ok(Frame::from(RgbImage::from_pixel(4, 4, Rgb([self.calls * 40, 0, 0]))))
    }
}

#[test]
fn stored_shot_is_the_classified_frame() {
    let out = tempfile::tempdir().unwrap();
    let config = BoothConfig::default();
    let mut booth = PhotoBooth::new(
        &config,
        ShadedFrames { calls: 0 },
        ScriptedClassifier::from_json_lines("{\"neutral\": 0.9}\n{\"happy\": 0.9}"),
        DirectoryExporter::new(out.path()).unwrap(),
    )
    .unwrap();

    assert_eq!(
        booth.poll_once(),
        SequencerEvent::NoAction(NoActionReason::NotEligible)
    );
    match booth.poll_once() {
        // the second grab was classified as happy; a third grab would be 120
        SequencerEvent::Captured { shot, .. } => assert_eq!(shot.image.data[0], 80),
        other => panic!("expected capture, got {other:?}"),
    }
}

#[test]
fn no_face_and_bad_lines_never_halt_the_session() {
    let out = tempfile::tempdir().unwrap();
    let config = BoothConfig::default();
    let mut booth = PhotoBooth::new(
        &config,
        still_frames(),
        ScriptedClassifier::from_json_lines("null\n{not json}\n{\"happy\": 0.7}"),
        DirectoryExporter::new(out.path()).unwrap(),
    )
    .unwrap();

    assert_eq!(
        booth.poll_once(),
        SequencerEvent::NoAction(NoActionReason::Malformed)
    );
    assert_eq!(
        booth.poll_once(),
        SequencerEvent::NoAction(NoActionReason::Malformed)
    );
    assert!(matches!(booth.poll_once(), SequencerEvent::Captured { .. }));
}
