// Library exports for the emotion photo booth

pub mod booth;
#[cfg(feature = "camera")]
pub mod camera;
pub mod compositor;
pub mod config;
pub mod emotion;
pub mod error;
pub mod font;
pub mod image_store;
pub mod layout;
pub mod models;
pub mod sequencer;

pub use booth::{PhotoBooth, SessionOutcome};
pub use compositor::{CollageCompositor, EncodedImage};
pub use config::{Arrangement, BoothConfig, LayoutParams, OrderingMode, OutputFormat, SequencePolicy};
pub use emotion::ExpressionClassifier;
pub use error::{BoothError, Result};
pub use image_store::ImageExport;
pub use models::{CapturedShot, EmotionLabel, ExpressionSample, Frame};
pub use sequencer::{CaptureSequencer, FrameSource, SequencerEvent};
