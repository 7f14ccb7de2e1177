// Image store: still-image frame sources for replays and the collage exporter

use crate::compositor::EncodedImage;
use crate::error::{BoothError, Result};
use crate::models::Frame;
use crate::sequencer::FrameSource;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Extensions picked up from a frames directory, in priority order
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Decodes an image file into an RGB frame
pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<Frame> {
    let img = image::open(path.as_ref()).map_err(|e| {
        BoothError::CaptureUnavailable(format!(
            "Failed to load image from {:?}: {}",
            path.as_ref(),
            e
        ))
    })?;
    Ok(Frame::from(img.to_rgb8()))
}

/// Serves the same frame on every call
pub struct StillFrameSource {
    frame: Frame,
}

impl StillFrameSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(load_frame(path)?))
    }
}

impl FrameSource for StillFrameSource {
    fn get_frame(&mut self) -> Result<Frame> {
        Ok(self.frame.clone())
    }
}

/// Cycles through the image files of a directory in file-name order
pub struct ImageDirSource {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageDirSource {
    /// Scans `dir` for png/jpg/jpeg files; hidden files are skipped
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            BoothError::Config(format!("Failed to read frames directory {dir:?}: {e}"))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_image_file(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(BoothError::Config(format!(
                "No png/jpg images found in {dir:?}"
            )));
        }
        info!("Replaying {} frames from {:?}", paths.len(), dir);
        Ok(Self { paths, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn is_image_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(true);
    let supported = path
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false);
    !hidden && supported
}

impl FrameSource for ImageDirSource {
    fn get_frame(&mut self) -> Result<Frame> {
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();
        load_frame(path).map_err(|e| {
            warn!("Skipping unreadable frame {:?}", path);
            e
        })
    }
}

/// Destination for the finished collage
pub trait ImageExport {
    fn export(&mut self, image: &EncodedImage, suggested_name: &str) -> Result<()>;
}

/// Writes exported images into a directory
pub struct DirectoryExporter {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectoryExporter {
    /// Creates the directory if it does not exist yet
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    /// Files written so far
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ImageExport for DirectoryExporter {
    fn export(&mut self, image: &EncodedImage, suggested_name: &str) -> Result<()> {
        let file_name = Path::new(suggested_name)
            .file_name()
            .ok_or_else(|| BoothError::Export(format!("unusable file name {suggested_name:?}")))?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, &image.bytes)
            .map_err(|e| BoothError::Export(format!("Failed to write {path:?}: {e}")))?;
        info!(
            "Exported {}x{} collage to {:?}",
            image.width, image.height, path
        );
        self.written.push(path);
        Ok(())
    }
}

/// `<prefix>-<unix seconds>.<ext>`
pub fn suggested_name(prefix: &str, image: &EncodedImage) -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{prefix}-{stamp}.{}", image.format.extension())
}
