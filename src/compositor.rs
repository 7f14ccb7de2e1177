// Collage compositing: crops, scales and labels captured shots onto one canvas

use crate::config::{LayoutParams, OutputFormat};
use crate::error::{BoothError, Result};
use crate::font;
use crate::layout::{center_crop, CellPlacement, CollageLayout};
use crate::models::CapturedShot;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::io::Cursor;
use tracing::{debug, error};

/// A finished collage, encoded and ready for export
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

/// Renders the collage for a completed session
pub struct CollageCompositor {
    params: LayoutParams,
}

impl CollageCompositor {
    pub fn new(params: LayoutParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Layout the given number of shots would use
    pub fn layout_for(&self, count: usize) -> Result<CollageLayout> {
        CollageLayout::compute(count, &self.params)
    }

    /// Renders and encodes the collage in the configured output format
    pub fn compose(&self, shots: &[CapturedShot]) -> Result<EncodedImage> {
        let canvas = self.render(shots)?;
        let format = self.params.output_format;
        let (width, height) = canvas.dimensions();

        let mut bytes = Cursor::new(Vec::new());
        canvas
            .write_to(&mut bytes, format.image_format())
            .map_err(|e| {
                error!("Failed to encode collage: {}", e);
                BoothError::CompositionFailed(format!("encoding failed: {e}"))
            })?;

        Ok(EncodedImage {
            bytes: bytes.into_inner(),
            format,
            width,
            height,
        })
    }

    /// Renders the collage without encoding it
    pub fn render(&self, shots: &[CapturedShot]) -> Result<RgbImage> {
        if shots.len() < self.params.minimum_count {
            return Err(BoothError::CompositionRefused {
                available: shots.len(),
                required: self.params.minimum_count,
            });
        }

        // Decode every shot first so a bad buffer never yields a partial collage
        let sources = shots
            .iter()
            .map(|shot| {
                shot.image.to_rgb_image().map_err(|e| {
                    error!("Shot {} has a malformed image: {}", shot.label, e);
                    e
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let layout = self.layout_for(shots.len()).map_err(|e| {
            error!("Collage layout failed: {}", e);
            e
        })?;
        let mut canvas = RgbImage::from_pixel(
            layout.canvas_width,
            layout.canvas_height,
            Rgb(self.params.background),
        );
        debug!(
            "Composing {} shots onto {}x{} canvas",
            shots.len(),
            layout.canvas_width,
            layout.canvas_height
        );

        for ((shot, source), cell) in shots.iter().zip(&sources).zip(&layout.cells) {
            let fitted = fit_to_cell(source, cell.image.width, cell.image.height);
            imageops::replace(&mut canvas, &fitted, cell.image.x as i64, cell.image.y as i64);
            self.draw_label(&mut canvas, cell, self.params.glyph_for(shot.label));
        }

        Ok(canvas)
    }

    fn draw_label(&self, canvas: &mut RgbImage, cell: &CellPlacement, text: &str) {
        let scale = self.params.label_scale;
        let (text_w, text_h) = font::text_size(text, scale);
        let (anchor_x, anchor_y) = cell.label_anchor;
        font::draw_outlined_text(
            canvas,
            text,
            anchor_x as i64 - (text_w / 2) as i64,
            anchor_y as i64 - (text_h / 2) as i64,
            scale,
            self.params.label_outline,
            Rgb(self.params.label_fill),
            Rgb(self.params.label_outline_color),
        );
    }
}

/// Center-crops `source` to the cell's aspect ratio, then scales it to exactly `width x height`
pub fn fit_to_cell(source: &RgbImage, width: u32, height: u32) -> RgbImage {
    let crop = center_crop(source.width(), source.height(), width, height);
    let cropped = imageops::crop_imm(source, crop.x, crop.y, crop.width, crop.height).to_image();
    if cropped.dimensions() == (width, height) {
        return cropped;
    }
    imageops::resize(&cropped, width, height, FilterType::Triangle)
}
