// Collage geometry: where each shot and its label go, and which part of the source is kept

use crate::config::{Arrangement, LayoutParams};
use crate::error::{BoothError, Result};
use crate::font;

/// Largest canvas side either output format can store (JPEG keeps dimensions as u16)
pub const MAX_CANVAS_SIDE: u32 = u16::MAX as u32;

/// Upper bound on the RGB canvas buffer, the same 512 MiB `image` allows decoders by default
pub const MAX_CANVAS_BYTES: u64 = 512 * 1024 * 1024;

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

/// Placement of a single shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPlacement {
    /// Where the cropped and scaled image is drawn
    pub image: Rect,
    /// Center point of the label text
    pub label_anchor: (u32, u32),
}

/// Deterministic layout for `n` shots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollageLayout {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub label_band: u32,
    pub cells: Vec<CellPlacement>,
}

impl CollageLayout {
    /// Computes the layout for `count` shots.
    ///
    /// Fails with `CompositionFailed` when the canvas would not fit in `u32` pixel
    /// coordinates, `MAX_CANVAS_SIDE` or `MAX_CANVAS_BYTES`.
    pub fn compute(count: usize, params: &LayoutParams) -> Result<Self> {
        let w = params.cell_width;
        let h = params.cell_height;
        let p = params.padding;
        let too_large = || {
            BoothError::CompositionFailed(format!(
                "{count} cells of {w}x{h} with padding {p} do not fit on one canvas"
            ))
        };

        let label_band = label_band_height(params).ok_or_else(too_large)?;
        let col_stride = w.checked_add(p).ok_or_else(too_large)?;
        let row_stride = h
            .checked_add(label_band)
            .and_then(|v| v.checked_add(p))
            .ok_or_else(too_large)?;
        let count = u32::try_from(count).map_err(|_| too_large())?;

        let (columns, rows): (u32, u32) = match params.arrangement {
            Arrangement::Grid => (2, count.div_ceil(2)),
            Arrangement::Stack => (1, count),
        };
        let canvas_width = columns
            .checked_mul(col_stride)
            .and_then(|v| v.checked_add(p))
            .ok_or_else(too_large)?;
        let canvas_height = rows
            .checked_mul(row_stride)
            .and_then(|v| v.checked_add(p))
            .ok_or_else(too_large)?;
        let canvas_bytes = canvas_width as u64 * canvas_height as u64 * 3;
        if canvas_width > MAX_CANVAS_SIDE
            || canvas_height > MAX_CANVAS_SIDE
            || canvas_bytes > MAX_CANVAS_BYTES
        {
            return Err(BoothError::CompositionFailed(format!(
                "{count} cells need a {canvas_width}x{canvas_height} canvas, larger than allowed"
            )));
        }

        // Every cell lies inside the canvas, so the offsets below cannot overflow
        let cells = (0..count)
            .map(|i| {
                let (col, row) = match params.arrangement {
                    Arrangement::Grid => (i % 2, i / 2),
                    Arrangement::Stack => (0, i),
                };
                let image = Rect::new(p + col * col_stride, p + row * row_stride, w, h);
                let label_anchor = (image.x + w / 2, image.y + h + label_band / 2);
                CellPlacement {
                    image,
                    label_anchor,
                }
            })
            .collect();

        Ok(Self {
            canvas_width,
            canvas_height,
            label_band,
            cells,
        })
    }
}

/// Height of the strip below each image reserved for its label, `None` on overflow
pub fn label_band_height(params: &LayoutParams) -> Option<u32> {
    let text = font::GLYPH_ROWS.checked_mul(params.label_scale)?;
    let gap = params.label_scale.checked_mul(2)?;
    let outline = params.label_outline.checked_mul(2)?;
    text.checked_add(gap)?.checked_add(outline)
}

/// Centered crop of a `src_w x src_h` source matching the aspect ratio of `dst_w x dst_h`.
/// Only one dimension is ever cut; the result is never wider or taller than the source.
pub fn center_crop(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Rect {
    let source_aspect = src_w as f64 / src_h as f64;
    let target_aspect = dst_w as f64 / dst_h as f64;

    if source_aspect > target_aspect {
        let width = ((src_h as f64 * target_aspect).round() as u32).clamp(1, src_w);
        Rect::new((src_w - width) / 2, 0, width, src_h)
    } else {
        let height = ((src_w as f64 / target_aspect).round() as u32).clamp(1, src_h);
        Rect::new(0, (src_h - height) / 2, src_w, height)
    }
}
