//! UI-space to pixel-space region mapping
//!
//! The annotation canvas is always 600x400 units regardless of the
//! uploaded image's real size; every selection is expressed in those units.

use serde::{Deserialize, Serialize};

use crate::error::{AnnotatorError, Result};

/// Width of the normalized annotation canvas
pub const CANVAS_WIDTH: f64 = 600.0;
/// Height of the normalized annotation canvas
pub const CANVAS_HEIGHT: f64 = 400.0;

/// A selection rectangle in canvas units.
///
/// Width and height may be negative when the user dragged up or left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Absolute pixel box: left/top inclusive, right/bottom exclusive.
///
/// Coordinates are signed and unclamped, so a selection hanging off the
/// canvas yields a box that extends past the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(AnnotatorError::validation(
                "region_coordinates must be finite numbers",
            ));
        }
        Ok(())
    }

    /// Map onto an image of `width` x `height` pixels
    pub fn to_pixel_box(&self, width: u32, height: u32) -> PixelBox {
        let mut sx = self.x / CANVAS_WIDTH;
        let mut sy = self.y / CANVAS_HEIGHT;
        let mut sw = self.width / CANVAS_WIDTH;
        let mut sh = self.height / CANVAS_HEIGHT;

        // negative drag: move the origin back by the overshoot
        if sw < 0.0 {
            sx += sw;
            sw = -sw;
        }
        if sh < 0.0 {
            sy += sh;
            sh = -sh;
        }

        let ow = f64::from(width);
        let oh = f64::from(height);
        PixelBox {
            left: (sx * ow).floor() as i64,
            top: (sy * oh).floor() as i64,
            right: ((sx + sw) * ow).floor() as i64,
            bottom: ((sy + sh) * oh).floor() as i64,
        }
    }
}

impl PixelBox {
    /// Horizontal span in pixels, zero if inverted
    pub fn width(&self) -> i64 {
        self.right.saturating_sub(self.left).max(0)
    }

    /// Vertical span in pixels, zero if inverted
    pub fn height(&self) -> i64 {
        self.bottom.saturating_sub(self.top).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Pixel dimensions, or `None` when either side does not fit in a `u32`
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((u32::try_from(self.width()).ok()?, u32::try_from(self.height()).ok()?))
    }

    /// Number of pixels covered
    pub fn area(&self) -> u128 {
        self.width() as u128 * self.height() as u128
    }
}
