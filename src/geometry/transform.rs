//! Display transform for sensor-to-screen orientation mismatch.
//!
//! The sensor delivers frames in its native orientation. When the display
//! is rotated by a quarter turn, the preview has to be remapped so that it
//! still covers the whole viewport without distortion.

use super::{OutputSize, ViewSize};
use serde::{Deserialize, Serialize};

/// Display rotation relative to the device's natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Number of clockwise quarter turns (0..=3).
    #[inline]
    pub fn quarter_turns(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 1,
            Rotation::Deg180 => 2,
            Rotation::Deg270 => 3,
        }
    }

    /// Returns true for 90° and 270°.
    #[inline]
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Axis-aligned rectangle in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn from_size(width: f32, height: f32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            right: width,
            bottom: height,
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    /// Moves the rectangle by `(dx, dy)`.
    pub fn offset(&mut self, dx: f32, dy: f32) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }
}

/// 2D affine transform stored as the top two rows of a 3x3 matrix:
/// `x' = sx*x + kx*y + tx`, `y' = ky*x + sy*y + ty`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub sx: f32,
    pub kx: f32,
    pub tx: f32,
    pub ky: f32,
    pub sy: f32,
    pub ty: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub const fn identity() -> Self {
        Self {
            sx: 1.0,
            kx: 0.0,
            tx: 0.0,
            ky: 0.0,
            sy: 1.0,
            ty: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Maps `src` onto `dst`, stretching each axis independently.
    pub fn rect_to_rect(src: &Rect, dst: &Rect) -> Self {
        let sx = dst.width() / src.width();
        let sy = dst.height() / src.height();
        Self {
            sx,
            kx: 0.0,
            tx: dst.left - src.left * sx,
            ky: 0.0,
            sy,
            ty: dst.top - src.top * sy,
        }
    }

    fn translate(dx: f32, dy: f32) -> Self {
        Self {
            tx: dx,
            ty: dy,
            ..Self::identity()
        }
    }

    /// Returns `other ∘ self`: `self` applied first, then `other`.
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            sx: other.sx * self.sx + other.kx * self.ky,
            kx: other.sx * self.kx + other.kx * self.sy,
            tx: other.sx * self.tx + other.kx * self.ty + other.tx,
            ky: other.ky * self.sx + other.sy * self.ky,
            sy: other.ky * self.kx + other.sy * self.sy,
            ty: other.ky * self.tx + other.sy * self.ty + other.ty,
        }
    }

    /// Appends a scale about the pivot `(px, py)`.
    pub fn post_scale(&self, sx: f32, sy: f32, px: f32, py: f32) -> Self {
        let scale = Self {
            sx,
            sy,
            ..Self::identity()
        };
        self.then(&Self::translate(-px, -py))
            .then(&scale)
            .then(&Self::translate(px, py))
    }

    /// Appends a rotation of `degrees` (clockwise in screen space) about the
    /// pivot `(px, py)`.
    pub fn post_rotate(&self, degrees: f32, px: f32, py: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let rotate = Self {
            sx: cos,
            kx: -sin,
            tx: 0.0,
            ky: sin,
            sy: cos,
            ty: 0.0,
        };
        self.then(&Self::translate(-px, -py))
            .then(&rotate)
            .then(&Self::translate(px, py))
    }

    /// Applies the transform to a point.
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.sx * x + self.kx * y + self.tx,
            self.ky * x + self.sy * y + self.ty,
        )
    }
}

/// Result of [`compute_transform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    /// Matrix to apply to the preview surface.
    pub matrix: Transform,
    /// Uniform fill scale applied about the view center (1.0 when unrotated).
    pub scale: f32,
    /// Rotation applied about the view center, in degrees.
    pub degrees: f32,
}

impl DisplayTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Transform::identity(),
            scale: 1.0,
            degrees: 0.0,
        }
    }
}

/// Computes the preview transform for the current display rotation.
///
/// Only quarter turns need correction; every other rotation yields the
/// identity.
pub fn compute_transform(view: ViewSize, output: OutputSize, rotation: Rotation) -> DisplayTransform {
    if !rotation.is_quarter_turn() || view.width == 0 || view.height == 0 {
        return DisplayTransform::identity();
    }

    let view_rect = Rect::from_size(view.width as f32, view.height as f32);
    let mut buffer_rect = Rect::from_size(output.height as f32, output.width as f32);
    let (cx, cy) = view_rect.center();
    let (bx, by) = buffer_rect.center();
    buffer_rect.offset(cx - bx, cy - by);

    let scale = f32::max(
        view.height as f32 / output.height.max(1) as f32,
        view.width as f32 / output.width.max(1) as f32,
    );
    let degrees = (90 * (rotation.quarter_turns() - 2)) as f32;

    let matrix = Transform::rect_to_rect(&view_rect, &buffer_rect)
        .post_scale(scale, scale, cx, cy)
        .post_rotate(degrees, cx, cy);

    tracing::debug!(
        view_width = view.width,
        view_height = view.height,
        output_width = output.width,
        output_height = output.height,
        scale,
        degrees,
        "Computed preview transform"
    );

    DisplayTransform {
        matrix,
        scale,
        degrees,
    }
}
