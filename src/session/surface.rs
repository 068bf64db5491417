//! Rendering surface the preview is drawn on.

use crate::geometry::{DisplayTransform, Rotation, ViewSize};
use std::sync::{Arc, Mutex, PoisonError};

/// The display side of the preview.
///
/// Owned by the control context. A surface that is not ready at start
/// reports readiness later through a surface event on the scanner handle;
/// from then on it is treated as ready, with the size that event carried.
pub trait PreviewSurface: Send {
    /// True once the surface can receive preview buffers.
    fn is_available(&self) -> bool;

    /// Current viewport size.
    fn viewport(&self) -> ViewSize;

    /// Current display rotation.
    fn rotation(&self) -> Rotation;

    /// Applies the preview transform.
    fn set_transform(&mut self, transform: &DisplayTransform);

    /// Tells the view which aspect ratio to lay itself out with.
    fn set_aspect_ratio(&mut self, width: u32, height: u32);
}

/// What a [`HeadlessSurface`] was last told.
#[derive(Debug, Clone, Default)]
pub struct SurfaceRecord {
    pub transform: Option<DisplayTransform>,
    pub aspect_ratio: Option<(u32, u32)>,
    pub transforms_applied: u32,
}

/// Surface without a display, for tests and the demo binary.
///
/// Records what the scanner applies so it can be inspected through
/// [`HeadlessSurface::record`] after the surface was handed over.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    available: bool,
    viewport: ViewSize,
    rotation: Rotation,
    record: Arc<Mutex<SurfaceRecord>>,
}

impl HeadlessSurface {
    pub fn new(viewport: ViewSize, rotation: Rotation) -> Self {
        Self {
            available: true,
            viewport,
            rotation,
            record: Arc::default(),
        }
    }

    /// A surface that is not ready yet.
    pub fn unavailable(viewport: ViewSize, rotation: Rotation) -> Self {
        Self {
            available: false,
            ..Self::new(viewport, rotation)
        }
    }

    /// Shared view of what has been applied to this surface.
    pub fn record(&self) -> Arc<Mutex<SurfaceRecord>> {
        Arc::clone(&self.record)
    }

    fn with_record(&self, f: impl FnOnce(&mut SurfaceRecord)) {
        f(&mut self.record.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl PreviewSurface for HeadlessSurface {
    fn is_available(&self) -> bool {
        self.available
    }

    fn viewport(&self) -> ViewSize {
        self.viewport
    }

    fn rotation(&self) -> Rotation {
        self.rotation
    }

    fn set_transform(&mut self, transform: &DisplayTransform) {
        self.with_record(|r| {
            r.transform = Some(*transform);
            r.transforms_applied += 1;
        });
    }

    fn set_aspect_ratio(&mut self, width: u32, height: u32) {
        self.with_record(|r| r.aspect_ratio = Some((width, height)));
    }
}
