//! Output resolution selection.

use serde::{Deserialize, Serialize};

/// A sensor output resolution in pixels.
///
/// Chosen once per preview start and kept until the preview is restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

impl OutputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height.
    #[inline]
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Dimensions of the on-screen preview viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewSize {
    pub width: u32,
    pub height: u32,
}

impl ViewSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if the viewport is wider than it is tall.
    #[inline]
    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Aspect ratio the output size should approach: long side over short side.
    pub fn target_aspect(&self) -> f32 {
        let long = self.width.max(self.height) as f32;
        let short = self.width.min(self.height).max(1) as f32;
        long / short
    }
}

/// Chooses the output size closest to `target_aspect` among candidates no
/// wider than `max_width`.
///
/// Ties keep the earliest candidate. When no candidate fits under
/// `max_width` the first candidate is returned, so a choice is always made
/// for a non-empty list. Returns `None` only for an empty list.
pub fn choose_output_size(
    candidates: &[OutputSize],
    target_aspect: f32,
    max_width: u32,
) -> Option<OutputSize> {
    let first = *candidates.first()?;

    let best = candidates
        .iter()
        .filter(|size| size.width <= max_width)
        .fold(None::<(OutputSize, f32)>, |best, &size| {
            let distance = (size.aspect() - target_aspect).abs();
            match best {
                Some((_, best_distance)) if best_distance <= distance => best,
                _ => Some((size, distance)),
            }
        });

    Some(best.map(|(size, _)| size).unwrap_or(first))
}
