//! Frame type representing a captured sensor buffer.

use std::time::Instant;

/// Callback that returns a frame's underlying buffer to the driver.
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

/// A single captured frame from the camera.
///
/// A frame has exactly one owner at a time and must hand its buffer back
/// to the driver once. The release runs when the frame is dropped, so
/// every code path that lets go of a frame releases it, including unwinds.
pub struct Frame {
    /// Luma (Y) plane, one byte per pixel.
    luma: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Capture timestamp.
    timestamp: Instant,
    /// Monotonic sequence number assigned by the driver.
    sequence: u64,
    release: Option<ReleaseFn>,
}

impl Frame {
    /// Creates a frame with no release callback.
    pub fn new(luma: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            luma,
            width,
            height,
            timestamp: Instant::now(),
            sequence,
            release: None,
        }
    }

    /// Attaches the callback run when the frame is released.
    pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// Returns the luma plane.
    #[inline]
    pub fn luma_plane(&self) -> &[u8] {
        &self.luma
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// When the frame was captured.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Validates that the luma plane covers the declared dimensions.
    pub fn is_valid(&self) -> bool {
        self.luma.len() >= (self.width as usize) * (self.height as usize)
    }

    /// Releases the frame now.
    pub fn release(self) {}
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("luma_bytes", &self.luma.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(vec![0u8; 640 * 480], 640, 480, 1);

        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert_eq!(frame.sequence(), 1);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_frame_invalid_size() {
        let frame = Frame::new(vec![0u8; 100], 640, 480, 1);
        assert!(!frame.is_valid());
    }

    #[test]
    fn test_release_runs_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let frame = Frame::new(vec![0u8; 4], 2, 2, 7)
            .with_release(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        frame.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_on_unwind() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let frame = Frame::new(vec![0u8; 4], 2, 2, 1).with_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _owned = frame;
            panic!("decoder fault");
        }));

        assert!(result.is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
