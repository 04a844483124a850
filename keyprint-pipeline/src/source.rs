//! The decoder seam

use keyprint_core::DecodedFrame;

/// A stream of decoded keyframes.
///
/// Frames must come out with strictly increasing frame numbers. Returning
/// `Ok(None)` means end of stream; an `Err` aborts the whole run.
pub trait FrameSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Width and height of the selected video stream
    fn dimensions(&self) -> (u32, u32);

    fn next_keyframe(&mut self) -> Result<Option<DecodedFrame>, Self::Error>;
}
