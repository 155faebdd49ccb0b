//! Frame acquisition boundary.
//!
//! The polling loop never talks to a screen grabber directly; it asks a
//! [`FrameSource`] for the current pixels of a region. Production code wires
//! in a platform capture backend, tests wire in scripted frames.

use image::RgbaImage;

use crate::error::VisionResult;
use crate::polling::region::Region;

/// Supplies the current content of a screen region.
pub trait FrameSource {
    /// Captures `region` as an RGBA frame sized `region.width` by
    /// `region.height`. Transient failure should be reported through
    /// [`VisionError::CaptureFailed`](crate::error::VisionError::CaptureFailed)
    /// so the caller can decide whether to retry.
    fn capture(&mut self, region: Region) -> VisionResult<RgbaImage>;
}
