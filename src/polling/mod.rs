//! Polled search: wait until a template is visible, then act on it.
//!
//! Single-frame matching lives in [`crate::matching`]; this module adds the
//! time dimension. A [`controller::Locator`] repeatedly captures a region,
//! runs the matcher, and accepts the first candidate that clears the
//! threshold, tracking the best score seen so a timeout can say how close it
//! came. All side effects sit behind traits so the loop itself stays
//! deterministic and testable.

pub mod capture;
pub mod controller;
pub mod debug;
pub mod region;
pub mod templates;


pub use capture::FrameSource;
pub use controller::{ClickPoint, Locator};
pub use debug::{ArtifactSink, DebugSink, annotate, sanitize_step_name};
pub use region::{FixedLayout, Region, RegionSource, RegionSpec};
pub use templates::{FsTemplateStore, TemplateSource};
