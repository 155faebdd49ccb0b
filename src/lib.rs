//! On-screen template location for UI automation.
//!
//! Given a small reference image, find where it currently appears on a
//! larger frame, robustly enough to drive clicks: tolerant of moderate
//! rescaling, brightness shifts and theme changes. Three matchers cover the
//! spectrum (intensity correlation, edge correlation and ORB-style feature
//! matching), combined by a configurable strategy. The [`polling`] module
//! turns the single-frame search into "wait until this appears", with live
//! score feedback and annotated snapshots for debugging.
//!
//! ```no_run
//! use std::time::Duration;
//! use vision_match::{
//!     FsTemplateStore, Locator, SearchOverrides, VisionDefaults,
//! };
//! # use vision_match::{FixedLayout, Region, VisionResult};
//! # use image::RgbaImage;
//! # struct Grabber;
//! # impl vision_match::FrameSource for Grabber {
//! #     fn capture(&mut self, r: Region) -> VisionResult<RgbaImage> {
//! #         Ok(RgbaImage::new(r.width, r.height))
//! #     }
//! # }
//!
//! # fn main() -> VisionResult<()> {
//! env_logger::init();
//! let defaults = VisionDefaults::default();
//! let step = SearchOverrides {
//!     image: Some("ok_button.png".into()),
//!     timeout: Some(Duration::from_secs(5)),
//!     ..SearchOverrides::default()
//! };
//!
//! let mut locator = Locator::new(
//!     Grabber,
//!     FsTemplateStore::new("assets/templates"),
//!     FixedLayout::new(Region::new(0, 0, 1920, 1080)),
//! );
//! let point = locator.click_image(&step.resolve(&defaults)?)?;
//! println!("click at ({}, {})", point.x, point.y);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod duration;
pub mod error;
pub mod matching;
pub mod polling;

pub use config::{SearchOverrides, SearchParams, VisionDefaults};
pub use error::{VisionError, VisionResult};
pub use matching::{
    MatchCandidate, MatchMethod, MatchOutcome, MatchSettings, MatchStrategy, Rect, ScaleRange,
    find_template,
};
pub use polling::{
    ArtifactSink, ClickPoint, DebugSink, FixedLayout, FrameSource, FsTemplateStore, Locator,
    Region, RegionSource, RegionSpec, TemplateSource,
};
