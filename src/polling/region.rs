//! Search regions and their resolution.
//!
//! Callers describe where to look either symbolically (whole screen, the
//! active window) or as an explicit rectangle; a [`RegionSource`] turns the
//! symbolic forms into concrete screen-absolute rectangles at poll time, so
//! a window that moves between attempts is re-resolved naturally.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{VisionError, VisionResult};

/// Screen-absolute rectangle a search is confined to. The origin may be
/// negative on multi-monitor layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// One past the rightmost column.
    pub fn right(&self) -> i32 {
        self.left + self.width as i32
    }

    /// One past the bottom row.
    pub fn bottom(&self) -> i32 {
        self.top + self.height as i32
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }

    /// Clamps a point into the region. Empty regions pin to the origin.
    pub fn clamp_point(&self, x: i32, y: i32) -> (i32, i32) {
        if self.is_empty() {
            return (self.left, self.top);
        }
        (
            x.clamp(self.left, self.right() - 1),
            y.clamp(self.top, self.bottom() - 1),
        )
    }
}

/// Where a search should look, before resolution.
///
/// Config accepts the strings `"screen"` and `"window"` or an inline
/// rectangle with `left`/`top`/`width`/`height` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionSpec {
    #[default]
    Screen,
    Window,
    Rect(Region),
}

impl Serialize for RegionSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RegionSpec::Screen => serializer.serialize_str("screen"),
            RegionSpec::Window => serializer.serialize_str("window"),
            RegionSpec::Rect(region) => region.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RegionSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Rect(Region),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Name(name) => match name.trim().to_ascii_lowercase().as_str() {
                "screen" => Ok(RegionSpec::Screen),
                "window" => Ok(RegionSpec::Window),
                other => Err(D::Error::custom(format!(
                    "unknown region {other:?}, expected \"screen\", \"window\" or a rectangle"
                ))),
            },
            Raw::Rect(region) => Ok(RegionSpec::Rect(region)),
        }
    }
}

/// Resolves symbolic regions against the live desktop layout.
pub trait RegionSource {
    fn resolve(&mut self, spec: &RegionSpec) -> VisionResult<Region>;
}

/// Resolver over a fixed layout. Suits single-monitor setups captured once
/// at startup, and tests.
#[derive(Debug, Clone)]
pub struct FixedLayout {
    pub screen: Region,
    pub window: Option<Region>,
}

impl FixedLayout {
    pub fn new(screen: Region) -> Self {
        Self {
            screen,
            window: None,
        }
    }

    pub fn with_window(mut self, window: Region) -> Self {
        self.window = Some(window);
        self
    }
}

impl RegionSource for FixedLayout {
    fn resolve(&mut self, spec: &RegionSpec) -> VisionResult<Region> {
        match spec {
            RegionSpec::Screen => Ok(self.screen),
            RegionSpec::Window => self.window.ok_or_else(|| {
                VisionError::invalid_config("window region requested but none is known")
            }),
            RegionSpec::Rect(region) => Ok(*region),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_points_into_bounds() {
        let region = Region::new(100, 50, 200, 100);
        assert_eq!(region.clamp_point(150, 75), (150, 75));
        assert_eq!(region.clamp_point(-10, 75), (100, 75));
        assert_eq!(region.clamp_point(500, 500), (299, 149));
    }

    #[test]
    fn contains_uses_half_open_bounds() {
        let region = Region::new(0, 0, 10, 10);
        assert!(region.contains(0, 0));
        assert!(region.contains(9, 9));
        assert!(!region.contains(10, 9));
        assert!(!region.contains(-1, 0));
    }

    #[test]
    fn spec_deserializes_names_and_rectangles() {
        let screen: RegionSpec = serde_json::from_str("\"screen\"").unwrap();
        assert_eq!(screen, RegionSpec::Screen);

        let window: RegionSpec = serde_json::from_str("\" Window \"").unwrap();
        assert_eq!(window, RegionSpec::Window);

        let rect: RegionSpec =
            serde_json::from_str(r#"{"left": 10, "top": 20, "width": 300, "height": 200}"#)
                .unwrap();
        assert_eq!(rect, RegionSpec::Rect(Region::new(10, 20, 300, 200)));

        assert!(serde_json::from_str::<RegionSpec>("\"desktop\"").is_err());
    }

    #[test]
    fn fixed_layout_resolves_specs() {
        let mut layout =
            FixedLayout::new(Region::new(0, 0, 1920, 1080)).with_window(Region::new(40, 40, 800, 600));
        assert_eq!(
            layout.resolve(&RegionSpec::Screen).unwrap(),
            Region::new(0, 0, 1920, 1080)
        );
        assert_eq!(
            layout.resolve(&RegionSpec::Window).unwrap(),
            Region::new(40, 40, 800, 600)
        );

        let mut bare = FixedLayout::new(Region::new(0, 0, 100, 100));
        assert!(bare.resolve(&RegionSpec::Window).is_err());
    }
}
