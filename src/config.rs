//! Search configuration.
//!
//! Two layers: [`VisionDefaults`] holds profile-wide settings, and each
//! search step supplies [`SearchOverrides`] where every field is optional.
//! [`SearchOverrides::resolve`] merges the two into a fully validated
//! [`SearchParams`] that the poll loop consumes, so bad values surface
//! before the first frame is captured rather than mid-poll.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::{serde_secs, serde_secs_opt};
use crate::error::{VisionError, VisionResult};
use crate::matching::edges::{CANNY_HIGH, CANNY_LOW};
use crate::matching::{DEFAULT_STEPS, MatchSettings, MatchStrategy, ScaleRange};
use crate::polling::region::RegionSpec;

pub const DEFAULT_THRESHOLD: f32 = 0.87;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(400);

/// Profile-wide defaults for every search that does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisionDefaults {
    pub threshold: f32,
    pub scale_range: ScaleRange,
    pub steps: u32,
    pub strategy: MatchStrategy,
    pub canny_thresholds: (f32, f32),
    pub use_clahe: bool,
    #[serde(with = "serde_secs")]
    pub timeout: Duration,
    #[serde(with = "serde_secs")]
    pub retry_delay: Duration,
    pub region: RegionSpec,
    pub show_score: bool,
    pub save_best: bool,
}

impl Default for VisionDefaults {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            scale_range: ScaleRange::default(),
            steps: DEFAULT_STEPS,
            strategy: MatchStrategy::Hybrid,
            canny_thresholds: (CANNY_LOW, CANNY_HIGH),
            use_clahe: true,
            timeout: DEFAULT_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            region: RegionSpec::Screen,
            show_score: false,
            save_best: false,
        }
    }
}

/// Per-step search description. Only `image` is mandatory; everything else
/// inherits from [`VisionDefaults`] when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchOverrides {
    /// Template reference, usually a path relative to the template store.
    pub image: Option<String>,
    /// Step name used in logs and snapshot filenames.
    pub name: Option<String>,
    pub region: Option<RegionSpec>,
    pub threshold: Option<f32>,
    pub scale_range: Option<ScaleRange>,
    pub steps: Option<u32>,
    pub matcher: Option<MatchStrategy>,
    pub canny_thresholds: Option<(f32, f32)>,
    pub use_clahe: Option<bool>,
    #[serde(with = "serde_secs_opt")]
    pub timeout: Option<Duration>,
    #[serde(with = "serde_secs_opt")]
    pub retry_delay: Option<Duration>,
    /// Click offset from the match centre, in pixels.
    pub offset: Option<[i32; 2]>,
    pub show_score: Option<bool>,
    pub save_best: Option<bool>,
}

/// Fully resolved parameters for one polled search.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub template: String,
    pub step_name: String,
    pub region: RegionSpec,
    /// Acceptance threshold the poll loop applies to candidate scores.
    pub threshold: f32,
    pub settings: MatchSettings,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub offset: (i32, i32),
    pub show_score: bool,
    pub save_best: bool,
}

impl SearchOverrides {
    /// Merges the overrides onto the defaults and validates the result.
    pub fn resolve(&self, defaults: &VisionDefaults) -> VisionResult<SearchParams> {
        let template = self
            .image
            .clone()
            .ok_or_else(|| VisionError::invalid_config("search step is missing an image"))?;
        let step_name = self.name.clone().unwrap_or_else(|| "vision".to_string());

        let threshold = self.threshold.unwrap_or(defaults.threshold);
        let retry_delay = self.retry_delay.unwrap_or(defaults.retry_delay);
        if retry_delay.is_zero() {
            return Err(VisionError::invalid_config(
                "retry delay must be positive; a zero delay would spin on capture",
            ));
        }

        let settings = MatchSettings {
            strategy: self.matcher.unwrap_or(defaults.strategy),
            scale_range: self.scale_range.unwrap_or(defaults.scale_range),
            steps: self.steps.unwrap_or(defaults.steps),
            canny_thresholds: self.canny_thresholds.unwrap_or(defaults.canny_thresholds),
            use_clahe: self.use_clahe.unwrap_or(defaults.use_clahe),
            threshold,
            ..MatchSettings::default()
        };
        settings.validate()?;

        Ok(SearchParams {
            template,
            step_name,
            region: self.region.unwrap_or(defaults.region),
            threshold,
            settings,
            timeout: self.timeout.unwrap_or(defaults.timeout),
            retry_delay,
            offset: self.offset.map_or((0, 0), |o| (o[0], o[1])),
            show_score: self.show_score.unwrap_or(defaults.show_score),
            save_best: self.save_best.unwrap_or(defaults.save_best),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_only() -> SearchOverrides {
        SearchOverrides {
            image: Some("ok_button.png".to_string()),
            ..SearchOverrides::default()
        }
    }

    #[test]
    fn image_alone_resolves_against_defaults() {
        let params = image_only().resolve(&VisionDefaults::default()).unwrap();
        assert_eq!(params.template, "ok_button.png");
        assert_eq!(params.step_name, "vision");
        assert_eq!(params.threshold, DEFAULT_THRESHOLD);
        assert_eq!(params.settings.strategy, MatchStrategy::Hybrid);
        assert_eq!(params.settings.steps, DEFAULT_STEPS);
        assert_eq!(params.settings.threshold, DEFAULT_THRESHOLD);
        assert_eq!(params.timeout, DEFAULT_TIMEOUT);
        assert_eq!(params.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(params.region, RegionSpec::Screen);
        assert_eq!(params.offset, (0, 0));
        assert!(!params.show_score);
        assert!(!params.save_best);
    }

    #[test]
    fn a_step_without_an_image_is_rejected() {
        let err = SearchOverrides::default()
            .resolve(&VisionDefaults::default())
            .unwrap_err();
        assert!(err.to_string().contains("image"));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let step: SearchOverrides = serde_json::from_str(
            r#"{
                "image": "boss.png",
                "name": "boss fight",
                "threshold": 0.6,
                "matcher": "orb",
                "steps": 5,
                "scale_range": [0.8, 1.2],
                "canny_thresholds": [50, 150],
                "use_clahe": false,
                "timeout": "90s",
                "retry_delay": 0.2,
                "offset": [10, -5],
                "region": "window",
                "show_score": true,
                "save_best": true
            }"#,
        )
        .unwrap();

        let params = step.resolve(&VisionDefaults::default()).unwrap();
        assert_eq!(params.step_name, "boss fight");
        assert_eq!(params.threshold, 0.6);
        assert_eq!(params.settings.strategy, MatchStrategy::Orb);
        assert_eq!(params.settings.steps, 5);
        assert_eq!(params.settings.canny_thresholds, (50.0, 150.0));
        assert!(!params.settings.use_clahe);
        assert_eq!(params.timeout, Duration::from_secs(90));
        assert_eq!(params.retry_delay, Duration::from_millis(200));
        assert_eq!(params.offset, (10, -5));
        assert_eq!(params.region, RegionSpec::Window);
        assert!(params.show_score);
        assert!(params.save_best);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut step = image_only();
        step.threshold = Some(1.5);
        assert!(step.resolve(&VisionDefaults::default()).is_err());

        let mut step = image_only();
        step.retry_delay = Some(Duration::ZERO);
        assert!(step.resolve(&VisionDefaults::default()).is_err());

        let mut step = image_only();
        step.canny_thresholds = Some((200.0, 50.0));
        assert!(step.resolve(&VisionDefaults::default()).is_err());
    }

    #[test]
    fn defaults_deserialize_duration_strings() {
        let defaults: VisionDefaults = serde_json::from_str(
            r#"{"timeout": "30s", "retry_delay": "250ms", "strategy": "tm"}"#,
        )
        .unwrap();
        assert_eq!(defaults.timeout, Duration::from_secs(30));
        assert_eq!(defaults.retry_delay, Duration::from_millis(250));
        assert_eq!(defaults.strategy, MatchStrategy::Tm);
        assert_eq!(defaults.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed = serde_json::from_str::<SearchOverrides>(r#"{"treshold": 0.9}"#);
        assert!(parsed.is_err());
    }
}
