//! The poll loop that turns single-frame matching into "wait until visible".
//!
//! A [`Locator`] owns its collaborators behind traits: frames come from a
//! [`FrameSource`], templates from a [`TemplateSource`], regions from a
//! [`RegionSource`], and diagnostics go to an optional [`DebugSink`]. The
//! loop captures, matches, and retries until a candidate clears the
//! acceptance threshold or the timeout budget runs out. A zero timeout
//! still performs exactly one attempt, so `timeout = 0` means "check now".

use std::time::Instant;

use image::RgbaImage;

use crate::config::SearchParams;
use crate::error::{VisionError, VisionResult};
use crate::matching::{
    MatchCandidate, MatchMethod, MatchOutcome, MatchSettings, Rect, find_template,
};
use crate::polling::capture::FrameSource;
use crate::polling::debug::{DebugSink, annotate, sanitize_step_name};
use crate::polling::region::{Region, RegionSource};
use crate::polling::templates::TemplateSource;

/// Screen-absolute click target derived from a match.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickPoint {
    pub x: i32,
    pub y: i32,
    pub candidate: MatchCandidate,
}

/// Polls a screen region until a template shows up.
pub struct Locator<F, T, R> {
    frames: F,
    templates: T,
    regions: R,
    sink: Option<Box<dyn DebugSink>>,
}

impl<F, T, R> Locator<F, T, R>
where
    F: FrameSource,
    T: TemplateSource,
    R: RegionSource,
{
    pub fn new(frames: F, templates: T, regions: R) -> Self {
        Self {
            frames,
            templates,
            regions,
            sink: None,
        }
    }

    /// Attaches a sink for score lines and best-match snapshots.
    pub fn with_debug_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Waits until the template is on screen and returns the winning
    /// candidate, with its rectangle in region-local coordinates.
    pub fn image_exists(&mut self, params: &SearchParams) -> VisionResult<MatchCandidate> {
        self.poll(params).map(|(candidate, _)| candidate)
    }

    /// Waits for the template and returns where to click: the match centre
    /// plus the configured offset, clamped into the search region.
    pub fn click_image(&mut self, params: &SearchParams) -> VisionResult<ClickPoint> {
        let (candidate, region) = self.poll(params)?;
        let (cx, cy) = candidate.rect.center();
        let (x, y) = region.clamp_point(
            region.left + cx as i32 + params.offset.0,
            region.top + cy as i32 + params.offset.1,
        );
        log::debug!(
            "click point ({x}, {y}) for {} with offset {:?}",
            params.step_name,
            params.offset
        );
        Ok(ClickPoint { x, y, candidate })
    }

    fn poll(&mut self, params: &SearchParams) -> VisionResult<(MatchCandidate, Region)> {
        let region = self.regions.resolve(&params.region)?;
        if region.is_empty() {
            return Err(VisionError::invalid_config(format!(
                "search region has no area: {region:?}"
            )));
        }
        log::debug!(
            "searching for {:?} in {}x{} region at ({}, {}), up to {:?}",
            params.template,
            region.width,
            region.height,
            region.left,
            region.top,
            params.timeout
        );

        // Matching always reports its best candidate; acceptance against the
        // threshold happens here, per attempt.
        let probe = MatchSettings {
            threshold: 0.0,
            ..params.settings.clone()
        };
        let mut state = PollState::new(params.timeout);

        loop {
            state.attempts += 1;
            let frame = self.frames.capture(region)?;
            let template = self.templates.resolve(&params.template)?;
            let outcome = find_template(&frame, &template, &probe)?;

            if let Some(candidate) = outcome.candidate() {
                if state.observe(candidate) && params.save_best {
                    self.save_best_snapshot(&frame, candidate, params);
                }
            }
            if params.show_score && let Some(sink) = self.sink.as_deref_mut() {
                sink.score_line(&format!(
                    "[vision] {} best={:.3} thr={:.2} region={}x{}",
                    params.settings.strategy,
                    state.best_score,
                    params.threshold,
                    region.width,
                    region.height
                ));
            }

            if let MatchOutcome::Found(candidate) = outcome
                && candidate.score >= params.threshold
            {
                self.finish_stream(params);
                log::info!(
                    "🎯 {}: matched via {} at ({}, {}) score {:.3} after {} attempt(s)",
                    params.step_name,
                    candidate.method,
                    candidate.rect.x,
                    candidate.rect.y,
                    candidate.score,
                    state.attempts
                );
                return Ok((candidate, region));
            }

            // The deadline is checked after the attempt so a zero timeout
            // still gets one look at the screen.
            if state.expired() {
                break;
            }
            std::thread::sleep(params.retry_delay);
        }

        self.finish_stream(params);
        match state.best {
            Some((rect, method)) => log::warn!(
                "{}: no match within {:?}, best {:.3} via {} near ({}, {}) over {} attempt(s)",
                params.step_name,
                params.timeout,
                state.best_score,
                method,
                rect.x,
                rect.y,
                state.attempts
            ),
            None => log::warn!(
                "{}: no match within {:?}, nothing seen over {} attempt(s)",
                params.step_name,
                params.timeout,
                state.attempts
            ),
        }
        Err(VisionError::Timeout {
            waited: params.timeout,
            best_score: state.best_score,
            method: state.best_method(),
        })
    }

    fn save_best_snapshot(
        &mut self,
        frame: &RgbaImage,
        candidate: &MatchCandidate,
        params: &SearchParams,
    ) {
        let Some(sink) = self.sink.as_deref_mut() else {
            return;
        };
        let shot = annotate(frame, candidate.rect, candidate.score);
        let hint = format!("{}_best", sanitize_step_name(&params.step_name));
        // A failed snapshot is worth a warning, never a failed search.
        if let Err(err) = sink.save_snapshot(&shot, &hint) {
            log::warn!("could not save best-match snapshot: {err}");
        }
    }

    fn finish_stream(&mut self, params: &SearchParams) {
        if params.show_score
            && let Some(sink) = self.sink.as_deref_mut()
        {
            sink.finish_score_stream();
        }
    }
}

/// Running aggregates of one poll. The best candidate is tracked across
/// attempts even when no attempt ever passes the threshold, so a timeout can
/// report how close the search came and where.
struct PollState {
    deadline: Instant,
    attempts: u32,
    best_score: f32,
    best: Option<(Rect, MatchMethod)>,
}

impl PollState {
    fn new(timeout: std::time::Duration) -> Self {
        let now = Instant::now();
        // `Instant` overflows long before `Duration::MAX`; cap absurd
        // timeouts at a deadline no poll will ever reach.
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + std::time::Duration::from_secs(60 * 60 * 24 * 365));
        Self {
            deadline,
            attempts: 0,
            best_score: 0.0,
            best: None,
        }
    }

    /// Records the candidate if it strictly beats the best so far.
    fn observe(&mut self, candidate: &MatchCandidate) -> bool {
        if candidate.score > self.best_score {
            self.best_score = candidate.score;
            self.best = Some((candidate.rect, candidate.method));
            return true;
        }
        false
    }

    fn best_method(&self) -> Option<MatchMethod> {
        self.best.map(|(_, method)| method)
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn candidate(score: f32) -> MatchCandidate {
        MatchCandidate::new(Rect::new(5, 5, 10, 10), score, MatchMethod::Edges)
    }

    #[test]
    fn observe_keeps_the_strict_maximum() {
        let mut state = PollState::new(Duration::from_secs(1));
        assert!(state.observe(&candidate(0.4)));
        assert!(!state.observe(&candidate(0.4)));
        assert!(!state.observe(&candidate(0.2)));
        assert!(state.observe(&candidate(0.9)));
        assert_eq!(state.best_score, 0.9);
        assert_eq!(state.best_method(), Some(MatchMethod::Edges));
    }

    #[test]
    fn zero_score_candidates_are_not_recorded() {
        let mut state = PollState::new(Duration::from_secs(1));
        assert!(!state.observe(&candidate(0.0)));
        assert_eq!(state.best_method(), None);
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let state = PollState::new(Duration::ZERO);
        assert!(state.expired());
    }

    #[test]
    fn oversized_timeouts_do_not_overflow_the_deadline() {
        let state = PollState::new(Duration::MAX);
        assert!(!state.expired());
    }
}
