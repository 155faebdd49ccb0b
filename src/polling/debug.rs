//! Diagnostic artifacts for polled searches.
//!
//! Long-running searches are miserable to debug blind, so the poll loop can
//! stream live score lines and save an annotated frame whenever its best
//! candidate improves. Both go through a [`DebugSink`] so tests and headless
//! runs can capture or discard them.

use std::io::Write;
use std::path::PathBuf;

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect as PixelRect;

use crate::error::VisionResult;
use crate::matching::types::Rect;

const HIGHLIGHT: Rgba<u8> = Rgba([255, 255, 0, 255]);
const SCORE_BAR_HEIGHT: u32 = 3;

/// Receives score lines and annotated snapshots from the poll loop.
pub trait DebugSink {
    /// Persists an annotated frame under the given name hint.
    fn save_snapshot(&mut self, image: &RgbaImage, hint: &str) -> VisionResult<()>;

    /// Emits one live score line. Lines arrive carriage-return style, one
    /// per attempt, and are meant to overwrite each other on a terminal.
    fn score_line(&mut self, line: &str);

    /// Called once when the score stream ends, successful or not.
    fn finish_score_stream(&mut self) {}
}

/// Writes snapshots into a directory and score lines to a terminal-style
/// writer (stdout by default).
pub struct ArtifactSink {
    dir: PathBuf,
    out: Box<dyn Write + Send>,
}

impl ArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_writer(dir, Box::new(std::io::stdout()))
    }

    pub fn with_writer(dir: impl Into<PathBuf>, out: Box<dyn Write + Send>) -> Self {
        Self {
            dir: dir.into(),
            out,
        }
    }
}

impl DebugSink for ArtifactSink {
    fn save_snapshot(&mut self, image: &RgbaImage, hint: &str) -> VisionResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{hint}.png"));
        image.save(&path)?;
        log::debug!("saved snapshot {path:?}");
        Ok(())
    }

    fn score_line(&mut self, line: &str) {
        // A stuck ticker must never abort the search.
        let _ = write!(self.out, "\r{line}");
        let _ = self.out.flush();
    }

    fn finish_score_stream(&mut self) {
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }
}

/// Copies the frame and draws the matched rectangle plus a proportional
/// score bar above it.
pub fn annotate(frame: &RgbaImage, rect: Rect, score: f32) -> RgbaImage {
    let mut out = frame.clone();
    if rect.is_empty() {
        return out;
    }

    let outline = PixelRect::at(rect.x as i32, rect.y as i32).of_size(rect.width, rect.height);
    draw_hollow_rect_mut(&mut out, outline, HIGHLIGHT);
    // Second ring for a visible 2 px border; imageproc clips whatever falls
    // outside the frame.
    let ring = PixelRect::at(rect.x as i32 - 1, rect.y as i32 - 1)
        .of_size(rect.width + 2, rect.height + 2);
    draw_hollow_rect_mut(&mut out, ring, HIGHLIGHT);

    let bar_width = (rect.width as f32 * score.clamp(0.0, 1.0)).round() as u32;
    if bar_width > 0 {
        let bar_y = if rect.y as i32 >= SCORE_BAR_HEIGHT as i32 + 3 {
            rect.y as i32 - SCORE_BAR_HEIGHT as i32 - 2
        } else {
            rect.y as i32 + 1
        };
        let bar = PixelRect::at(rect.x as i32, bar_y).of_size(bar_width, SCORE_BAR_HEIGHT);
        draw_filled_rect_mut(&mut out, bar, HIGHLIGHT);
    }
    out
}

/// Reduces a step name to something safe for a filename: alphanumerics,
/// dashes and underscores survive, spaces become underscores, everything
/// else is dropped, capped at 80 characters.
pub fn sanitize_step_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();
    let cleaned: String = kept.trim().replace(' ', "_").chars().take(80).collect();
    if cleaned.is_empty() {
        "step".to_string()
    } else {
        cleaned
    }
}
