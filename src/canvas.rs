//! In-memory [`Surface`] used by the command line host and the tests.
//!
//! Boxes are rasterized into an RGBA pixel buffer. Text is not rasterized;
//! each run is recorded with its position and color so it can be replayed
//! as terminal text or serialized as JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::{Rgba, Surface, FONT_H, FONT_W};

/// How a finished frame is printed by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FrameFormat {
    /// Colored terminal text (default)
    #[default]
    Text,
    /// JSON document with every text run
    Json,
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameFormat::Text => write!(f, "text"),
            FrameFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for FrameFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(FrameFormat::Text),
            "json" => Ok(FrameFormat::Json),
            _ => Err(format!("Unknown frame format: {}", s)),
        }
    }
}

/// A text run as drawn by the renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRun {
    pub text: String,
    pub x: usize,
    pub y: usize,
    pub color: Rgba,
}

/// Serializable snapshot of a canvas
#[derive(Serialize)]
struct FrameJson<'a> {
    width: usize,
    height: usize,
    runs: &'a [TextRun],
}

#[derive(Debug, Clone)]
pub struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<Rgba>,
    runs: Vec<TextRun>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgba::TRANSPARENT; width * height],
            runs: Vec::new(),
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgba> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    /// Text runs currently visible, in drawing order
    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    /// All visible text concatenated, one line per distinct row
    pub fn plain_text(&self) -> String {
        self.lines()
            .into_iter()
            .map(|(_, runs)| runs.iter().map(|r| r.text.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Count of pixels that differ from `color`
    pub fn count_not(&self, color: Rgba) -> usize {
        self.pixels.iter().filter(|&&p| p != color).count()
    }

    fn lines(&self) -> BTreeMap<usize, Vec<&TextRun>> {
        let mut lines: BTreeMap<usize, Vec<&TextRun>> = BTreeMap::new();
        for run in &self.runs {
            lines.entry(run.y).or_default().push(run);
        }
        for runs in lines.values_mut() {
            runs.sort_by_key(|r| r.x);
        }
        lines
    }

    /// Render the recorded runs as ANSI colored text, mapping pixel columns
    /// to character columns.
    pub fn to_ansi(&self) -> String {
        let mut out = String::new();

        for (_, runs) in self.lines() {
            let mut column = 0;
            for run in runs {
                let target = run.x / FONT_W;
                if target > column {
                    out.push_str(&" ".repeat(target - column));
                    column = target;
                }
                let text = run.text.truecolor(run.color.r, run.color.g, run.color.b);
                out.push_str(&text.to_string());
                column += run.text.chars().count();
            }
            out.push('\n');
        }

        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&FrameJson {
            width: self.width,
            height: self.height,
            runs: &self.runs,
        })
    }

    pub fn render(&self, format: FrameFormat) -> serde_json::Result<String> {
        match format {
            FrameFormat::Text => Ok(self.to_ansi()),
            FrameFormat::Json => self.to_json(),
        }
    }

    /// Write the pixel buffer as a binary PPM image, alpha discarded.
    pub fn write_ppm<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "P6\n{} {}\n255\n", self.width, self.height)?;
        let mut rgb = Vec::with_capacity(self.pixels.len() * 3);
        for p in &self.pixels {
            rgb.extend_from_slice(&[p.r, p.g, p.b]);
        }
        out.write_all(&rgb)
    }
}

impl Surface for Canvas {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.pixels = vec![Rgba::TRANSPARENT; width * height];
        self.runs.clear();
    }

    fn draw_box(&mut self, x: usize, y: usize, w: usize, h: usize, color: Rgba) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);

        for row in y.min(y_end)..y_end {
            let start = row * self.width;
            self.pixels[start + x.min(x_end)..start + x_end].fill(color);
        }

        // text underneath is painted over
        self.runs
            .retain(|r| !(r.x >= x && r.x < x_end && r.y >= y && r.y < y_end));
    }

    fn draw_text(&mut self, text: &str, x: usize, y: usize, color: Rgba) {
        if x >= self.width || y + FONT_H > self.height {
            return;
        }

        let fits = (self.width - x) / FONT_W;
        let text: String = text.chars().take(fits).collect();
        if text.is_empty() {
            return;
        }

        self.runs.push(TextRun { text, x, y, color });
    }
}
