//! Renders narration text onto full-frame PNG slides.

use crossposter_core::{FontConfig, RenderError, SegmentKind, TextConfig, TextSegment};
use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};
use image::{ImageFormat, Rgba, RgbaImage};
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

/// Text is never shrunk below this size when fitting long segments.
const MIN_FONT_SIZE: f32 = 20.0;

#[cfg_attr(test, mockall::automock)]
pub trait SlideRenderer: Send + Sync {
    fn render(&self, segment: &TextSegment, output: &Path) -> Result<(), RenderError>;
}

pub struct ImageMaker {
    regular: Font,
    bold: Font,
    width: u32,
    height: u32,
    padding: u32,
    wrap_width: usize,
    font_size: f32,
    title_font_size: f32,
    text_color: [u8; 4],
    background: [u8; 4],
}

impl ImageMaker {
    pub fn new(
        fonts: &FontConfig,
        text: &TextConfig,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        Ok(Self {
            regular: load_font(&fonts.regular)?,
            bold: load_font(&fonts.bold)?,
            width,
            height,
            padding: text.padding.min(width / 4),
            wrap_width: text.wrap_width.max(1),
            font_size: text.font_size,
            title_font_size: text.title_font_size,
            text_color: parse_color(&text.text_color)?,
            background: parse_color(&text.background_color)?,
        })
    }

    fn font_for(&self, kind: SegmentKind) -> (&Font, f32) {
        match kind {
            SegmentKind::Title => (&self.bold, self.title_font_size),
            _ => (&self.regular, self.font_size),
        }
    }

    /// Picks the largest size, starting from the configured one, at which the
    /// wrapped text fits inside the padded frame. Text still too tall at
    /// `MIN_FONT_SIZE` is drawn anyway and clipped at the frame edges.
    fn fit(&self, font: &Font, start_size: f32, text: &str) -> (f32, Vec<String>) {
        let max_width = self.width.saturating_sub(2 * self.padding) as f32;
        let max_height = self.height.saturating_sub(2 * self.padding) as f32;

        let mut size = start_size.max(MIN_FONT_SIZE);
        loop {
            let lines = wrap_to_width(font, size, text, self.wrap_width, max_width);
            if lines.len() as f32 * line_height(font, size) <= max_height {
                return (size, lines);
            }
            if size <= MIN_FONT_SIZE {
                warn!(
                    "Text starting {:?} overflows the slide at {:.0}px",
                    text.chars().take(40).collect::<String>(),
                    size
                );
                return (size, lines);
            }
            size = (size * 0.9).max(MIN_FONT_SIZE);
        }
    }

    fn draw(&self, segment: &TextSegment) -> Result<RgbaImage, RenderError> {
        let (font, start_size) = self.font_for(segment.kind);
        let (size, lines) = self.fit(font, start_size, &segment.text);
        if size < start_size {
            debug!(
                "Segment {} shrunk from {:.0}px to {:.0}px to fit",
                segment.index, start_size, size
            );
        }

        let mut image = RgbaImage::from_pixel(self.width, self.height, Rgba(self.background));
        let (width, height) = (self.width, self.height);
        let frame: &mut [u8] = &mut image;

        let step = line_height(font, size);
        let block_height = step * lines.len() as f32;
        let top = (height as f32 - block_height) / 2.0;

        for (row, line) in lines.iter().enumerate() {
            let x = (width as f32 - line_width(font, size, line)) / 2.0;
            let y = top + step * row as f32;
            draw_line(font, size, frame, width, height, x, y, line, self.text_color);
        }
        Ok(image)
    }
}

impl SlideRenderer for ImageMaker {
    fn render(&self, segment: &TextSegment, output: &Path) -> Result<(), RenderError> {
        let image = self.draw(segment)?;
        image
            .save_with_format(output, ImageFormat::Png)
            .map_err(|e| RenderError::WriteFailed {
                path: output.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!("Rendered slide {}", output.display());
        Ok(())
    }
}

fn load_font(path: &Path) -> Result<Font, RenderError> {
    if !path.exists() {
        return Err(RenderError::FontNotFound {
            path: path.display().to_string(),
        });
    }
    let bytes = std::fs::read(path).map_err(|e| RenderError::InvalidFont {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Font::from_bytes(bytes, FontSettings::default()).map_err(|reason| RenderError::InvalidFont {
        path: path.display().to_string(),
        reason: reason.to_string(),
    })
}

/// Accepts `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb(r,g,b)`,
/// `rgba(r,g,b,a)` with `a` in 0..=1, a few color names, and `none`.
pub fn parse_color(value: &str) -> Result<[u8; 4], RenderError> {
    let invalid = || RenderError::InvalidColor {
        value: value.to_string(),
    };
    let spec = value.trim().to_ascii_lowercase();

    match spec.as_str() {
        "none" | "transparent" => return Ok([0, 0, 0, 0]),
        "white" => return Ok([255, 255, 255, 255]),
        "black" => return Ok([0, 0, 0, 255]),
        "red" => return Ok([255, 0, 0, 255]),
        "green" => return Ok([0, 128, 0, 255]),
        "blue" => return Ok([0, 0, 255, 255]),
        "yellow" => return Ok([255, 255, 0, 255]),
        "orange" => return Ok([255, 165, 0, 255]),
        "purple" => return Ok([128, 0, 128, 255]),
        "gray" | "grey" => return Ok([128, 128, 128, 255]),
        _ => {}
    }

    if let Some(hex) = spec.strip_prefix('#') {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let digits: Vec<u8> = match hex.len() {
            3 | 4 => hex
                .chars()
                .map(|c| u8::from_str_radix(&c.to_string().repeat(2), 16))
                .collect::<Result<_, _>>()
                .map_err(|_| invalid())?,
            6 | 8 => (0..hex.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
                .collect::<Result<_, _>>()
                .map_err(|_| invalid())?,
            _ => return Err(invalid()),
        };
        let alpha = digits.get(3).copied().unwrap_or(255);
        return Ok([digits[0], digits[1], digits[2], alpha]);
    }

    let pattern = Regex::new(
        r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*([0-9]*\.?[0-9]+)\s*)?\)$",
    )
    .map_err(|_| invalid())?;
    let caps = pattern.captures(&spec).ok_or_else(invalid)?;

    let channel = |i: usize| -> Result<u8, RenderError> {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .ok_or_else(invalid)
    };
    let alpha = match caps.get(4) {
        Some(m) => {
            let a: f32 = m.as_str().parse().map_err(|_| invalid())?;
            if !(0.0..=1.0).contains(&a) {
                return Err(invalid());
            }
            (a * 255.0).round() as u8
        }
        None => 255,
    };
    Ok([channel(1)?, channel(2)?, channel(3)?, alpha])
}

/// Word wrap by character count. Words longer than `width` get a line of
/// their own.
pub fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.chars().count() + 1 + word.chars().count() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Wraps by character count first, then re-wraps any line wider than
/// `max_px`. A word that alone is wider than `max_px` is broken between
/// characters so every line fits.
fn wrap_to_width(font: &Font, size: f32, text: &str, wrap_width: usize, max_px: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for line in wrap_lines(text, wrap_width) {
        if line_width(font, size, &line) <= max_px {
            lines.push(line);
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            for piece in break_word(font, size, word, max_px) {
                let candidate = if current.is_empty() {
                    piece.clone()
                } else {
                    format!("{} {}", current, piece)
                };
                if current.is_empty() || line_width(font, size, &candidate) <= max_px {
                    current = candidate;
                } else {
                    lines.push(std::mem::replace(&mut current, piece));
                }
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

fn break_word(font: &Font, size: f32, word: &str, max_px: f32) -> Vec<String> {
    if line_width(font, size, word) <= max_px {
        return vec![word.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_px = 0.0;
    for c in word.chars() {
        let advance = font.metrics(c, size).advance_width;
        if !current.is_empty() && current_px + advance > max_px {
            pieces.push(std::mem::take(&mut current));
            current_px = 0.0;
        }
        current.push(c);
        current_px += advance;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn line_width(font: &Font, size: f32, line: &str) -> f32 {
    line.chars().map(|c| font.metrics(c, size).advance_width).sum()
}

fn line_height(font: &Font, size: f32) -> f32 {
    font.horizontal_line_metrics(size)
        .map(|m| m.new_line_size)
        .unwrap_or(size * 1.2)
}

#[allow(clippy::too_many_arguments)]
fn draw_line(
    font: &Font,
    size: f32,
    frame: &mut [u8],
    width: u32,
    height: u32,
    x: f32,
    y: f32,
    text: &str,
    color: [u8; 4],
) {
    let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&LayoutSettings {
        x,
        y,
        ..LayoutSettings::default()
    });
    layout.append(&[font], &TextStyle::new(text, size, 0));

    for glyph in layout.glyphs() {
        if glyph.width == 0 || glyph.height == 0 {
            continue;
        }
        let (metrics, bitmap) = font.rasterize_config(glyph.key);
        for row in 0..metrics.height {
            let py = glyph.y.round() as i32 + row as i32;
            if py < 0 || py >= height as i32 {
                continue;
            }
            for col in 0..metrics.width {
                let px = glyph.x.round() as i32 + col as i32;
                if px < 0 || px >= width as i32 {
                    continue;
                }
                let coverage = bitmap[row * metrics.width + col];
                if coverage == 0 {
                    continue;
                }
                let alpha = ((u16::from(coverage) * u16::from(color[3])) / 255) as u8;
                let idx = ((py as u32 * width + px as u32) * 4) as usize;
                blend_over(frame, idx, [color[0], color[1], color[2], alpha]);
            }
        }
    }
}

/// Source-over compositing that also works on translucent backgrounds.
fn blend_over(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let sa = f32::from(src[3]) / 255.0;
    if sa == 0.0 {
        return;
    }
    let da = f32::from(frame[idx + 3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for channel in 0..3 {
        let sc = f32::from(src[channel]);
        let dc = f32::from(frame[idx + channel]);
        frame[idx + channel] = ((sc * sa + dc * da * (1.0 - sa)) / out_a).round() as u8;
    }
    frame[idx + 3] = (out_a * 255.0).round() as u8;
}
