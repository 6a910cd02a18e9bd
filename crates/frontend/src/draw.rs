//! Server-side annotation of detection results.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use inference::DetectionResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const GREEN: Rgb<u8> = Rgb([0x00, 0xff, 0x41]);
pub const RED: Rgb<u8> = Rgb([0xff, 0x00, 0x40]);
pub const BLUE: Rgb<u8> = Rgb([0x00, 0x80, 0xff]);

const CYCLE: [Rgb<u8>; 3] = [GREEN, RED, BLUE];

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

const LABEL_PADDING: i32 = 12;
const LABEL_GAP: i32 = 10;
const TEXT_OUTLINE: i32 = 3;

const SYSTEM_FONTS: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:/Windows/Fonts/arial.ttf",
];

/// Color pinned to a known weed class, matched on the lowercased, trimmed name.
pub fn fixed_color(class_name: &str) -> Option<Rgb<u8>> {
    match class_name.trim().to_lowercase().as_str() {
        "morningglory" | "morning glory" | "morning-glory" => Some(RED),
        "carpetweed" => Some(GREEN),
        "palmer_amaranth" | "palmer amaranth" => Some(BLUE),
        _ => None,
    }
}

pub fn to_hex(color: Rgb<u8>) -> String {
    let [r, g, b] = color.0;
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// `palmer_amaranth` becomes `Palmer Amaranth`.
pub fn display_name(class_name: &str) -> String {
    class_name
        .replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Name and score drawn above a box, e.g. `PALMER AMARANTH` and `97.0%`.
fn label_parts(class_name: &str, confidence: f32) -> (String, String) {
    (
        display_name(class_name).to_uppercase(),
        format!("{:.1}%", confidence * 100.0),
    )
}

/// Per-class colors for one result.
///
/// Known weeds keep their fixed color; every other class gets the next color of
/// the green/red/blue cycle, assigned in sorted name order.
#[derive(Debug, Clone, Default)]
pub struct ClassPalette {
    colors: HashMap<String, Rgb<u8>>,
}

impl ClassPalette {
    pub fn for_result(result: &DetectionResult) -> Self {
        let mut names: Vec<&str> = result.classes().iter().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();

        let mut colors = HashMap::with_capacity(names.len());
        let mut cycle = CYCLE.iter().cycle();
        for name in names {
            let color = match fixed_color(name) {
                Some(color) => color,
                None => *cycle.next().unwrap_or(&GREEN),
            };
            colors.insert(name.to_string(), color);
        }
        Self { colors }
    }

    pub fn color(&self, class_name: &str) -> Rgb<u8> {
        fixed_color(class_name)
            .or_else(|| self.colors.get(class_name).copied())
            .or_else(|| {
                let wanted = class_name.trim().to_lowercase();
                self.colors
                    .iter()
                    .find(|(name, _)| name.trim().to_lowercase() == wanted)
                    .map(|(_, color)| *color)
            })
            .unwrap_or(GREEN)
    }
}

/// Draws boxes, corner markers and labels onto images.
///
/// Without a font, boxes and markers are still drawn but labels are skipped.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn without_font() -> Self {
        Self { font: None }
    }

    /// Loads `explicit` if given, otherwise the first readable system font.
    pub fn load(explicit: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
        };

        for path in &candidates {
            let Ok(bytes) = std::fs::read(path) else {
                continue;
            };
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    tracing::info!(path = %path.display(), "Label font loaded");
                    return Self { font: Some(font) };
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Unusable font"),
            }
        }

        tracing::warn!("No font found, labels will not be drawn");
        Self::without_font()
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(&self, image: &mut RgbImage, result: &DetectionResult) {
        let palette = ClassPalette::for_result(result);
        let width = image.width() as i32;
        let border = (width / 200).max(3);
        let corner = (width / 50).max(10);

        for det in result.iter() {
            let color = palette.color(det.class_name);
            let Some(bounds) = clamp_box(*det.bbox, image.width(), image.height()) else {
                continue;
            };

            draw_border(image, bounds, border, color);
            draw_corners(image, bounds, border, corner, color);

            if let Some(font) = &self.font {
                let label = LabelStyle::for_width(width);
                label.draw(image, font, bounds, det.class_name, det.confidence, color);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

/// Rounds a box to pixels inside the image; `None` when nothing is left.
fn clamp_box([x1, y1, x2, y2]: [f32; 4], width: u32, height: u32) -> Option<Bounds> {
    if width == 0 || height == 0 {
        return None;
    }
    let max_x = width as i32 - 1;
    let max_y = height as i32 - 1;
    let bounds = Bounds {
        x1: (x1.floor() as i32).clamp(0, max_x),
        y1: (y1.floor() as i32).clamp(0, max_y),
        x2: (x2.ceil() as i32).clamp(0, max_x),
        y2: (y2.ceil() as i32).clamp(0, max_y),
    };
    (bounds.x1 < bounds.x2 && bounds.y1 < bounds.y2).then_some(bounds)
}

fn rect(x: i32, y: i32, w: i32, h: i32) -> Option<Rect> {
    (w > 0 && h > 0).then(|| Rect::at(x, y).of_size(w as u32, h as u32))
}

fn draw_border(image: &mut RgbImage, b: Bounds, border: i32, color: Rgb<u8>) {
    for t in 0..border {
        if let Some(r) = rect(b.x1 + t, b.y1 + t, b.x2 - b.x1 + 1 - 2 * t, b.y2 - b.y1 + 1 - 2 * t) {
            draw_hollow_rect_mut(image, r, color);
        }
    }
}

fn draw_corners(image: &mut RgbImage, b: Bounds, border: i32, len: i32, color: Rgb<u8>) {
    let segments = [
        // top-left
        (b.x1, b.y1, len, border),
        (b.x1, b.y1, border, len),
        // top-right
        (b.x2 - len + 1, b.y1, len, border),
        (b.x2 - border + 1, b.y1, border, len),
        // bottom-left
        (b.x1, b.y2 - border + 1, len, border),
        (b.x1, b.y2 - len + 1, border, len),
        // bottom-right
        (b.x2 - len + 1, b.y2 - border + 1, len, border),
        (b.x2 - border + 1, b.y2 - len + 1, border, len),
    ];
    for (x, y, w, h) in segments {
        if let Some(r) = rect(x, y, w, h) {
            draw_filled_rect_mut(image, r, color);
        }
    }
}

struct LabelStyle {
    name_scale: PxScale,
    score_scale: PxScale,
}

impl LabelStyle {
    fn for_width(width: i32) -> Self {
        Self {
            name_scale: PxScale::from((width / 20).max(28) as f32),
            score_scale: PxScale::from((width / 30).max(20) as f32),
        }
    }

    /// Colored strip above the box holding the class name and the confidence.
    fn draw(
        &self,
        image: &mut RgbImage,
        font: &FontVec,
        b: Bounds,
        class_name: &str,
        confidence: f32,
        color: Rgb<u8>,
    ) {
        let (name, score) = label_parts(class_name, confidence);

        let (name_w, name_h) = text_size(self.name_scale, font, &name);
        let (score_w, score_h) = text_size(self.score_scale, font, &score);
        let (name_w, name_h) = (name_w as i32, name_h as i32);
        let (score_w, score_h) = (score_w as i32, score_h as i32);

        let total_w = name_w + score_w + 2 * LABEL_GAP;
        let total_h = name_h.max(score_h);
        let x = b.x1;
        let y = (b.y1 - total_h - 2 * LABEL_PADDING).max(0);

        let strip_w = total_w + 3 * LABEL_PADDING;
        let strip_h = total_h + 3 * LABEL_PADDING;
        if let Some(r) = rect(x - LABEL_PADDING - 2, y - LABEL_PADDING - 2, strip_w + 4, strip_h + 4) {
            draw_filled_rect_mut(image, r, BLACK);
        }
        if let Some(r) = rect(x - LABEL_PADDING, y - LABEL_PADDING, strip_w, strip_h) {
            draw_filled_rect_mut(image, r, color);
        }

        let score_x = x + name_w + LABEL_GAP;
        let score_y = y + 4;
        for dx in -TEXT_OUTLINE..=TEXT_OUTLINE {
            for dy in -TEXT_OUTLINE..=TEXT_OUTLINE {
                if dx.abs() == TEXT_OUTLINE || dy.abs() == TEXT_OUTLINE {
                    draw_text_mut(image, BLACK, x + dx, y + dy, self.name_scale, font, &name);
                    draw_text_mut(image, BLACK, score_x + dx, score_y + dy, self.score_scale, font, &score);
                }
            }
        }
        draw_text_mut(image, WHITE, x, y, self.name_scale, font, &name);
        draw_text_mut(image, WHITE, score_x, score_y, self.score_scale, font, &score);
    }
}
