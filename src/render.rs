use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{Rgb, RgbImage};
use log::{info, warn};

use crate::color::ColorMap;
use crate::data::model::ElementMap;

// ---------------------------------------------------------------------------
// Element map images
// ---------------------------------------------------------------------------

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const FRAME: Rgb<u8> = Rgb([0, 0, 0]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);

/// Side of one font8x8 glyph, in font pixels.
const GLYPH: u32 = 8;

/// Layout of a rendered element image.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Maps are upscaled by an integer factor until their long side reaches this.
    pub min_size: u32,
    pub margin: u32,
    pub colorbar_gap: u32,
    pub colorbar_width: u32,
    /// Gap between the colorbar and its min/max labels.
    pub label_gap: u32,
    /// Each glyph pixel is drawn as a `text_scale` square.
    pub text_scale: u32,
    pub color_map: ColorMap,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            min_size: 256,
            margin: 8,
            colorbar_gap: 10,
            colorbar_width: 16,
            label_gap: 4,
            text_scale: 2,
            color_map: ColorMap::default(),
        }
    }
}

impl RenderOptions {
    fn scale_for(&self, map: &ElementMap) -> u32 {
        let long = map.width().max(map.height()).max(1) as u32;
        self.min_size.div_ceil(long).max(1)
    }

    fn glyph_size(&self) -> u32 {
        GLYPH * self.text_scale.max(1)
    }

    fn text_width(&self, text: &str) -> u32 {
        text.chars().count() as u32 * self.glyph_size()
    }
}

/// Pixel positions of every part of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    scale: u32,
    title_x: u32,
    map_x: u32,
    map_y: u32,
    map_w: u32,
    map_h: u32,
    bar_x: u32,
    label_x: u32,
    width: u32,
    height: u32,
}

impl Layout {
    fn new(map: &ElementMap, title: &str, labels: &[&str], opts: &RenderOptions) -> Self {
        let scale = opts.scale_for(map);
        let glyph = opts.glyph_size();
        let map_w = map.width() as u32 * scale;
        let map_h = map.height() as u32 * scale;

        let map_x = opts.margin;
        let map_y = opts.margin + glyph + opts.margin;
        let bar_x = map_x + map_w + opts.colorbar_gap;
        let label_x = bar_x + opts.colorbar_width + opts.label_gap;
        let label_w = labels.iter().map(|l| opts.text_width(l)).max().unwrap_or(0);

        let title_w = opts.text_width(title);
        let width = (label_x + label_w + opts.margin).max(title_w + 2 * opts.margin);
        Layout {
            scale,
            title_x: (width - title_w) / 2,
            map_x,
            map_y,
            map_w,
            map_h,
            bar_x,
            label_x,
            width,
            height: map_y + map_h + opts.margin,
        }
    }
}

/// Draw one map under its title, with a colorbar on its right (maximum at
/// the top) labelled with the map's value range.
///
/// ```text
///        S1 Fe
///  ┌────────────┐  ┌─┐
///  │    map     │  │▓│ 0.62
///  │            │  │▒│
///  │            │  │░│ 0.01
///  └────────────┘  └─┘
/// ```
pub fn render_element(map: &ElementMap, title: &str, opts: &RenderOptions) -> RgbImage {
    let range = map.value_range();
    let labels: Vec<String> = match range {
        Some((lo, hi)) => vec![format_value(hi), format_value(lo)],
        None => Vec::new(),
    };
    let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
    let layout = Layout::new(map, title, &label_refs, opts);
    let Layout {
        scale,
        map_x,
        map_y,
        map_w,
        map_h,
        bar_x,
        ..
    } = layout;

    let mut img = RgbImage::from_pixel(layout.width, layout.height, BACKGROUND);

    let (lo, hi) = range.unwrap_or((0.0, 0.0));
    for y in 0..map.height() {
        for x in 0..map.width() {
            let value = map.get(x, y).unwrap_or(f32::NAN);
            let color = opts.color_map.color_in_range(value, lo, hi);
            let (px, py) = (map_x + x as u32 * scale, map_y + y as u32 * scale);
            fill_rect(&mut img, px, py, scale, scale, color);
        }
    }

    for row in 0..map_h {
        let t = if map_h > 1 {
            1.0 - row as f32 / (map_h - 1) as f32
        } else {
            1.0
        };
        let color = opts.color_map.color_for(t);
        fill_rect(&mut img, bar_x, map_y + row, opts.colorbar_width, 1, color);
    }

    stroke_rect(&mut img, map_x, map_y, map_w, map_h);
    stroke_rect(&mut img, bar_x, map_y, opts.colorbar_width, map_h);

    draw_text(&mut img, layout.title_x, opts.margin, title, opts.text_scale);
    if let [max_label, min_label] = label_refs.as_slice() {
        let glyph = opts.glyph_size();
        draw_text(&mut img, layout.label_x, map_y, max_label, opts.text_scale);
        let min_y = (map_y + map_h).saturating_sub(glyph).max(map_y + glyph);
        draw_text(&mut img, layout.label_x, min_y, min_label, opts.text_scale);
    }
    img
}

/// Write `{basename}_{element}.png` into `dir` for every map, titled
/// `"{basename} {element}"`.
///
/// Returns the written paths in element order.
pub fn save_element_images(
    maps: &BTreeMap<String, ElementMap>,
    dir: &Path,
    basename: &str,
    opts: &RenderOptions,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut written = Vec::with_capacity(maps.len());
    for (symbol, map) in maps {
        if map.width() == 0 || map.height() == 0 {
            warn!("{symbol}: empty map, no image written");
            continue;
        }
        let title = format!("{basename} {symbol}");
        let path = dir.join(format!("{basename}_{symbol}.png"));

        render_element(map, &title, opts)
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;

        match map.value_range() {
            Some((lo, hi)) => info!("'{title}' [{lo} .. {hi}] → {}", path.display()),
            None => info!("'{title}' (no finite values) → {}", path.display()),
        }
        written.push(path);
    }
    Ok(written)
}

/// Short colorbar label: plain decimals in the usual range, exponent
/// notation for very large or very small magnitudes.
fn format_value(v: f32) -> String {
    let a = v.abs();
    if a == 0.0 {
        return "0".to_string();
    }
    if !(1e-3..1e5).contains(&a) {
        return format!("{v:.2e}");
    }
    let fixed = format!("{v:.3}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Blit `text` with its top-left corner at (`x`, `y`). Characters without a
/// glyph leave a blank cell.
fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32) {
    let scale = scale.max(1);
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| LATIN_FONTS.get(ch)) else {
            continue;
        };
        let cell_x = x + i as u32 * GLYPH * scale;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH {
                // bit 0 is the leftmost pixel
                if bits & (1 << col) != 0 {
                    let px = cell_x + col * scale;
                    let py = y + row as u32 * scale;
                    fill_rect(img, px, py, scale, scale, INK);
                }
            }
        }
    }
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    for py in y..(y + h).min(img.height()) {
        for px in x..(x + w).min(img.width()) {
            img.put_pixel(px, py, color);
        }
    }
}

/// One-pixel frame just outside the given rectangle.
fn stroke_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
    let (x0, y0) = (x.saturating_sub(1), y.saturating_sub(1));
    let (x1, y1) = (x + w, y + h);
    fill_rect(img, x0, y0, x1 - x0 + 1, 1, FRAME);
    fill_rect(img, x0, y1, x1 - x0 + 1, 1, FRAME);
    fill_rect(img, x0, y0, 1, y1 - y0 + 1, FRAME);
    fill_rect(img, x1, y0, 1, y1 - y0 + 1, FRAME);
}
