use image::Rgb;
use palette::{IntoColor, LinSrgb, Mix, Srgb};

// ---------------------------------------------------------------------------
// Sequential colour map: normalised value → Rgb<u8>
// ---------------------------------------------------------------------------

/// Perceptually ordered anchor colours (dark violet → yellow), sRGB.
const ANCHORS: [(f32, f32, f32); 5] = [
    (0.267, 0.005, 0.329),
    (0.231, 0.322, 0.545),
    (0.129, 0.569, 0.549),
    (0.369, 0.788, 0.384),
    (0.992, 0.906, 0.145),
];

/// Maps values in `[0, 1]` to colours by interpolating between anchors in
/// linear RGB.
#[derive(Debug, Clone)]
pub struct ColorMap {
    stops: Vec<LinSrgb>,
    missing_color: Rgb<u8>,
}

impl Default for ColorMap {
    fn default() -> Self {
        Self::from_srgb(&ANCHORS)
    }
}

impl ColorMap {
    /// Build a map from at least one sRGB anchor, evenly spaced.
    pub fn from_srgb(anchors: &[(f32, f32, f32)]) -> Self {
        let stops = anchors
            .iter()
            .map(|&(r, g, b)| Srgb::new(r, g, b).into_linear())
            .collect();
        ColorMap {
            stops,
            missing_color: Rgb([160, 160, 160]),
        }
    }

    /// Colour for a normalised value. NaN gets the missing-data grey;
    /// anything outside `[0, 1]` is clamped.
    pub fn color_for(&self, t: f32) -> Rgb<u8> {
        if t.is_nan() || self.stops.is_empty() {
            return self.missing_color;
        }
        let last = self.stops.len() - 1;
        let pos = t.clamp(0.0, 1.0) * last as f32;
        let idx = (pos.floor() as usize).min(last);
        let lin = if idx == last {
            self.stops[last]
        } else {
            self.stops[idx].mix(self.stops[idx + 1], pos - idx as f32)
        };
        to_rgb8(lin)
    }

    /// Colour for `value` scaled into `[lo, hi]`. A flat range maps to the middle.
    pub fn color_in_range(&self, value: f32, lo: f32, hi: f32) -> Rgb<u8> {
        if !value.is_finite() {
            return self.missing_color;
        }
        let span = hi - lo;
        let t = if span > f32::EPSILON { (value - lo) / span } else { 0.5 };
        self.color_for(t)
    }
}

fn to_rgb8(lin: LinSrgb) -> Rgb<u8> {
    let srgb: Srgb = lin.into_color();
    let srgb: Srgb<u8> = srgb.into_format();
    Rgb([srgb.red, srgb.green, srgb.blue])
}
