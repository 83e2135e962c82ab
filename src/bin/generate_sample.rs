use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tiff::encoder::{colortype, TiffEncoder};

/// Map side length in pixels.
const SIZE: usize = 64;
const SAMPLE: &str = "Demo";

/// Circular phase inclusions: (centre x, centre y, radius, composition).
/// Compositions are atomic fractions of Fe, O, Si, Al and sum to one.
const PHASES: [(f64, f64, f64, [f64; 4]); 3] = [
    (18.0, 20.0, 12.0, [0.40, 0.60, 0.00, 0.00]),
    (44.0, 26.0, 10.0, [0.00, 0.60, 0.30, 0.10]),
    (30.0, 48.0, 14.0, [0.05, 0.55, 0.00, 0.40]),
];
/// Matrix composition outside every inclusion.
const MATRIX: [f64; 4] = [0.02, 0.65, 0.33, 0.00];
const ELEMENTS: [&str; 4] = ["Fe", "O", "Si", "Al"];
const ATOMIC_MASS: [f64; 4] = [55.845, 15.999, 28.086, 26.982];

/// Weight maps are written under every legacy naming convention, one per
/// element.
const WEIGHT_NAMES: [&str; 4] = [
    "{s}-weight norm_{e}",
    "{s}_mass_norm_{e}",
    "{s}-w% norm_{e}",
    "{s}-w%-norm_{e}",
];

/// Counter-based measurement noise: each pixel/element pair hashes to its
/// own, approximately Gaussian, draw.
struct PixelNoise {
    seed: u64,
    sigma: f64,
}

impl PixelNoise {
    /// SplitMix64 finalizer.
    fn mix(mut z: u64) -> u64 {
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    fn uniform(&self, counter: u64) -> f64 {
        let bits = Self::mix(self.seed ^ counter.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        (bits >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Irwin-Hall approximation: twelve uniforms summed, centred on zero.
    fn sample(&self, pixel: usize, element: usize) -> f64 {
        let base = ((pixel * ELEMENTS.len() + element) as u64) * 12;
        let sum: f64 = (0..12).map(|k| self.uniform(base + k)).sum();
        (sum - 6.0) * self.sigma
    }
}

/// Atomic fractions per element, row-major, with a soft edge around each phase.
fn atomic_maps(noise: &PixelNoise) -> Vec<Vec<f64>> {
    let mut maps = vec![vec![0.0; SIZE * SIZE]; ELEMENTS.len()];
    for y in 0..SIZE {
        for x in 0..SIZE {
            let mut comp = MATRIX;
            for &(cx, cy, r, phase) in &PHASES {
                let d = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
                let w = 1.0 / (1.0 + ((d - r) / 1.5).exp());
                for (c, p) in comp.iter_mut().zip(phase) {
                    *c = *c * (1.0 - w) + p * w;
                }
            }
            let pixel = y * SIZE + x;
            let noisy: Vec<f64> = comp
                .iter()
                .enumerate()
                .map(|(k, &c)| (c + noise.sample(pixel, k)).max(0.0))
                .collect();
            let total: f64 = noisy.iter().sum();
            for (map, v) in maps.iter_mut().zip(&noisy) {
                map[pixel] = v / total;
            }
        }
    }
    maps
}

fn weight_maps(atomic: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut maps = vec![vec![0.0; SIZE * SIZE]; ELEMENTS.len()];
    for i in 0..SIZE * SIZE {
        let mass: f64 = atomic.iter().zip(ATOMIC_MASS).map(|(m, a)| m[i] * a).sum();
        for (k, map) in maps.iter_mut().enumerate() {
            map[i] = atomic[k][i] * ATOMIC_MASS[k] / mass;
        }
    }
    maps
}

fn write_text(path: &Path, values: &[f64]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in values.chunks(SIZE) {
        writer.write_record(row.iter().map(|v| format!("{v:.5}")))?;
    }
    writer.flush()?;
    Ok(())
}

/// 16-bit TIFF holding weight percent × 100, or 32-bit float TIFF holding
/// the weight fraction itself.
fn write_tiff(path: &Path, values: &[f64], float: bool) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let side = SIZE as u32;
    let written = if float {
        let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();
        encoder.write_image::<colortype::Gray32Float>(side, side, &data)
    } else {
        let data: Vec<u16> = values
            .iter()
            .map(|v| (v * 10_000.0).round().clamp(0.0, u16::MAX as f64) as u16)
            .collect();
        encoder.write_image::<colortype::Gray16>(side, side, &data)
    };
    written.with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("demo_data"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let noise = PixelNoise {
        seed: 42,
        sigma: 0.01,
    };
    let atomic = atomic_maps(&noise);
    let weight = weight_maps(&atomic);

    for (k, element) in ELEMENTS.iter().enumerate() {
        let txt = out_dir.join(format!("{SAMPLE}-atom norm_{element}.txt"));
        write_text(&txt, &atomic[k])?;

        let stem = WEIGHT_NAMES[k].replace("{s}", SAMPLE).replace("{e}", element);
        let tif = out_dir.join(format!("{stem}.tif"));
        // alternate integer and float encodings across the elements
        write_tiff(&tif, &weight[k], k % 2 == 1)?;
    }

    println!(
        "Wrote {} elements ({SIZE}x{SIZE}) for sample {SAMPLE} to {}",
        ELEMENTS.len(),
        out_dir.display()
    );
    println!(
        "Try: xray-phasemap render -s {SAMPLE} -e Fe,O,Si,Al -n weight -x tif -d {}",
        out_dir.display()
    );
    Ok(())
}
