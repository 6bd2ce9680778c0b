//! # Visual Features
//!
//! Euristiche pixel-level sulle immagini decodificate.
//!
//! ## Metriche:
//! - **Complessità**: densità dei bordi (gradiente |dx|+|dy|) e deviazione standard della luma
//! - **Colore**: grayscale, palette quantizzata a 5 bit per canale
//! - **Rumore**: residuo medio del Laplaciano sulle zone senza bordi
//! - **Testo**: righe con molte transizioni nette su un'immagine bimodale
//! - **Volti**: copertura di toni pelle nello spazio YCbCr
//! - **Colori dominanti**: istogramma a 4 bit + k-means limitato
//!
//! Le soglie sono costanti di modulo; le immagini più grandi di
//! `ANALYSIS_MAX_SIDE` vengono campionate prima del calcolo.

use crate::types::{ColorComplexity, Complexity, NoiseLevel};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use std::collections::HashSet;

pub const ANALYSIS_MAX_SIDE: u32 = 1024;

const EDGE_THRESHOLD: i32 = 64;
const HIGH_EDGE_DENSITY: f32 = 0.18;
const MEDIUM_EDGE_DENSITY: f32 = 0.06;
const FLAT_STDDEV: f32 = 10.0;

const CLEAN_RESIDUAL: f32 = 4.0;
const MODERATE_RESIDUAL: f32 = 12.0;

const GRAYSCALE_TOLERANCE: i32 = 12;
const LIMITED_PALETTE: usize = 256;

const TEXT_TRANSITION: i32 = 96;
const TEXT_ROW_DENSITY: (f32, f32) = (0.05, 0.6);
const TEXT_ROW_FRACTION: f32 = 0.10;
const TEXT_BIMODAL_FRACTION: f32 = 0.60;

const SKIN_COVERAGE: (f32, f32) = (0.05, 0.6);

const MAX_DOMINANT_COLORS: usize = 5;
const SEED_DISTANCE: i32 = 48;
const KMEANS_ROUNDS: usize = 8;

/// Everything the analyzer derives from pixels
#[derive(Debug, Clone, PartialEq)]
pub struct VisualFeatures {
    pub complexity: Complexity,
    pub color_complexity: ColorComplexity,
    pub noise_level: NoiseLevel,
    pub has_text: bool,
    pub has_faces: bool,
    pub dominant_colors: Vec<String>,
    pub edge_density: f32,
    pub luma_stddev: f32,
}

/// Compute visual features of a decoded image
pub fn extract(image: &DynamicImage) -> VisualFeatures {
    let sampled = sample(image);
    let rgb = sampled.to_rgb8();
    let luma = LumaPlane::from_rgb(&rgb);

    let edge_density = luma.edge_density();
    let luma_stddev = luma.stddev();
    let complexity = classify_complexity(edge_density, luma_stddev);

    VisualFeatures {
        complexity,
        color_complexity: color_complexity(&rgb),
        noise_level: classify_noise(luma.flat_residual()),
        has_text: luma.looks_like_text(),
        has_faces: skin_coverage_in_range(&rgb) && complexity != Complexity::Low,
        dominant_colors: dominant_colors(&rgb),
        edge_density,
        luma_stddev,
    }
}

fn sample(image: &DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width.max(height) > ANALYSIS_MAX_SIDE {
        image.resize(ANALYSIS_MAX_SIDE, ANALYSIS_MAX_SIDE, FilterType::Nearest)
    } else {
        image.clone()
    }
}

pub(crate) fn classify_complexity(edge_density: f32, stddev: f32) -> Complexity {
    if stddev < FLAT_STDDEV {
        Complexity::Low
    } else if edge_density >= HIGH_EDGE_DENSITY {
        Complexity::High
    } else if edge_density >= MEDIUM_EDGE_DENSITY {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

pub(crate) fn classify_noise(residual: f32) -> NoiseLevel {
    if residual < CLEAN_RESIDUAL {
        NoiseLevel::Clean
    } else if residual < MODERATE_RESIDUAL {
        NoiseLevel::Moderate
    } else {
        NoiseLevel::Heavy
    }
}

struct LumaPlane {
    width: usize,
    height: usize,
    values: Vec<i32>,
}

impl LumaPlane {
    fn from_rgb(rgb: &RgbImage) -> Self {
        let values = rgb
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                (299 * r as i32 + 587 * g as i32 + 114 * b as i32) / 1000
            })
            .collect();
        Self {
            width: rgb.width() as usize,
            height: rgb.height() as usize,
            values,
        }
    }

    fn at(&self, x: usize, y: usize) -> i32 {
        self.values[y * self.width + x]
    }

    fn gradient(&self, x: usize, y: usize) -> i32 {
        let here = self.at(x, y);
        (self.at(x + 1, y) - here).abs() + (self.at(x, y + 1) - here).abs()
    }

    fn edge_density(&self) -> f32 {
        if self.width < 2 || self.height < 2 {
            return 0.0;
        }
        let mut edges = 0usize;
        for y in 0..self.height - 1 {
            for x in 0..self.width - 1 {
                if self.gradient(x, y) > EDGE_THRESHOLD {
                    edges += 1;
                }
            }
        }
        edges as f32 / ((self.width - 1) * (self.height - 1)) as f32
    }

    fn stddev(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        let n = self.values.len() as f64;
        let mean = self.values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = self
            .values
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        variance.sqrt() as f32
    }

    /// Mean Laplacian residual over interior pixels that are not edges
    fn flat_residual(&self) -> f32 {
        if self.width < 3 || self.height < 3 {
            return 0.0;
        }
        let mut total = 0i64;
        let mut count = 0i64;
        for y in 1..self.height - 1 {
            for x in 1..self.width - 1 {
                if self.gradient(x, y) > EDGE_THRESHOLD {
                    continue;
                }
                let around = self.at(x - 1, y) + self.at(x + 1, y) + self.at(x, y - 1) + self.at(x, y + 1);
                total += ((4 * self.at(x, y) - around).abs() / 4) as i64;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            total as f32 / count as f32
        }
    }

    fn looks_like_text(&self) -> bool {
        if self.width < 2 || self.height == 0 {
            return false;
        }

        let extremes = self.values.iter().filter(|&&v| !(48..=208).contains(&v)).count();
        if (extremes as f32 / self.values.len() as f32) < TEXT_BIMODAL_FRACTION {
            return false;
        }

        let (low, high) = TEXT_ROW_DENSITY;
        let text_rows = (0..self.height)
            .filter(|&y| {
                let transitions = (0..self.width - 1)
                    .filter(|&x| (self.at(x + 1, y) - self.at(x, y)).abs() > TEXT_TRANSITION)
                    .count();
                let density = transitions as f32 / (self.width - 1) as f32;
                density >= low && density <= high
            })
            .count();

        text_rows as f32 / self.height as f32 >= TEXT_ROW_FRACTION
    }
}

fn color_complexity(rgb: &RgbImage) -> ColorComplexity {
    let grayscale = rgb.pixels().all(|p| {
        let [r, g, b] = p.0.map(i32::from);
        (r - g).abs() <= GRAYSCALE_TOLERANCE && (g - b).abs() <= GRAYSCALE_TOLERANCE
    });
    if grayscale {
        return ColorComplexity::Monochrome;
    }

    let mut palette = HashSet::new();
    for p in rgb.pixels() {
        let [r, g, b] = p.0;
        palette.insert(((r >> 3) as u16) << 10 | ((g >> 3) as u16) << 5 | (b >> 3) as u16);
        if palette.len() > LIMITED_PALETTE {
            return ColorComplexity::Full;
        }
    }
    if palette.len() <= 2 {
        ColorComplexity::Monochrome
    } else {
        ColorComplexity::Limited
    }
}

fn skin_coverage_in_range(rgb: &RgbImage) -> bool {
    let total = (rgb.width() * rgb.height()) as f32;
    if total == 0.0 {
        return false;
    }
    let skin = rgb
        .pixels()
        .filter(|p| {
            let [r, g, b] = p.0.map(f32::from);
            let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
            let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
            (77.0..=127.0).contains(&cb) && (133.0..=173.0).contains(&cr)
        })
        .count() as f32;
    let coverage = skin / total;
    coverage >= SKIN_COVERAGE.0 && coverage <= SKIN_COVERAGE.1
}

#[derive(Clone, Copy)]
struct Bin {
    count: u64,
    sum: [u64; 3],
}

impl Bin {
    fn mean(&self) -> [i32; 3] {
        let n = self.count.max(1);
        self.sum.map(|s| (s / n) as i32)
    }
}

fn distance(a: [i32; 3], b: [i32; 3]) -> i32 {
    (0..3).map(|i| (a[i] - b[i]).pow(2)).sum()
}

/// Up to five `#rrggbb` colours, most frequent first
fn dominant_colors(rgb: &RgbImage) -> Vec<String> {
    let mut bins = vec![Bin { count: 0, sum: [0; 3] }; 4096];
    for p in rgb.pixels() {
        let [r, g, b] = p.0;
        let index = ((r >> 4) as usize) << 8 | ((g >> 4) as usize) << 4 | (b >> 4) as usize;
        let bin = &mut bins[index];
        bin.count += 1;
        bin.sum[0] += r as u64;
        bin.sum[1] += g as u64;
        bin.sum[2] += b as u64;
    }
    let mut occupied: Vec<Bin> = bins.into_iter().filter(|b| b.count > 0).collect();
    if occupied.is_empty() {
        return Vec::new();
    }
    occupied.sort_by(|a, b| b.count.cmp(&a.count));

    let mut centroids: Vec<[i32; 3]> = Vec::with_capacity(MAX_DOMINANT_COLORS);
    for bin in &occupied {
        let color = bin.mean();
        if centroids
            .iter()
            .all(|c| distance(*c, color) > SEED_DISTANCE * SEED_DISTANCE)
        {
            centroids.push(color);
            if centroids.len() == MAX_DOMINANT_COLORS {
                break;
            }
        }
    }

    let mut weights = vec![0u64; centroids.len()];
    for _ in 0..KMEANS_ROUNDS {
        let mut clusters = vec![Bin { count: 0, sum: [0; 3] }; centroids.len()];
        for bin in &occupied {
            let nearest = nearest_centroid(&centroids, bin.mean());
            let cluster = &mut clusters[nearest];
            cluster.count += bin.count;
            for channel in 0..3 {
                cluster.sum[channel] += bin.sum[channel];
            }
        }
        let updated: Vec<[i32; 3]> = clusters
            .iter()
            .zip(&centroids)
            .map(|(cluster, old)| if cluster.count == 0 { *old } else { cluster.mean() })
            .collect();
        weights = clusters.iter().map(|c| c.count).collect();
        if updated == centroids {
            break;
        }
        centroids = updated;
    }

    let mut ranked: Vec<([i32; 3], u64)> = centroids.into_iter().zip(weights).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .filter(|(_, weight)| *weight > 0)
        .map(|([r, g, b], _)| format!("#{:02x}{:02x}{:02x}", r, g, b))
        .collect()
}

fn nearest_centroid(centroids: &[[i32; 3]], color: [i32; 3]) -> usize {
    centroids
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| distance(**c, color))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{flat_image, gradient_image, noisy_image, text_like_image};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_flat_image_is_low_complexity() {
        let features = extract(&flat_image(200, 100, [30, 120, 200]));
        assert_eq!(features.complexity, Complexity::Low);
        assert_eq!(features.noise_level, NoiseLevel::Clean);
        assert!(!features.has_text);
        assert!(!features.has_faces);
        assert_eq!(features.dominant_colors, vec!["#1e78c8".to_string()]);
    }

    #[test]
    fn test_text_page_is_detected() {
        let features = extract(&text_like_image(1920, 1080));
        assert!(features.has_text);
        assert_eq!(features.complexity, Complexity::High);
        assert_eq!(features.color_complexity, ColorComplexity::Monochrome);
    }

    #[test]
    fn test_random_noise_is_full_color_and_complex() {
        let features = extract(&noisy_image(256, 256, 3));
        assert_eq!(features.complexity, Complexity::High);
        assert_eq!(features.color_complexity, ColorComplexity::Full);
        assert!(!features.has_text);
    }

    #[test]
    fn test_gradient_is_smooth() {
        let features = extract(&gradient_image(400, 300));
        assert_eq!(features.complexity, Complexity::Low);
        assert_eq!(features.noise_level, NoiseLevel::Clean);
        assert_eq!(features.color_complexity, ColorComplexity::Full);
    }

    #[test]
    fn test_limited_palette() {
        let colors = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [250, 250, 0]];
        let image = RgbImage::from_fn(64, 64, |x, y| Rgb(colors[((x / 16 + y / 16) % 4) as usize]));
        let features = extract(&DynamicImage::ImageRgb8(image));
        assert_eq!(features.color_complexity, ColorComplexity::Limited);
        assert_eq!(features.dominant_colors.len(), 4);
    }

    #[test]
    fn test_dominant_colors_are_bounded_and_formatted() {
        let features = extract(&noisy_image(128, 128, 9));
        assert!(!features.dominant_colors.is_empty());
        assert!(features.dominant_colors.len() <= MAX_DOMINANT_COLORS);
        for color in &features.dominant_colors {
            assert_eq!(color.len(), 7);
            assert!(color.starts_with('#'));
            assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_dominant_colors_rank_by_area() {
        // Three quarters orange, one quarter navy
        let image = RgbImage::from_fn(100, 100, |x, _| {
            if x < 75 {
                Rgb([240, 140, 20])
            } else {
                Rgb([10, 20, 90])
            }
        });
        let colors = dominant_colors(&image);
        assert_eq!(colors, vec!["#f08c14".to_string(), "#0a145a".to_string()]);
    }

    #[test]
    fn test_skin_tone_coverage() {
        let image = RgbImage::from_fn(100, 100, |x, y| {
            if (30..70).contains(&x) && (20..80).contains(&y) {
                Rgb([224, 172, 138])
            } else {
                Rgb([30, 60, 40])
            }
        });
        assert!(skin_coverage_in_range(&image));
        assert!(!skin_coverage_in_range(&RgbImage::from_pixel(50, 50, Rgb([224, 172, 138]))));
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(classify_complexity(0.5, 5.0), Complexity::Low);
        assert_eq!(classify_complexity(0.2, 40.0), Complexity::High);
        assert_eq!(classify_complexity(0.1, 40.0), Complexity::Medium);
        assert_eq!(classify_noise(1.0), NoiseLevel::Clean);
        assert_eq!(classify_noise(8.0), NoiseLevel::Moderate);
        assert_eq!(classify_noise(30.0), NoiseLevel::Heavy);
    }
}
