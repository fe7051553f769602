//! Image quality assessment.
//!
//! Each axis (resolution, brightness, contrast, sharpness, text coverage) is an
//! independent [`QualityProbe`]. The assessor combines whichever probes produced
//! a result into one weighted score. Weights are renormalized over the probes
//! that ran, so a probe can be disabled or fail without skewing the scale.
//!
//! Assessment never fails: a probe that cannot compute its metric returns
//! `None` and is left out.

use std::time::{Duration, Instant};

use image::{GenericImageView, GrayImage};
use serde::{Deserialize, Serialize};

use super::types::CapturedImage;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Resolution at which the resolution score saturates.
const IDEAL_WIDTH: u32 = 800;
const IDEAL_HEIGHT: u32 = 600;

/// Minimum short/long side for the resolution check to pass.
const MIN_SHORT_SIDE: u32 = 300;
const MIN_LONG_SIDE: u32 = 400;

/// Mean luma (0..1) scored as ideal.
const IDEAL_BRIGHTNESS: f32 = 0.55;

/// RMS contrast at which the contrast score saturates.
const CONTRAST_SATURATION: f32 = 64.0;

/// Laplacian variance at which the sharpness score saturates.
const SHARPNESS_SATURATION: f32 = 500.0;

/// Side of the square blocks sampled for text coverage.
const TEXT_BLOCK_SIZE: u32 = 8;

/// Luma standard deviation above which a block looks like print.
const TEXT_BLOCK_STDDEV: f32 = 20.0;

/// Share of text-like blocks at which the text-area score saturates.
const TEXT_COVERAGE_SATURATION: f32 = 0.20;

/// Pixel probes run on a copy no larger than this on either side.
const ANALYSIS_MAX_DIM: u32 = 1024;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCheckType {
    Resolution,
    Brightness,
    Contrast,
    Sharpness,
    TextArea,
}

impl QualityCheckType {
    /// Fixed weight in the overall score.
    pub fn weight(self) -> f32 {
        match self {
            Self::Resolution => 0.25,
            Self::Brightness => 0.15,
            Self::Contrast => 0.20,
            Self::Sharpness => 0.25,
            Self::TextArea => 0.15,
        }
    }

    /// Score at or above which the check passes.
    pub fn pass_threshold(self) -> f32 {
        match self {
            // Resolution passes on pixel dimensions, not on its score
            Self::Resolution => 0.0,
            Self::Brightness => 0.5,
            Self::Contrast => 0.4,
            Self::Sharpness => 0.2,
            Self::TextArea => 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub check_type: QualityCheckType,
    pub score: f32,
    pub passed: bool,
    /// Raw metric behind the score (megapixels, mean luma, RMS, variance, coverage).
    pub measured: f32,
    pub details: String,
}

impl QualityCheck {
    fn scored(check_type: QualityCheckType, score: f32, measured: f32, details: String) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            check_type,
            score,
            passed: score >= check_type.pass_threshold(),
            measured,
            details,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRecommendation {
    Excellent,
    Good,
    Acceptable,
    Poor,
    Unusable,
}

impl QualityRecommendation {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.9 {
            Self::Excellent
        } else if score >= 0.7 {
            Self::Good
        } else if score >= 0.5 {
            Self::Acceptable
        } else if score >= 0.3 {
            Self::Poor
        } else {
            Self::Unusable
        }
    }
}

/// Human-facing hint derived from a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityWarning {
    LowResolution,
    TooDark,
    TooBright,
    LowContrast,
    Blurry,
    LittleText,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub overall_score: f32,
    pub checks: Vec<QualityCheck>,
    pub recommendation: QualityRecommendation,
    pub estimated_ocr_success: f32,
    pub warnings: Vec<QualityWarning>,
    pub processing_time: Duration,
}

impl QualityAssessment {
    pub fn check(&self, check_type: QualityCheckType) -> Option<&QualityCheck> {
        self.checks.iter().find(|c| c.check_type == check_type)
    }

    pub fn failed_check_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    /// Gate test: passes when the score is at least `minimum` (inclusive).
    pub fn meets(&self, minimum: f32) -> bool {
        self.overall_score >= minimum
    }
}

// ═══════════════════════════════════════════════════════════
// Probe trait
// ═══════════════════════════════════════════════════════════

/// One independent quality axis.
pub trait QualityProbe: Send + Sync {
    fn check_type(&self) -> QualityCheckType;

    /// `sample` is a grayscale copy (possibly downscaled); `original` is the
    /// size of the captured image. `None` means the metric is unavailable.
    fn run(&self, sample: &GrayImage, original: (u32, u32)) -> Option<QualityCheck>;
}

// ── ResolutionProbe ───────────────────────────────────────

pub struct ResolutionProbe;

impl QualityProbe for ResolutionProbe {
    fn check_type(&self) -> QualityCheckType {
        QualityCheckType::Resolution
    }

    fn run(&self, _sample: &GrayImage, (w, h): (u32, u32)) -> Option<QualityCheck> {
        let pixels = w as f64 * h as f64;
        let ideal = IDEAL_WIDTH as f64 * IDEAL_HEIGHT as f64;
        let score = (pixels / ideal).min(1.0) as f32;
        let passed = w.min(h) >= MIN_SHORT_SIDE && w.max(h) >= MIN_LONG_SIDE;

        Some(QualityCheck {
            check_type: QualityCheckType::Resolution,
            score,
            passed,
            measured: (pixels / 1_000_000.0) as f32,
            details: format!("{w}x{h} px"),
        })
    }
}

// ── BrightnessProbe ───────────────────────────────────────

pub struct BrightnessProbe;

impl QualityProbe for BrightnessProbe {
    fn check_type(&self) -> QualityCheckType {
        QualityCheckType::Brightness
    }

    fn run(&self, sample: &GrayImage, _original: (u32, u32)) -> Option<QualityCheck> {
        let mean = mean_luma(sample)?;
        let score = 1.0 - (mean - IDEAL_BRIGHTNESS).abs() / IDEAL_BRIGHTNESS;
        Some(QualityCheck::scored(
            QualityCheckType::Brightness,
            score,
            mean,
            format!("mean luma {mean:.2}"),
        ))
    }
}

// ── ContrastProbe ─────────────────────────────────────────

pub struct ContrastProbe;

impl QualityProbe for ContrastProbe {
    fn check_type(&self) -> QualityCheckType {
        QualityCheckType::Contrast
    }

    fn run(&self, sample: &GrayImage, _original: (u32, u32)) -> Option<QualityCheck> {
        if sample.width() == 0 || sample.height() == 0 {
            return None;
        }
        let rms = compute_contrast_score(sample);
        Some(QualityCheck::scored(
            QualityCheckType::Contrast,
            rms / CONTRAST_SATURATION,
            rms,
            format!("RMS contrast {rms:.1}"),
        ))
    }
}

// ── SharpnessProbe ────────────────────────────────────────

pub struct SharpnessProbe;

impl QualityProbe for SharpnessProbe {
    fn check_type(&self) -> QualityCheckType {
        QualityCheckType::Sharpness
    }

    fn run(&self, sample: &GrayImage, _original: (u32, u32)) -> Option<QualityCheck> {
        if sample.width() < 3 || sample.height() < 3 {
            return None;
        }
        let variance = compute_laplacian_variance(sample);
        Some(QualityCheck::scored(
            QualityCheckType::Sharpness,
            variance / SHARPNESS_SATURATION,
            variance,
            format!("Laplacian variance {variance:.1}"),
        ))
    }
}

// ── TextAreaProbe ─────────────────────────────────────────

/// Estimates how much of the frame carries print: the share of 8x8 blocks
/// whose luma spread looks like glyph edges rather than flat background.
pub struct TextAreaProbe;

impl QualityProbe for TextAreaProbe {
    fn check_type(&self) -> QualityCheckType {
        QualityCheckType::TextArea
    }

    fn run(&self, sample: &GrayImage, _original: (u32, u32)) -> Option<QualityCheck> {
        let coverage = text_block_coverage(sample)?;
        Some(QualityCheck::scored(
            QualityCheckType::TextArea,
            coverage / TEXT_COVERAGE_SATURATION,
            coverage,
            format!("{:.0}% text-like blocks", coverage * 100.0),
        ))
    }
}

// ── FixedQualityProbe ─────────────────────────────────────

/// Probe with a constant result, for gate-boundary tests and for plugging a
/// known score where real pixel analysis is not wanted.
pub struct FixedQualityProbe {
    check_type: QualityCheckType,
    score: Option<f32>,
}

impl FixedQualityProbe {
    pub fn new(check_type: QualityCheckType, score: f32) -> Self {
        Self {
            check_type,
            score: Some(score),
        }
    }

    /// Probe that never produces a result.
    pub fn unavailable(check_type: QualityCheckType) -> Self {
        Self {
            check_type,
            score: None,
        }
    }
}

impl QualityProbe for FixedQualityProbe {
    fn check_type(&self) -> QualityCheckType {
        self.check_type
    }

    fn run(&self, _sample: &GrayImage, _original: (u32, u32)) -> Option<QualityCheck> {
        let score = self.score?;
        Some(QualityCheck::scored(
            self.check_type,
            score,
            score,
            "fixed".to_string(),
        ))
    }
}

// ═══════════════════════════════════════════════════════════
// ImageQualityAssessor
// ═══════════════════════════════════════════════════════════

pub struct ImageQualityAssessor {
    probes: Vec<Box<dyn QualityProbe>>,
}

impl ImageQualityAssessor {
    /// All five pixel probes.
    pub fn new() -> Self {
        Self::with_probes(vec![
            Box::new(ResolutionProbe),
            Box::new(BrightnessProbe),
            Box::new(ContrastProbe),
            Box::new(SharpnessProbe),
            Box::new(TextAreaProbe),
        ])
    }

    pub fn with_probes(probes: Vec<Box<dyn QualityProbe>>) -> Self {
        Self { probes }
    }

    pub fn probe_types(&self) -> Vec<QualityCheckType> {
        self.probes.iter().map(|p| p.check_type()).collect()
    }

    pub fn assess(&self, image: &CapturedImage) -> QualityAssessment {
        let start = Instant::now();
        let original = image.dimensions();

        let checks: Vec<QualityCheck> = if image.is_degenerate() {
            Vec::new()
        } else {
            let sample = analysis_sample(image);
            self.probes
                .iter()
                .filter_map(|probe| probe.run(&sample, original))
                .collect()
        };

        let overall_score = weighted_score(&checks);
        let failed = checks.iter().filter(|c| !c.passed).count();
        let estimated_ocr_success =
            (overall_score * 0.9 - 0.1 * failed as f32).clamp(0.1, 0.95);
        let warnings = checks.iter().filter_map(warning_for).collect();

        tracing::debug!(
            score = overall_score,
            checks = checks.len(),
            failed,
            "Image quality assessed"
        );

        QualityAssessment {
            overall_score,
            recommendation: QualityRecommendation::from_score(overall_score),
            checks,
            estimated_ocr_success,
            warnings,
            processing_time: start.elapsed(),
        }
    }
}

impl Default for ImageQualityAssessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-weight average over the checks present. No checks → 0.
pub fn weighted_score(checks: &[QualityCheck]) -> f32 {
    let total_weight: f32 = checks.iter().map(|c| c.check_type.weight()).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted: f32 = checks
        .iter()
        .map(|c| c.score * c.check_type.weight())
        .sum();
    (weighted / total_weight).clamp(0.0, 1.0)
}

fn warning_for(check: &QualityCheck) -> Option<QualityWarning> {
    if check.passed {
        return None;
    }
    Some(match check.check_type {
        QualityCheckType::Resolution => QualityWarning::LowResolution,
        // Brightness fails on both ends
        QualityCheckType::Brightness if check.measured < IDEAL_BRIGHTNESS => {
            QualityWarning::TooDark
        }
        QualityCheckType::Brightness => QualityWarning::TooBright,
        QualityCheckType::Contrast => QualityWarning::LowContrast,
        QualityCheckType::Sharpness => QualityWarning::Blurry,
        QualityCheckType::TextArea => QualityWarning::LittleText,
    })
}

fn analysis_sample(image: &CapturedImage) -> GrayImage {
    let (w, h) = image.image.dimensions();
    if w > ANALYSIS_MAX_DIM || h > ANALYSIS_MAX_DIM {
        image.image.thumbnail(ANALYSIS_MAX_DIM, ANALYSIS_MAX_DIM).to_luma8()
    } else {
        image.to_luma8()
    }
}

// ═══════════════════════════════════════════════════════════
// Pixel metrics (reusable)
// ═══════════════════════════════════════════════════════════

/// Mean luma normalized to 0..1. `None` for an empty image.
pub fn mean_luma(img: &GrayImage) -> Option<f32> {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return None;
    }
    let sum: u64 = img.pixels().map(|p| p.0[0] as u64).sum();
    Some((sum as f64 / count as f64 / 255.0) as f32)
}

/// Laplacian variance: sharpness metric, higher is sharper.
///
/// 3x3 kernel `[0,1,0; 1,-4,1; 0,1,0]`. Blurry photos score below ~100,
/// crisp print above ~500.
pub fn compute_laplacian_variance(img: &GrayImage) -> f32 {
    let (w, h) = (img.width(), img.height());
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let px = |x: u32, y: u32| img.get_pixel(x, y).0[0] as f64;
            let laplacian =
                px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0) as f32
}

/// RMS contrast: standard deviation of luma (0..127.5).
pub fn compute_contrast_score(img: &GrayImage) -> f32 {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for pixel in img.pixels() {
        let val = pixel.0[0] as f64;
        sum += val;
        sum_sq += val * val;
        count += 1;
    }

    if count == 0 {
        return 0.0;
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0).sqrt() as f32
}

/// Share of full 8x8 blocks whose luma standard deviation looks like print.
/// `None` when the image holds no full block.
pub fn text_block_coverage(img: &GrayImage) -> Option<f32> {
    let blocks_x = img.width() / TEXT_BLOCK_SIZE;
    let blocks_y = img.height() / TEXT_BLOCK_SIZE;
    if blocks_x == 0 || blocks_y == 0 {
        return None;
    }

    let mut text_blocks = 0u32;
    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let mut sum = 0.0f32;
            let mut sum_sq = 0.0f32;
            for y in 0..TEXT_BLOCK_SIZE {
                for x in 0..TEXT_BLOCK_SIZE {
                    let v = img
                        .get_pixel(bx * TEXT_BLOCK_SIZE + x, by * TEXT_BLOCK_SIZE + y)
                        .0[0] as f32;
                    sum += v;
                    sum_sq += v * v;
                }
            }
            let n = (TEXT_BLOCK_SIZE * TEXT_BLOCK_SIZE) as f32;
            let mean = sum / n;
            let stddev = (sum_sq / n - mean * mean).max(0.0).sqrt();
            if stddev > TEXT_BLOCK_STDDEV {
                text_blocks += 1;
            }
        }
    }

    Some(text_blocks as f32 / (blocks_x * blocks_y) as f32)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
