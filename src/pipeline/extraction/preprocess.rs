//! Best-effort image enhancement before recognition.
//!
//! Key rule: do NOT enhance clean photos. Each step runs only when its
//! metric says the image needs it:
//! - EXIF orientation → rotate/flip upright
//! - low RMS contrast → contrast stretch
//! - low Laplacian variance → unsharp mask
//!
//! Preprocessing is never required for correctness; the coordinator falls back
//! to the original image when it fails.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::DynamicImage;
use tracing::debug;

use super::quality::{compute_contrast_score, compute_laplacian_variance};
use super::types::CapturedImage;
use super::ExtractionError;

/// RMS contrast below this triggers a contrast stretch.
const CONTRAST_THRESHOLD: f32 = 25.0;

/// Laplacian variance below this triggers sharpening.
const BLUR_THRESHOLD: f32 = 100.0;

/// Percentage passed to `adjust_contrast`.
const CONTRAST_BOOST: f32 = 30.0;

/// Unsharp mask parameters (Gaussian sigma, luma threshold).
const UNSHARP_SIGMA: f32 = 1.0;
const UNSHARP_THRESHOLD: i32 = 4;

/// Image → image enhancement step.
pub trait ImagePreprocessor: Send + Sync {
    fn preprocess(&self, image: &CapturedImage) -> Result<CapturedImage, ExtractionError>;
}

// ═══════════════════════════════════════════════════════════
// LabelPreprocessor
// ═══════════════════════════════════════════════════════════

pub struct LabelPreprocessor {
    contrast_threshold: f32,
    blur_threshold: f32,
}

impl LabelPreprocessor {
    pub fn new() -> Self {
        Self {
            contrast_threshold: CONTRAST_THRESHOLD,
            blur_threshold: BLUR_THRESHOLD,
        }
    }

    pub fn with_thresholds(contrast_threshold: f32, blur_threshold: f32) -> Self {
        Self {
            contrast_threshold,
            blur_threshold,
        }
    }
}

impl Default for LabelPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImagePreprocessor for LabelPreprocessor {
    fn preprocess(&self, image: &CapturedImage) -> Result<CapturedImage, ExtractionError> {
        if image.is_degenerate() {
            let (w, h) = image.dimensions();
            return Err(ExtractionError::Preprocessing(format!(
                "cannot enhance a {w}x{h} image"
            )));
        }

        let rotated = image.orientation != 1;
        let mut working = if rotated {
            apply_orientation((*image.image).clone(), image.orientation)
        } else {
            (*image.image).clone()
        };

        let gray = working.to_luma8();
        let contrast = compute_contrast_score(&gray);
        let sharpness = compute_laplacian_variance(&gray);
        let mut changed = rotated;

        if contrast < self.contrast_threshold {
            debug!(contrast, "Stretching low-contrast image");
            working = working.adjust_contrast(CONTRAST_BOOST);
            changed = true;
        }

        if sharpness < self.blur_threshold {
            debug!(sharpness, "Sharpening soft image");
            working = working.unsharpen(UNSHARP_SIGMA, UNSHARP_THRESHOLD);
            changed = true;
        }

        if !changed {
            return Ok(image.clone());
        }
        Ok(CapturedImage {
            image: Arc::new(working),
            orientation: 1,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Orientation
// ═══════════════════════════════════════════════════════════

/// Read EXIF orientation tag (0x0112) from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation transform.
///
/// 1 = normal, 2 = mirrored, 3 = 180°, 4 = flipped vertically,
/// 5 = mirrored + 90° CW, 6 = 90° CW, 7 = mirrored + 270° CW, 8 = 270° CW.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ═══════════════════════════════════════════════════════════
// Mock implementation (testing)
// ═══════════════════════════════════════════════════════════

/// Passthrough preprocessor, optionally failing every call.
pub struct MockImagePreprocessor {
    fail: bool,
    calls: AtomicUsize,
}

impl MockImagePreprocessor {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImagePreprocessor for MockImagePreprocessor {
    fn preprocess(&self, image: &CapturedImage) -> Result<CapturedImage, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ExtractionError::Preprocessing(
                "Mock preprocessing failure".into(),
            ));
        }
        Ok(image.clone())
    }
}
