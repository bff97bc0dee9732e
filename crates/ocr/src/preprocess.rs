use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::{filter3x3, gaussian_blur_f32, median_filter};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::geometry::min_area_rect;
use imageproc::morphology::{grayscale_close, grayscale_dilate, Mask};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Named combination of preprocessing steps a template region asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessVariant {
    /// Shadow removal and sharpening for faded documents.
    HighContrast,
    /// Thermal receipts; branches on photo vs. flatbed scan.
    Receipt,
    /// Denoise, equalize, global threshold. Unknown selectors fall back here.
    #[default]
    #[serde(other)]
    Standard,
}

impl PreprocessVariant {
    /// Run the variant on an already-grayscale image.
    pub fn apply(self, gray: &GrayImage, photo_threshold_px: u32) -> GrayImage {
        match self {
            PreprocessVariant::Standard => preprocess_standard(gray),
            PreprocessVariant::HighContrast => preprocess_high_contrast(gray),
            PreprocessVariant::Receipt => preprocess_receipt(gray, photo_threshold_px),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binarization {
    /// Single global threshold chosen by Otsu's method.
    Otsu,
    /// Pixel is white when brighter than its Gaussian-weighted neighbourhood minus `offset`.
    Adaptive { block_size: u32, offset: i16 },
}

// ── Loading / encoding ───────────────────────────────────────────────────────

pub fn load_image(path: &Path) -> Result<DynamicImage, PreprocessError> {
    Ok(image::open(path)?)
}

pub fn decode_image(data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    Ok(image::load_from_memory(data)?)
}

/// Down-scale so neither side exceeds `max_side` (Tesseract works best around 300 DPI / ~2000 px).
pub fn fit_within(img: GrayImage, max_side: u32) -> GrayImage {
    if img.width() > max_side || img.height() > max_side {
        DynamicImage::ImageLuma8(img)
            .resize(max_side, max_side, image::imageops::FilterType::Lanczos3)
            .into_luma8()
    } else {
        img
    }
}

pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

/// True when the image is large enough to be a camera photo rather than a scan.
pub fn is_photo(width: u32, height: u32, photo_threshold_px: u32) -> bool {
    width > photo_threshold_px || height > photo_threshold_px
}

// ── Variants ─────────────────────────────────────────────────────────────────

pub fn preprocess_standard(gray: &GrayImage) -> GrayImage {
    let denoised = denoise(gray, 1);
    let enhanced = enhance_contrast(&denoised);
    binarize(&enhanced, Binarization::Otsu)
}

pub fn preprocess_high_contrast(gray: &GrayImage) -> GrayImage {
    let shadows_removed = remove_shadows(gray);
    let enhanced = enhance_contrast(&shadows_removed);
    let sharpened = sharpen(&enhanced);
    binarize(&sharpened, Binarization::Adaptive { block_size: 11, offset: 2 })
}

pub fn preprocess_receipt(gray: &GrayImage, photo_threshold_px: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let binary = if is_photo(w, h, photo_threshold_px) {
        debug!(width = w, height = h, "Receipt preprocessing: photo path");
        let shadows_removed = remove_shadows(gray);
        let denoised = denoise(&shadows_removed, 2);
        let enhanced = enhance_contrast(&denoised);
        let sharpened = sharpen(&enhanced);
        binarize(&sharpened, Binarization::Adaptive { block_size: 21, offset: 5 })
    } else {
        debug!(width = w, height = h, "Receipt preprocessing: scan path");
        let denoised = denoise(gray, 1);
        let enhanced = enhance_contrast(&denoised);
        binarize(&enhanced, Binarization::Adaptive { block_size: 15, offset: 4 })
    };
    close_small_gaps(&binary)
}

// ── Steps ────────────────────────────────────────────────────────────────────

pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Edge-preserving median denoise; `radius` 1 is a 3×3 window, 2 is 5×5.
pub fn denoise(img: &GrayImage, radius: u32) -> GrayImage {
    median_filter(img, radius, radius)
}

/// Tiled histogram equalization (CLAHE) with the usual 8×8 grid and clip limit 2.
pub fn enhance_contrast(img: &GrayImage) -> GrayImage {
    clahe(img, 2.0, 8)
}

pub fn clahe(img: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let tile_w = w.div_ceil(grid.clamp(1, w));
    let tile_h = h.div_ceil(grid.clamp(1, h));
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, y0) = (tx * tile_w, ty * tile_h);
            let (x1, y1) = ((x0 + tile_w).min(w), (y0 + tile_h).min(h));
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[img.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            luts.push(clipped_equalization(&mut hist, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let lut = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let axis = |pos: u32, tile: u32, tiles: u32| -> (u32, u32, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        let t0 = (f.floor().max(0.0) as u32).min(tiles - 1);
        let t1 = (t0 + 1).min(tiles - 1);
        (t0, t1, (f - t0 as f32).clamp(0.0, 1.0))
    };

    ImageBuffer::from_fn(w, h, |x, y| {
        let p = img.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, ax) = axis(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = axis(y, tile_h, tiles_y);
        let top = lut(tx0, ty0)[p] as f32 * (1.0 - ax) + lut(tx1, ty0)[p] as f32 * ax;
        let bottom = lut(tx0, ty1)[p] as f32 * (1.0 - ax) + lut(tx1, ty1)[p] as f32 * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

fn clipped_equalization(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let (share, remainder) = (excess / 256, (excess % 256) as usize);
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = ((cdf as f32 * 255.0 / area as f32).round()).min(255.0) as u8;
    }
    lut
}

pub fn binarize(img: &GrayImage, method: Binarization) -> GrayImage {
    match method {
        Binarization::Otsu => threshold(img, otsu_level(img), ThresholdType::Binary),
        Binarization::Adaptive { block_size, offset } => {
            let block_size = block_size.max(3) | 1;
            let sigma = 0.3 * ((block_size - 1) as f32 * 0.5 - 1.0) + 0.8;
            let local_mean = gaussian_blur_f32(img, sigma);
            ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
                let p = img.get_pixel(x, y)[0] as i16;
                let threshold = local_mean.get_pixel(x, y)[0] as i16 - offset;
                Luma([if p > threshold { 255 } else { 0 }])
            })
        }
    }
}

/// Rotate the page so text lines are horizontal. Angles under 0.5° are left
/// alone since the resampling blur costs more than the skew.
pub fn deskew(img: &GrayImage) -> GrayImage {
    match estimate_skew(img) {
        Some(angle) if angle.abs() >= 0.5 => {
            debug!(angle, "Deskewing");
            rotate_about_center(img, -angle.to_radians(), Interpolation::Bicubic, Luma([255]))
        }
        _ => img.clone(),
    }
}

/// Angle in degrees, within (-45, 45], of the minimum-area rectangle around the dark pixels.
pub fn estimate_skew(img: &GrayImage) -> Option<f32> {
    // Row extremes of the dark pixels share the convex hull of the whole set.
    let mut points = Vec::new();
    for (y, row) in img.enumerate_rows() {
        let mut dark = row.filter(|(_, _, p)| p[0] < 128).map(|(x, _, _)| x);
        if let Some(first) = dark.next() {
            let last = dark.last().unwrap_or(first);
            points.push(Point::new(first as i32, y as i32));
            if last != first {
                points.push(Point::new(last as i32, y as i32));
            }
        }
    }
    if points.len() < 2 {
        return None;
    }
    // Corners come back as [top left, top right, bottom right, bottom left].
    let [top_left, top_right, ..] = min_area_rect(&points);
    if top_left == top_right {
        return None;
    }
    let angle = ((top_right.y - top_left.y) as f32)
        .atan2((top_right.x - top_left.x) as f32)
        .to_degrees();
    Some(normalize_angle(angle))
}

fn normalize_angle(mut angle: f32) -> f32 {
    while angle > 45.0 {
        angle -= 90.0;
    }
    while angle <= -45.0 {
        angle += 90.0;
    }
    angle
}

/// Flatten uneven illumination: estimate the background with a 7×7 max
/// filter and a 21×21 median, then keep only the difference from it.
pub fn remove_shadows(img: &GrayImage) -> GrayImage {
    let dilated = grayscale_dilate(img, &Mask::square(3));
    let background = median_filter(&dilated, 10, 10);
    let diff: GrayImage = ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y)[0];
        let bg = background.get_pixel(x, y)[0];
        Luma([255 - p.abs_diff(bg)])
    });
    stretch_contrast(&diff)
}

/// Min-max contrast stretch to the full 0–255 range.
pub fn stretch_contrast(gray: &GrayImage) -> GrayImage {
    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px <= min_px {
        return gray.clone();
    }
    imageproc::contrast::stretch_contrast(gray, min_px, max_px, 0, 255)
}

/// 3×3 high-pass sharpen (centre 9, neighbours -1); borders replicate.
pub fn sharpen(img: &GrayImage) -> GrayImage {
    const KERNEL: [i32; 9] = [-1, -1, -1, -1, 9, -1, -1, -1, -1];
    filter3x3::<_, i32, u8>(img, &KERNEL)
}

/// 2×2 morphological closing: removes isolated dark specks smaller than the window.
pub fn close_small_gaps(img: &GrayImage) -> GrayImage {
    let window = Mask::from_image(&GrayImage::from_pixel(2, 2, Luma([255])), 1, 1);
    grayscale_close(img, &window)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_gray(width: u32, height: u32, value: u8) -> GrayImage {
        ImageBuffer::from_fn(width, height, |_, _| Luma([value]))
    }

    fn gradient_gray(width: u32, height: u32) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, _| Luma([(x * 255 / width) as u8]))
    }

    /// White page with a dark bar running at `angle_deg`.
    fn tilted_bar(angle_deg: f32) -> GrayImage {
        let slope = angle_deg.to_radians().tan();
        ImageBuffer::from_fn(240, 160, |x, y| {
            let centre = 80.0 + (x as f32 - 120.0) * slope;
            let inside = x >= 20 && x < 220 && (y as f32 - centre).abs() <= 4.0;
            Luma([if inside { 0 } else { 255 }])
        })
    }

    fn is_binary(img: &GrayImage) -> bool {
        img.pixels().all(|p| p[0] == 0 || p[0] == 255)
    }

    #[test]
    fn stretch_uniform_image_returns_same() {
        let img = solid_gray(10, 10, 128);
        assert_eq!(stretch_contrast(&img), img);
    }

    #[test]
    fn stretch_gradient_to_full_range() {
        let result = stretch_contrast(&gradient_gray(256, 1));
        let min = result.pixels().map(|p| p[0]).min().unwrap();
        let max = result.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!((min, max), (0, 255));
    }

    #[test]
    fn variants_produce_binary_images_of_same_size() {
        let img = gradient_gray(64, 48);
        for variant in [PreprocessVariant::Standard, PreprocessVariant::HighContrast, PreprocessVariant::Receipt] {
            let out = variant.apply(&img, 1500);
            assert_eq!(out.dimensions(), (64, 48), "{variant:?}");
            assert!(is_binary(&out), "{variant:?} produced non-binary output");
        }
    }

    #[test]
    fn variant_names_and_unknown_fallback() {
        let parsed: Vec<PreprocessVariant> =
            serde_json::from_str(r#"["receipt", "high_contrast", "standard", "binarize_twice"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                PreprocessVariant::Receipt,
                PreprocessVariant::HighContrast,
                PreprocessVariant::Standard,
                PreprocessVariant::Standard,
            ]
        );
        assert_eq!(serde_json::to_string(&PreprocessVariant::HighContrast).unwrap(), r#""high_contrast""#);
        assert_eq!(PreprocessVariant::default(), PreprocessVariant::Standard);
    }

    #[test]
    fn receipt_photo_branch_by_size() {
        assert!(is_photo(1501, 100, 1500));
        assert!(is_photo(100, 1600, 1500));
        assert!(!is_photo(1500, 1500, 1500));
        // Threshold lowered so the photo path runs on a small image.
        let out = preprocess_receipt(&gradient_gray(40, 30), 20);
        assert!(is_binary(&out));
    }

    #[test]
    fn otsu_separates_two_levels() {
        let img: GrayImage = ImageBuffer::from_fn(20, 10, |x, _| Luma([if x < 10 { 40 } else { 200 }]));
        let out = binarize(&img, Binarization::Otsu);
        assert_eq!(out.get_pixel(2, 5)[0], 0);
        assert_eq!(out.get_pixel(17, 5)[0], 255);
    }

    #[test]
    fn adaptive_threshold_keeps_dark_text_on_uneven_background() {
        // Background brightens left to right; a dark stroke sits in the middle.
        let img: GrayImage = ImageBuffer::from_fn(60, 20, |x, y| {
            if (28..32).contains(&x) && (5..15).contains(&y) {
                Luma([20])
            } else {
                Luma([(120 + x * 2) as u8])
            }
        });
        let out = binarize(&img, Binarization::Adaptive { block_size: 15, offset: 4 });
        assert_eq!(out.get_pixel(30, 10)[0], 0);
        assert_eq!(out.get_pixel(5, 2)[0], 255);
        assert_eq!(out.get_pixel(55, 2)[0], 255);
    }

    #[test]
    fn clahe_keeps_dimensions_and_spreads_histogram() {
        let img: GrayImage = ImageBuffer::from_fn(64, 64, |x, _| Luma([100 + (x % 16) as u8]));
        let out = enhance_contrast(&img);
        assert_eq!(out.dimensions(), (64, 64));
        let spread = |g: &GrayImage| {
            let min = g.pixels().map(|p| p[0]).min().unwrap();
            let max = g.pixels().map(|p| p[0]).max().unwrap();
            max - min
        };
        assert!(spread(&out) > spread(&img));
    }

    #[test]
    fn clahe_handles_tiny_images() {
        let out = clahe(&solid_gray(3, 2, 77), 2.0, 8);
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn estimate_skew_of_tilted_bar() {
        let angle = estimate_skew(&tilted_bar(5.0)).unwrap();
        assert!((angle - 5.0).abs() < 1.0, "estimated {angle}");
        let level = estimate_skew(&tilted_bar(0.0)).unwrap();
        assert!(level.abs() < 0.5, "estimated {level}");
    }

    #[test]
    fn deskew_leaves_level_and_blank_pages_alone() {
        let img = tilted_bar(0.0);
        assert_eq!(deskew(&img), img);
        let blank = solid_gray(30, 30, 255);
        assert_eq!(deskew(&blank), blank);
    }

    #[test]
    fn deskew_straightens_tilted_bar() {
        let corrected = deskew(&tilted_bar(6.0));
        let residual = estimate_skew(&corrected).unwrap();
        assert!(residual.abs() < 2.0, "residual skew {residual}");
    }

    /// Left half in shadow (paper 80), right half lit (paper 220), one 2 px
    /// ink stroke of 20 in each half.
    fn half_shadowed_page() -> GrayImage {
        ImageBuffer::from_fn(80, 40, |x, y| {
            let stroke = (10..30).contains(&y) && (x == 10 || x == 11 || x == 60 || x == 61);
            let paper = if x < 40 { 80 } else { 220 };
            Luma([if stroke { 20 } else { paper }])
        })
    }

    #[test]
    fn remove_shadows_lifts_shadowed_paper_to_white() {
        let img = half_shadowed_page();
        let out = remove_shadows(&img);
        assert_eq!(out.dimensions(), (80, 40));

        let shadow_paper = out.get_pixel(25, 20)[0];
        let lit_paper = out.get_pixel(50, 20)[0];
        assert!(shadow_paper >= 250, "shadowed paper -> {shadow_paper}");
        assert!(lit_paper >= 250, "lit paper -> {lit_paper}");
        assert!(out.get_pixel(60, 20)[0] < 50);
        assert!(out.get_pixel(10, 20)[0] < shadow_paper);

        // A plain stretch would leave the shadowed paper mid-gray.
        assert!(stretch_contrast(&img).get_pixel(25, 20)[0] < 100);
    }

    #[test]
    fn remove_shadows_keeps_ink_below_threshold_after_binarize() {
        let out = binarize(&remove_shadows(&half_shadowed_page()), Binarization::Otsu);
        assert_eq!(out.get_pixel(25, 20)[0], 255);
        assert_eq!(out.get_pixel(50, 20)[0], 255);
        assert_eq!(out.get_pixel(60, 20)[0], 0);
    }

    #[test]
    fn sharpen_preserves_flat_regions() {
        let img = solid_gray(8, 8, 90);
        assert_eq!(sharpen(&img), img);
    }

    #[test]
    fn close_removes_isolated_speck() {
        let mut img = solid_gray(9, 9, 255);
        img.put_pixel(4, 4, Luma([0]));
        let out = close_small_gaps(&img);
        assert_eq!(out.get_pixel(4, 4)[0], 255);
    }

    #[test]
    fn close_keeps_large_dark_blocks() {
        let img: GrayImage = ImageBuffer::from_fn(12, 12, |x, y| {
            Luma([if (3..9).contains(&x) && (3..9).contains(&y) { 0 } else { 255 }])
        });
        let out = close_small_gaps(&img);
        assert_eq!(out.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn encode_png_has_magic_bytes() {
        let bytes = encode_png(&solid_gray(4, 4, 100)).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        let back = decode_image(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (4, 4));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_image(b"not an image"), Err(PreprocessError::Load(_))));
    }

    #[test]
    fn large_image_is_resized() {
        let result = fit_within(solid_gray(3000, 1000, 200), 2800);
        assert_eq!(result.width(), 2800);
        assert!(result.height() < 1000);
        let small = solid_gray(100, 50, 200);
        assert_eq!(fit_within(small.clone(), 2800), small);
    }
}
