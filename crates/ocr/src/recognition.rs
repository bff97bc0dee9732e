use image::GrayImage;
use tracing::{debug, info, warn};

use crate::preprocess::{is_photo, PreprocessVariant};
use crate::recognizer::{EngineConfig, LayoutMode, OcrBackend, RecognizedWord};
use crate::settings::EngineSettings;
use crate::template::{DocumentRegion, DocumentTemplate, FULL_TEXT_REGION};
use crate::types::{RawWord, RegionExtraction};

/// Page-layout assumptions tried, in order, by the whole-page fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStrategy {
    SingleBlock,
    SingleColumn,
    Auto,
    SparseText,
}

impl PageStrategy {
    pub const ALL: [PageStrategy; 4] = [
        PageStrategy::SingleBlock,
        PageStrategy::SingleColumn,
        PageStrategy::Auto,
        PageStrategy::SparseText,
    ];

    pub fn layout(self) -> LayoutMode {
        match self {
            PageStrategy::SingleBlock => LayoutMode::SingleBlock,
            PageStrategy::SingleColumn => LayoutMode::SingleColumn,
            PageStrategy::Auto => LayoutMode::Auto,
            PageStrategy::SparseText => LayoutMode::SparseText,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PageStrategy::SingleBlock => "single_block",
            PageStrategy::SingleColumn => "single_column",
            PageStrategy::Auto => "auto",
            PageStrategy::SparseText => "sparse_text",
        }
    }
}

/// Outcome of one whole-page strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct PageAttempt {
    pub strategy: PageStrategy,
    pub extraction: RegionExtraction,
}

impl PageAttempt {
    /// Strategies are compared by the mean confidence of their accepted words.
    pub fn score(&self) -> f32 {
        self.extraction.confidence
    }
}

/// Percent coordinates → `(x, y, width, height)` in pixels, clamped to the image.
pub fn pixel_bounds(width: u32, height: u32, coordinates: [f32; 4]) -> (u32, u32, u32, u32) {
    let scale = |pct: f32, size: u32| ((pct * size as f32 / 100.0) as u32).min(size);
    let [x1, y1, x2, y2] = coordinates;
    let (left, top) = (scale(x1, width), scale(y1, height));
    let (right, bottom) = (scale(x2, width), scale(y2, height));
    (left, top, right.saturating_sub(left), bottom.saturating_sub(top))
}

/// Keep words strictly above `min_confidence` (0–100) with at least `min_len` characters.
pub fn filter_words(words: Vec<RecognizedWord>, min_confidence: f32, min_len: usize) -> RegionExtraction {
    let kept = words
        .into_iter()
        .filter(|w| w.confidence > min_confidence)
        .filter_map(|w| {
            let text = w.text.trim();
            if text.is_empty() || text.chars().count() < min_len {
                return None;
            }
            let raw = RawWord {
                text: text.to_string(),
                confidence: (w.confidence / 100.0).clamp(0.0, 1.0),
                bbox: w.bbox,
            };
            Some((raw, w.line))
        })
        .collect();
    RegionExtraction::from_words(kept)
}

/// Mean of the non-zero region confidences, 0 when every region came back empty.
pub fn overall_confidence(regions: &[(String, RegionExtraction)]) -> f32 {
    let scores: Vec<f32> = regions
        .iter()
        .map(|(_, r)| r.confidence)
        .filter(|c| *c > 0.0)
        .collect();
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    }
}

/// Put the fallback result in the full-text slot if it strictly beats what is there.
pub fn apply_page_fallback(regions: &mut Vec<(String, RegionExtraction)>, attempt: PageAttempt) -> bool {
    let slot = regions.iter().position(|(name, _)| name == FULL_TEXT_REGION);
    let current = slot.map_or(0.0, |i| regions[i].1.confidence);
    if attempt.score() <= current {
        return false;
    }
    info!(
        strategy = attempt.strategy.name(),
        confidence = attempt.score(),
        previous = current,
        "Whole-page fallback replaces full-text region"
    );
    match slot {
        Some(i) => regions[i].1 = attempt.extraction,
        None => regions.push((FULL_TEXT_REGION.to_string(), attempt.extraction)),
    }
    true
}

/// Runs the recognizer over template regions, and over the whole page for photos.
pub struct RecognitionEngine<'a, R: OcrBackend + ?Sized> {
    recognizer: &'a R,
    settings: &'a EngineSettings,
}

impl<'a, R: OcrBackend + ?Sized> RecognitionEngine<'a, R> {
    pub fn new(recognizer: &'a R, settings: &'a EngineSettings) -> Self {
        Self { recognizer, settings }
    }

    /// Crop, preprocess and recognize one region. Engine failures yield a
    /// zero-confidence result carrying the error.
    pub fn extract_region(&self, page: &GrayImage, region: &DocumentRegion) -> RegionExtraction {
        let (x, y, w, h) = pixel_bounds(page.width(), page.height(), region.coordinates);
        if w == 0 || h == 0 {
            debug!(region = %region.name, "Region crop is empty");
            return RegionExtraction::empty();
        }
        let crop = image::imageops::crop_imm(page, x, y, w, h).to_image();
        let processed = region.preprocessing.apply(&crop, self.settings.photo_threshold_px);

        let mut config = EngineConfig::new(&self.settings.languages, LayoutMode::SingleBlock)
            .with_whitelist(region.data_type.char_whitelist());
        config.apply_overrides(&region.engine_config);

        match self.recognizer.recognize(&processed, &config) {
            Ok(words) => {
                let extraction = filter_words(words, region.confidence_threshold * 100.0, 1);
                debug!(
                    region = %region.name,
                    words = extraction.word_count,
                    confidence = extraction.confidence,
                    "Region recognized"
                );
                extraction
            }
            Err(e) => {
                warn!(region = %region.name, "Recognition failed: {e}");
                RegionExtraction::failed(e.to_string())
            }
        }
    }

    /// Try every [`PageStrategy`] on the receipt-preprocessed page and return
    /// the best-scoring one (earliest wins ties). Failed strategies are skipped.
    pub fn best_page_attempt(&self, page: &GrayImage) -> Option<PageAttempt> {
        let processed = PreprocessVariant::Receipt.apply(page, self.settings.photo_threshold_px);
        let mut best: Option<PageAttempt> = None;
        for strategy in PageStrategy::ALL {
            let config = EngineConfig::new(&self.settings.languages, strategy.layout());
            let words = match self.recognizer.recognize(&processed, &config) {
                Ok(words) => words,
                Err(e) => {
                    warn!(strategy = strategy.name(), "Page strategy failed: {e}");
                    continue;
                }
            };
            let extraction = filter_words(
                words,
                self.settings.fallback_min_confidence,
                self.settings.fallback_min_word_len,
            );
            let attempt = PageAttempt { strategy, extraction };
            debug!(strategy = strategy.name(), score = attempt.score(), "Page strategy scored");
            if best.as_ref().map_or(true, |b| attempt.score() > b.score()) {
                best = Some(attempt);
            }
        }
        best
    }

    /// All template regions in template order, plus the whole-page fallback
    /// when the page looks like a camera photo.
    pub fn recognize_document(&self, page: &GrayImage, template: &DocumentTemplate) -> Vec<(String, RegionExtraction)> {
        let mut regions: Vec<(String, RegionExtraction)> = template
            .regions
            .iter()
            .map(|region| (region.name.clone(), self.extract_region(page, region)))
            .collect();

        if is_photo(page.width(), page.height(), self.settings.photo_threshold_px) {
            if let Some(attempt) = self.best_page_attempt(page) {
                apply_page_fallback(&mut regions, attempt);
            }
        }
        regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockRecognizer;
    use crate::types::BBox;
    use docscan_core::DataType;
    use image::{ImageBuffer, Luma};

    fn page(width: u32, height: u32) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, y| Luma([if (x + y) % 7 == 0 { 30 } else { 220 }]))
    }

    fn word(text: &str, confidence: f32, line: u32) -> RecognizedWord {
        RecognizedWord { text: text.to_string(), confidence, bbox: BBox::default(), line }
    }

    fn settings() -> EngineSettings {
        EngineSettings::default()
    }

    #[test]
    fn pixel_bounds_scale_and_clamp() {
        assert_eq!(pixel_bounds(200, 100, [0.0, 0.0, 100.0, 100.0]), (0, 0, 200, 100));
        assert_eq!(pixel_bounds(200, 100, [50.0, 70.0, 100.0, 100.0]), (100, 70, 100, 30));
        assert_eq!(pixel_bounds(200, 100, [90.0, 0.0, 120.0, 100.0]), (180, 0, 20, 100));
        assert_eq!(pixel_bounds(10, 10, [50.0, 50.0, 50.5, 50.5]), (5, 5, 0, 0));
    }

    #[test]
    fn filter_is_strictly_above_threshold() {
        let words = vec![word("TOTAL", 60.0, 0), word("125,50", 60.1, 0), word(" ", 99.0, 0)];
        let r = filter_words(words, 60.0, 1);
        assert_eq!(r.text, "125,50");
        assert_eq!(r.word_count, 1);
        assert!((r.confidence - 0.601).abs() < 1e-4);
    }

    #[test]
    fn filter_minimum_length() {
        let words = vec![word("A", 90.0, 0), word("LEI", 90.0, 0)];
        assert_eq!(filter_words(words, 40.0, 2).text, "LEI");
    }

    #[test]
    fn region_below_threshold_is_empty() {
        let mock = MockRecognizer::new("TOTAL 125,50").with_confidence(55.0);
        let s = settings();
        let engine = RecognitionEngine::new(&mock, &s);
        let region = DocumentRegion::new("totals", [0.0, 0.0, 100.0, 100.0]).with_threshold(0.6);
        let r = engine.extract_region(&page(40, 30), &region);
        assert_eq!(r.text, "");
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn region_config_uses_data_type_whitelist_and_overrides() {
        let mock = MockRecognizer::new("12,50");
        let s = settings();
        let engine = RecognitionEngine::new(&mock, &s);
        let img = page(40, 30);

        let currency = DocumentRegion::new("totals", [0.0, 0.0, 100.0, 100.0]).with_data_type(DataType::Currency);
        let r = engine.extract_region(&img, &currency);
        assert_eq!(r.text, "12,50");
        assert!((r.confidence - 0.9).abs() < 1e-6);

        let overridden = DocumentRegion::new("numbers", [0.0, 0.0, 100.0, 100.0])
            .with_data_type(DataType::Number)
            .with_engine_config("--psm 7 -c tessedit_char_whitelist=0123456789");
        engine.extract_region(&img, &overridden);

        let calls = mock.calls();
        assert_eq!(calls[0].layout, LayoutMode::SingleBlock);
        assert_eq!(calls[0].languages, "ron+eng");
        assert_eq!(calls[0].whitelist.as_deref(), DataType::Currency.char_whitelist());
        assert_eq!(calls[1].layout, LayoutMode::SingleLine);
        assert_eq!(calls[1].whitelist.as_deref(), Some("0123456789"));
    }

    #[test]
    fn engine_failure_becomes_zero_confidence_region() {
        let mock = MockRecognizer::failing();
        let s = settings();
        let engine = RecognitionEngine::new(&mock, &s);
        let template = DocumentTemplate::invoice();
        let regions = engine.recognize_document(&page(60, 40), &template);
        assert_eq!(regions.len(), 3);
        for (_, r) in &regions {
            assert_eq!(r.confidence, 0.0);
            assert!(r.error.is_some());
        }
        assert_eq!(overall_confidence(&regions), 0.0);
    }

    #[test]
    fn empty_crop_yields_empty_result() {
        let mock = MockRecognizer::new("text");
        let s = settings();
        let engine = RecognitionEngine::new(&mock, &s);
        let region = DocumentRegion::new("sliver", [10.0, 10.0, 10.5, 90.0]);
        let r = engine.extract_region(&page(20, 20), &region);
        assert_eq!(r, RegionExtraction::empty());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn best_strategy_wins_and_earliest_breaks_ties() {
        let mock = MockRecognizer::new("")
            .with_layout(LayoutMode::SingleBlock, "KAUFLAND TOTAL", 60.0)
            .with_layout(LayoutMode::SingleColumn, "KAUFLAND\nTOTAL 125,50", 85.0)
            .failing_on(LayoutMode::Auto)
            .with_layout(LayoutMode::SparseText, "KAUFLAND TOTAL", 85.0);
        let s = settings();
        let engine = RecognitionEngine::new(&mock, &s);
        let best = engine.best_page_attempt(&page(40, 30)).unwrap();
        assert_eq!(best.strategy, PageStrategy::SingleColumn);
        assert_eq!(best.extraction.text, "KAUFLAND\nTOTAL 125,50");
        let layouts: Vec<LayoutMode> = mock.calls().iter().map(|c| c.layout).collect();
        assert_eq!(
            layouts,
            vec![LayoutMode::SingleBlock, LayoutMode::SingleColumn, LayoutMode::Auto, LayoutMode::SparseText]
        );
    }

    #[test]
    fn fallback_words_need_confidence_above_forty() {
        let mock = MockRecognizer::new("LOW WORDS").with_confidence(40.0);
        let s = settings();
        let engine = RecognitionEngine::new(&mock, &s);
        let best = engine.best_page_attempt(&page(40, 30)).unwrap();
        assert_eq!(best.score(), 0.0);
    }

    #[test]
    fn fallback_replaces_only_when_strictly_better() {
        let full = |conf: f32| RegionExtraction { confidence: conf, text: "x".into(), ..RegionExtraction::empty() };
        let attempt = |conf: f32| PageAttempt { strategy: PageStrategy::Auto, extraction: full(conf) };

        let mut regions = vec![(FULL_TEXT_REGION.to_string(), full(0.8))];
        assert!(!apply_page_fallback(&mut regions, attempt(0.8)));
        assert!(apply_page_fallback(&mut regions, attempt(0.85)));
        assert_eq!(regions[0].1.confidence, 0.85);

        let mut no_full_text = vec![("header".to_string(), full(0.7))];
        assert!(apply_page_fallback(&mut no_full_text, attempt(0.5)));
        assert_eq!(no_full_text[1].0, FULL_TEXT_REGION);
        assert!(!apply_page_fallback(&mut Vec::new(), attempt(0.0)));
    }

    #[test]
    fn photos_trigger_whole_page_fallback() {
        let mock = MockRecognizer::new("KAUFLAND")
            .with_confidence(50.0)
            .with_layout(LayoutMode::SparseText, "KAUFLAND\nTOTAL 45,00 LEI", 92.0);
        let s = EngineSettings { photo_threshold_px: 30, ..settings() };
        let engine = RecognitionEngine::new(&mock, &s);
        let template = DocumentTemplate::romanian_receipt();

        let regions = engine.recognize_document(&page(40, 30), &template);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].1.text, "KAUFLAND\nTOTAL 45,00 LEI");
        assert!((regions[0].1.confidence - 0.92).abs() < 1e-6);

        // A scan-sized page only runs the template region.
        let calls_before = mock.calls().len();
        engine.recognize_document(&page(20, 20), &template);
        assert_eq!(mock.calls().len(), calls_before + 1);
    }

    #[test]
    fn overall_confidence_ignores_empty_regions() {
        let r = |c: f32| RegionExtraction { confidence: c, ..RegionExtraction::empty() };
        let regions = vec![("a".to_string(), r(0.9)), ("b".to_string(), r(0.0)), ("c".to_string(), r(0.7))];
        assert!((overall_confidence(&regions) - 0.8).abs() < 1e-6);
    }
}
